//! Compiler configuration threaded explicitly through the pipeline.
//!
//! The original implementation reaches for process-global state (a mutable
//! allocation ledger, LLVM init flags, search roots baked into the loader).
//! Per the redesign notes in `spec.md` §9 this crate instead threads one
//! `CompilerConfig` value through every stage that needs it.

/// Default module lookup roots, in search order: the current directory,
/// a `std/` directory for the standard library, and `noxy_examples/` for
/// sample programs and fixtures (mirrors the three default roots the
/// module resolver specifies).
pub const DEFAULT_ROOTS: &[&str] = &[".", "std", "noxy_examples"];

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Directories searched, in order, when resolving a `use` path.
    pub module_roots: Vec<String>,

    /// When set, semantic and code-generation errors are caught rather than
    /// propagated; whatever IR was produced so far is returned alongside
    /// the diagnostic (§7's "debug-IR entry point").
    pub debug_mode: bool,

    /// Overrides the LLVM target triple. `None` means "the platform
    /// default, except `*-pc-windows-msvc` is rewritten to
    /// `*-w64-windows-gnu`" per §6.
    pub target_triple_override: Option<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            module_roots: DEFAULT_ROOTS.iter().map(|s| s.to_string()).collect(),
            debug_mode: false,
            target_triple_override: None,
        }
    }
}

impl CompilerConfig {
    pub fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    pub fn with_extra_root(mut self, root: impl Into<String>) -> Self {
        self.module_roots.push(root.into());
        self
    }
}

/// Rewrites a target triple the way the code generator's module-layout
/// contract (`spec.md` §6) requires: MSVC's Windows triple is swapped for
/// the MinGW one so the module can be linked with GCC instead of the MSVC
/// toolchain.
pub fn normalize_target_triple(triple: &str) -> String {
    if triple.ends_with("pc-windows-msvc") {
        triple.replace("pc-windows-msvc", "w64-windows-gnu")
    } else {
        triple.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roots_match_spec() {
        let config = CompilerConfig::default();
        assert_eq!(config.module_roots, vec![".", "std", "noxy_examples"]);
    }

    #[test]
    fn msvc_triple_rewritten_to_mingw() {
        assert_eq!(
            normalize_target_triple("x86_64-pc-windows-msvc"),
            "x86_64-w64-windows-gnu"
        );
        assert_eq!(
            normalize_target_triple("x86_64-unknown-linux-gnu"),
            "x86_64-unknown-linux-gnu"
        );
    }
}
