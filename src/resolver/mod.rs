//! # Module Resolver
//!
//! Runs once per `use` statement, during parsing of imports and before the
//! semantic phase (`spec.md` §2's "Resolver invoked while parsing imports
//! before semantic phase"). Five responsibilities, applied in order:
//!
//! 1. **locate** a dotted module path against a configurable list of
//!    search roots,
//! 2. **parse** the located file (lex + parse only; resolved modules are
//!    never code-generated on their own),
//! 3. **export** its top-level functions, global assignments and struct
//!    definitions, keyed by symbol name,
//! 4. **import**, with the three `use` forms from `spec.md` §4.3 differing
//!    only in which exports end up in the import table and under what key,
//! 5. **cache** the parsed module by its dotted name so a diamond of
//!    `use` statements only parses the file once.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::ast::{Expr, Program, Stmt};
use crate::diagnostics::Diagnostic;
use crate::parser::parse_source;

/// Built-in free functions the code generator declares directly; these
/// never count as "free identifiers" a selectively-imported symbol closes
/// over (`spec.md` §4.3 step 4).
pub const BUILTINS: &[&str] = &[
    "printf",
    "malloc",
    "free",
    "strlen",
    "strcpy",
    "strcat",
    "to_str",
    "array_to_str",
    "to_int",
    "to_float",
    "ord",
    "length",
    "print",
];

/// One exported top-level definition, along with the symbol name it was
/// declared under in its source module.
#[derive(Debug, Clone)]
pub enum Export {
    Function(Stmt),
    Global(Stmt),
    Struct(Stmt),
}

impl Export {
    fn name(&self) -> &str {
        match self {
            Export::Function(Stmt::Function { name, .. }) => name,
            Export::Global(Stmt::Assignment { id, .. }) => id,
            Export::Struct(Stmt::StructDefinition { name, .. }) => name,
            _ => unreachable!("Export variants only ever wrap their matching Stmt kind"),
        }
    }
}

/// A fully parsed and exported module, cached by its dotted name.
#[derive(Debug, Clone)]
pub struct ResolvedModule {
    pub program: Program,
    pub exports: HashMap<String, Export>,
}

/// A single symbol brought into scope by a `use` statement, with the name
/// it is visible under at the call site (`M.S` for a bare `use M`, `S`
/// for `select *` or a selective import).
#[derive(Debug, Clone)]
pub struct ImportedSymbol {
    pub key: String,
    pub export: Export,
}

pub struct Resolver {
    roots: Vec<PathBuf>,
    cache: HashMap<String, ResolvedModule>,
}

impl Resolver {
    pub fn new(roots: &[String]) -> Self {
        Self {
            roots: roots.iter().map(PathBuf::from).collect(),
            cache: HashMap::new(),
        }
    }

    /// Resolves one `use module [select ...]` statement into the list of
    /// symbols it brings into scope.
    pub fn resolve_use(
        &mut self,
        module: &str,
        selected: &Option<Vec<String>>,
        import_all: bool,
    ) -> Result<Vec<ImportedSymbol>, Diagnostic> {
        self.load(module)?;
        let resolved = self.cache.get(module).expect("just loaded");

        match (import_all, selected) {
            (_, None) if !import_all => Ok(resolved
                .exports
                .values()
                .map(|export| ImportedSymbol {
                    key: format!("{module}.{}", export.name()),
                    export: export.clone(),
                })
                .collect()),
            (true, _) => Ok(resolved
                .exports
                .values()
                .map(|export| ImportedSymbol {
                    key: export.name().to_string(),
                    export: export.clone(),
                })
                .collect()),
            (false, Some(names)) => self.resolve_selected(resolved, names),
            (false, None) => unreachable!("covered by first arm"),
        }
    }

    fn resolve_selected(
        &self,
        module: &ResolvedModule,
        requested: &[String],
    ) -> Result<Vec<ImportedSymbol>, Diagnostic> {
        let mut closure = HashSet::new();
        let mut queue: Vec<String> = requested.to_vec();

        while let Some(name) = queue.pop() {
            if !closure.insert(name.clone()) {
                continue;
            }
            let Some(export) = module.exports.get(&name) else {
                continue;
            };
            if let Export::Function(Stmt::Function { params, body, .. }) = export {
                let param_names: HashSet<String> =
                    params.iter().map(|(n, _)| n.clone()).collect();
                let mut referenced = HashSet::new();
                collect_referenced_names(body, &mut referenced);
                for referenced_name in referenced {
                    if param_names.contains(&referenced_name) {
                        continue;
                    }
                    if BUILTINS.contains(&referenced_name.as_str()) {
                        continue;
                    }
                    if module.exports.contains_key(&referenced_name) {
                        queue.push(referenced_name);
                    }
                }
            }
        }

        Ok(closure
            .into_iter()
            .filter_map(|name| {
                module.exports.get(&name).map(|export| ImportedSymbol {
                    key: name,
                    export: export.clone(),
                })
            })
            .collect())
    }

    fn load(&mut self, module: &str) -> Result<(), Diagnostic> {
        if self.cache.contains_key(module) {
            return Ok(());
        }

        let path = self.locate(module).ok_or_else(|| {
            Diagnostic::semantic(
                format!(
                    "could not locate module '{module}' in any of the configured search roots"
                ),
                None,
                "",
            )
        })?;

        let source = std::fs::read_to_string(&path).map_err(|e| {
            Diagnostic::semantic(
                format!("failed to read module '{module}' at {}: {e}", path.display()),
                None,
                "",
            )
        })?;

        let program = parse_source(&source)?;
        let exports = collect_exports(&program);

        self.cache
            .insert(module.to_string(), ResolvedModule { program, exports });
        Ok(())
    }

    fn locate(&self, module: &str) -> Option<PathBuf> {
        let segments: Vec<&str> = module.split('.').collect();
        let joined = segments.join("/");

        for root in &self.roots {
            let candidates: Vec<PathBuf> = if segments.len() == 1 {
                vec![
                    root.join(format!("{joined}.nx")),
                    root.join(&joined).join("__init__.nx"),
                ]
            } else {
                vec![
                    root.join(format!("{joined}.nx")),
                    root.join(&joined).join("__init__.nx"),
                ]
            };

            for candidate in candidates {
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

fn collect_exports(program: &Program) -> HashMap<String, Export> {
    let mut exports = HashMap::new();
    for stmt in &program.statements {
        match stmt {
            Stmt::Function { name, .. } => {
                exports.insert(name.clone(), Export::Function(stmt.clone()));
            }
            Stmt::StructDefinition { name, .. } => {
                exports.insert(name.clone(), Export::Struct(stmt.clone()));
            }
            // Every top-level `let`/`global` is global by construction
            // (function-nesting depth 0), so every top-level Assignment is
            // an exportable global.
            Stmt::Assignment { id, .. } => {
                exports.insert(id.clone(), Export::Global(stmt.clone()));
            }
            _ => {}
        }
    }
    exports
}

/// Recursively collects every name referenced as an `Identifier`, `Call`,
/// `StructConstructor`, or array-access base across a statement list, per
/// the "recursive descent through child nodes" rule in `spec.md` §4.3.
fn collect_referenced_names(stmts: &[Stmt], out: &mut HashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assignment { value, .. } => collect_from_expr(value, out),
            Stmt::ArrayAssignment { index, value, .. } => {
                collect_from_expr(index, out);
                collect_from_expr(value, out);
            }
            Stmt::ArrayFieldAssignment { index, value, .. } => {
                collect_from_expr(index, out);
                collect_from_expr(value, out);
            }
            Stmt::StructAssignment { value, .. } => collect_from_expr(value, out),
            Stmt::NestedStructAssignment { value, .. } => collect_from_expr(value, out),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                collect_from_expr(condition, out);
                collect_referenced_names(then_branch, out);
                if let Some(else_branch) = else_branch {
                    collect_referenced_names(else_branch, out);
                }
            }
            Stmt::While { condition, body, .. } => {
                collect_from_expr(condition, out);
                collect_referenced_names(body, out);
            }
            Stmt::Return { value: Some(v), .. } => collect_from_expr(v, out),
            Stmt::Return { value: None, .. } | Stmt::Break { .. } => {}
            Stmt::Print { value, .. } => collect_from_expr(value, out),
            Stmt::ExprStmt { value, .. } => collect_from_expr(value, out),
            Stmt::StructDefinition { .. } | Stmt::Function { .. } | Stmt::Use { .. } => {}
        }
    }
}

fn collect_from_expr(expr: &Expr, out: &mut HashSet<String>) {
    match expr {
        Expr::Identifier(name, _) => {
            out.insert(name.clone());
        }
        Expr::Call { name, args, .. } => {
            out.insert(name.clone());
            args.iter().for_each(|a| collect_from_expr(a, out));
        }
        Expr::StructConstructor { name, args, .. } => {
            out.insert(name.clone());
            args.iter().for_each(|a| collect_from_expr(a, out));
        }
        Expr::ArrayAccess { name, index, .. } => {
            collect_from_expr(name, out);
            collect_from_expr(index, out);
        }
        Expr::Array { elements, .. } => elements.iter().for_each(|e| collect_from_expr(e, out)),
        Expr::Zeros { size, .. } => collect_from_expr(size, out),
        Expr::StructAccess { base, .. } => collect_from_expr(base, out),
        Expr::StructAccessFromArray { array_access, .. } => collect_from_expr(array_access, out),
        Expr::StringCharAccess { literal, index, .. } => {
            collect_from_expr(literal, out);
            collect_from_expr(index, out);
        }
        Expr::BinaryOp { lhs, rhs, .. } => {
            collect_from_expr(lhs, out);
            collect_from_expr(rhs, out);
        }
        Expr::UnaryOp { operand, .. } => collect_from_expr(operand, out),
        Expr::Cast { expr, .. } => collect_from_expr(expr, out),
        Expr::Concat { lhs, rhs, .. } => {
            collect_from_expr(lhs, out);
            collect_from_expr(rhs, out);
        }
        Expr::Reference { expr, .. } => collect_from_expr(expr, out),
        Expr::FString(parts, _) => {
            for part in parts {
                if let crate::ast::FStringExprPart::Expr { expr, .. } = part {
                    collect_from_expr(expr, out);
                }
            }
        }
        Expr::Number(_, _)
        | Expr::Float(_, _)
        | Expr::Str(_, _)
        | Expr::Bool(_, _)
        | Expr::Null(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;

    fn write_module(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(format!("{name}.nx"));
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn selective_import_pulls_in_transitive_closure_only() {
        let dir = std::env::temp_dir().join(format!(
            "noxy_resolver_test_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        write_module(
            &dir,
            "utils",
            "func h() -> int\nreturn 1\nend\nfunc g() -> int\nreturn h()\nend\n",
        );

        let mut resolver = Resolver::new(&[dir.to_string_lossy().to_string()]);
        let imported = resolver
            .resolve_use("utils", &Some(vec!["g".to_string()]), false)
            .unwrap();

        let keys: HashSet<String> = imported.into_iter().map(|s| s.key).collect();
        assert!(keys.contains("g"));
        assert!(keys.contains("h"));

        // `select h` alone must not pull in `g`.
        let mut resolver = Resolver::new(&[dir.to_string_lossy().to_string()]);
        let imported = resolver
            .resolve_use("utils", &Some(vec!["h".to_string()]), false)
            .unwrap();
        let keys: HashSet<String> = imported.into_iter().map(|s| s.key).collect();
        assert!(keys.contains("h"));
        assert!(!keys.contains("g"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn bare_use_namespaces_every_export_under_module_dot_symbol() {
        let dir = std::env::temp_dir().join(format!("noxy_resolver_bare_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        write_module(&dir, "shapes", "func area() -> int\nreturn 1\nend\n");

        let mut resolver = Resolver::new(&[dir.to_string_lossy().to_string()]);
        let imported = resolver.resolve_use("shapes", &None, false).unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].key, "shapes.area");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_module_is_a_diagnostic_not_a_panic() {
        let mut resolver = Resolver::new(&["/nonexistent/root/for/noxy/tests".to_string()]);
        assert!(resolver.resolve_use("nope", &None, false).is_err());
    }
}
