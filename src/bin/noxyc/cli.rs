//! Command-line surface (`spec.md` §6's CLI contract, "provided by the
//! external collaborator, specified here only for completeness"): a
//! positional source file, `--compile` to emit an object file instead of
//! printing IR, and the usual verbosity knob — the same shape as
//! `why`'s `cli.rs`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(author, version, about = "Compiler front-end and LLVM code generator for Noxy.")]
pub struct Cli {
    /// Noxy source file (`.nx`) to compile.
    #[arg(index = 1)]
    pub file: PathBuf,

    /// Emit an object file here instead of printing LLVM IR to stdout.
    #[arg(short = 'c', long)]
    pub compile: Option<PathBuf>,

    /// Catch semantic/codegen errors and print whatever IR was produced
    /// so far alongside the diagnostic, instead of failing outright.
    #[arg(long)]
    pub debug: bool,

    /// Print the parsed AST before compiling.
    #[arg(long)]
    pub dump_parsed: bool,

    /// Extra module lookup root, may be repeated.
    #[arg(long = "root")]
    pub extra_roots: Vec<String>,

    #[arg(value_enum, short, long, default_value_t = LogLevel::default())]
    pub verbosity: LogLevel,
}

impl Cli {
    pub fn init() -> Self {
        Cli::parse()
    }
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum LogLevel {
    #[default]
    #[value(alias("0"))]
    Error,
    #[value(alias("1"))]
    Warn,
    #[value(alias("2"))]
    Info,
    #[value(alias("3"))]
    Debug,
    #[value(alias("4"))]
    Trace,
}

impl From<&LogLevel> for log::Level {
    fn from(value: &LogLevel) -> Self {
        match value {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}
