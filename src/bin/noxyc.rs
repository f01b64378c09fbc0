//! `noxyc` — the Noxy compiler binary. Orchestrates the library the same
//! way `why`'s `main.rs` drives `y_lang`: parse the CLI, read the source
//! file, compile it, then either print IR or emit an object file.

mod cli;

use std::error::Error;
use std::fs;

use cli::Cli;
use log::{error, info};

use noxy::{CompilerConfig, Compiler};

fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::init();
    simple_logger::init_with_level((&args.verbosity).into())?;

    let path = fs::canonicalize(&args.file)?;
    let source = fs::read_to_string(&path)?;
    let module_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("noxy_module")
        .to_string();

    if args.dump_parsed {
        match noxy::parse_source(&source) {
            Ok(program) => info!("Parsed AST:\n{program:#?}"),
            Err(diagnostic) => {
                eprintln!("{diagnostic}");
                std::process::exit(1);
            }
        }
    }

    let mut config = CompilerConfig::default().with_debug_mode(args.debug);
    for root in &args.extra_roots {
        config = config.with_extra_root(root.clone());
    }

    let compiler = Compiler::new(config);

    if args.debug {
        let (ir, diagnostic) = compiler.compile_debug(&module_name, &source)?;
        if let Some(diagnostic) = &diagnostic {
            error!("{diagnostic}");
        }
        match (ir, &args.compile) {
            (Some(ir), None) => println!("{ir}"),
            (None, _) => std::process::exit(1),
            (Some(_), Some(_)) => {
                error!("--compile is not supported together with --debug; rerun without --debug once the diagnostic is fixed");
                std::process::exit(1);
            }
        }
        if diagnostic.is_some() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let module = match compiler.compile(&module_name, &source) {
        Ok(module) => module,
        Err(diagnostic) => {
            eprintln!("{diagnostic}");
            std::process::exit(1);
        }
    };

    match &args.compile {
        Some(output) => {
            compiler.emit_object_file(&module, output)?;
            info!("wrote {}", output.display());
        }
        None => println!("{}", module.print_to_string().to_string()),
    }

    Ok(())
}
