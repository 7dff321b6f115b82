//! Pulsar Programming Language - CLI

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pulsar::{bindings, version, ExecutionContext, Parser, RuntimeState, NAME};

/// An embeddable stack-based scripting language
#[derive(ClapParser, Debug)]
#[command(name = "pulsar")]
#[command(version = pulsar::VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a Pulsar source file
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Check a source file for errors without running it
    Check {
        /// Source file to check
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    if args.verbose {
        info!("{} {}", NAME, version::language_version());
        info!("host: {}", std::env::consts::OS);
    }

    match args.command {
        Commands::Run { file } => run_file(&file),
        Commands::Check { file } => check_file(&file),
        Commands::Version => {
            println!("{} {}", NAME, version::language_version());
            Ok(())
        }
    }
}

fn compile_file(path: &Path) -> Result<pulsar::Module> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut module = pulsar::Module::new();
    let mut parser = Parser::new(&source);
    if let Err(error) = parser.parse_into_module(&mut module) {
        bail!("{}: {}", path.display(), error);
    }
    Ok(module)
}

fn run_file(path: &Path) -> Result<()> {
    let mut module = compile_file(path)?;
    bindings::bind_all(&mut module);

    let Some(entry) = module.find_function_by_name("main") else {
        bail!("{}: no `main` function", path.display());
    };

    let mut ctx = ExecutionContext::new(&module);
    if let Err(error) = ctx.call_function(entry) {
        eprintln!("runtime error ({}): {}", ctx.state().as_str(), error);
        eprint!("{}", ctx.stack_trace());
        std::process::exit(1);
    }

    debug_assert_eq!(ctx.state(), RuntimeState::Ok);
    for value in ctx.stack() {
        println!("{}", value);
    }
    Ok(())
}

fn check_file(path: &Path) -> Result<()> {
    compile_file(path)?;
    println!("{}: OK", path.display());
    Ok(())
}
