//! `riac`: compile a RIA script to its on-disk bytecode module.

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

#[derive(Parser)]
#[command(name = "riac", version, about = "RIA script compiler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a `.ria` source file to a bytecode module.
    Compile {
        input: PathBuf,
        /// Defaults to the input path with its extension replaced by `.riac`.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Emit a shell completion script to stdout.
    Completions { shell: Shell },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::Compile { input, output } => run_compile(input, output),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            ExitCode::SUCCESS
        }
    }
}

fn run_compile(input: PathBuf, output: Option<PathBuf>) -> ExitCode {
    let source = match std::fs::read_to_string(&input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: reading {}: {e}", input.display());
            return ExitCode::FAILURE;
        }
    };

    let module = match ria_compiler::compile(&source) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{}: {e}", input.display());
            return ExitCode::FAILURE;
        }
    };

    let out_path = output.unwrap_or_else(|| input.with_extension("riac"));
    let mut f = match std::fs::File::create(&out_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error: creating {}: {e}", out_path.display());
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = f.write_all(&module) {
        eprintln!("error: writing {}: {e}", out_path.display());
        return ExitCode::FAILURE;
    }

    tracing::info!(bytes = module.len(), path = %out_path.display(), "compiled module");
    ExitCode::SUCCESS
}
