//! `ria`: load a compiled module and execute one of its entry points.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ria_core::{RString, Status};

#[derive(Parser)]
#[command(name = "ria", version, about = "RIA bytecode runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a named entry point in a compiled module.
    Run {
        module: PathBuf,
        entry: String,
        /// Caller parameters, in index order (param 0, param 1, ...).
        params: Vec<String>,
        /// Directory the HTTP/file built-ins resolve relative paths against.
        #[arg(long)]
        temp_dir: Option<PathBuf>,
        /// Path to a `ria.toml` config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::Run { module, entry, params, temp_dir, config } => run(module, entry, params, temp_dir, config),
    }
}

fn run(module_path: PathBuf, entry: String, params: Vec<String>, temp_dir: Option<PathBuf>, config_path: Option<PathBuf>) -> ExitCode {
    let mut cfg = match &config_path {
        Some(p) => match ria_runtime::EngineConfig::load(p) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => ria_runtime::EngineConfig::default(),
    };
    if let Some(dir) = temp_dir {
        cfg.temp_dir = dir;
    }

    let bytes = match std::fs::read(&module_path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: reading {}: {e}", module_path.display());
            return ExitCode::FAILURE;
        }
    };
    let module = match ria_runtime::load(bytes) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let handle = ria_runtime::create_engine(cfg);
    let params: Vec<RString> = params.iter().map(|p| RString::from_str(p)).collect();

    let mut outcome = ria_runtime::execute(handle, &module, &entry, params);
    loop {
        match outcome {
            Ok((Status::Pending, _)) => {
                outcome = ria_runtime::continue_(handle);
            }
            Ok((status, value)) => {
                println!("status: {status:?}");
                if let ria_core::Value::Str(s) = &value {
                    println!("result: {}", s.as_str());
                }
                let _ = ria_runtime::destroy_engine(handle);
                return if status == Status::Failed { ExitCode::FAILURE } else { ExitCode::SUCCESS };
            }
            Err(e) => {
                eprintln!("error: {e}");
                let _ = ria_runtime::destroy_engine(handle);
                return ExitCode::FAILURE;
            }
        }
    }
}
