use clap::Parser;

mod cli;
mod commands;

use cli::{Args, Commands};
use commands::open_composite;

fn main() {
    match run() {
        Ok(code) => {
            std::process::exit(code);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run() -> cowfs::Result<i32> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("COWFS_LOG").unwrap_or_else(|_| "info".to_string()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let fs = open_composite(&args)?;

    match args.command {
        Commands::Deleted => commands::print_deleted(&fs)?,
        Commands::Resolve { path } => commands::print_resolved(&fs, &path)?,
        Commands::Ls { path } => commands::list_directory(&fs, &path)?,
    }
    Ok(0)
}
