use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cowfs")]
#[command(about = "Inspect a copy-on-write composite of a base and an overlay directory")]
pub struct Args {
    #[arg(long, help = "Read-only base directory")]
    pub base: PathBuf,

    #[arg(long, help = "Writable overlay directory")]
    pub overlay: PathBuf,

    #[arg(long, help = "Whiteout log directory, relative to the overlay root")]
    pub whiteout: Option<String>,

    #[arg(long, help = "TOML config file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Override the rename chain hop limit")]
    pub max_rename_hops: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Print every base path deleted or renamed away, one per line")]
    Deleted,
    #[command(about = "Print the path a name currently resolves to")]
    Resolve {
        #[arg(help = "Path inside the composite")]
        path: String,
    },
    #[command(about = "List a directory of the composite")]
    Ls {
        #[arg(default_value = ".", help = "Directory inside the composite")]
        path: String,
    },
}
