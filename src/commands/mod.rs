pub mod deleted;
pub mod ls;
pub mod resolve;

pub use deleted::print_deleted;
pub use ls::list_directory;
pub use resolve::print_resolved;

use cowfs::{load_config, merge_configs, CowConfig, CowFs, LocalFs, Result};

use crate::cli::{validate_layers, Args};

pub type HostCowFs = CowFs<LocalFs, LocalFs>;

/// Build the composite described by the command line. Flags override the
/// config file.
pub fn open_composite(args: &Args) -> Result<HostCowFs> {
    validate_layers(&args.base, &args.overlay)?;

    let file_config = match &args.config {
        Some(path) => load_config(path)?,
        None => CowConfig::default(),
    };
    let overrides = CowConfig {
        max_rename_hops: args.max_rename_hops,
        whiteout_dir: args.whiteout.clone(),
        ..Default::default()
    };
    let config = merge_configs(file_config, overrides);

    tracing::debug!(
        "Opening composite base={} overlay={}",
        args.base.display(),
        args.overlay.display()
    );
    let base = LocalFs::new(args.base.clone())?;
    let overlay = LocalFs::new(args.overlay.clone())?;
    CowFs::with_config(base, overlay, &config)
}
