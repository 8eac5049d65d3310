use crate::error::{CowError, Result};
use serde::{Deserialize, Serialize};

/// Tunables for a [`CowFs`](crate::overlay::CowFs).
///
/// Every field is optional in the TOML file; the `get_*` accessors fill in
/// defaults. Modes can be written as TOML octal integers (`0o755`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CowConfig {
    /// Upper bound on rename-map hops followed while resolving a path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rename_hops: Option<usize>,
    /// Overlay-relative directory for the whiteout log. Persistence is off when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whiteout_dir: Option<String>,
    /// Permission bits for parent directories scaffolded into the overlay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaffold_dir_mode: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whiteout_file_mode: Option<u32>,
}

impl CowConfig {
    pub fn get_max_rename_hops(&self) -> usize {
        self.max_rename_hops
            .unwrap_or_else(super::default_max_rename_hops)
    }

    pub fn get_whiteout_dir(&self) -> Option<String> {
        self.whiteout_dir.clone()
    }

    pub fn get_scaffold_dir_mode(&self) -> u32 {
        self.scaffold_dir_mode
            .unwrap_or_else(super::default_scaffold_dir_mode)
    }

    pub fn get_whiteout_file_mode(&self) -> u32 {
        self.whiteout_file_mode
            .unwrap_or_else(super::default_whiteout_file_mode)
    }
}

pub fn validate_config(config: &CowConfig) -> Result<()> {
    if config.get_max_rename_hops() == 0 {
        return Err(CowError::Config(
            "max_rename_hops must be at least 1".to_string(),
        ));
    }

    if let Some(dir) = &config.whiteout_dir {
        let trimmed = dir.trim_matches('/');
        if dir.starts_with('/') || trimmed.is_empty() || trimmed == "." {
            return Err(CowError::Config(format!(
                "whiteout_dir '{}' must be a relative directory inside the overlay",
                dir
            )));
        }
    }

    for (name, mode) in [
        ("scaffold_dir_mode", config.scaffold_dir_mode),
        ("whiteout_file_mode", config.whiteout_file_mode),
    ] {
        if let Some(mode) = mode {
            if mode > 0o7777 {
                return Err(CowError::Config(format!(
                    "{} {:#o} has bits outside 0o7777",
                    name, mode
                )));
            }
        }
    }

    Ok(())
}
