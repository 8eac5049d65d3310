use crate::error::{CowError, Result};
use std::path::Path;

use crate::config::schema::*;

/// Read and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<CowConfig> {
    let toml_content = std::fs::read_to_string(path).map_err(|e| {
        CowError::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let config: CowConfig = toml::from_str(&toml_content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Fields set in `overrides` win over `base`.
pub fn merge_configs(base: CowConfig, overrides: CowConfig) -> CowConfig {
    CowConfig {
        max_rename_hops: overrides.max_rename_hops.or(base.max_rename_hops),
        whiteout_dir: overrides.whiteout_dir.or(base.whiteout_dir),
        scaffold_dir_mode: overrides.scaffold_dir_mode.or(base.scaffold_dir_mode),
        whiteout_file_mode: overrides.whiteout_file_mode.or(base.whiteout_file_mode),
    }
}

pub fn save_config(path: &Path, config: &CowConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CowError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }
    }
    let toml_str = toml::to_string_pretty(config)?;
    std::fs::write(path, toml_str)
        .map_err(|e| CowError::Config(format!("Failed to write config file: {}", e)))?;
    Ok(())
}
