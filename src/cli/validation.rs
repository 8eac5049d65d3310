use cowfs::{CowError, Result};
use std::path::Path;

/// The overlay must be a separate tree: neither layer may contain the other.
pub fn validate_layers(base: &Path, overlay: &Path) -> Result<()> {
    let base = canonical(base, "base")?;
    let overlay = canonical(overlay, "overlay")?;

    if base == overlay {
        return Err(CowError::Config(
            "Base and overlay must be different directories".to_string(),
        ));
    }

    if overlay.starts_with(&base) || base.starts_with(&overlay) {
        return Err(CowError::Config(format!(
            "Base {} and overlay {} must not be nested",
            base.display(),
            overlay.display()
        )));
    }

    Ok(())
}

fn canonical(path: &Path, what: &str) -> Result<std::path::PathBuf> {
    let resolved = path.canonicalize().map_err(|e| {
        CowError::Config(format!(
            "Cannot open {} directory {}: {}",
            what,
            path.display(),
            e
        ))
    })?;
    if !resolved.is_dir() {
        return Err(CowError::Config(format!(
            "{} is not a directory: {}",
            what,
            path.display()
        )));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_layers() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("base");
        let overlay = temp.path().join("overlay");
        std::fs::create_dir_all(&base).unwrap();
        std::fs::create_dir_all(&overlay).unwrap();

        assert!(validate_layers(&base, &overlay).is_ok());
        assert!(validate_layers(&base, &base).is_err());
        assert!(validate_layers(temp.path(), &overlay).is_err());
        assert!(validate_layers(&base, &temp.path().join("missing")).is_err());
    }
}
