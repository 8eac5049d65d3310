use cowfs::Result;

use super::HostCowFs;

/// Print where `path` lives after following renames. A tombstoned result is
/// reported as missing.
pub fn print_resolved(fs: &HostCowFs, path: &str) -> Result<()> {
    let resolved = fs.resolve_path(path)?;
    println!("{}", resolved);
    Ok(())
}
