use cowfs::Result;

use super::HostCowFs;

pub fn print_deleted(fs: &HostCowFs) -> Result<()> {
    for path in fs.deleted() {
        println!("{}", path);
    }
    Ok(())
}
