use cowfs::{FileType, Result};

use super::HostCowFs;

pub fn list_directory(fs: &HostCowFs, path: &str) -> Result<()> {
    for entry in fs.read_dir(path)? {
        let suffix = match entry.file_type {
            FileType::Dir => "/",
            FileType::Symlink => "@",
            FileType::File => "",
        };
        println!("{}{}", entry.name, suffix);
    }
    Ok(())
}
