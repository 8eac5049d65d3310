pub mod config;
pub mod error;
pub mod overlay;
pub mod vfs;

pub use config::load_config;
pub use config::merge_configs;
pub use config::save_config;
pub use config::validate_config;
pub use config::CowConfig;

pub use error::{CowError, Result};

pub use overlay::{CowFs, DirHandle, DirectoryView, Handle};

#[cfg(unix)]
pub use vfs::local::LocalFs;
pub use vfs::mem::MemFs;
pub use vfs::{DirEntry, FileSystem, FileType, Metadata, OpenFlags, VirtualFile};
