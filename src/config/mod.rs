pub mod persistence;
pub mod schema;

pub use persistence::*;
pub use schema::*;

fn default_max_rename_hops() -> usize {
    crate::overlay::DEFAULT_MAX_RENAME_HOPS
}

fn default_scaffold_dir_mode() -> u32 {
    0o755
}

fn default_whiteout_file_mode() -> u32 {
    0o644
}
