use crate::error::{CowError, Result};
use crate::overlay::union_dir::DirHandle;
use crate::vfs::{stat_opt, FileSystem, Metadata, VirtualFile};

/// What opening a path through the composite yields.
#[derive(Debug)]
pub enum Handle {
    File(Box<dyn VirtualFile>),
    Dir(DirHandle),
}

impl Handle {
    pub fn is_dir(&self) -> bool {
        matches!(self, Handle::Dir(_))
    }

    pub fn metadata(&self) -> Result<Metadata> {
        match self {
            Handle::File(file) => file.metadata(),
            Handle::Dir(dir) => Ok(dir.metadata().clone()),
        }
    }

    /// The file stream, or `IsADirectory` for a directory handle.
    pub fn into_file(self) -> Result<Box<dyn VirtualFile>> {
        match self {
            Handle::File(file) => Ok(file),
            Handle::Dir(dir) => Err(CowError::IsADirectory(dir.path().to_string())),
        }
    }

    /// The directory handle, or `NotADirectory` for a file stream.
    pub fn into_dir(self) -> Result<DirHandle> {
        match self {
            Handle::Dir(dir) => Ok(dir),
            Handle::File(_) => Err(CowError::NotADirectory("open file handle".to_string())),
        }
    }
}

/// Raw per-layer lookup of one path, ignoring tombstones.
#[derive(Debug, Clone, Default)]
pub(crate) struct Presence {
    pub overlay: Option<Metadata>,
    pub base: Option<Metadata>,
}

impl Presence {
    /// Stat `path` in both layers; missing entries become `None`.
    pub fn probe<B, O>(base: &B, overlay: &O, path: &str) -> Result<Self>
    where
        B: FileSystem + ?Sized,
        O: FileSystem + ?Sized,
    {
        Ok(Presence {
            overlay: stat_opt(overlay, path)?,
            base: stat_opt(base, path)?,
        })
    }

    pub fn in_overlay(&self) -> bool {
        self.overlay.is_some()
    }

    pub fn in_base(&self) -> bool {
        self.base.is_some()
    }

    /// Overlay metadata when present, otherwise base.
    pub fn effective(&self) -> Option<&Metadata> {
        self.overlay.as_ref().or(self.base.as_ref())
    }
}
