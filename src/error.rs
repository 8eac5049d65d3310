use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CowError>;

#[derive(Error, Debug)]
pub enum CowError {
    #[error("No such file or directory: {0}")]
    NotExist(String),

    #[error("File exists: {0}")]
    Exist(String),

    #[error("Invalid argument: {0}")]
    Invalid(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("IO error: {0}")]
    Io(io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl CowError {
    pub fn not_exist(path: impl Into<String>) -> Self {
        CowError::NotExist(path.into())
    }

    pub fn exist(path: impl Into<String>) -> Self {
        CowError::Exist(path.into())
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        CowError::Invalid(reason.into())
    }

    /// True for a missing path, including one hidden by a tombstone.
    pub fn is_not_exist(&self) -> bool {
        match self {
            CowError::NotExist(_) => true,
            CowError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    pub fn is_exist(&self) -> bool {
        match self {
            CowError::Exist(_) => true,
            CowError::Io(e) => e.kind() == io::ErrorKind::AlreadyExists,
            _ => false,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, CowError::Invalid(_))
    }
}

impl From<io::Error> for CowError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => CowError::NotExist(err.to_string()),
            io::ErrorKind::AlreadyExists => CowError::Exist(err.to_string()),
            io::ErrorKind::PermissionDenied => CowError::PermissionDenied(err.to_string()),
            io::ErrorKind::InvalidInput => CowError::Invalid(err.to_string()),
            _ => CowError::Io(err),
        }
    }
}

impl From<CowError> for io::Error {
    fn from(err: CowError) -> Self {
        let kind = match &err {
            CowError::NotExist(_) => io::ErrorKind::NotFound,
            CowError::Exist(_) => io::ErrorKind::AlreadyExists,
            CowError::Invalid(_) => io::ErrorKind::InvalidInput,
            CowError::PermissionDenied(_) => io::ErrorKind::PermissionDenied,
            CowError::Io(e) => e.kind(),
            _ => io::ErrorKind::Other,
        };
        match err {
            CowError::Io(e) => e,
            other => io::Error::new(kind, other.to_string()),
        }
    }
}

impl From<toml::de::Error> for CowError {
    fn from(err: toml::de::Error) -> Self {
        CowError::Config(format!("Failed to parse config: {}", err))
    }
}

impl From<toml::ser::Error> for CowError {
    fn from(err: toml::ser::Error) -> Self {
        CowError::Config(format!("Failed to serialize config: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_kinds_map_to_variants() {
        let err: CowError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(err.is_not_exist());

        let err: CowError = io::Error::new(io::ErrorKind::AlreadyExists, "there").into();
        assert!(err.is_exist());

        let err: CowError = io::Error::new(io::ErrorKind::InvalidInput, "bad").into();
        assert!(err.is_invalid());

        let err: CowError = io::Error::other("boom").into();
        assert!(matches!(err, CowError::Io(_)));
    }

    #[test]
    fn test_round_trip_into_io_error_keeps_kind() {
        let err: io::Error = CowError::not_exist("a.txt").into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        let err: io::Error = CowError::exist("a.txt").into();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}
