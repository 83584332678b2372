use std::io;

use thiserror::Error;

// errno values reported through the bridge.
pub const ENOENT: i32 = 2;
pub const EIO: i32 = 5;
pub const EEXIST: i32 = 17;
pub const ENOTDIR: i32 = 20;
pub const EISDIR: i32 = 21;
pub const EINVAL: i32 = 22;
pub const EFBIG: i32 = 27;
pub const ENOSPC: i32 = 28;
pub const ENAMETOOLONG: i32 = 36;
pub const ENOTEMPTY: i32 = 39;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Block allocator or inode budget exhausted.
    #[error("no space left on device")]
    OutOfSpace,

    #[error("file would exceed {max} blocks")]
    FileTooLarge { max: usize },

    /// Directory entry list is full.
    #[error("directory {dir} already holds {max} entries")]
    CapacityExceeded { dir: u32, max: usize },

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("not a directory: {0}")]
    NotDirectory(String),

    #[error("is a directory: {0}")]
    IsDirectory(String),

    #[error("invalid name: {0:?}")]
    InvalidName(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal state is corrupt. Never caused by user input.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("block store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("record encoding error: {0}")]
    Codec(#[from] postcard::Error),
}

impl FsError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    /// Builds an [`FsError::InvariantViolation`] and logs it, since it means the model is
    /// corrupt rather than that the caller asked for something impossible.
    pub fn invariant(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        log::error!("invariant violated: {msg}");
        Self::InvariantViolation(msg)
    }

    /// errno for FUSE-style callers.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => ENOENT,
            FsError::AlreadyExists(_) => EEXIST,
            FsError::OutOfSpace => ENOSPC,
            FsError::FileTooLarge { .. } => EFBIG,
            FsError::CapacityExceeded { .. } => ENOSPC,
            FsError::NotEmpty(_) => ENOTEMPTY,
            FsError::NotDirectory(_) => ENOTDIR,
            FsError::IsDirectory(_) => EISDIR,
            FsError::InvalidName(name) if name.len() > crate::MAX_NAME_LEN => ENAMETOOLONG,
            FsError::InvalidName(_) | FsError::InvalidConfig(_) => EINVAL,
            FsError::InvariantViolation(_) | FsError::Io(_) | FsError::Codec(_) => EIO,
        }
    }
}

impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            FsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            FsError::OutOfSpace | FsError::CapacityExceeded { .. } => {
                io::Error::new(io::ErrorKind::StorageFull, e.to_string())
            }
            FsError::FileTooLarge { .. } => io::Error::new(io::ErrorKind::FileTooLarge, e.to_string()),
            FsError::NotEmpty(msg) => io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg),
            FsError::NotDirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            FsError::IsDirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            FsError::InvalidName(_) | FsError::InvalidConfig(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
            }
            FsError::Io(e) => e,
            FsError::InvariantViolation(_) | FsError::Codec(_) => io::Error::other(e.to_string()),
        }
    }
}

pub type Result<T> = core::result::Result<T, FsError>;
