use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the upload directory
#[derive(Error, Debug)]
pub enum StorageError {
    /// The root directory could not be created. Fatal at startup.
    #[error("Could not initialize folder for upload at {}: {source}", path.display())]
    InitFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file with this name is already stored. Uploads never overwrite.
    #[error("A file named '{name}' already exists")]
    AlreadyExists { name: String },

    /// The file is absent or is not a readable regular file
    #[error("Could not read the file '{name}'")]
    NotFound { name: String },

    /// The client-supplied name cannot be used as a storage key
    #[error("Invalid filename '{name}': {reason}")]
    InvalidFilename { name: String, reason: &'static str },

    /// Any other filesystem failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;
