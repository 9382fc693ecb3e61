//! Flat upload directory keyed by filename.
//!
//! Every uploaded file lives directly under a single root directory, under the name the client
//! supplied. There is no index: the directory listing *is* the catalogue, and filesystem metadata
//! provides size and modification time.
//!
//! Names are validated with [`validate_filename`] before they are joined onto the root, so a
//! stored file can never escape the root or land in a nested directory.

pub mod errors;
pub mod filename;

pub use errors::{Result, StorageError};
pub use filename::{is_pdf, validate_filename};

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_stream::wrappers::ReadDirStream;
use tracing::{debug, info, instrument, warn};

/// A readable reference to a stored file
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl StoredFile {
    async fn from_path(name: &str, path: PathBuf) -> Result<Self> {
        let not_found = || StorageError::NotFound { name: name.to_string() };

        let metadata = match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(not_found()),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };

        // Existence alone isn't enough, the handle has to be readable
        if let Err(e) = fs::File::open(&path).await {
            debug!(name, error = %e, "Stored file exists but cannot be opened");
            return Err(not_found());
        }

        Ok(Self {
            name: name.to_string(),
            path,
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    /// Open the file for streaming reads
    pub async fn open(&self) -> Result<fs::File> {
        fs::File::open(&self.path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound { name: self.name.clone() },
            _ => e.into(),
        })
    }

    /// Read the whole file into memory
    pub async fn read(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound { name: self.name.clone() },
            _ => e.into(),
        })
    }
}

/// Local filesystem storage rooted at a single directory
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory (and parents) if it doesn't exist yet. Idempotent.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await.map_err(|source| StorageError::InitFailure {
            path: self.root.clone(),
            source,
        })?;
        debug!("Upload directory ready");
        Ok(())
    }

    /// Copy `content` into a new file called `name`.
    ///
    /// Creation uses `create_new`, so the existence check and the create are one atomic step:
    /// of two concurrent uploads with the same name, exactly one succeeds. If the copy fails
    /// part way, the partial file is removed.
    #[instrument(skip(self, content), err)]
    pub async fn save<R>(&self, name: &str, mut content: R) -> Result<StoredFile>
    where
        R: AsyncRead + Unpin,
    {
        let name = validate_filename(name)?;
        let path = self.root.join(name);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists { name: name.to_string() });
            }
            Err(e) => return Err(e.into()),
        };

        let copied = async {
            let bytes = tokio::io::copy(&mut content, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<_, std::io::Error>(bytes)
        }
        .await;

        match copied {
            Ok(bytes) => {
                info!(name, bytes, "Stored upload");
                Ok(StoredFile {
                    name: name.to_string(),
                    modified: Some(Utc::now()),
                    path,
                    size: bytes,
                })
            }
            Err(e) => {
                drop(file);
                if let Err(cleanup) = fs::remove_file(&path).await {
                    warn!(name, error = %cleanup, "Failed to remove partially written upload");
                }
                Err(e.into())
            }
        }
    }

    /// Resolve `name` against the root and return a readable handle to it
    pub async fn load(&self, name: &str) -> Result<StoredFile> {
        let name = validate_filename(name)?;
        StoredFile::from_path(name, self.root.join(name)).await
    }

    /// Names of the immediate children of the root, read lazily.
    ///
    /// The listing is not recursive and does not include the root itself. A root that doesn't
    /// exist (e.g. after [`delete_all`](Self::delete_all)) lists as empty.
    pub fn load_all(&self) -> BoxStream<'static, Result<String>> {
        let root = self.root.clone();

        stream::once(async move { fs::read_dir(&root).await })
            .map(|read_dir| -> BoxStream<'static, Result<String>> {
                match read_dir {
                    Ok(read_dir) => ReadDirStream::new(read_dir)
                        .map(|entry| {
                            entry
                                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                                .map_err(StorageError::from)
                        })
                        .boxed(),
                    Err(e) if e.kind() == ErrorKind::NotFound => stream::empty().boxed(),
                    Err(e) => stream::once(async move { Err(StorageError::Io(e)) }).boxed(),
                }
            })
            .flatten()
            .boxed()
    }

    /// Remove `name` if present. Returns whether a file was actually removed.
    ///
    /// Directories under the root are not stored files, so they are left alone and reported as
    /// not removed.
    #[instrument(skip(self), err)]
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let name = validate_filename(name)?;
        let path = self.root.join(name);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(name, "Deleted stored file");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => match fs::metadata(&path).await {
                Ok(metadata) if metadata.is_dir() => {
                    debug!(name, "Not deleting directory entry");
                    Ok(false)
                }
                _ => Err(e.into()),
            },
        }
    }

    /// Recursively remove the whole root, including the root directory itself.
    ///
    /// Returns whether anything was removed. Call [`init`](Self::init) afterwards to accept
    /// uploads again.
    #[instrument(skip(self), fields(root = %self.root.display()), err)]
    pub async fn delete_all(&self) -> Result<bool> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {
                warn!("Removed upload directory and all of its contents");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
