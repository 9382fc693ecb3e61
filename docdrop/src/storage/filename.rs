//! Validation of client-supplied filenames.
//!
//! Uploaded files are keyed by the name the client sends, so the name is resolved directly
//! against the root directory. Anything that could resolve outside the root (or into a nested
//! directory) is rejected before the filesystem is touched.

use super::errors::{Result, StorageError};
use std::path::{Component, Path};

/// Most filesystems cap a single path component at 255 bytes
const MAX_FILENAME_BYTES: usize = 255;

/// Check that `name` is a single, plain path component.
///
/// Rejects empty names, `.` and `..`, path separators of either platform, NUL bytes, absolute
/// or drive-prefixed paths, and names longer than [`MAX_FILENAME_BYTES`].
pub fn validate_filename(name: &str) -> Result<&str> {
    let invalid = |reason: &'static str| StorageError::InvalidFilename {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > MAX_FILENAME_BYTES {
        return Err(invalid("name is too long"));
    }
    if name == "." || name == ".." {
        return Err(invalid("relative directory references are not allowed"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(invalid("path separators are not allowed"));
    }
    if name.contains('\0') {
        return Err(invalid("NUL bytes are not allowed"));
    }

    // Catches Windows drive prefixes like `C:` that contain no separator
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(invalid("name must be a single path component")),
    }
}

/// Whether the name looks like a PDF, judged by extension
pub fn is_pdf(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
