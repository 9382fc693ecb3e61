//! HTTP request handlers.
//!
//! - [`files`]: upload, listing, download and deletion of stored files
//! - [`extraction`]: running the OCR-then-extract pipeline on a stored PDF
//!
//! Handlers return [`crate::errors::Result`], so failures are turned into responses by
//! [`crate::errors::Error`]'s `IntoResponse` impl.

pub mod extraction;
pub mod files;
