//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! - **Files** (`/files/*`): upload, list, download and delete stored files
//! - **Extraction** (`/files/{filename}/extract`): OCR and text extraction of a stored PDF
//!
//! All endpoints are documented with `utoipa`; the rendered docs are served at `/docs`.

pub mod handlers;
pub mod models;
