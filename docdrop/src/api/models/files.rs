use serde::{Deserialize, Serialize};
use url::form_urlencoded;
use utoipa::ToSchema;

/// Relative URL a stored file can be downloaded from
pub fn file_url(name: &str) -> String {
    // form encoding uses '+' for spaces, which path segments don't understand
    let encoded: String = form_urlencoded::byte_serialize(name.as_bytes()).collect();
    format!("/files/{}", encoded.replace('+', "%20"))
}

/// A freshly uploaded file
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileResponse {
    pub name: String,
    /// Size in bytes
    pub size: u64,
    pub url: String,
}

/// Entry in the file listing
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub url: String,
}

impl FileInfo {
    pub fn new(name: String) -> Self {
        let url = file_url(&name);
        Self { name, url }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ListObject {
    List,
}

/// Response for file list
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileListResponse {
    pub object: ListObject, // Always "list"
    pub data: Vec<FileInfo>,
}

/// Response for single file deletion
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileDeleteResponse {
    pub name: String,
    /// False when there was no such file
    pub deleted: bool,
}

/// Response for deleting every stored file
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteAllResponse {
    /// False when the upload directory was already empty or missing
    pub deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_url_encodes_name() {
        assert_eq!(file_url("report.pdf"), "/files/report.pdf");
        assert_eq!(file_url("my report.pdf"), "/files/my%20report.pdf");
        assert_eq!(file_url("a+b&c.txt"), "/files/a%2Bb%26c.txt");
    }
}
