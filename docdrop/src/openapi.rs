//! OpenAPI documentation for the HTTP API, served as JSON at `/api-docs/openapi.json` and
//! rendered with Scalar at `/docs`.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "docdrop",
        description = "Upload files and extract text from PDFs via Adobe PDF Services"
    ),
    paths(
        api::handlers::files::upload_file,
        api::handlers::files::list_files,
        api::handlers::files::get_file,
        api::handlers::files::delete_file,
        api::handlers::files::delete_all_files,
        api::handlers::extraction::extract_file,
    ),
    components(
        schemas(
            api::models::files::FileResponse,
            api::models::files::FileInfo,
            api::models::files::FileListResponse,
            api::models::files::FileDeleteResponse,
            api::models::files::DeleteAllResponse,
            api::models::files::ListObject,
        )
    ),
    tags(
        (name = "files", description = "Stored file management"),
        (name = "extraction", description = "OCR and text extraction of stored PDFs"),
    )
)]
pub struct ApiDoc;
