//! HTTP layer -- the review page, the upload/export flow and a small JSON API.

mod pages;
mod routes;
pub mod session;
pub mod state;

use self::state::AppState;
use crate::pipeline::ParamRequest;
use axum::extract::multipart::{Multipart, MultipartError};
use axum::extract::DefaultBodyLimit;
use axum::Router;
use bytes::Bytes;
use tower_http::trace::TraceLayer;

/// Build the application router with all routes.
pub fn router(state: AppState) -> Router {
    let body_limit = match state.config.server.max_upload_bytes {
        Some(max) => DefaultBodyLimit::max(max),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .merge(pages::page_routes())
        .nest("/api/v1", routes::api_routes())
        .fallback(fallback)
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn fallback() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::NOT_FOUND, "not found")
}

/// A file field from a multipart form.
#[derive(Debug)]
pub(crate) struct FileField {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Fields recognised in upload forms.
#[derive(Debug, Default)]
pub(crate) struct UploadForm {
    pub file: Option<FileField>,
    pub params: ParamRequest,
}

/// Drain a multipart body into an [`UploadForm`]. Unknown fields are ignored,
/// and an empty file input (no file chosen) counts as no file.
pub(crate) async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, MultipartError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                let nothing_chosen = file_name.as_deref().map_or(true, str::is_empty) && bytes.is_empty();
                if !nothing_chosen {
                    form.file = Some(FileField {
                        file_name,
                        content_type,
                        bytes,
                    });
                }
            }
            "feature_x" => form.params.feature_x = Some(field.text().await?),
            "feature_y" => form.params.feature_y = Some(field.text().await?),
            "contamination" => {
                let text = field.text().await?;
                let text = text.trim();
                if !text.is_empty() {
                    // Unparseable input is left for range validation to reject.
                    form.params.contamination = Some(text.parse().unwrap_or(f64::NAN));
                }
            }
            _ => {}
        }
    }
    Ok(form)
}
