use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "ui/"]
struct UiAssets;

const DASHBOARD: &str = "dashboard.html";

/// Serve the embedded analytics dashboard
pub async fn serve_dashboard() -> Response {
    match UiAssets::get(DASHBOARD) {
        Some(content) => serve_file(DASHBOARD, content.data.as_ref()),
        None => (StatusCode::NOT_FOUND, "Dashboard is not bundled in this build").into_response(),
    }
}

fn serve_file(path: &str, content: &[u8]) -> Response {
    let mime_type = mime_guess::from_path(path).first_or_octet_stream();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, mime_type.as_ref())],
        content.to_vec(),
    )
        .into_response()
}
