use axum::{
    body::Body,
    extract::Request,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use rust_embed::RustEmbed;

use super::api::ApiError;

/// The compiled browser UI. Build it with `npm run build` in `ui/`, or set
/// `STATICMS_BUILD_UI=1` when compiling.
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/ui/dist"]
pub struct Assets;

/// Vite puts content-hashed files under `assets/`.
const HASHED_PREFIX: &str = "assets/";

/// Serve embedded static files or fall back to index.html for SPA routing.
pub async fn static_handler(req: Request<Body>) -> Response {
    let path = req.uri().path().trim_start_matches('/');

    // Unknown API routes stay JSON 404s rather than the SPA shell
    if path == "api" || path.starts_with("api/") {
        return ApiError::NotFound(format!("No route for /{}", path)).into_response();
    }

    if !path.is_empty()
        && let Some(content) = Assets::get(path)
    {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let cache = if path.starts_with(HASHED_PREFIX) {
            "public, max-age=31536000, immutable"
        } else {
            "no-cache"
        };
        return (
            [
                (header::CONTENT_TYPE, mime.as_ref().to_string()),
                (header::CACHE_CONTROL, cache.to_string()),
            ],
            content.data.into_owned(),
        )
            .into_response();
    }

    match Assets::get("index.html") {
        Some(content) => (
            [(header::CACHE_CONTROL, "no-cache")],
            Html(String::from_utf8_lossy(&content.data).into_owned()),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            "UI not found. Run 'npm run build' in ui/ and rebuild.",
        )
            .into_response(),
    }
}
