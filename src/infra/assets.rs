//! Static asset serving for `/public/{name}`.
//!
//! Two sources, selected by configuration rather than by sniffing the
//! running executable's path: the bundled tree embedded at compile time
//! (cached aggressively) or a live filesystem directory (never cached,
//! for local development against editable files).

use std::io::ErrorKind;
use std::path::PathBuf;

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use include_dir::{Dir, include_dir};
use tracing::warn;

use crate::application::error::ErrorReport;

static BUNDLED_ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/static");

const SOURCE: &str = "infra::assets::serve";

const CACHE_IMMUTABLE: HeaderValue = HeaderValue::from_static("public, max-age=31536000");
const CACHE_NONE: HeaderValue = HeaderValue::from_static("no-store");

/// Where asset bytes come from.
pub enum AssetSource {
    /// Compiled-in `static/` tree.
    Bundled,
    /// Files read from disk on every request.
    Live(PathBuf),
}

impl AssetSource {
    pub async fn serve(&self, name: &str) -> Response {
        if !valid_asset_name(name) {
            return not_found_response();
        }

        match self {
            AssetSource::Bundled => match BUNDLED_ASSETS.get_file(name) {
                Some(file) => {
                    asset_response(name, Bytes::from_static(file.contents()), CACHE_IMMUTABLE)
                }
                None => not_found_response(),
            },
            AssetSource::Live(dir) => match tokio::fs::read(dir.join(name)).await {
                Ok(contents) => asset_response(name, Bytes::from(contents), CACHE_NONE),
                // A name resolving to a directory is as absent as a missing file.
                Err(err)
                    if err.kind() == ErrorKind::NotFound
                        || err.kind() == ErrorKind::IsADirectory =>
                {
                    not_found_response()
                }
                Err(err) => {
                    let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
                    ErrorReport::from_error(SOURCE, &err).attach(&mut response);
                    response
                }
            },
        }
    }
}

/// Reject traversal and directory-shaped requests outright.
fn valid_asset_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('/')
        && !name.ends_with('/')
        && !name.contains("..")
        && !name.contains('\\')
}

fn asset_response(name: &str, bytes: Bytes, cache_control: HeaderValue) -> Response {
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    match mime_guess::from_path(name).first() {
        Some(mime) => {
            if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
        }
        None => {
            // Unknown extension: the response still goes out, just untyped.
            warn!(target_module = SOURCE, asset = name, "unknown asset extension");
        }
    }
    if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }
    headers.insert(header::CACHE_CONTROL, cache_control);

    response
}

fn not_found_response() -> Response {
    let mut response = StatusCode::NOT_FOUND.into_response();
    ErrorReport::from_message(SOURCE, "Static asset not found").attach(&mut response);
    response
}
