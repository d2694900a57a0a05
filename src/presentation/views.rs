//! Homepage rendering.

use askama::Template;
use axum::http::StatusCode;
use bytes::Bytes;
use thiserror::Error;

use crate::application::error::HttpError;
use crate::domain::counters::CounterPair;

/// A template that failed to render. Always a server-side bug; the public
/// response carries a generic message.
#[derive(Debug, Error)]
#[error("failed to render `{template}`")]
pub struct TemplateRenderError {
    template: &'static str,
    #[source]
    source: askama::Error,
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        HttpError::from_error(
            "presentation::views::render_homepage",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Page rendering failed",
            &err,
        )
    }
}

/// The homepage: the counter pair laid into the site layout.
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub visits: u64,
    pub likes: u64,
}

impl From<CounterPair> for IndexTemplate {
    fn from(pair: CounterPair) -> Self {
        Self {
            visits: pair.visits,
            likes: pair.likes,
        }
    }
}

/// Render the homepage into an immutable buffer. Both the snapshot cell
/// and the per-request render path go through here.
pub fn render_homepage(pair: CounterPair) -> Result<Bytes, TemplateRenderError> {
    IndexTemplate::from(pair)
        .render()
        .map(Bytes::from)
        .map_err(|source| TemplateRenderError {
            template: "index.html",
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn homepage_shows_both_counters() {
        let html = IndexTemplate::from(CounterPair::new(42, 7))
            .render()
            .expect("render");
        assert!(html.contains("42"));
        assert!(html.contains("7"));
        assert!(html.contains("/like"));
    }

    #[test]
    fn snapshot_buffer_is_a_complete_document() {
        let bytes = render_homepage(CounterPair::default()).expect("render");
        let text = std::str::from_utf8(&bytes).expect("utf8");
        assert!(text.contains("<!DOCTYPE html>") || text.contains("<html"));
    }
}
