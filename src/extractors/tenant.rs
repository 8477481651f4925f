//! Build the transport-neutral request view from axum request parts.

use crate::identify::RequestView;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

#[async_trait]
impl<S> FromRequestParts<S> for RequestView
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let host = parts
            .headers
            .get(axum::http::header::HOST)
            .and_then(|v: &axum::http::HeaderValue| v.to_str().ok())
            .map(|s: &str| s.trim().to_string())
            .filter(|s: &String| !s.is_empty())
            .or_else(|| parts.uri.host().map(|h| h.to_string()));

        let mut view = RequestView::new(host, parts.uri.path());
        for (name, value) in &parts.headers {
            if let Ok(v) = value.to_str() {
                view = view.with_header(name.as_str(), v);
            }
        }
        if let Some(query) = parts.uri.query() {
            for pair in query.split('&') {
                let mut it = pair.splitn(2, '=');
                let name = it.next().unwrap_or_default();
                if name.is_empty() {
                    continue;
                }
                view = view.with_query(name, it.next().unwrap_or_default());
            }
        }
        Ok(view)
    }
}
