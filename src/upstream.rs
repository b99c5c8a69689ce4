#![forbid(unsafe_code)]

//! Outbound call to the third-party media resolution service.
//!
//! The resolver returns the upstream JSON text untouched. It is only checked
//! for being well-formed JSON; reshaping happens once on the client side (see
//! [`crate::record::normalize`]) so this layer stays a pure pass-through.

use serde_json::value::RawValue;
use thiserror::Error;
use url::Url;

const USER_AGENT: &str = concat!("vidgrab-tools/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum Fault {
    /// The request never produced an HTTP response (DNS, connect, TLS, reset).
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),
    /// The upstream answered with a non-success status or a body we could not
    /// parse as JSON.
    #[error("upstream error: {0}")]
    UpstreamError(String),
}

/// Anything able to turn a public video URL into the resolver's raw payload.
///
/// Implementations perform blocking I/O; async callers should run them via
/// `spawn_blocking`.
pub trait Resolver: Send + Sync {
    fn resolve(&self, url: &str) -> Result<Box<RawValue>, Fault>;
}

/// Appends `url=<source>` to `base`, percent-encoding the source.
pub fn lookup_url(base: &Url, source: &str) -> Url {
    let mut target = base.clone();
    target.query_pairs_mut().append_pair("url", source);
    target
}

/// [`Resolver`] backed by a single `ureq` GET per call. No retries, no cache.
#[derive(Clone)]
pub struct HttpResolver {
    agent: ureq::Agent,
    base_url: Url,
}

impl HttpResolver {
    pub fn new(base_url: Url) -> Self {
        let agent = ureq::AgentBuilder::new().user_agent(USER_AGENT).build();
        Self { agent, base_url }
    }
}

impl Resolver for HttpResolver {
    fn resolve(&self, url: &str) -> Result<Box<RawValue>, Fault> {
        let target = lookup_url(&self.base_url, url);
        log::debug!("resolving {url} via {}", self.base_url);

        let response = match self.agent.request_url("GET", &target).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(Fault::UpstreamError(format!("upstream returned HTTP {code}")));
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(Fault::UpstreamUnreachable(transport.to_string()));
            }
        };

        let text = response
            .into_string()
            .map_err(|err| Fault::UpstreamError(format!("unreadable upstream body: {err}")))?;
        RawValue::from_string(text)
            .map_err(|err| Fault::UpstreamError(format!("unparsable upstream body: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::Query,
        http::StatusCode,
        response::IntoResponse,
        routing::get,
    };
    use serde_json::{Value, json};
    use std::collections::HashMap;

    async fn spawn_upstream() -> Url {
        let app = Router::new()
            .route(
                "/resolve",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    Json(json!({
                        "status": true,
                        "result": { "echo": params.get("url").cloned() }
                    }))
                }),
            )
            .route(
                "/broken",
                get(|| async { (StatusCode::BAD_GATEWAY, "bad gateway").into_response() }),
            )
            .route("/garbage", get(|| async { "<html>not json</html>" }))
            .route(
                "/precise",
                get(|| async { r#"{"status":true,"result":{"n":1.10,"big":18446744073709551616}}"# }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    async fn resolve_blocking(base: Url, source: &str) -> Result<Box<RawValue>, Fault> {
        let resolver = HttpResolver::new(base);
        let source = source.to_string();
        tokio::task::spawn_blocking(move || resolver.resolve(&source))
            .await
            .unwrap()
    }

    #[test]
    fn lookup_url_percent_encodes_source() {
        let base = Url::parse("https://resolver.test/download/tiktok").unwrap();
        let target = lookup_url(&base, "https://tiktok.com/@a/video/1?lang=en&x=y");
        assert_eq!(
            target.as_str(),
            "https://resolver.test/download/tiktok?url=https%3A%2F%2Ftiktok.com%2F%40a%2Fvideo%2F1%3Flang%3Den%26x%3Dy"
        );
    }

    #[test]
    fn lookup_url_keeps_existing_query() {
        let base = Url::parse("https://resolver.test/api?key=abc").unwrap();
        let target = lookup_url(&base, "v");
        assert_eq!(target.query(), Some("key=abc&url=v"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_returns_payload_verbatim() {
        let base = spawn_upstream().await.join("resolve").unwrap();
        let payload = resolve_blocking(base, "https://example.com/v/1 ?&")
            .await
            .unwrap();
        let payload: Value = serde_json::from_str(payload.get()).unwrap();
        assert_eq!(
            payload,
            json!({ "status": true, "result": { "echo": "https://example.com/v/1 ?&" } })
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_keeps_number_text_intact() {
        let base = spawn_upstream().await.join("precise").unwrap();
        let payload = resolve_blocking(base, "https://example.com/v/1")
            .await
            .unwrap();
        assert_eq!(
            payload.get(),
            r#"{"status":true,"result":{"n":1.10,"big":18446744073709551616}}"#
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_maps_error_status_to_upstream_error() {
        let base = spawn_upstream().await.join("broken").unwrap();
        let fault = resolve_blocking(base, "https://example.com/v/1")
            .await
            .unwrap_err();
        assert!(matches!(fault, Fault::UpstreamError(ref message) if message.contains("502")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_maps_unparsable_body_to_upstream_error() {
        let base = spawn_upstream().await.join("garbage").unwrap();
        let fault = resolve_blocking(base, "https://example.com/v/1")
            .await
            .unwrap_err();
        assert!(matches!(fault, Fault::UpstreamError(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_maps_refused_connection_to_unreachable() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let base = Url::parse(&format!("http://{addr}/resolve")).unwrap();
        let fault = resolve_blocking(base, "https://example.com/v/1")
            .await
            .unwrap_err();
        assert!(matches!(fault, Fault::UpstreamUnreachable(_)));
    }
}
