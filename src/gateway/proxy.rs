//! Upstream forwarder — the terminal handler of the middleware chain.
//!
//! Minimal by design: once the chain admits a request it is replayed
//! against the API's `target_url` and the upstream response is copied back.
//! Streaming bodies, retries, and connection management belong to a full
//! reverse proxy and are out of scope here.

use std::time::Duration;

use axum::body::Body;
use axum::http::header;
use axum::http::request::Parts;
use axum::response::Response;

use crate::config::ApiSpec;
use crate::error::{Error, Result};

/// Forwards admitted requests to the API's upstream target.
pub struct UpstreamProxy {
    client: reqwest::Client,
    timeout: Duration,
    max_body_size: usize,
}

impl UpstreamProxy {
    /// Create a forwarder with the server's request timeout and body cap.
    #[must_use]
    pub fn new(timeout: Duration, max_body_size: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            max_body_size,
        }
    }

    /// Replay the request upstream and translate the response back.
    pub async fn forward(&self, spec: &ApiSpec, parts: &Parts, body: Body) -> Result<Response> {
        let path = parts.uri.path();
        let upstream_path = if spec.proxy.strip_listen_path {
            let listen = spec.proxy.listen_path.trim_end_matches('/');
            path.strip_prefix(listen).unwrap_or(path)
        } else {
            path
        };

        let mut url = format!(
            "{}{}",
            spec.proxy.target_url.trim_end_matches('/'),
            upstream_path
        );
        if let Some(query) = parts.uri.query() {
            url.push('?');
            url.push_str(query);
        }

        let body_bytes = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| Error::Internal(format!("Could not read request body: {e}")))?;

        let mut headers = parts.headers.clone();
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::CONNECTION);

        let upstream = self
            .client
            .request(parts.method.clone(), &url)
            .headers(headers)
            .body(body_bytes.to_vec())
            .timeout(self.timeout)
            .send()
            .await?;

        let status = upstream.status();
        let upstream_headers = upstream.headers().clone();
        let bytes = upstream.bytes().await?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        for (name, value) in &upstream_headers {
            if name == header::TRANSFER_ENCODING || name == header::CONNECTION {
                continue;
            }
            response.headers_mut().append(name.clone(), value.clone());
        }
        Ok(response)
    }
}
