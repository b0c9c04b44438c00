//! Request forwarding
//!
//! Method, path, query and body go upstream unchanged; the upstream status
//! and body come back unchanged. Only a missing upstream answer is turned
//! into a gateway error.

use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::config::ServiceRoute;

/// Largest request body forwarded
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// No response from the upstream: refused, timed out, or cut off
    #[error("The requested service is not available")]
    Unavailable,

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            ProxyError::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable"),
            ProxyError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
        };
        let body = Json(json!({
            "error": error,
            "message": self.to_string()
        }));
        (status, body).into_response()
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() {
            ProxyError::Unavailable
        } else {
            ProxyError::Internal(e.to_string())
        }
    }
}

/// Send `request` to `route` and relay the answer
pub async fn forward(
    client: &reqwest::Client,
    route: &ServiceRoute,
    request: Request,
) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", route.base_url, path_and_query);

    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ProxyError::Internal(format!("Failed to read request body: {e}")))?;

    tracing::info!(
        service = route.name,
        method = %parts.method,
        url = %url,
        "Proxying request"
    );

    let upstream = client
        .request(parts.method, &url)
        .headers(forwardable(&parts.headers))
        .body(body)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(service = route.name, url = %url, error = %e, "Proxy error");
            ProxyError::from(e)
        })?;

    let status = upstream.status();
    let headers = forwardable(upstream.headers());
    let bytes = upstream.bytes().await.map_err(|e| {
        tracing::error!(service = route.name, url = %url, error = %e, "Upstream body failed");
        ProxyError::from(e)
    })?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Copy of `headers` without the hop-by-hop ones
fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let hop_by_hop: [HeaderName; 6] = [
        header::CONNECTION,
        header::HOST,
        header::CONTENT_LENGTH,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
        header::TE,
    ];

    let mut forwarded = headers.clone();
    for name in hop_by_hop {
        forwarded.remove(name);
    }
    forwarded
}
