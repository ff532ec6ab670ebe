//! HTTP passthrough probe. The upstream's status and body become the
//! verdict, so a service can publish its own failure detail.

use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderName, HeaderValue, Method, Request};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use tokio::time;

use crate::checker::{CheckContext, CheckResult, CheckSettings};

const USER_AGENT: &str = concat!("healthgate/", env!("CARGO_PKG_VERSION"));

/// Inbound headers forwarded to the checked service.
const HEADERS_TO_COPY: [HeaderName; 1] = [header::HOST];

/// Upstream bodies are verdict messages, not payloads; cap what we buffer.
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub async fn check(
    client: &Client<HttpConnector, Body>,
    ctx: &CheckContext<'_>,
    settings: &CheckSettings,
) -> CheckResult {
    let mut uri = format!("http://127.0.0.1:{}/{}", ctx.port, ctx.path);
    if let Some(query) = ctx.query.filter(|q| !q.is_empty()) {
        uri.push('?');
        uri.push_str(query);
    }

    let mut builder = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(header::USER_AGENT, USER_AGENT);
    for name in HEADERS_TO_COPY {
        if let Some(value) = ctx.headers.get(&name) {
            let value = value.clone();
            builder = builder.header(name, value);
        }
    }
    if let Some(name) = settings.service_name_header.as_deref() {
        match HeaderValue::from_str(ctx.service) {
            Ok(value) => builder = builder.header(name, value),
            Err(_) => {
                tracing::debug!(
                    service = ctx.service,
                    "service name is not a legal header value, skipping header"
                );
            }
        }
    }
    let request = match builder.body(Body::empty()) {
        Ok(request) => request,
        Err(e) => return CheckResult::new(599, format!("Unhandled exception {e}")),
    };

    match fetch(client, request, settings.timeout).await {
        Ok((status, body)) => CheckResult::new(status, body),
        Err(message) => CheckResult::new(599, message),
    }
}

/// Issue one request through the shared client under a whole-probe deadline
/// and buffer the response. Errors come back already phrased for a verdict.
pub(crate) async fn fetch(
    client: &Client<HttpConnector, Body>,
    request: Request<Body>,
    timeout: Duration,
) -> Result<(u16, Bytes), String> {
    let started = Instant::now();
    let exchange = async {
        let response = client
            .request(request)
            .await
            .map_err(|e| format!("Unhandled exception {e}"))?;
        let status = response.status().as_u16();
        let body = axum::body::to_bytes(Body::new(response.into_body()), MAX_BODY_BYTES)
            .await
            .map_err(|e| format!("Unhandled exception {e}"))?;
        Ok((status, body))
    };
    match time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => Err(format!(
            "Connection timed out after {:.2}s",
            started.elapsed().as_secs_f64()
        )),
    }
}
