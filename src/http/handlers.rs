//! Request handlers for the check and control routes.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Form, Path, Query, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::checker::{CheckContext, Proto};
use crate::http::server::AppState;

struct CheckParams<'a> {
    proto: &'a str,
    service: &'a str,
    port: &'a str,
    path: &'a str,
    query: Option<&'a str>,
}

/// GET `/{proto}/{service}/{port}` and its trailing-slash form.
pub async fn check_root(
    State(state): State<AppState>,
    Path((proto, service, port)): Path<(String, String, String)>,
    RawQuery(query): RawQuery,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let params = CheckParams {
        proto: &proto,
        service: &service,
        port: &port,
        path: "",
        query: query.as_deref(),
    };
    run_check(&state, params, &headers, remote).await
}

/// GET `/{proto}/{service}/{port}/{*path}`.
pub async fn check_path(
    State(state): State<AppState>,
    Path((proto, service, port, path)): Path<(String, String, String, String)>,
    RawQuery(query): RawQuery,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let params = CheckParams {
        proto: &proto,
        service: &service,
        port: &port,
        path: &path,
        query: query.as_deref(),
    };
    run_check(&state, params, &headers, remote).await
}

async fn run_check(
    state: &AppState,
    params: CheckParams<'_>,
    headers: &HeaderMap,
    remote: SocketAddr,
) -> Response {
    let Some(proto) = Proto::parse(params.proto) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !valid_service_name(params.service) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Ok(port) = params.port.parse::<u16>() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let port = haproxy_server_state_port(headers).unwrap_or(port);

    let bust = headers
        .get(header::PRAGMA)
        .and_then(|value| value.to_str().ok())
        == Some("no-cache");

    let ctx = CheckContext {
        service: params.service,
        port,
        path: params.path,
        query: params.query,
        headers,
    };
    let remote_ip = remote.ip().to_string();
    let verdict = state
        .dispatcher
        .dispatch(&ctx, proto.chain(), &remote_ip, bust)
        .await;
    (verdict.transport_status(), verdict.message).into_response()
}

/// Service names address spool files and may end up in header values, so
/// the alphabet is kept tight; `.` and `..` would address the spool root.
fn valid_service_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    name.bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

/// Newer HAProxy versions advertise the backend port in the send-state
/// header; when present it overrides the port in the URL.
fn haproxy_server_state_port(headers: &HeaderMap) -> Option<u16> {
    let state = headers.get("x-haproxy-server-state")?.to_str().ok()?;
    state
        .split(';')
        .filter_map(|part| {
            let (key, value) = part.trim().split_once('=')?;
            (key == "port").then_some(value)
        })
        .next()
        .and_then(|value| value.parse().ok())
}

#[derive(Debug, Deserialize)]
pub struct SpoolUpdateForm {
    status: Option<String>,
    reason: Option<String>,
    expiration: Option<f64>,
    creation: Option<f64>,
}

/// POST `/spool/{service}/{port}`: force a service up or down remotely.
pub async fn update_spool(
    State(state): State<AppState>,
    Path((proto, service, port)): Path<(String, String, String)>,
    Form(form): Form<SpoolUpdateForm>,
) -> Response {
    if Proto::parse(&proto) != Some(Proto::Spool) {
        return StatusCode::NOT_FOUND.into_response();
    }
    if !state.allow_remote_spool_changes {
        return (
            StatusCode::FORBIDDEN,
            "remote spool changes are not allowed",
        )
            .into_response();
    }
    if !valid_service_name(&service) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Ok(port) = port.parse::<u16>() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let result = match form.status.as_deref() {
        Some("up") => state.spool.up(&service, Some(port)),
        Some("down") => state.spool.down(
            &service,
            form.reason.as_deref().unwrap_or(""),
            Some(port),
            form.expiration,
            form.creation,
        ),
        _ => {
            return (StatusCode::BAD_REQUEST, "status must be 'up' or 'down'").into_response();
        }
    };
    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::error!(service = %service, port, error = %e, "spool update failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// GET `/status`: cache statistics and process uptime.
pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "cache": state.cache.stats(),
        "uptime": state.started_at.elapsed().as_secs_f64(),
    }))
}

/// GET `/status/count`: per-service access counts broken down by requester.
pub async fn status_count(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service_access_counts": state.tracker.access_counts(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    threshold: Option<f64>,
}

/// GET `/recent`: services seen within the threshold and their last verdict.
pub async fn recent(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> Json<serde_json::Value> {
    let threshold = params.threshold.unwrap_or(600.0);
    Json(json!({
        "seen_services": state.tracker.recent(threshold),
        "threshold_seconds": threshold,
    }))
}
