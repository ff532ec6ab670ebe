//! HAProxy probe: fetch the CSV stats page and judge the service's
//! BACKEND row.

use axum::body::Body;
use axum::http::{Method, Request};
use hyper_util::client::legacy::{connect::HttpConnector, Client};

use crate::checker::http::fetch;
use crate::checker::{CheckContext, CheckResult, CheckSettings};

// Stats CSV column offsets.
const PXNAME: usize = 0;
const SVNAME: usize = 1;
const STATUS: usize = 17;

pub async fn check(
    client: &Client<HttpConnector, Body>,
    ctx: &CheckContext<'_>,
    settings: &CheckSettings,
) -> CheckResult {
    let uri = format!("http://127.0.0.1:{}/;csv", ctx.port);
    let request = match Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
    {
        Ok(request) => request,
        Err(e) => return CheckResult::new(599, format!("Unhandled exception {e}")),
    };

    let (status, body) = match fetch(client, request, settings.timeout).await {
        Ok(reply) => reply,
        Err(message) => return CheckResult::new(599, message),
    };
    if status != 200 {
        return CheckResult::new(status, body);
    }

    let stats = String::from_utf8_lossy(&body);
    parse_stats(&stats, ctx.service)
}

fn parse_stats(stats: &str, service: &str) -> CheckResult {
    for row in stats.split('\n') {
        let row = row.trim_end_matches('\r');
        let columns: Vec<&str> = row.split(',').collect();
        if columns.len() < 18 {
            continue;
        }
        if columns[PXNAME] == service && columns[SVNAME] == "BACKEND" {
            return match columns[STATUS] {
                "UP" => CheckResult::new(200, format!("{service} is UP")),
                status => CheckResult::new(500, format!("{service} is {status}")),
            };
        }
    }
    CheckResult::new(500, format!("{service} is not found"))
}
