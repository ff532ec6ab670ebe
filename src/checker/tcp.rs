//! Plain TCP connect probe. No payload I/O, just whether the port accepts.

use std::time::Instant;

use tokio::net::TcpStream;
use tokio::time;

use crate::checker::{CheckContext, CheckResult, CheckSettings};

pub async fn check(ctx: &CheckContext<'_>, settings: &CheckSettings) -> CheckResult {
    let started = Instant::now();
    let connect = TcpStream::connect(("127.0.0.1", ctx.port));
    match time::timeout(settings.timeout, connect).await {
        Ok(Ok(_stream)) => CheckResult::new(
            200,
            format!("Connected in {:.2}s", started.elapsed().as_secs_f64()),
        ),
        Ok(Err(e)) => CheckResult::new(
            503,
            format!(
                "Unexpected error {} after {:.2}s",
                e,
                started.elapsed().as_secs_f64()
            ),
        ),
        Err(_) => CheckResult::new(
            503,
            format!(
                "Connection timed out after {:.2}s",
                started.elapsed().as_secs_f64()
            ),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn settings() -> CheckSettings {
        CheckSettings {
            timeout: Duration::from_secs(2),
            service_name_header: None,
            mysql_username: None,
            mysql_password: None,
        }
    }

    fn ctx<'a>(port: u16, headers: &'a HeaderMap) -> CheckContext<'a> {
        CheckContext {
            service: "widget",
            port,
            path: "",
            query: None,
            headers,
        }
    }

    #[tokio::test]
    async fn connects_to_a_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let headers = HeaderMap::new();

        let result = check(&ctx(port, &headers), &settings()).await;
        assert_eq!(result.status, 200);
        assert!(result.message.starts_with(b"Connected in"));
    }

    #[tokio::test]
    async fn reports_a_refused_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let headers = HeaderMap::new();

        let result = check(&ctx(port, &headers), &settings()).await;
        assert_eq!(result.status, 503);
        assert!(result.message.starts_with(b"Unexpected error"));
    }
}
