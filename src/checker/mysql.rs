//! MySQL probe: a full authentication round-trip, then a clean COM_QUIT.
//! Anything short of an OK from the server fails the check.

use std::time::Instant;

use tokio::time;

use crate::checker::{CheckContext, CheckResult, CheckSettings};
use crate::mysql::{MySqlConnection, MySqlError};

pub async fn check(ctx: &CheckContext<'_>, settings: &CheckSettings) -> CheckResult {
    let (Some(username), Some(password)) = (
        settings.mysql_username.as_deref(),
        settings.mysql_password.as_deref(),
    ) else {
        return CheckResult::new(500, "No MySQL username or password configured");
    };

    let started = Instant::now();
    let probe = async {
        let mut conn = MySqlConnection::connect("127.0.0.1", ctx.port).await?;
        let greeting = conn.read_greeting().await?;
        let response = conn.authenticate(&greeting, username, password).await?;
        Ok::<_, MySqlError>((conn, response))
    };
    match time::timeout(settings.timeout, probe).await {
        Ok(Ok((conn, response))) => {
            if response.is_ok() {
                if let Err(e) = conn.quit().await {
                    tracing::debug!(error = %e, port = ctx.port, "COM_QUIT failed");
                }
                CheckResult::new(
                    200,
                    format!("MySQL connect response: {}", response.describe()),
                )
            } else {
                CheckResult::new(500, format!("MySQL sez {}", response.describe()))
            }
        }
        Ok(Err(e)) => CheckResult::new(503, format!("Unexpected error {e}")),
        Err(_) => CheckResult::new(
            503,
            format!(
                "MySQL timed out after {:.2}s",
                started.elapsed().as_secs_f64()
            ),
        ),
    }
}
