//! Redis and Sentinel probes. PING wants the literal `+PONG`; the INFO
//! probes read the reply until a known section marker and turn the
//! `key:value` lines into a map.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Instant;

use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use crate::checker::{CheckContext, CheckResult, CheckSettings};

/// Which INFO dialect we are reading.
#[derive(Debug, Clone, Copy)]
pub enum InfoMode {
    Redis,
    Sentinel,
}

impl InfoMode {
    /// Marker that tells us the interesting part of the reply has arrived.
    fn terminator(&self) -> &'static str {
        match self {
            InfoMode::Redis => "Keyspace",
            InfoMode::Sentinel => "sentinels",
        }
    }

    fn is_sentinel(&self) -> bool {
        matches!(self, InfoMode::Sentinel)
    }
}

fn master_address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}:\d{1,5}").expect("static pattern")
    })
}

pub async fn check_ping(ctx: &CheckContext<'_>, settings: &CheckSettings) -> CheckResult {
    let started = Instant::now();
    match time::timeout(settings.timeout, exchange(ctx.port, b"PING\r\n", b"\n")).await {
        Ok(Ok(reply)) => {
            let reply = reply.trim();
            if reply == "+PONG" {
                CheckResult::new(200, "Sent PING, got back +PONG")
            } else {
                CheckResult::new(500, format!("Sent PING, got back {reply}"))
            }
        }
        Ok(Err(e)) => CheckResult::new(503, format!("Unexpected error {e}")),
        Err(_) => CheckResult::new(
            503,
            format!(
                "Connection timed out after {:.2}s",
                started.elapsed().as_secs_f64()
            ),
        ),
    }
}

pub async fn check_info(
    ctx: &CheckContext<'_>,
    settings: &CheckSettings,
    mode: InfoMode,
) -> CheckResult {
    let started = Instant::now();
    let probe = exchange(ctx.port, b"INFO\r\n", mode.terminator().as_bytes());
    let reply = match time::timeout(settings.timeout, probe).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => return CheckResult::new(503, format!("Unexpected error {e}")),
        Err(_) => {
            return CheckResult::new(
                503,
                format!(
                    "Connection timed out after {:.2}s",
                    started.elapsed().as_secs_f64()
                ),
            )
        }
    };

    let info = parse_info(&reply, mode);
    if !info.contains_key("redis_version") {
        return CheckResult::new(500, format!("Sent INFO, got back {reply}"));
    }

    if ctx.path == "match" {
        let query = ctx.query.unwrap_or("");
        let wanted: Vec<_> = url::form_urlencoded::parse(query.as_bytes()).collect();
        // An empty query carries no constraint; fall through to the dump.
        if !wanted.is_empty() {
            for (field, value) in wanted {
                if info.get(field.as_ref()).map(String::as_str) == Some(value.as_ref()) {
                    return CheckResult::new(
                        200,
                        format!("Match found: field {field}, value {value}"),
                    );
                }
            }
            return CheckResult::new(500, "No matching field found");
        }
    }

    match serde_json::to_string(&info) {
        Ok(body) => CheckResult::new(200, body),
        Err(e) => CheckResult::new(500, format!("Unhandled exception {e}")),
    }
}

/// Write `command` and collect the reply until `terminator` shows up in the
/// stream or the peer closes.
async fn exchange(port: u16, command: &[u8], terminator: &[u8]) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;
    stream.write_all(command).await?;

    let mut collected = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        collected.extend_from_slice(&chunk[..n]);
        if contains(&collected, terminator) {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&collected).into_owned())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Lines with exactly one colon become map entries. Sentinel replies also
/// publish the master address: each line is scanned for an `ip:port` and the
/// line's first hit lands under `redis_master`, later lines overwriting.
fn parse_info(payload: &str, mode: InfoMode) -> BTreeMap<String, String> {
    let mut info = BTreeMap::new();
    for line in payload.split('\n') {
        if mode.is_sentinel() {
            if let Some(address) = master_address_pattern().find(line) {
                info.insert("redis_master".to_string(), address.as_str().to_string());
            }
        }
        let line = line.trim();
        let mut parts = line.splitn(3, ':');
        if let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) {
            info.insert(key.to_string(), value.to_string());
        }
    }
    info
}
