//! Check dispatch.
//!
//! Every request runs a short chain of checkers: the spool gate first, then
//! the protocol probe named by the URL. The chain stops at the first checker
//! reporting a status above 200, and that verdict is what the caller sees
//! after transport normalization.

pub mod haproxy;
pub mod http;
pub mod mysql;
pub mod redis;
pub mod spool;
pub mod tcp;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, StatusCode};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::cache::{CacheKey, CacheScope, ResponseCache};
use crate::config::CheckConfig;
use crate::spool::SpoolStore;
use crate::tracking::RecencyTracker;

/// Identity of one checker. Cache keys carry it so verdicts from different
/// probes against the same service and port never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckerId {
    Spool,
    Tcp,
    Http,
    MySql,
    RedisPing,
    RedisInfo,
    SentinelInfo,
    Haproxy,
}

impl CheckerId {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckerId::Spool => "spool",
            CheckerId::Tcp => "tcp",
            CheckerId::Http => "http",
            CheckerId::MySql => "mysql",
            CheckerId::RedisPing => "redis-ping",
            CheckerId::RedisInfo => "redis-info",
            CheckerId::SentinelInfo => "sentinel-info",
            CheckerId::Haproxy => "haproxy",
        }
    }

    /// Spool answers must always reflect the live spool directory.
    pub fn cacheable(&self) -> bool {
        !matches!(self, CheckerId::Spool)
    }
}

impl fmt::Display for CheckerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check family selected by the first URL segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proto {
    Http,
    Tcp,
    MySql,
    Redis,
    RedisInfo,
    Sentinel,
    SentinelInfo,
    Spool,
    Haproxy,
}

impl Proto {
    pub fn parse(segment: &str) -> Option<Self> {
        match segment {
            "http" => Some(Proto::Http),
            "tcp" => Some(Proto::Tcp),
            "mysql" => Some(Proto::MySql),
            "redis" => Some(Proto::Redis),
            "redis-info" => Some(Proto::RedisInfo),
            "sentinel" => Some(Proto::Sentinel),
            "sentinel-info" => Some(Proto::SentinelInfo),
            "spool" => Some(Proto::Spool),
            "haproxy" => Some(Proto::Haproxy),
            _ => None,
        }
    }

    /// Checkers to run, in order. The spool gate always goes first so an
    /// operator downing a service wins over a live backend.
    pub fn chain(&self) -> &'static [CheckerId] {
        match self {
            Proto::Http => &[CheckerId::Spool, CheckerId::Http],
            Proto::Tcp => &[CheckerId::Spool, CheckerId::Tcp],
            Proto::MySql => &[CheckerId::Spool, CheckerId::MySql],
            Proto::Redis | Proto::Sentinel => &[CheckerId::Spool, CheckerId::RedisPing],
            Proto::RedisInfo => &[CheckerId::Spool, CheckerId::RedisInfo],
            Proto::SentinelInfo => &[CheckerId::Spool, CheckerId::SentinelInfo],
            Proto::Spool => &[CheckerId::Spool],
            Proto::Haproxy => &[CheckerId::Spool, CheckerId::Haproxy],
        }
    }
}

/// Outcome of a single checker probe.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub status: u16,
    pub message: Bytes,
}

impl CheckResult {
    pub fn new(status: u16, message: impl Into<Bytes>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// A probe passes at 200 or below.
    pub fn passed(&self) -> bool {
        self.status <= 200
    }
}

/// Borrowed request context handed to each checker.
pub struct CheckContext<'a> {
    pub service: &'a str,
    pub port: u16,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub headers: &'a HeaderMap,
}

/// Probe tuning lifted out of [`CheckConfig`].
#[derive(Debug, Clone)]
pub struct CheckSettings {
    pub timeout: Duration,
    pub service_name_header: Option<String>,
    pub mysql_username: Option<String>,
    pub mysql_password: Option<String>,
}

impl CheckSettings {
    pub fn from_config(config: &CheckConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            service_name_header: config.service_name_header.clone(),
            mysql_username: config.mysql_username.clone(),
            mysql_password: config.mysql_password.clone(),
        }
    }
}

/// Final answer for one check request.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub status: u16,
    pub message: Bytes,
}

impl Verdict {
    /// Status to put on the wire. Checkers report upstream codes verbatim;
    /// anything without a registered reason phrase (599, out-of-range
    /// values) leaves as 503.
    pub fn transport_status(&self) -> StatusCode {
        StatusCode::from_u16(self.status)
            .ok()
            .filter(|status| status.canonical_reason().is_some())
            .unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Runs checker chains and records every verdict.
pub struct Dispatcher {
    spool: Arc<SpoolStore>,
    cache: Arc<ResponseCache>,
    tracker: Arc<RecencyTracker>,
    client: Client<HttpConnector, Body>,
    settings: CheckSettings,
}

impl Dispatcher {
    pub fn new(
        spool: Arc<SpoolStore>,
        cache: Arc<ResponseCache>,
        tracker: Arc<RecencyTracker>,
        settings: CheckSettings,
    ) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            spool,
            cache,
            tracker,
            client,
            settings,
        }
    }

    /// Run the chain for one request, recording the access and the verdict.
    pub async fn dispatch(
        &self,
        ctx: &CheckContext<'_>,
        chain: &[CheckerId],
        remote_ip: &str,
        bust_cache: bool,
    ) -> Verdict {
        self.tracker.record_access(ctx.service, remote_ip);
        let scope = self.cache.scope(bust_cache);

        let mut verdict = Verdict {
            status: 200,
            message: Bytes::new(),
        };
        for checker in chain {
            let result = self.run_one(*checker, ctx, &scope).await;
            let passed = result.passed();
            verdict = Verdict {
                status: result.status,
                message: result.message,
            };
            if !passed {
                tracing::debug!(
                    checker = %checker,
                    service = ctx.service,
                    port = ctx.port,
                    status = verdict.status,
                    "check chain stopped"
                );
                break;
            }
        }

        self.tracker
            .record_verdict(ctx.service, verdict.status, remote_ip);
        verdict
    }

    async fn run_one(
        &self,
        checker: CheckerId,
        ctx: &CheckContext<'_>,
        scope: &CacheScope<'_>,
    ) -> CheckResult {
        if !checker.cacheable() {
            return self.probe(checker, ctx).await;
        }

        let key = CacheKey {
            checker,
            service: ctx.service.to_string(),
            port: ctx.port,
            path: ctx.path.to_string(),
            query: ctx.query.unwrap_or("").to_string(),
        };
        if let Some(result) = scope.get(&key) {
            return result;
        }
        let result = self.probe(checker, ctx).await;
        scope.set(key, result.clone());
        result
    }

    async fn probe(&self, checker: CheckerId, ctx: &CheckContext<'_>) -> CheckResult {
        match checker {
            CheckerId::Spool => spool::check(&self.spool, ctx),
            CheckerId::Tcp => tcp::check(ctx, &self.settings).await,
            CheckerId::Http => http::check(&self.client, ctx, &self.settings).await,
            CheckerId::MySql => mysql::check(ctx, &self.settings).await,
            CheckerId::RedisPing => redis::check_ping(ctx, &self.settings).await,
            CheckerId::RedisInfo => {
                redis::check_info(ctx, &self.settings, redis::InfoMode::Redis).await
            }
            CheckerId::SentinelInfo => {
                redis::check_info(ctx, &self.settings, redis::InfoMode::Sentinel).await
            }
            CheckerId::Haproxy => haproxy::check(&self.client, ctx, &self.settings).await,
        }
    }
}
