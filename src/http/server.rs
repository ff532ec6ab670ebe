//! HTTP server setup.
//!
//! # Responsibilities
//! - Wire up the spool, cache, tracker, and dispatcher
//! - Build the Axum router for the check and control routes
//! - Serve each listener with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::cache::ResponseCache;
use crate::checker::{CheckSettings, Dispatcher};
use crate::config::HealthgateConfig;
use crate::http::handlers;
use crate::spool::{SpoolError, SpoolStore};
use crate::tracking::RecencyTracker;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub spool: Arc<SpoolStore>,
    pub cache: Arc<ResponseCache>,
    pub tracker: Arc<RecencyTracker>,
    pub allow_remote_spool_changes: bool,
    pub started_at: Instant,
}

impl AppState {
    /// Build the shared subsystems from the loaded configuration.
    pub fn new(config: &HealthgateConfig) -> Result<Self, SpoolError> {
        let spool = Arc::new(SpoolStore::configure(
            &config.spool.root,
            config.spool.allow_remote_changes,
        )?);
        let cache = Arc::new(ResponseCache::new(config.cache.ttl_secs));
        Ok(Self::from_parts(
            spool,
            cache,
            CheckSettings::from_config(&config.checks),
            config.spool.allow_remote_changes,
        ))
    }

    /// Assemble state from already-configured subsystems.
    pub fn from_parts(
        spool: Arc<SpoolStore>,
        cache: Arc<ResponseCache>,
        settings: CheckSettings,
        allow_remote_spool_changes: bool,
    ) -> Self {
        let tracker = Arc::new(RecencyTracker::new());
        let dispatcher = Arc::new(Dispatcher::new(
            spool.clone(),
            cache.clone(),
            tracker.clone(),
            settings,
        ));

        Self {
            dispatcher,
            spool,
            cache,
            tracker,
            allow_remote_spool_changes,
            started_at: Instant::now(),
        }
    }
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // The bare and trailing-slash forms are distinct routes; the catch-all
    // only matches when a non-empty sub-path follows.
    Router::new()
        .route("/status", get(handlers::status))
        .route("/status/count", get(handlers::status_count))
        .route("/recent", get(handlers::recent))
        .route(
            "/{proto}/{service}/{port}",
            get(handlers::check_root).post(handlers::update_spool),
        )
        .route(
            "/{proto}/{service}/{port}/",
            get(handlers::check_root).post(handlers::update_spool),
        )
        .route(
            "/{proto}/{service}/{port}/{*path}",
            get(handlers::check_path),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// HTTP server for one listener.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: build_router(state),
        }
    }

    /// Accept connections until the shutdown channel fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP listener starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!(address = %addr, "HTTP listener stopped");
        Ok(())
    }
}
