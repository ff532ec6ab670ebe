//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, routing, graceful shutdown)
//!     → handlers.rs (parse route params, consult the dispatcher)
//!     → checker chain (spool gate, protocol probe)
//!     → verdict (status + message) back to the load balancer
//! ```

pub mod handlers;
pub mod server;

pub use server::{build_router, AppState, HttpServer};
