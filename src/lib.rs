//! Health-check proxy between a load balancer and locally-hosted services.
//!
//! A load balancer asks `GET /{proto}/{service}/{port}/{path}` whether a
//! co-located service is healthy. The answer comes from the admission spool
//! (operator overrides) first and a protocol-specific probe second, cached
//! briefly so aggressive probing does not hammer the service itself.

pub mod agent;
pub mod cache;
pub mod checker;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod mysql;
pub mod spool;
pub mod tracking;

pub use config::HealthgateConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
