//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → HealthgateConfig (validated, immutable)
//!     → CLI overrides applied in main
//!     → shared with subsystems at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::HealthgateConfig;
pub use schema::{CacheConfig, CheckConfig, ListenerConfig, ObservabilityConfig, SpoolConfig};
pub use validation::{validate_config, ValidationError};
