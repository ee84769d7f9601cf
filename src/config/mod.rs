//! Server settings subsystem.
//!
//! # Data Flow
//! ```text
//! settings file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → command line overrides (host, port, url)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//! ```
//!
//! Dataset configuration is a separate concern, handled by `datasets`.
//!
//! # Design Decisions
//! - Settings are immutable once loaded
//! - All fields have defaults to allow running without a file
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, LoadError};
pub use schema::{EngineConfig, ListenerConfig, ServerConfig};
pub use validation::{validate_config, SettingsError};
