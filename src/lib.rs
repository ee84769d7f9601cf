//! Dataset archive server library.
//!
//! Merges dataset configurations from files, dataset directories and other
//! servers, and serves the datasets over HTTP through an Archive Engine.

pub mod config;
pub mod datasets;
pub mod engine;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::ServerConfig;
pub use datasets::{ConfigAggregator, ConfigSection, ConfigSet};
pub use engine::{ArchiveEngine, ExecEngine};
pub use http::{HttpServer, ServerState};
pub use lifecycle::Shutdown;
