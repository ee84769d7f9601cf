//! Settings validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and URLs
//! - Validate value ranges (timeouts > 0, limits > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<SettingsError>>

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ServerConfig;

/// A single semantic problem in the settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<SettingsError>> {
    let mut errors = Vec::new();

    if let Err(e) = config.listener.bind_address.parse::<SocketAddr>() {
        errors.push(SettingsError {
            field: "listener.bind_address",
            message: format!("{} ({})", e, config.listener.bind_address),
        });
    }

    if let Some(url) = &config.server.url {
        match url::Url::parse(url) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
            Ok(u) => errors.push(SettingsError {
                field: "server.url",
                message: format!("unsupported scheme {}", u.scheme()),
            }),
            Err(e) => errors.push(SettingsError {
                field: "server.url",
                message: e.to_string(),
            }),
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(SettingsError {
            field: "timeouts.request_secs",
            message: "must be greater than zero".into(),
        });
    }

    if config.security.max_body_size == 0 {
        errors.push(SettingsError {
            field: "security.max_body_size",
            message: "must be greater than zero".into(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(SettingsError {
            field: "observability.metrics_address",
            message: format!("invalid address {}", config.observability.metrics_address),
        });
    }

    for (field, command) in [
        ("engine.query_command", &config.engine.query_command),
        ("engine.dump_command", &config.engine.dump_command),
    ] {
        if command.trim().is_empty() {
            errors.push(SettingsError {
                field,
                message: "must not be empty".into(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
