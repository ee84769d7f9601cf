//! Error types shared across subsystems.
//!
//! Engine diagnostics are carried verbatim: client tooling pattern-matches
//! on matcher parse errors, so nothing here rewords them.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by the Archive Engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Diagnostic text produced by the engine.
    #[error("{0}")]
    Failed(String),

    /// I/O failure while moving data to or from the engine.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The engine has no implementation for the requested capability.
    #[error("{0} is not supported by this archive engine")]
    Unsupported(&'static str),
}

impl EngineError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// One section that did not pass validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionFailure {
    pub name: String,
    pub message: String,
}

impl fmt::Display for SectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// Every validation failure found in a configuration scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationFailures {
    pub failures: Vec<SectionFailure>,
}

impl ValidationFailures {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SectionFailure> {
        self.failures.iter()
    }
}

impl fmt::Display for ValidationFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Some input files did not validate.")
    }
}

impl std::error::Error for ValidationFailures {}

/// Errors raised while building a merged dataset configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{origin}:{line}: {message}")]
    Parse {
        origin: String,
        line: usize,
        message: String,
    },

    #[error("{0}")]
    Dataset(String),

    #[error("cannot fetch configuration from {url}")]
    Remote {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("cannot fetch configuration from {url}: server replied {status}")]
    RemoteStatus { url: String, status: u16 },

    #[error("you need to specify at least one config file or dataset")]
    EmptyInput,

    #[error("none of the configuration provided were useable")]
    NoDatasetsLeft,

    #[error(transparent)]
    Validation(#[from] ValidationFailures),

    #[error("{name}: {error}")]
    Extra { name: String, error: EngineError },
}

/// Errors raised while handling an HTTP request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl RequestError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}
