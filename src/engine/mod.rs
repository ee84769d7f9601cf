//! Archive Engine capability contract.
//!
//! # Data Flow
//! ```text
//! ConfigSection ──open_reader──▶ DatasetReader ─┬─ query_data   (per-record push)
//!                                               ├─ query_bytes  (byte stream + start hook)
//! MacroRequest ──open_qmacro──▶ DatasetReader  └─ query_summary ──▶ Summary
//! ```
//!
//! # Design Decisions
//! - Everything that reads archive bytes, parses matcher grammar or runs
//!   postprocessors lives behind these traits
//! - Calls are blocking; the HTTP layer runs them on the blocking pool
//! - Output formats are opaque byte streams to the rest of the crate

pub mod exec;

use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use crate::datasets::bounding::Point;
use crate::datasets::ConfigSection;
use crate::error::EngineError;

pub use exec::ExecEngine;

/// Query parameters for record streams.
#[derive(Debug, Clone, Default)]
pub struct DataQuery {
    pub matcher: String,
    pub sort: Option<String>,
    pub with_data: bool,
}

/// What a byte-stream query produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteOutput {
    /// Raw payload of every matching item.
    Data,
    /// Payload piped through the named postprocessor.
    Postprocess(String),
    /// Textual report computed over metadata.
    MetadataReport(String),
    /// Textual report computed over the summary.
    SummaryReport(String),
}

/// Query parameters for byte streams.
#[derive(Debug, Clone)]
pub struct ByteQuery {
    pub matcher: String,
    pub sort: Option<String>,
    pub output: ByteOutput,
    /// Working directory for the postprocessor.
    pub workdir: Option<PathBuf>,
    /// Extra environment for the postprocessor.
    pub env: Vec<(String, String)>,
}

impl ByteQuery {
    pub fn new(matcher: impl Into<String>, output: ByteOutput) -> Self {
        Self {
            matcher: matcher.into(),
            sort: None,
            output,
            workdir: None,
            env: Vec::new(),
        }
    }
}

/// Serialization negotiated for summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SummaryStyle {
    #[default]
    Binary,
    Json,
    Yaml,
}

impl SummaryStyle {
    pub fn content_type(self) -> &'static str {
        match self {
            SummaryStyle::Binary => "application/octet-stream",
            SummaryStyle::Json => "application/json",
            SummaryStyle::Yaml => "text/x-yaml",
        }
    }
}

impl FromStr for SummaryStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "binary" => Ok(SummaryStyle::Binary),
            "json" => Ok(SummaryStyle::Json),
            "yaml" => Ok(SummaryStyle::Yaml),
            other => Err(format!("unsupported summary style {}", other)),
        }
    }
}

/// Inputs for building a virtual dataset from a query macro.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroRequest {
    /// Configuration of the macro environment itself (`url = ...`).
    pub macro_cfg: String,
    /// The whole server configuration, serialized.
    pub datasets_cfg: String,
    pub name: String,
    pub argument: String,
}

/// One metadata record produced by a record stream.
pub trait Metadata: Send {
    /// Point the record's source at `url`.
    fn make_url(&mut self, url: &str) -> Result<(), EngineError>;

    /// Embed the payload in the record.
    fn make_inline(&mut self) -> Result<(), EngineError>;

    fn write(&self, out: &mut dyn Write) -> Result<(), EngineError>;
}

/// Aggregate description of a dataset's contents.
pub trait Summary: Send {
    fn write(&self, style: SummaryStyle, out: &mut dyn Write) -> Result<(), EngineError>;

    fn write_short(&self, style: SummaryStyle, out: &mut dyn Write) -> Result<(), EngineError>;

    /// Spatial coverage points, used for bounding polygons.
    fn coverage(&self) -> Result<Vec<Point>, EngineError>;
}

/// Callback receiving each record of a record stream.
pub type MetadataSink<'a> = dyn FnMut(Box<dyn Metadata>) -> Result<(), EngineError> + 'a;

/// Hook run once, right before the first byte of output.
pub type DataStartHook<'a> = dyn FnMut() -> Result<(), EngineError> + 'a;

/// Read access to one dataset (stored or virtual).
pub trait DatasetReader: Send {
    fn query_data(&mut self, query: &DataQuery, on_metadata: &mut MetadataSink<'_>) -> Result<(), EngineError>;

    fn query_bytes(
        &mut self,
        query: &ByteQuery,
        out: &mut dyn Write,
        data_start_hook: &mut DataStartHook<'_>,
    ) -> Result<(), EngineError>;

    fn query_summary(&mut self, matcher: &str) -> Result<Box<dyn Summary>, EngineError>;
}

/// The Archive Engine.
pub trait ArchiveEngine: Send + Sync {
    /// Parse a matcher expression, returning its expanded form.
    fn parse_matcher(&self, expr: &str) -> Result<String, EngineError>;

    /// Expand aliases in a query.
    fn expand_query(&self, query: &str) -> Result<String, EngineError> {
        self.parse_matcher(query)
    }

    /// The matcher alias database, in its text form.
    fn alias_database(&self) -> Result<String, EngineError>;

    fn open_reader(&self, section: &ConfigSection) -> Result<Box<dyn DatasetReader>, EngineError>;

    fn open_qmacro(&self, request: &MacroRequest) -> Result<Box<dyn DatasetReader>, EngineError>;
}
