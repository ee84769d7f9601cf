//! Query styles and the stream handlers that serve them.
//!
//! # Data Flow
//! ```text
//! form `style` ──▶ QueryStyle (table lookup)
//! path or qmacro ─▶ DatasetSource (stored dataset | macro query)
//!                      │
//!                      ▼
//!   StreamHandler { style, source, params }::stream
//!       metadata / inline      → query_data, headers on first record
//!       data / postprocess     → query_bytes, headers from the data start hook
//!       rep_metadata / rep_summary
//! ```

use std::fmt;

use crate::datasets::ConfigSection;
use crate::engine::{ArchiveEngine, ByteOutput, ByteQuery, DataQuery, DatasetReader, SummaryStyle};
use crate::error::{EngineError, RequestError};
use crate::http::qmacro::MacroQuery;
use crate::http::request::QueryForm;
use crate::http::response::{ResponseHead, ResponseWriter};
use crate::http::staging::StagingArea;

/// Output style of a dataset query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStyle {
    Metadata,
    Inline,
    Data,
    Postprocess,
    RepMetadata,
    RepSummary,
}

const STYLES: [(&str, QueryStyle); 6] = [
    ("metadata", QueryStyle::Metadata),
    ("inline", QueryStyle::Inline),
    ("data", QueryStyle::Data),
    ("postprocess", QueryStyle::Postprocess),
    ("rep_metadata", QueryStyle::RepMetadata),
    ("rep_summary", QueryStyle::RepSummary),
];

impl QueryStyle {
    /// Look up a style name; empty means `metadata`.
    pub fn parse(name: &str) -> Result<Self, RequestError> {
        if name.is_empty() {
            return Ok(QueryStyle::Metadata);
        }
        STYLES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, style)| *style)
            .ok_or_else(|| RequestError::not_found(format!("Query style {} is not supported", name)))
    }

    pub fn name(self) -> &'static str {
        STYLES
            .iter()
            .find(|(_, style)| *style == self)
            .map(|(n, _)| *n)
            .unwrap_or("metadata")
    }

    /// Extension of the suggested download name.
    pub fn extension(self) -> &'static str {
        match self {
            QueryStyle::Metadata | QueryStyle::Inline => "arkimet",
            QueryStyle::Data => "data",
            QueryStyle::Postprocess => "postprocessed",
            QueryStyle::RepMetadata | QueryStyle::RepSummary => "txt",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            QueryStyle::RepMetadata | QueryStyle::RepSummary => "text/plain",
            _ => "application/octet-stream",
        }
    }
}

impl fmt::Display for QueryStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a handler reads from.
#[derive(Debug, Clone)]
pub enum DatasetSource {
    /// A stored dataset of the server configuration.
    Dataset {
        name: String,
        section: ConfigSection,
        /// Public URL of the dataset, recorded in metadata.
        url: String,
    },
    /// A virtual dataset built by a query macro.
    Macro(MacroQuery),
}

impl DatasetSource {
    pub fn dataset(name: &str, section: &ConfigSection, server_url: &str) -> Self {
        DatasetSource::Dataset {
            name: name.to_string(),
            section: section.clone(),
            url: format!("{}/dataset/{}", server_url, name),
        }
    }

    pub fn open_reader(&self, engine: &dyn ArchiveEngine) -> Result<Box<dyn DatasetReader>, EngineError> {
        match self {
            DatasetSource::Dataset { section, .. } => engine.open_reader(section),
            DatasetSource::Macro(query) => engine.open_qmacro(&query.request),
        }
    }

    /// Suggested download name with extension `ext`.
    pub fn filename(&self, ext: &str) -> String {
        match self {
            DatasetSource::Dataset { name, .. } => format!("{}.{}", name, ext),
            DatasetSource::Macro(query) => format!("{}.{}", query.name(), ext),
        }
    }

    /// Base URL recorded as the source of streamed metadata.
    pub fn metadata_url(&self, server_url: &str) -> String {
        match self {
            DatasetSource::Dataset { url, .. } => url.clone(),
            DatasetSource::Macro(_) => format!("{}/query", server_url),
        }
    }

    /// Matcher for the engine call. Macro queries carry their argument in
    /// the macro request instead.
    pub fn matcher(&self, query: &str) -> String {
        match self {
            DatasetSource::Dataset { .. } => query.to_string(),
            DatasetSource::Macro(_) => String::new(),
        }
    }
}

/// Request parameters shared by all styles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pub query: String,
    pub sort: Option<String>,
    /// Postprocessor or report command.
    pub command: Option<String>,
}

impl QueryParams {
    pub fn from_form(form: &QueryForm) -> Self {
        Self {
            query: form.get_or("query", "").trim().to_string(),
            sort: form.non_empty("sort").map(|s| s.trim().to_string()),
            command: form.non_empty("command").map(str::to_string),
        }
    }
}

/// One query request, ready to stream.
#[derive(Debug, Clone)]
pub struct StreamHandler {
    pub style: QueryStyle,
    pub source: DatasetSource,
    pub params: QueryParams,
}

impl StreamHandler {
    pub fn new(style: QueryStyle, source: DatasetSource, params: QueryParams) -> Self {
        Self { style, source, params }
    }

    pub fn head(&self) -> ResponseHead {
        ResponseHead::attachment(self.style.content_type(), self.source.filename(self.style.extension()))
    }

    fn command(&self) -> Result<String, RequestError> {
        self.params
            .command
            .clone()
            .ok_or_else(|| RequestError::BadRequest(format!("{} queries need a command", self.style)))
    }

    /// Run the query, writing into `out`.
    pub fn stream(
        &self,
        engine: &dyn ArchiveEngine,
        server_url: &str,
        staging: Option<&StagingArea>,
        out: &mut ResponseWriter,
    ) -> Result<(), RequestError> {
        let mut reader = self.source.open_reader(engine)?;
        let matcher = self.source.matcher(&self.params.query);

        match self.style {
            QueryStyle::Metadata | QueryStyle::Inline => {
                let inline = self.style == QueryStyle::Inline;
                let query = DataQuery {
                    matcher,
                    sort: self.params.sort.clone(),
                    with_data: inline,
                };
                let url = self.source.metadata_url(server_url);
                reader.query_data(&query, &mut |mut md| {
                    out.send_headers()?;
                    if inline {
                        md.make_inline()?;
                    } else {
                        md.make_url(&url)?;
                    }
                    md.write(&mut *out)
                })?;
            }
            QueryStyle::Data | QueryStyle::Postprocess | QueryStyle::RepMetadata | QueryStyle::RepSummary => {
                let output = match self.style {
                    QueryStyle::Data => ByteOutput::Data,
                    QueryStyle::Postprocess => ByteOutput::Postprocess(self.command()?),
                    QueryStyle::RepMetadata => ByteOutput::MetadataReport(self.command()?),
                    _ => ByteOutput::SummaryReport(self.command()?),
                };
                let mut query = ByteQuery::new(matcher, output);
                query.sort = self.params.sort.clone();
                if let Some(staging) = staging {
                    query.workdir = Some(staging.path().to_path_buf());
                    query.env = staging.env();
                }

                let latch = out.latch();
                let mut data_start_hook = || latch.send().map_err(EngineError::from);
                reader.query_bytes(&query, out, &mut data_start_hook)?;
            }
        }
        Ok(())
    }
}

/// Serve a summary of `source` in `style`, full or short.
pub fn stream_summary(
    engine: &dyn ArchiveEngine,
    source: &DatasetSource,
    matcher: &str,
    style: SummaryStyle,
    short: bool,
    out: &mut ResponseWriter,
) -> Result<(), RequestError> {
    let mut reader = source.open_reader(engine)?;
    let summary = reader.query_summary(&source.matcher(matcher))?;
    out.send_headers()?;
    if short {
        summary.write_short(style, out)?;
    } else {
        summary.write(style, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MacroRequest;

    #[test]
    fn test_style_table() {
        assert_eq!(QueryStyle::parse("").unwrap(), QueryStyle::Metadata);
        assert_eq!(QueryStyle::parse("rep_summary").unwrap(), QueryStyle::RepSummary);
        for (name, style) in STYLES {
            assert_eq!(style.name(), name);
        }
        let err = QueryStyle::parse("foo").unwrap_err();
        assert!(matches!(err, RequestError::NotFound(_)));
    }

    #[test]
    fn test_head_per_style() {
        let section: ConfigSection = [("name", "test200")].into_iter().collect();
        let source = DatasetSource::dataset("test200", &section, "http://localhost:8080");
        let handler = StreamHandler::new(QueryStyle::RepMetadata, source.clone(), QueryParams::default());
        assert_eq!(handler.head(), ResponseHead::attachment("text/plain", "test200.txt"));

        let handler = StreamHandler::new(QueryStyle::Postprocess, source.clone(), QueryParams::default());
        assert_eq!(handler.head().filename.as_deref(), Some("test200.postprocessed"));
        assert_eq!(source.metadata_url("http://localhost:8080"), "http://localhost:8080/dataset/test200");
    }

    #[test]
    fn test_macro_source() {
        let source = DatasetSource::Macro(MacroQuery {
            request: MacroRequest {
                name: "noop".into(),
                ..Default::default()
            },
        });
        assert_eq!(source.filename("arkimet"), "noop.arkimet");
        assert_eq!(source.metadata_url("http://host"), "http://host/query");
        assert_eq!(source.matcher("origin:GRIB1"), "");
    }

    #[test]
    fn test_params_from_form() {
        let mut form = QueryForm::default();
        form.insert("query", " origin:GRIB1 \n");
        form.insert("sort", "");
        form.insert("command", "say ciao");
        let params = QueryParams::from_form(&form);
        assert_eq!(params.query, "origin:GRIB1");
        assert_eq!(params.sort, None);
        assert_eq!(params.command.as_deref(), Some("say ciao"));
    }
}
