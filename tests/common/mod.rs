//! Shared utilities for integration tests: an in-memory Archive Engine and
//! a server bound to an ephemeral port.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;

use arki_server::config::ServerConfig;
use arki_server::datasets::bounding::Point;
use arki_server::datasets::{ConfigSection, ConfigSet};
use arki_server::engine::{
    ArchiveEngine, ByteOutput, ByteQuery, DataQuery, DataStartHook, DatasetReader, MacroRequest, Metadata,
    MetadataSink, Summary, SummaryStyle,
};
use arki_server::error::EngineError;
use arki_server::http::staging::MANIFEST_ENV;
use arki_server::{HttpServer, ServerState, Shutdown};

/// One archived item.
#[derive(Debug, Clone)]
pub struct Record {
    pub origin: String,
    pub data: Vec<u8>,
    pub point: Point,
}

/// Archive Engine over records held in memory.
///
/// Matchers are `;`-separated `key:value` subexpressions; only `origin`
/// filters records. Postprocessors are scripted by name.
#[derive(Debug, Default)]
pub struct MockEngine {
    datasets: BTreeMap<String, Vec<Record>>,
    pub macro_requests: Mutex<Vec<MacroRequest>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, name: &str, records: Vec<Record>) -> Self {
        self.datasets.insert(name.to_string(), records);
        self
    }

    /// The fixture used by most tests: `test200` and `test80`, one GRIB
    /// each.
    pub fn fixture() -> Self {
        Self::new()
            .with_dataset(
                "test200",
                vec![Record {
                    origin: "GRIB1,200".into(),
                    data: b"GRIB200".to_vec(),
                    point: Point::new(12.0, 45.0),
                }],
            )
            .with_dataset(
                "test80",
                vec![Record {
                    origin: "GRIB1,80".into(),
                    data: b"GRIB80".to_vec(),
                    point: Point::new(11.0, 44.0),
                }],
            )
    }

    fn reader(&self, name: &str) -> Result<Box<dyn DatasetReader>, EngineError> {
        let records = self
            .datasets
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::failed(format!("dataset {} not found", name)))?;
        Ok(Box::new(MockReader { records }))
    }
}

fn parse(expr: &str) -> Result<Vec<(String, String)>, EngineError> {
    expr.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|sub| {
            sub.split_once(':')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| {
                    EngineError::failed(format!(
                        "cannot parse matcher subexpression '{}' does not contain a colon (':')",
                        sub
                    ))
                })
        })
        .collect()
}

impl ArchiveEngine for MockEngine {
    fn parse_matcher(&self, expr: &str) -> Result<String, EngineError> {
        let parts = parse(expr)?;
        Ok(parts
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect::<Vec<_>>()
            .join("; "))
    }

    fn expand_query(&self, query: &str) -> Result<String, EngineError> {
        let parts = parse(query)?;
        let mut expanded = Vec::new();
        for (k, v) in parts {
            match (k.as_str(), v.as_str()) {
                ("product", "t") => expanded.push("product:GRIB1,200,2,11".to_string()),
                ("product", v) if !v.starts_with("GRIB") => {
                    return Err(EngineError::failed(format!("cannot parse Product style '{}'", v)))
                }
                _ => expanded.push(format!("{}:{}", k, v)),
            }
        }
        Ok(expanded.join("; "))
    }

    fn alias_database(&self) -> Result<String, EngineError> {
        Ok("[origin]\narpa = GRIB1,200\n\n[product]\nt = GRIB1,200,2,11\n".to_string())
    }

    fn open_reader(&self, section: &ConfigSection) -> Result<Box<dyn DatasetReader>, EngineError> {
        self.reader(section.name())
    }

    fn open_qmacro(&self, request: &MacroRequest) -> Result<Box<dyn DatasetReader>, EngineError> {
        if let Ok(mut requests) = self.macro_requests.lock() {
            requests.push(request.clone());
        }
        match request.name.as_str() {
            "noop" => {
                let target = request.argument.trim();
                let cfg = ConfigSet::parse(&request.datasets_cfg, "qmacro")
                    .map_err(|e| EngineError::failed(e.to_string()))?;
                if !cfg.contains(target) {
                    return Err(EngineError::failed(format!("dataset {} not found", target)));
                }
                self.reader(target)
            }
            other => Err(EngineError::failed(format!("unknown query macro {}", other))),
        }
    }
}

struct MockReader {
    records: Vec<Record>,
}

impl MockReader {
    fn matching(&self, matcher: &str) -> Result<Vec<Record>, EngineError> {
        let parts = parse(matcher)?;
        Ok(self
            .records
            .iter()
            .filter(|r| parts.iter().all(|(k, v)| k != "origin" || *v == r.origin))
            .cloned()
            .collect())
    }
}

impl DatasetReader for MockReader {
    fn query_data(&mut self, query: &DataQuery, on_metadata: &mut MetadataSink<'_>) -> Result<(), EngineError> {
        for record in self.matching(&query.matcher)? {
            on_metadata(Box::new(MockMetadata {
                record,
                url: None,
                with_data: query.with_data,
                inline: false,
            }))?;
        }
        Ok(())
    }

    fn query_bytes(
        &mut self,
        query: &ByteQuery,
        out: &mut dyn Write,
        data_start_hook: &mut DataStartHook<'_>,
    ) -> Result<(), EngineError> {
        let records = self.matching(&query.matcher)?;
        match &query.output {
            ByteOutput::Data => {
                for (i, record) in records.iter().enumerate() {
                    if i == 0 {
                        data_start_hook()?;
                    }
                    out.write_all(&record.data)?;
                }
            }
            ByteOutput::Postprocess(command) => match command.split_once(' ') {
                Some(("say", word)) => {
                    data_start_hook()?;
                    writeln!(out, "{}", word)?;
                }
                _ if command == "checkfiles" => {
                    let manifest = query
                        .env
                        .iter()
                        .find(|(k, _)| k == MANIFEST_ENV)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default();
                    let workdir = query.workdir.clone().unwrap_or_else(|| PathBuf::from("."));
                    for name in manifest.split(':').filter(|n| !n.is_empty()) {
                        if !workdir.join(name).exists() {
                            return Err(EngineError::failed(format!("{} is missing", name)));
                        }
                    }
                    data_start_hook()?;
                    writeln!(out, "{}", manifest)?;
                }
                _ if command == "outthenerr" => {
                    data_start_hook()?;
                    out.write_all(b"So far, so good\n")?;
                    out.flush()?;
                    return Err(EngineError::failed("FAIL"));
                }
                _ if command == "error" => return Err(EngineError::failed("FAIL")),
                _ if command == "cat" => {
                    data_start_hook()?;
                    for record in &records {
                        out.write_all(&record.data)?;
                    }
                }
                _ => return Err(EngineError::failed(format!("postprocessor {} is not allowed", command))),
            },
            ByteOutput::MetadataReport(command) => {
                data_start_hook()?;
                writeln!(out, "{}: {} items", command, records.len())?;
            }
            ByteOutput::SummaryReport(command) => {
                data_start_hook()?;
                writeln!(out, "{}: summary of {} items", command, records.len())?;
            }
        }
        Ok(())
    }

    fn query_summary(&mut self, matcher: &str) -> Result<Box<dyn Summary>, EngineError> {
        let records = self.matching(matcher)?;
        Ok(Box::new(MockSummary { records }))
    }
}

struct MockMetadata {
    record: Record,
    url: Option<String>,
    with_data: bool,
    inline: bool,
}

impl Metadata for MockMetadata {
    fn make_url(&mut self, url: &str) -> Result<(), EngineError> {
        self.url = Some(url.to_string());
        Ok(())
    }

    fn make_inline(&mut self) -> Result<(), EngineError> {
        if !self.with_data {
            return Err(EngineError::failed("data was not queried"));
        }
        self.inline = true;
        Ok(())
    }

    fn write(&self, out: &mut dyn Write) -> Result<(), EngineError> {
        if self.inline {
            writeln!(out, "MD origin={} inline={}", self.record.origin, self.record.data.len())?;
            out.write_all(&self.record.data)?;
            writeln!(out)?;
        } else {
            writeln!(
                out,
                "MD origin={} url={}",
                self.record.origin,
                self.url.as_deref().unwrap_or("")
            )?;
        }
        Ok(())
    }
}

struct MockSummary {
    records: Vec<Record>,
}

impl Summary for MockSummary {
    fn write(&self, style: SummaryStyle, out: &mut dyn Write) -> Result<(), EngineError> {
        let count = self.records.len();
        match style {
            SummaryStyle::Binary => write!(out, "SU{}", count)?,
            SummaryStyle::Json => write!(out, "{{\"items\":[{{\"count\":{}}}]}}", count)?,
            SummaryStyle::Yaml => write!(out, "SummaryItem:\n  count: {}\n", count)?,
        }
        Ok(())
    }

    fn write_short(&self, style: SummaryStyle, out: &mut dyn Write) -> Result<(), EngineError> {
        let count = self.records.len();
        match style {
            SummaryStyle::Binary => write!(out, "SU{}", count)?,
            SummaryStyle::Json => write!(out, "{{\"items\":{{\"count\":{}}}}}", count)?,
            SummaryStyle::Yaml => write!(out, "SummaryStats:\n  count: {}\n", count)?,
        }
        Ok(())
    }

    fn coverage(&self) -> Result<Vec<Point>, EngineError> {
        Ok(self.records.iter().map(|r| r.point).collect())
    }
}

/// Configuration matching [`MockEngine::fixture`], plus an error dataset.
pub const FIXTURE_CONFIG: &str = "\
[error]
path = /srv/arki/error
step = daily
type = error

[test200]
format = grib
path = /srv/arki/test200
postprocess = cat,say,checkfiles,error,outthenerr
restrict = test
step = daily
type = iseg

[test80]
format = grib
path = /srv/arki/test80
postprocess = cat,say,checkfiles,error,outthenerr
step = daily
type = iseg
";

/// A running server.
pub struct TestServer<E = MockEngine> {
    pub url: String,
    pub engine: Arc<E>,
    pub staging_root: tempfile::TempDir,
    shutdown: Shutdown,
}

impl<E: ArchiveEngine + 'static> TestServer<E> {
    pub async fn start(engine: E, cfg_text: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let staging_root = tempfile::tempdir().unwrap();

        let mut cfg = ConfigSet::parse(cfg_text, "test").unwrap();
        for (name, section) in cfg.iter_mut() {
            section.set("name", name);
        }

        let engine = Arc::new(engine);
        let state = ServerState::new(cfg, &url, engine.clone())
            .with_staging_root(Some(staging_root.path().to_path_buf()));
        let shutdown = Shutdown::new();
        let server = HttpServer::new(&ServerConfig::default(), state);
        let handle = shutdown.clone();
        tokio::spawn(async move {
            server.run(listener, handle).await.unwrap();
        });

        Self {
            url,
            engine,
            staging_root,
            shutdown,
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }

    /// Entries left in the staging root.
    pub fn staged_entries(&self) -> usize {
        std::fs::read_dir(self.staging_root.path()).unwrap().count()
    }
}

impl<E> Drop for TestServer<E> {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}
