//! Archive Engine backed by the arkimet command-line tools.
//!
//! Matchers and aliases go through `arki-dump`, dataset access through
//! `arki-query` run against a temporary configuration file.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;

use tempfile::NamedTempFile;

use crate::config::EngineConfig;
use crate::datasets::bounding::{parse_wkt_points, Point};
use crate::datasets::{ConfigSection, ConfigSet};
use crate::engine::{
    ArchiveEngine, ByteOutput, ByteQuery, DataQuery, DataStartHook, DatasetReader, MacroRequest, Metadata,
    MetadataSink, Summary, SummaryStyle,
};
use crate::error::EngineError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Engine that shells out to `arki-query` and `arki-dump`.
#[derive(Debug, Clone)]
pub struct ExecEngine {
    query_command: String,
    dump_command: String,
}

impl ExecEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            query_command: config.query_command.clone(),
            dump_command: config.dump_command.clone(),
        }
    }

    fn dump(&self, args: &[&str]) -> Result<String, EngineError> {
        let mut cmd = Command::new(&self.dump_command);
        cmd.args(args);
        let out = run_captured(&mut cmd, &self.dump_command)?;
        Ok(String::from_utf8_lossy(&out).trim_end().to_string())
    }
}

impl ArchiveEngine for ExecEngine {
    fn parse_matcher(&self, expr: &str) -> Result<String, EngineError> {
        self.dump(&["--query", expr])
    }

    fn alias_database(&self) -> Result<String, EngineError> {
        self.dump(&["--aliases"])
    }

    fn open_reader(&self, section: &ConfigSection) -> Result<Box<dyn DatasetReader>, EngineError> {
        let mut cfg = ConfigSet::new();
        cfg.insert(section.name(), section.clone());
        Ok(Box::new(ExecReader {
            query_command: self.query_command.clone(),
            dump_command: self.dump_command.clone(),
            config: cfg.to_string(),
            qmacro: None,
        }))
    }

    /// `arki-query --qmacro` reads only the datasets configuration; the
    /// macro configuration has no command line counterpart and is not
    /// forwarded.
    fn open_qmacro(&self, request: &MacroRequest) -> Result<Box<dyn DatasetReader>, EngineError> {
        tracing::debug!(qmacro = %request.name, "Macro configuration not forwarded to arki-query");
        Ok(Box::new(ExecReader {
            query_command: self.query_command.clone(),
            dump_command: self.dump_command.clone(),
            config: request.datasets_cfg.clone(),
            qmacro: Some((request.name.clone(), request.argument.clone())),
        }))
    }
}

#[derive(Debug, Clone)]
struct ExecReader {
    query_command: String,
    dump_command: String,
    config: String,
    /// Macro name and argument, for virtual datasets.
    qmacro: Option<(String, String)>,
}

impl ExecReader {
    /// Build an `arki-query` invocation. The returned file backs the
    /// `--config` argument and must outlive the command.
    fn command(&self, options: &[String], matcher: &str) -> Result<(Command, NamedTempFile), EngineError> {
        let mut cfg_file = NamedTempFile::new()?;
        cfg_file.write_all(self.config.as_bytes())?;
        cfg_file.flush()?;

        let mut cmd = Command::new(&self.query_command);
        cmd.args(options);
        match &self.qmacro {
            Some((name, argument)) => {
                cmd.arg(format!("--qmacro={}", name)).arg(argument);
            }
            None => {
                cmd.arg(matcher);
            }
        }
        cmd.arg(format!("--config={}", cfg_file.path().display()));
        Ok((cmd, cfg_file))
    }

    fn summary_bytes(&self, matcher: &str, options: &[String]) -> Result<Vec<u8>, EngineError> {
        let (mut cmd, _cfg) = self.command(options, matcher)?;
        run_captured(&mut cmd, &self.query_command)
    }
}

impl DatasetReader for ExecReader {
    fn query_data(&mut self, query: &DataQuery, on_metadata: &mut MetadataSink<'_>) -> Result<(), EngineError> {
        let mut options = Vec::new();
        if query.with_data {
            options.push("--inline".to_string());
        }
        push_sort(&mut options, query.sort.as_deref());

        let (mut cmd, _cfg) = self.command(&options, &query.matcher)?;
        let inline = query.with_data;
        stream_child(&mut cmd, &self.query_command, &mut |chunk| {
            on_metadata(Box::new(ChunkMetadata {
                bytes: chunk.to_vec(),
                inline,
            }))
        })
    }

    fn query_bytes(
        &mut self,
        query: &ByteQuery,
        out: &mut dyn Write,
        data_start_hook: &mut DataStartHook<'_>,
    ) -> Result<(), EngineError> {
        let mut options = match &query.output {
            ByteOutput::Data => vec!["--data".to_string()],
            ByteOutput::Postprocess(command) => vec![format!("--postprocess={}", command)],
            ByteOutput::MetadataReport(command) => vec![format!("--report={}", command)],
            ByteOutput::SummaryReport(command) => vec!["--summary".to_string(), format!("--report={}", command)],
        };
        push_sort(&mut options, query.sort.as_deref());

        let (mut cmd, _cfg) = self.command(&options, &query.matcher)?;
        if let Some(dir) = &query.workdir {
            cmd.current_dir(dir);
        }
        cmd.envs(query.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let mut started = false;
        stream_child(&mut cmd, &self.query_command, &mut |chunk| {
            if !started {
                data_start_hook()?;
                started = true;
            }
            out.write_all(chunk)?;
            Ok(())
        })?;
        out.flush()?;
        Ok(())
    }

    fn query_summary(&mut self, matcher: &str) -> Result<Box<dyn Summary>, EngineError> {
        // Run once now so that bad queries fail before any output
        let binary = self.summary_bytes(matcher, &["--summary".to_string()])?;
        Ok(Box::new(ExecSummary {
            reader: self.clone(),
            matcher: matcher.to_string(),
            binary,
        }))
    }
}

fn push_sort(options: &mut Vec<String>, sort: Option<&str>) {
    if let Some(sort) = sort.filter(|s| !s.is_empty()) {
        options.push(format!("--sort={}", sort));
    }
}

/// A chunk of `arki-query` metadata output. The tool's framing is opaque
/// here, so records are delivered as read.
struct ChunkMetadata {
    bytes: Vec<u8>,
    inline: bool,
}

impl Metadata for ChunkMetadata {
    /// `arki-query` records its own source in the metadata it prints, so
    /// records pass through unchanged.
    fn make_url(&mut self, url: &str) -> Result<(), EngineError> {
        tracing::trace!(url, "Metadata source left as produced by arki-query");
        Ok(())
    }

    fn make_inline(&mut self) -> Result<(), EngineError> {
        if self.inline {
            Ok(())
        } else {
            Err(EngineError::Unsupported("inlining metadata queried without data"))
        }
    }

    fn write(&self, out: &mut dyn Write) -> Result<(), EngineError> {
        out.write_all(&self.bytes)?;
        Ok(())
    }
}

struct ExecSummary {
    reader: ExecReader,
    matcher: String,
    binary: Vec<u8>,
}

impl ExecSummary {
    fn write_with(&self, base: &str, style: SummaryStyle, out: &mut dyn Write) -> Result<(), EngineError> {
        let mut options = vec![base.to_string()];
        match style {
            SummaryStyle::Binary if base == "--summary" => {
                out.write_all(&self.binary)?;
                return Ok(());
            }
            SummaryStyle::Binary => {}
            SummaryStyle::Json => options.push("--json".to_string()),
            SummaryStyle::Yaml => options.push("--yaml".to_string()),
        }
        let bytes = self.reader.summary_bytes(&self.matcher, &options)?;
        out.write_all(&bytes)?;
        Ok(())
    }
}

impl Summary for ExecSummary {
    fn write(&self, style: SummaryStyle, out: &mut dyn Write) -> Result<(), EngineError> {
        self.write_with("--summary", style, out)
    }

    fn write_short(&self, style: SummaryStyle, out: &mut dyn Write) -> Result<(), EngineError> {
        self.write_with("--summary-short", style, out)
    }

    fn coverage(&self) -> Result<Vec<Point>, EngineError> {
        let mut file = NamedTempFile::new()?;
        file.write_all(&self.binary)?;
        file.flush()?;

        let mut cmd = Command::new(&self.reader.dump_command);
        cmd.arg("--bbox").arg(file.path());
        let out = run_captured(&mut cmd, &self.reader.dump_command)?;
        let wkt = String::from_utf8_lossy(&out);
        if wkt.trim().is_empty() {
            return Ok(Vec::new());
        }
        parse_wkt_points(wkt.trim()).map_err(EngineError::Failed)
    }
}

fn spawn_error(program: &str, err: std::io::Error) -> EngineError {
    EngineError::Failed(format!("cannot run {}: {}", program, err))
}

fn failure_message(program: &str, status: std::process::ExitStatus, stderr: &[u8]) -> EngineError {
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        EngineError::Failed(format!("{} failed with {}", program, status))
    } else {
        EngineError::Failed(stderr.to_string())
    }
}

/// Run to completion, returning standard output.
fn run_captured(cmd: &mut Command, program: &str) -> Result<Vec<u8>, EngineError> {
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| spawn_error(program, e))?;
    if !output.status.success() {
        return Err(failure_message(program, output.status, &output.stderr));
    }
    Ok(output.stdout)
}

/// Run a child process, pushing its standard output to `on_chunk` as it
/// arrives. The child is killed if `on_chunk` fails.
fn stream_child(
    cmd: &mut Command,
    program: &str,
    on_chunk: &mut dyn FnMut(&[u8]) -> Result<(), EngineError>,
) -> Result<(), EngineError> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let stderr_reader = child.stderr.take().map(|mut stderr| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf);
            buf
        })
    });

    let result = pump_stdout(&mut child, on_chunk);
    if result.is_err() {
        let _ = child.kill();
    }
    let status = child.wait()?;
    let stderr = stderr_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    result?;
    if !status.success() {
        return Err(failure_message(program, status, &stderr));
    }
    Ok(())
}

fn pump_stdout(
    child: &mut Child,
    on_chunk: &mut dyn FnMut(&[u8]) -> Result<(), EngineError>,
) -> Result<(), EngineError> {
    let Some(stdout) = child.stdout.as_mut() else {
        return Ok(());
    };
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = stdout.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        on_chunk(&buf[..n])?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(query: &str, dump: &str) -> ExecEngine {
        ExecEngine::new(&EngineConfig {
            query_command: query.into(),
            dump_command: dump.into(),
        })
    }

    #[test]
    fn test_missing_tool_reports_program() {
        let engine = engine_with("arki-query-missing-for-test", "arki-dump-missing-for-test");
        let err = engine.parse_matcher("origin:GRIB1").unwrap_err();
        assert!(err.to_string().starts_with("cannot run arki-dump-missing-for-test"));
    }

    #[test]
    fn test_chunk_metadata_passes_through() {
        let mut md = ChunkMetadata {
            bytes: b"MD record".to_vec(),
            inline: false,
        };
        md.make_url("http://localhost:8080/dataset/ds").unwrap();
        assert!(md.make_inline().is_err());

        let mut out = Vec::new();
        md.write(&mut out).unwrap();
        assert_eq!(out, b"MD record");
    }

    #[cfg(unix)]
    #[test]
    fn test_stream_child_collects_output() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf 'hello'");
        let mut got = Vec::new();
        stream_child(&mut cmd, "sh", &mut |chunk| {
            got.extend_from_slice(chunk);
            Ok(())
        })
        .unwrap();
        assert_eq!(got, b"hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_stream_child_failure_uses_stderr() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo 'FAIL' >&2; exit 3");
        let err = stream_child(&mut cmd, "sh", &mut |_| Ok(())).unwrap_err();
        assert_eq!(err.to_string(), "FAIL");
    }
}
