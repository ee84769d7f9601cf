//! Staging of files uploaded for postprocessors.
//!
//! Each postprocess request with uploads gets a fresh directory, deleted
//! when the `StagingArea` is dropped. The postprocessor runs with that
//! directory as its working directory and finds the staged names in
//! `ARKI_POSTPROC_FILES`; the server's own working directory is never
//! changed.

use std::collections::BTreeSet;
use std::path::Path;

use tempfile::TempDir;

use crate::error::RequestError;
use crate::http::request::UploadedFile;

/// Environment variable listing the staged files, colon separated.
pub const MANIFEST_ENV: &str = "ARKI_POSTPROC_FILES";

/// Per-request directory of uploaded files.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
    files: BTreeSet<String>,
}

impl StagingArea {
    /// Create an empty area, under `root` or the system temp directory.
    pub fn create(root: Option<&Path>) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("arki-server-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        tracing::debug!(path = %dir.path().display(), "Created staging area");
        Ok(Self {
            dir,
            files: BTreeSet::new(),
        })
    }

    /// Create an area holding `files`.
    pub fn stage(root: Option<&Path>, files: &[UploadedFile]) -> Result<Self, RequestError> {
        let mut area = Self::create(root)?;
        for file in files {
            area.save(&file.filename, &file.data)?;
        }
        Ok(area)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Save `data` under the base name of `filename`, returning that name.
    ///
    /// A name already staged is overwritten.
    pub fn save(&mut self, filename: &str, data: &[u8]) -> Result<String, RequestError> {
        let name = sanitize_filename(filename)
            .ok_or_else(|| RequestError::BadRequest(format!("invalid upload file name {:?}", filename)))?;
        std::fs::write(self.dir.path().join(&name), data)?;
        self.files.insert(name.clone());
        Ok(name)
    }

    /// Staged names, sorted and colon separated.
    pub fn manifest(&self) -> String {
        self.files.iter().map(String::as_str).collect::<Vec<_>>().join(":")
    }

    /// Environment for the postprocessor.
    pub fn env(&self) -> Vec<(String, String)> {
        if self.files.is_empty() {
            Vec::new()
        } else {
            vec![(MANIFEST_ENV.to_string(), self.manifest())]
        }
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        tracing::debug!(path = %self.dir.path().display(), "Removing staging area");
    }
}

/// Base name of a client supplied file name, with any directory part
/// (Unix or Windows style) removed.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    let normalized = filename.replace('\\', "/");
    let base = normalized.rsplit('/').next().unwrap_or_default().trim();
    match base {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}
