//! Configuration sources: config files, standard input, local datasets and
//! remote servers.

use std::path::{Path, PathBuf};

use tokio::io::AsyncReadExt;

use crate::datasets::section::{ConfigSection, ConfigSet};
use crate::error::ConfigError;

/// One input of a merge, in command-line order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A multi-section configuration file.
    ConfigFile(PathBuf),
    /// A multi-section configuration read from standard input.
    Stdin,
    /// A dataset directory or data file.
    Dataset(PathBuf),
    /// Another server, whose `/config` is merged.
    Remote(String),
}

impl Source {
    /// Interpret a `--config` argument.
    pub fn config_arg(arg: &str) -> Self {
        if arg == "-" {
            Source::Stdin
        } else {
            Source::ConfigFile(PathBuf::from(arg))
        }
    }

    /// Interpret a positional source argument.
    pub fn path_arg(arg: &str) -> Self {
        if arg.starts_with("http://") || arg.starts_with("https://") {
            Source::Remote(arg.trim_end_matches('/').to_string())
        } else {
            Source::Dataset(PathBuf::from(arg))
        }
    }
}

/// Sections produced by a source, each with the name it is added under.
pub type NamedSections = Vec<(String, ConfigSection)>;

/// Loads sections from sources.
#[derive(Debug, Clone, Default)]
pub struct SourceLoader {
    client: reqwest::Client,
}

impl SourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn load(&self, source: &Source) -> Result<NamedSections, ConfigError> {
        match source {
            Source::ConfigFile(path) => {
                let text = tokio::fs::read_to_string(path).await.map_err(|e| ConfigError::Io {
                    path: path.clone(),
                    source: e,
                })?;
                named(ConfigSet::parse(&text, &path.display().to_string())?)
            }
            Source::Stdin => {
                let mut text = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut text)
                    .await
                    .map_err(|e| ConfigError::Io {
                        path: PathBuf::from("-"),
                        source: e,
                    })?;
                named(ConfigSet::parse(&text, "(stdin)")?)
            }
            Source::Dataset(path) => {
                let section = read_dataset_config(path)?;
                Ok(vec![(section.name().to_string(), section)])
            }
            Source::Remote(url) => named(self.load_remote(url).await?),
        }
    }

    async fn load_remote(&self, url: &str) -> Result<ConfigSet, ConfigError> {
        let config_url = format!("{}/config", url);
        tracing::debug!(url = %config_url, "Fetching remote configuration");

        let res = self
            .client
            .get(&config_url)
            .send()
            .await
            .map_err(|e| ConfigError::Remote {
                url: config_url.clone(),
                source: e,
            })?;
        let status = res.status();
        if !status.is_success() {
            return Err(ConfigError::RemoteStatus {
                url: config_url,
                status: status.as_u16(),
            });
        }
        let text = res.text().await.map_err(|e| ConfigError::Remote {
            url: config_url.clone(),
            source: e,
        })?;
        ConfigSet::parse(&text, &config_url)
    }
}

fn named(set: ConfigSet) -> Result<NamedSections, ConfigError> {
    Ok(set
        .iter()
        .map(|(name, section)| (name.to_string(), section.clone()))
        .collect())
}

fn absolute(path: &Path) -> Result<PathBuf, ConfigError> {
    std::path::absolute(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Configuration of a local dataset directory or data file.
pub fn read_dataset_config(path: &Path) -> Result<ConfigSection, ConfigError> {
    if path.is_dir() {
        read_directory_config(path)
    } else {
        read_file_config(path)
    }
}

fn read_directory_config(path: &Path) -> Result<ConfigSection, ConfigError> {
    let cfg_path = path.join("config");
    let text = std::fs::read_to_string(&cfg_path).map_err(|e| ConfigError::Io {
        path: cfg_path.clone(),
        source: e,
    })?;
    let mut section = ConfigSection::parse(&text, &cfg_path.display().to_string())?;

    let abs = absolute(path)?;
    if !section.contains_key("name") {
        let name = abs
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| abs.display().to_string());
        section.set("name", name);
    }
    section.set("path", abs.display().to_string());
    Ok(section)
}

fn read_file_config(path: &Path) -> Result<ConfigSection, ConfigError> {
    let mut section = ConfigSection::new();
    section.set("type", "file");

    let arg = path.to_string_lossy();
    if path.exists() {
        section.set("path", absolute(path)?.display().to_string());
        section.set("format", format_from_filename(&arg));
        section.set("name", arg.to_string());
        return Ok(section);
    }

    // format:path
    let Some((format, fname)) = arg.split_once(':') else {
        return Err(ConfigError::Dataset(format!("file {} does not exist", arg)));
    };
    let format = normalise_format(format)
        .ok_or_else(|| ConfigError::Dataset(format!("unsupported format `{}`", format)))?;
    let fpath = Path::new(fname);
    if !fpath.exists() {
        return Err(ConfigError::Dataset(format!("file {} does not exist", fname)));
    }
    section.set("format", format);
    section.set("path", absolute(fpath)?.display().to_string());
    section.set("name", fname);
    Ok(section)
}

/// Canonical data format name, if known.
pub fn normalise_format(format: &str) -> Option<&'static str> {
    match format.to_lowercase().as_str() {
        "grib" | "grib1" | "grib2" => Some("grib"),
        "bufr" => Some("bufr"),
        "vm2" => Some("vm2"),
        "h5" | "hdf5" | "odim" | "odimh5" => Some("odimh5"),
        "yaml" => Some("yaml"),
        "metadata" => Some("arkimet"),
        _ => None,
    }
}

/// Data format guessed from a file extension, defaulting to `arkimet`.
pub fn format_from_filename(fname: &str) -> &'static str {
    Path::new(fname)
        .extension()
        .and_then(|ext| normalise_format(&ext.to_string_lossy()))
        .unwrap_or("arkimet")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_args() {
        assert_eq!(Source::config_arg("-"), Source::Stdin);
        assert_eq!(
            Source::path_arg("http://example.org/arki/"),
            Source::Remote("http://example.org/arki".into())
        );
        assert_eq!(Source::path_arg("/srv/ds"), Source::Dataset(PathBuf::from("/srv/ds")));
    }

    #[test]
    fn test_formats() {
        assert_eq!(format_from_filename("inbound/test.grib1"), "grib");
        assert_eq!(format_from_filename("x.HDF5"), "odimh5");
        assert_eq!(format_from_filename("x.arkimet"), "arkimet");
        assert_eq!(normalise_format("foo"), None);
    }

    #[test]
    fn test_directory_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let ds = dir.path().join("test200");
        std::fs::create_dir(&ds).unwrap();
        std::fs::write(ds.join("config"), "type = iseg\nformat = grib\n").unwrap();

        let section = read_dataset_config(&ds).unwrap();
        assert_eq!(section.name(), "test200");
        assert_eq!(section.get("type"), Some("iseg"));
        assert_eq!(section.path(), std::path::absolute(&ds).unwrap().display().to_string());
    }

    #[test]
    fn test_file_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("test.grib1");
        std::fs::write(&file, b"GRIB").unwrap();

        let section = read_dataset_config(&file).unwrap();
        assert_eq!(section.get("type"), Some("file"));
        assert_eq!(section.get("format"), Some("grib"));
        assert_eq!(section.name(), file.to_string_lossy());

        let explicit = format!("bufr:{}", file.display());
        let section = read_dataset_config(Path::new(&explicit)).unwrap();
        assert_eq!(section.get("format"), Some("bufr"));

        let err = read_dataset_config(&dir.path().join("missing.grib")).unwrap_err();
        assert!(err.to_string().ends_with("does not exist"));
    }

    #[tokio::test]
    async fn test_load_config_file_sorted_by_name() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"[b]\npath = /b\n[a]\npath = /a\n").unwrap();

        let loaded = SourceLoader::new()
            .load(&Source::ConfigFile(file.path().to_path_buf()))
            .await
            .unwrap();
        let names: Vec<_> = loaded.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }
}
