//! Merging, filtering, validation and enrichment of dataset configuration.
//!
//! # Responsibilities
//! - Merge sections from ordered sources, first writer wins on names
//! - Drop sections not allowed by a restrict list
//! - Drop error/duplicates system datasets
//! - Validate every `filter` through the Archive Engine, reporting all
//!   failures at once
//! - Compute bounding polygons for `--extra`

use futures_util::future::try_join_all;

use crate::datasets::bounding::bounding_wkt;
use crate::datasets::restrict::RestrictSet;
use crate::datasets::section::{ConfigSection, ConfigSet};
use crate::datasets::source::{Source, SourceLoader};
use crate::engine::ArchiveEngine;
use crate::error::{ConfigError, SectionFailure, ValidationFailures};

/// A section dropped because its name was already taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub name: String,
    /// Path of the dropped section.
    pub dropped: String,
    /// Path of the section that was kept.
    pub kept: String,
}

/// Accumulates sections into a ConfigSet.
#[derive(Debug, Default)]
pub struct ConfigAggregator {
    merged: ConfigSet,
    conflicts: Vec<MergeConflict>,
}

impl ConfigAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a section under `name` (default: its `name` value).
    ///
    /// If the name is taken the incoming section is dropped and the
    /// conflict is logged and recorded.
    pub fn add_section(&mut self, mut incoming: ConfigSection, name: Option<&str>) {
        let name = name.unwrap_or_else(|| incoming.name()).to_string();

        if let Some(kept) = self.merged.get(&name) {
            let conflict = MergeConflict {
                name: name.clone(),
                dropped: incoming.path().to_string(),
                kept: kept.path().to_string(),
            };
            tracing::warn!(
                dataset = %conflict.name,
                dropped = %conflict.dropped,
                kept = %conflict.kept,
                "ignoring dataset {} in {}, which has the same name as the dataset in {}",
                conflict.name,
                conflict.dropped,
                conflict.kept
            );
            self.conflicts.push(conflict);
            return;
        }

        incoming.set("name", name.clone());
        self.merged.insert(name, incoming);
    }

    /// Merge every source, applying them strictly in the given order.
    ///
    /// Sources are fetched concurrently; only application is ordered.
    pub async fn merge(&mut self, loader: &SourceLoader, sources: &[Source]) -> Result<(), ConfigError> {
        let loaded = try_join_all(sources.iter().map(|source| loader.load(source))).await?;

        for sections in loaded {
            for (name, section) in sections {
                self.add_section(section, Some(&name));
            }
        }

        if self.merged.is_empty() {
            return Err(ConfigError::EmptyInput);
        }
        Ok(())
    }

    pub fn conflicts(&self) -> &[MergeConflict] {
        &self.conflicts
    }

    pub fn config(&self) -> &ConfigSet {
        &self.merged
    }

    pub fn into_config(self) -> ConfigSet {
        self.merged
    }
}

/// Keep only sections whose `restrict` shares a label with `allowed`.
///
/// Sections without `restrict` are always removed.
pub fn filter_restrict(cfg: &mut ConfigSet, allowed: &RestrictSet) -> Result<(), ConfigError> {
    cfg.retain(|name, section| {
        let keep = section
            .get("restrict")
            .map(|r| allowed.intersects(&RestrictSet::parse(r)))
            .unwrap_or(false);
        if !keep {
            tracing::debug!(dataset = %name, "Dataset not allowed by restrict list");
        }
        keep
    });

    if cfg.is_empty() {
        return Err(ConfigError::NoDatasetsLeft);
    }
    Ok(())
}

/// True for the `error` and `duplicates` system datasets.
pub fn is_system_dataset(name: &str, section: &ConfigSection) -> bool {
    match section.get("type") {
        Some("error") | Some("duplicates") => true,
        Some("remote") => name == "error" || name == "duplicates",
        _ => false,
    }
}

/// Remove system datasets, returning how many were removed.
pub fn filter_system_datasets(cfg: &mut ConfigSet) -> usize {
    let before = cfg.len();
    cfg.retain(|name, section| !is_system_dataset(name, section));
    before - cfg.len()
}

/// Fail with `NoDatasetsLeft` on an empty set.
pub fn ensure_not_empty(cfg: &ConfigSet) -> Result<(), ConfigError> {
    if cfg.is_empty() {
        Err(ConfigError::NoDatasetsLeft)
    } else {
        Ok(())
    }
}

/// Check every `filter` expression. All sections are scanned before
/// deciding.
pub fn validate(cfg: &ConfigSet, engine: &dyn ArchiveEngine) -> Result<(), ValidationFailures> {
    let failures: Vec<SectionFailure> = cfg
        .iter()
        .filter_map(|(name, section)| {
            let filter = section.get("filter")?;
            engine.parse_matcher(filter).err().map(|e| SectionFailure {
                name: name.to_string(),
                message: e.to_string(),
            })
        })
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailures { failures })
    }
}

/// Store each dataset's bounding polygon under `bounding`.
pub fn compute_extra(cfg: &mut ConfigSet, engine: &dyn ArchiveEngine) -> Result<(), ConfigError> {
    for (name, section) in cfg.iter_mut() {
        let extra = |section: &ConfigSection| -> Result<Option<String>, crate::error::EngineError> {
            let mut reader = engine.open_reader(section)?;
            let summary = reader.query_summary("")?;
            Ok(bounding_wkt(&summary.coverage()?))
        };

        match extra(&*section) {
            Ok(Some(wkt)) => section.set("bounding", wkt),
            Ok(None) => {}
            Err(error) => {
                return Err(ConfigError::Extra {
                    name: name.to_string(),
                    error,
                })
            }
        }
    }
    Ok(())
}
