//! The full merge pipeline shared by the command line tools.

use crate::datasets::aggregator::{
    compute_extra, ensure_not_empty, filter_restrict, filter_system_datasets, validate, ConfigAggregator,
};
use crate::datasets::restrict::RestrictSet;
use crate::datasets::section::ConfigSet;
use crate::datasets::source::{Source, SourceLoader};
use crate::engine::ArchiveEngine;
use crate::error::ConfigError;

/// What to merge and how to filter it.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// `--config` arguments, `-` for standard input.
    pub configs: Vec<String>,
    /// Dataset directories, data files or server URLs.
    pub sources: Vec<String>,
    /// Allow-list of restrict labels.
    pub restrict: Option<String>,
    pub ignore_system_datasets: bool,
    /// Compute bounding polygons.
    pub extra: bool,
}

impl MergeOptions {
    /// Sources in merge order: config files first, then the rest.
    pub fn sources(&self) -> Vec<Source> {
        self.configs
            .iter()
            .map(|c| Source::config_arg(c))
            .chain(self.sources.iter().map(|s| Source::path_arg(s)))
            .collect()
    }
}

/// Merge and filter. Fails if nothing is left.
pub async fn load(opts: &MergeOptions, loader: &SourceLoader) -> Result<ConfigSet, ConfigError> {
    let mut aggregator = ConfigAggregator::new();
    aggregator.merge(loader, &opts.sources()).await?;
    let mut cfg = aggregator.into_config();

    // Any non-empty value filters, even one without labels
    if let Some(restrict) = opts.restrict.as_deref().filter(|r| !r.is_empty()) {
        filter_restrict(&mut cfg, &RestrictSet::parse(restrict))?;
    }

    if opts.ignore_system_datasets {
        let removed = filter_system_datasets(&mut cfg);
        tracing::debug!(removed, "Removed system datasets");
    }

    ensure_not_empty(&cfg)?;
    Ok(cfg)
}

/// Validate filters and, if requested, compute extra information.
pub fn check(cfg: &mut ConfigSet, opts: &MergeOptions, engine: &dyn ArchiveEngine) -> Result<(), ConfigError> {
    validate(cfg, engine)?;
    if opts.extra {
        compute_extra(cfg, engine)?;
    }
    Ok(())
}
