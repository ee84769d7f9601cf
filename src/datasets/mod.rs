//! Dataset configuration subsystem.
//!
//! # Data Flow
//! ```text
//! config files, stdin, dataset dirs/files, remote servers
//!     → source.rs (load each source into named sections)
//!     → aggregator.rs (ordered merge, first name wins)
//!     → restrict / system dataset filters
//!     → validation of `filter` expressions (all failures reported)
//!     → optional bounding computation (bounding.rs)
//!     → ConfigSet (written out, or served)
//! ```

pub mod aggregator;
pub mod bounding;
pub mod pipeline;
pub mod restrict;
pub mod section;
pub mod source;

pub use aggregator::{
    compute_extra, ensure_not_empty, filter_restrict, filter_system_datasets, is_system_dataset,
    validate, ConfigAggregator, MergeConflict,
};
pub use pipeline::MergeOptions;
pub use restrict::RestrictSet;
pub use section::{ConfigSection, ConfigSet};
pub use source::{Source, SourceLoader};
