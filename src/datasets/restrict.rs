//! Access-control label sets.

use std::collections::BTreeSet;

/// Set of restriction labels, parsed from a comma and/or whitespace
/// separated list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestrictSet {
    labels: BTreeSet<String>,
}

impl RestrictSet {
    pub fn parse(text: &str) -> Self {
        Self {
            labels: text
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// True if at least one label appears in both sets.
    pub fn intersects(&self, other: &RestrictSet) -> bool {
        self.labels.intersection(&other.labels).next().is_some()
    }
}
