//! Dataset configuration sections and section sets.
//!
//! The text form is INI-like: one `[name]` header per dataset followed by
//! `key = value` lines. Output is deterministic: sections sorted by name,
//! keys sorted alphabetically, one blank line between sections.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ConfigError;

/// Key/value configuration of one dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSection {
    values: BTreeMap<String, String>,
}

impl ConfigSection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Value of `name`, or the empty string.
    pub fn name(&self) -> &str {
        self.get("name").unwrap_or_default()
    }

    /// Value of `path`, or the empty string.
    pub fn path(&self) -> &str {
        self.get("path").unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse a header-less `key = value` block, as found in a dataset
    /// directory's `config` file.
    pub fn parse(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let mut section = ConfigSection::new();
        for (lineno, line) in text.lines().enumerate() {
            match parse_line(line, origin, lineno + 1)? {
                Line::Blank => {}
                Line::Header(_) => {
                    return Err(ConfigError::Parse {
                        origin: origin.to_string(),
                        line: lineno + 1,
                        message: "section headers are not allowed in a dataset config".into(),
                    })
                }
                Line::Entry(k, v) => section.set(k, v),
            }
        }
        Ok(section)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConfigSection {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl fmt::Display for ConfigSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in &self.values {
            writeln!(f, "{} = {}", k, v)?;
        }
        Ok(())
    }
}

/// Named dataset sections. Names are unique by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSet {
    sections: BTreeMap<String, ConfigSection>,
}

impl ConfigSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ConfigSection> {
        self.sections.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ConfigSection> {
        self.sections.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Insert or replace a section.
    pub fn insert(&mut self, name: impl Into<String>, section: ConfigSection) {
        self.sections.insert(name.into(), section);
    }

    pub fn remove(&mut self, name: &str) -> Option<ConfigSection> {
        self.sections.remove(name)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &ConfigSection) -> bool) {
        self.sections.retain(|name, section| keep(name, section));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigSection)> {
        self.sections.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut ConfigSection)> {
        self.sections.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Parse a multi-section configuration text.
    ///
    /// A header repeated within the same text updates the earlier section.
    pub fn parse(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let mut set = ConfigSet::new();
        let mut current: Option<String> = None;

        for (lineno, line) in text.lines().enumerate() {
            match parse_line(line, origin, lineno + 1)? {
                Line::Blank => {}
                Line::Header(name) => {
                    set.sections.entry(name.to_string()).or_default();
                    current = Some(name.to_string());
                }
                Line::Entry(k, v) => {
                    let Some(name) = &current else {
                        return Err(ConfigError::Parse {
                            origin: origin.to_string(),
                            line: lineno + 1,
                            message: format!("key {} found outside of any section", k),
                        });
                    };
                    if let Some(section) = set.sections.get_mut(name) {
                        section.set(k, v);
                    }
                }
            }
        }

        Ok(set)
    }
}

impl fmt::Display for ConfigSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, section)) in self.sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "[{}]", name)?;
            write!(f, "{}", section)?;
        }
        Ok(())
    }
}

enum Line<'a> {
    Blank,
    Header(&'a str),
    Entry(&'a str, &'a str),
}

fn parse_line<'a>(line: &'a str, origin: &str, lineno: usize) -> Result<Line<'a>, ConfigError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
        return Ok(Line::Blank);
    }

    if let Some(rest) = line.strip_prefix('[') {
        return match rest.strip_suffix(']') {
            Some(name) if !name.trim().is_empty() => Ok(Line::Header(name.trim())),
            _ => Err(ConfigError::Parse {
                origin: origin.to_string(),
                line: lineno,
                message: format!("invalid section header {}", line),
            }),
        };
    }

    match line.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok(Line::Entry(k.trim(), v.trim())),
        _ => Err(ConfigError::Parse {
            origin: origin.to_string(),
            line: lineno,
            message: format!("expected key = value, found {}", line),
        }),
    }
}
