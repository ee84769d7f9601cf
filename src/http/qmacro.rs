//! Macro query resolution.
//!
//! A macro query runs against a virtual dataset that the Archive Engine
//! builds from the whole server configuration, a macro name and the macro
//! argument. The macro language itself belongs to the engine.

use crate::datasets::ConfigSet;
use crate::engine::MacroRequest;
use crate::http::request::QueryForm;

/// A resolved macro query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroQuery {
    pub request: MacroRequest,
}

impl MacroQuery {
    pub fn name(&self) -> &str {
        &self.request.name
    }
}

/// Builds macro queries for one server.
#[derive(Debug, Clone, Copy)]
pub struct QueryMacroResolver<'a> {
    cfg: &'a ConfigSet,
    server_url: &'a str,
}

impl<'a> QueryMacroResolver<'a> {
    pub fn new(cfg: &'a ConfigSet, server_url: &'a str) -> Self {
        Self { cfg, server_url }
    }

    /// Macro name from `qmacro`, argument from `query` taken verbatim.
    pub fn resolve(&self, form: &QueryForm) -> MacroQuery {
        MacroQuery {
            request: MacroRequest {
                macro_cfg: format!("url = {}\n", self.server_url),
                datasets_cfg: self.cfg.to_string(),
                name: form.get_or("qmacro", "").trim().to_string(),
                argument: form.get_or("query", "").to_string(),
            },
        }
    }
}
