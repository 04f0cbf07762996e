//! Server configuration: storage location, logging destination, and the
//! per-research-type defaults session creation falls back to when a caller
//! omits them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::model::ResearchType;

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Optional path to redirect `tracing` output to. When unset, logs go
    /// to stderr (stdout is reserved for the JSON-RPC transport).
    pub log_path: Option<PathBuf>,
    /// Defaults applied when a session is created without explicit
    /// iteration/confidence overrides.
    pub research_defaults: ResearchDefaults,
    /// Defaults for the bounded-concurrency batch layer.
    pub batch: BatchDefaults,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_path: None,
            research_defaults: ResearchDefaults::default(),
            batch: BatchDefaults::default(),
        }
    }
}

impl ServerConfig {
    pub fn with_db_path(mut self, path: PathBuf) -> Self {
        self.db_path = path;
        self
    }

    pub fn with_log_path(mut self, path: Option<PathBuf>) -> Self {
        self.log_path = path;
        self
    }
}

/// Default session budget, keyed by research type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResearchDefaults {
    pub quick_max_iterations: i64,
    pub quick_confidence_threshold: f64,
    pub deep_max_iterations: i64,
    pub deep_confidence_threshold: f64,
}

impl Default for ResearchDefaults {
    fn default() -> Self {
        Self {
            quick_max_iterations: ResearchType::Quick.default_max_iterations(),
            quick_confidence_threshold: ResearchType::Quick.default_confidence_threshold(),
            deep_max_iterations: ResearchType::Deep.default_max_iterations(),
            deep_confidence_threshold: ResearchType::Deep.default_confidence_threshold(),
        }
    }
}

impl ResearchDefaults {
    pub fn max_iterations(&self, research_type: ResearchType) -> i64 {
        match research_type {
            ResearchType::Quick => self.quick_max_iterations,
            ResearchType::Deep => self.deep_max_iterations,
        }
    }

    pub fn confidence_threshold(&self, research_type: ResearchType) -> f64 {
        match research_type {
            ResearchType::Quick => self.quick_confidence_threshold,
            ResearchType::Deep => self.deep_confidence_threshold,
        }
    }
}

/// Defaults for [`crate::batch`]'s worker pool and result caches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchDefaults {
    pub max_concurrency: usize,
    pub use_cache: bool,
    pub stop_on_error: bool,
}

impl Default for BatchDefaults {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            use_cache: true,
            stop_on_error: false,
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
        .join("mcp-server")
        .join("research_state.db")
}
