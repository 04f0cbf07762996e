//! Core engine for the research orchestration server.
//!
//! This crate owns every durable, deterministic piece of the system: the
//! SQLite-backed storage layer, session lifecycle and advisory locking, the
//! Graph-of-Thoughts (GoT) exploration graph, the pure decision function that
//! drives the research loop, the text extraction/validation operators, and
//! the bounded-concurrency batch/cache layer. The MCP transport (the binary
//! crate at the workspace root) is the only consumer of this crate's public
//! API — it never touches SQLite directly.

pub mod batch;
pub mod config;
pub mod decision;
pub mod extract;
pub mod got;
pub mod pipeline;
pub mod prelude;
pub mod session;
pub mod storage;
pub mod types;

pub use config::ServerConfig;
pub use storage::Storage;
pub use types::error::{OrchestratorError, OrchestratorResult};
