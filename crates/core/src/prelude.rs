//! Common imports for internal modules.

pub use crate::types::error::{OrchestratorError, OrchestratorResult};
pub use crate::types::ids::{AgentId, FactId, OperationId, PathId, SessionId};
pub use tracing::{debug, error, info, warn};
