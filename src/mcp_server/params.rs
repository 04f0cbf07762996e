//! Parameter structs for every tool exposed by [`super::OrchestratorMcpServer`].

use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateSessionParams {
    /// The research question or topic to investigate.
    pub research_topic: String,
    /// "quick" (shallow, few iterations) or "deep" (thorough, many iterations).
    pub research_type: String,
    /// Directory the session's markdown artifacts are written to.
    pub output_directory: String,
    /// Override the research-type default iteration budget.
    pub max_iterations: Option<i64>,
    /// Override the research-type default confidence threshold (0.0-1.0).
    pub confidence_threshold: Option<f64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionIdParams {
    pub session_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateSessionStatusParams {
    pub session_id: String,
    /// One of: initializing, planning, executing, synthesizing, validating, completed, failed.
    pub status: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RegisterAgentParams {
    pub session_id: String,
    pub agent_type: String,
    pub agent_role: Option<String>,
    pub focus_description: Option<String>,
    #[serde(default)]
    pub search_queries: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateAgentStatusParams {
    pub agent_id: String,
    /// One of: deploying, running, completed, failed, timeout.
    pub status: String,
    pub output_file: Option<String>,
    pub token_usage: Option<i64>,
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdatePhaseParams {
    pub session_id: String,
    pub phase: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CheckpointPhaseParams {
    pub session_id: String,
    pub phase_number: i64,
    pub checkpoint_type: String,
    /// Arbitrary JSON snapshot of whatever state should survive a crash.
    pub state_snapshot: serde_json::Value,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LogActivityParams {
    pub session_id: String,
    pub phase: i64,
    /// One of: phase_start, phase_complete, agent_deploy, agent_complete, info, error.
    pub event_type: String,
    pub message: String,
    pub agent_id: Option<String>,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GeneratePathsParams {
    pub session_id: String,
    /// The research question or sub-question driving this branch.
    pub query: String,
    #[serde(default = "default_generate_k")]
    pub k: usize,
    /// One of: diverse, focused, exploratory.
    #[serde(default = "default_generate_strategy")]
    pub strategy: String,
}

fn default_generate_k() -> usize {
    3
}

fn default_generate_strategy() -> String {
    "diverse".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RefinePathParams {
    pub path_id: String,
    pub refined_content: String,
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PathIdParams {
    pub path_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CompletePathExecutionParams {
    pub path_id: String,
    pub content: String,
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ScoreAndPruneParams {
    pub session_id: String,
    #[serde(default = "default_score_threshold")]
    pub threshold: f64,
    #[serde(default = "default_keep_top_n")]
    pub keep_top_n: usize,
}

fn default_score_threshold() -> f64 {
    6.0
}

fn default_keep_top_n() -> usize {
    2
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AggregatePathsParams {
    pub session_id: String,
    pub path_ids: Vec<String>,
    /// One of: synthesis, voting, consensus.
    #[serde(default = "default_aggregate_strategy")]
    pub strategy: String,
}

fn default_aggregate_strategy() -> String {
    "synthesis".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExtractParams {
    pub text: String,
    /// One of: fact, entity, all.
    #[serde(default = "default_extract_mode")]
    pub mode: String,
    /// Whether entity mode should also look for relationship edges. Default true.
    pub extract_relations: Option<bool>,
}

fn default_extract_mode() -> String {
    "all".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ValidateParams {
    /// Citations to validate, as raw JSON objects matching the Citation record shape.
    pub citations: Vec<serde_json::Value>,
    /// One of: citation, source, all.
    #[serde(default = "default_validate_mode")]
    pub mode: String,
}

fn default_validate_mode() -> String {
    "all".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ConflictDetectParams {
    /// Facts to pairwise-compare, as raw JSON objects matching the Fact record shape.
    pub facts: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BatchExtractParams {
    pub texts: Vec<String>,
    #[serde(default = "default_extract_mode")]
    pub mode: String,
    pub extract_relations: Option<bool>,
    pub max_concurrency: Option<usize>,
    pub use_cache: Option<bool>,
    pub stop_on_error: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BatchValidateParams {
    pub citation_batches: Vec<Vec<serde_json::Value>>,
    #[serde(default = "default_validate_mode")]
    pub mode: String,
    pub max_concurrency: Option<usize>,
    pub use_cache: Option<bool>,
    pub stop_on_error: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BatchConflictDetectParams {
    pub fact_batches: Vec<Vec<serde_json::Value>>,
    pub max_concurrency: Option<usize>,
    pub use_cache: Option<bool>,
    pub stop_on_error: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AutoProcessDataParams {
    pub session_id: String,
    pub input_dir: String,
    pub output_dir: String,
    /// Subset of {fact_extraction, entity_extraction, citation_validation, conflict_detection}; default all four.
    #[serde(default = "default_operations")]
    pub operations: Vec<String>,
    pub continue_on_error: Option<bool>,
}

fn default_operations() -> Vec<String> {
    vec![
        "fact_extraction".to_string(),
        "entity_extraction".to_string(),
        "citation_validation".to_string(),
        "conflict_detection".to_string(),
    ]
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IngestContentParams {
    pub session_id: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BatchIngestParams {
    pub session_id: String,
    pub payloads: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProcessRawParams {
    pub session_id: String,
    pub raw_text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RenderProgressParams {
    pub session_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LockSessionParams {
    pub session_id: String,
    /// Identifier of the coordinator/agent requesting the lock.
    pub holder: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EmptyParams {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteSessionParams {
    pub session_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IncrementIterationParams {
    pub session_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateConfidenceParams {
    pub session_id: String,
    /// Clamped to [0, 1].
    pub confidence: f64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SetFlagParams {
    pub session_id: String,
    pub value: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetActivityLogParams {
    pub session_id: String,
    #[serde(default = "default_activity_limit")]
    pub limit: usize,
}

fn default_activity_limit() -> usize {
    50
}
