//! Domain records for the §3 data model. These are plain data — all
//! invariants are enforced by the operators in [`crate::session`],
//! [`crate::got`], and [`crate::extract`], not by the types themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchType {
    Quick,
    Deep,
}

impl ResearchType {
    pub fn default_max_iterations(self) -> i64 {
        match self {
            ResearchType::Quick => 3,
            ResearchType::Deep => 10,
        }
    }

    pub fn default_confidence_threshold(self) -> f64 {
        match self {
            ResearchType::Quick => 0.7,
            ResearchType::Deep => 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initializing,
    Planning,
    Executing,
    Synthesizing,
    Validating,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Initializing => "initializing",
            SessionStatus::Planning => "planning",
            SessionStatus::Executing => "executing",
            SessionStatus::Synthesizing => "synthesizing",
            SessionStatus::Validating => "validating",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "initializing" => SessionStatus::Initializing,
            "planning" => SessionStatus::Planning,
            "executing" => SessionStatus::Executing,
            "synthesizing" => SessionStatus::Synthesizing,
            "validating" => SessionStatus::Validating,
            "completed" => SessionStatus::Completed,
            "failed" => SessionStatus::Failed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub research_topic: String,
    pub research_type: ResearchType,
    pub output_directory: String,
    pub status: SessionStatus,
    pub current_phase: i64,
    pub iteration_count: i64,
    pub confidence: f64,
    pub is_aggregated: bool,
    pub budget_exhausted: bool,
    pub max_iterations: i64,
    pub confidence_threshold: f64,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Deploying,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Deploying => "deploying",
            AgentStatus::Running => "running",
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
            AgentStatus::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "deploying" => AgentStatus::Deploying,
            "running" => AgentStatus::Running,
            "completed" => AgentStatus::Completed,
            "failed" => AgentStatus::Failed,
            "timeout" => AgentStatus::Timeout,
            _ => return None,
        })
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AgentStatus::Completed | AgentStatus::Failed | AgentStatus::Timeout
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    pub session_id: SessionId,
    pub agent_type: String,
    pub agent_role: Option<String>,
    pub focus_description: Option<String>,
    pub search_queries: Vec<String>,
    pub status: AgentStatus,
    pub output_file: Option<String>,
    pub token_usage: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Root,
    Generated,
    Aggregated,
    Refined,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Root => "root",
            NodeType::Generated => "generated",
            NodeType::Aggregated => "aggregated",
            NodeType::Refined => "refined",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStatus {
    Active,
    Pending,
    Running,
    Completed,
    Pruned,
    Aggregated,
    Refined,
}

impl PathStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathStatus::Active => "active",
            PathStatus::Pending => "pending",
            PathStatus::Running => "running",
            PathStatus::Completed => "completed",
            PathStatus::Pruned => "pruned",
            PathStatus::Aggregated => "aggregated",
            PathStatus::Refined => "refined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "active" => PathStatus::Active,
            "pending" => PathStatus::Pending,
            "running" => PathStatus::Running,
            "completed" => PathStatus::Completed,
            "pruned" => PathStatus::Pruned,
            "aggregated" => PathStatus::Aggregated,
            "refined" => PathStatus::Refined,
            _ => return None,
        })
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PathStatus::Pruned | PathStatus::Aggregated | PathStatus::Refined
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Path {
    pub path_id: PathId,
    pub session_id: SessionId,
    pub parent_id: Option<PathId>,
    pub node_type: NodeType,
    pub content: String,
    pub summary: Option<String>,
    pub quality_score: f64,
    pub compression_ratio: f64,
    pub status: PathStatus,
    pub depth: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum GotOperationType {
    Generate,
    Aggregate,
    Refine,
    Score,
    Prune,
}

impl GotOperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GotOperationType::Generate => "Generate",
            GotOperationType::Aggregate => "Aggregate",
            GotOperationType::Refine => "Refine",
            GotOperationType::Score => "Score",
            GotOperationType::Prune => "Prune",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GotOperation {
    pub operation_id: OperationId,
    pub session_id: SessionId,
    pub operation_type: GotOperationType,
    pub input_nodes: Vec<PathId>,
    pub output_nodes: Vec<PathId>,
    pub parameters: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Number,
    Currency,
    Percentage,
    Date,
    Text,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Number => "number",
            ValueType::Currency => "currency",
            ValueType::Percentage => "percentage",
            ValueType::Date => "date",
            ValueType::Text => "text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceQuality {
    A,
    B,
    C,
    D,
    E,
}

impl SourceQuality {
    /// Numeric weight used by the scoring rubric's source-quality component.
    pub fn weight(self) -> f64 {
        match self {
            SourceQuality::A => 2.0,
            SourceQuality::B => 1.5,
            SourceQuality::C => 1.0,
            SourceQuality::D => 0.5,
            SourceQuality::E => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceQuality::A => "A",
            SourceQuality::B => "B",
            SourceQuality::C => "C",
            SourceQuality::D => "D",
            SourceQuality::E => "E",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "A" => SourceQuality::A,
            "B" => SourceQuality::B,
            "C" => SourceQuality::C,
            "D" => SourceQuality::D,
            "E" => SourceQuality::E,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub fact_id: FactId,
    pub session_id: Option<SessionId>,
    pub entity: String,
    pub attribute: String,
    pub value: String,
    pub value_type: ValueType,
    pub value_numeric: Option<f64>,
    pub unit: Option<String>,
    pub source_url: Option<String>,
    pub source_quality: Option<SourceQuality>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: EntityId,
    pub session_id: Option<SessionId>,
    pub name: String,
    pub entity_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub relationship_id: RelationshipId,
    pub session_id: Option<SessionId>,
    pub source_entity: String,
    pub target_entity: String,
    pub relationship_type: String,
    pub confidence: f64,
    pub evidence: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub citation_id: CitationId,
    pub session_id: Option<SessionId>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub source: Option<String>,
    pub url: Option<String>,
    pub publication_date: Option<String>,
    pub quality_rating: Option<SourceQuality>,
    pub is_valid: bool,
    pub validation_notes: Option<String>,
}

impl Citation {
    pub fn is_complete(&self) -> bool {
        self.author.is_some()
            && self.title.is_some()
            && !self.author.as_deref().unwrap_or("").is_empty()
            && !self.title.as_deref().unwrap_or("").is_empty()
            && self.publication_date.is_some()
            && self.url.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    Numerical,
    Temporal,
    Scope,
    Methodological,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Minor,
    Moderate,
    Critical,
}

impl ConflictSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictSeverity::Minor => "minor",
            ConflictSeverity::Moderate => "moderate",
            ConflictSeverity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactConflict {
    pub conflict_id: ConflictId,
    pub session_id: Option<SessionId>,
    pub fact_a: FactId,
    pub fact_b: FactId,
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    pub resolved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityEventType {
    PhaseStart,
    PhaseComplete,
    AgentDeploy,
    AgentComplete,
    Info,
    Error,
}

impl ActivityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityEventType::PhaseStart => "phase_start",
            ActivityEventType::PhaseComplete => "phase_complete",
            ActivityEventType::AgentDeploy => "agent_deploy",
            ActivityEventType::AgentComplete => "agent_complete",
            ActivityEventType::Info => "info",
            ActivityEventType::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub activity_id: ActivityId,
    pub session_id: SessionId,
    pub phase: i64,
    pub event_type: ActivityEventType,
    pub message: String,
    pub agent_id: Option<AgentId>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: CheckpointId,
    pub session_id: SessionId,
    pub phase_number: i64,
    pub checkpoint_type: String,
    pub state_snapshot: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedItem {
    pub ingest_id: IngestId,
    pub session_id: SessionId,
    pub payload: serde_json::Value,
    pub status: IngestStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub session_id: Option<SessionId>,
    pub paths_generated: i64,
    pub paths_pruned: i64,
    pub tool_calls: i64,
    pub total_tokens: i64,
}
