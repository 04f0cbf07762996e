//! Pure decision engine (C4): given a read-only snapshot of a session's
//! state, decide what should happen next. No I/O, no storage access — the
//! caller assembles [`GraphState`] from whatever it has already loaded and
//! this module just applies the priority-ordered rules.

use serde::{Deserialize, Serialize};

use crate::types::ids::PathId;
use crate::types::model::PathStatus;

/// The subset of a [`crate::types::model::Path`] the decision rules need.
#[derive(Debug, Clone)]
pub struct PathSnapshot {
    pub path_id: PathId,
    pub status: PathStatus,
    pub quality_score: f64,
}

/// Read-only projection of everything the decision rules need. Constructed
/// by the caller from session and path records — this module never touches
/// [`crate::storage::Storage`] directly.
#[derive(Debug, Clone)]
pub struct GraphState {
    pub paths: Vec<PathSnapshot>,
    pub iteration_count: i64,
    pub max_iterations: i64,
    pub confidence: f64,
    pub confidence_threshold: f64,
    pub is_aggregated: bool,
    pub budget_exhausted: bool,
    /// Free-text summary of findings so far, threaded into a `generate`
    /// action's `context` param when continuing exploration.
    pub current_findings: String,
}

/// The action vocabulary the server is allowed to emit. No other verb is
/// ever returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    Generate,
    Execute,
    Wait,
    Score,
    Aggregate,
    Synthesize,
}

impl NextAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            NextAction::Generate => "generate",
            NextAction::Execute => "execute",
            NextAction::Wait => "wait",
            NextAction::Score => "score",
            NextAction::Aggregate => "aggregate",
            NextAction::Synthesize => "synthesize",
        }
    }
}

/// Result of [`decide`]: the chosen action, its wire-shaped params, and the
/// human-readable reasoning the rule fired, so callers can surface it in
/// activity logs and `get_next_action` responses.
#[derive(Debug, Clone)]
pub struct Decision {
    pub action: NextAction,
    pub params: serde_json::Value,
    pub reasoning: String,
}

/// Apply the eight priority-ordered rules to `state`. The first rule whose
/// guard matches wins; rules are evaluated in the order written below.
/// Byte-identical `state` always yields a byte-identical `Decision`.
pub fn decide(state: &GraphState) -> Decision {
    // 1. Terminate.
    if state.confidence >= state.confidence_threshold {
        return Decision {
            action: NextAction::Synthesize,
            params: serde_json::json!({}),
            reasoning: format!(
                "Confidence threshold reached ({:.2}/{:.2})",
                state.confidence, state.confidence_threshold
            ),
        };
    }
    if state.iteration_count >= state.max_iterations {
        return Decision {
            action: NextAction::Synthesize,
            params: serde_json::json!({}),
            reasoning: format!(
                "Max iterations reached ({}/{})",
                state.iteration_count, state.max_iterations
            ),
        };
    }
    if state.budget_exhausted {
        return Decision {
            action: NextAction::Synthesize,
            params: serde_json::json!({}),
            reasoning: "Budget exhausted".into(),
        };
    }

    // 2. Bootstrap.
    if state.paths.is_empty() {
        return Decision {
            action: NextAction::Generate,
            params: serde_json::json!({ "k": 3, "strategy": "diverse" }),
            reasoning: "No paths exist, generating initial exploration paths".into(),
        };
    }

    // 3. Wait.
    let running: Vec<PathId> = state
        .paths
        .iter()
        .filter(|p| p.status == PathStatus::Running)
        .map(|p| p.path_id)
        .collect();
    if !running.is_empty() {
        return Decision {
            action: NextAction::Wait,
            params: serde_json::json!({ "path_ids": running }),
            reasoning: format!("{} path(s) still running", running.len()),
        };
    }

    // 4. Execute.
    let pending: Vec<PathId> = state
        .paths
        .iter()
        .filter(|p| p.status == PathStatus::Pending)
        .map(|p| p.path_id)
        .collect();
    if !pending.is_empty() {
        return Decision {
            action: NextAction::Execute,
            params: serde_json::json!({ "path_ids": pending }),
            reasoning: format!("{} path(s) pending execution", pending.len()),
        };
    }

    // 5. Score.
    let unscored_completed = state
        .paths
        .iter()
        .filter(|p| p.status == PathStatus::Completed && p.quality_score == 0.0)
        .count();
    if unscored_completed > 0 {
        return Decision {
            action: NextAction::Score,
            params: serde_json::json!({ "threshold": 6.0, "keep_top_n": 2 }),
            reasoning: format!("{unscored_completed} completed path(s) awaiting scoring"),
        };
    }

    // 6. Aggregate.
    let high_scoring: Vec<PathId> = state
        .paths
        .iter()
        .filter(|p| p.quality_score >= 7.0)
        .map(|p| p.path_id)
        .collect();
    if high_scoring.len() > 1 && !state.is_aggregated {
        return Decision {
            action: NextAction::Aggregate,
            params: serde_json::json!({ "path_ids": high_scoring, "strategy": "synthesis" }),
            reasoning: format!("{} path(s) scored ≥7.0, ready to aggregate", high_scoring.len()),
        };
    }

    // 7. Continue exploration.
    if state.confidence < state.confidence_threshold {
        return Decision {
            action: NextAction::Generate,
            params: serde_json::json!({
                "k": 2,
                "strategy": "focused",
                "context": state.current_findings,
            }),
            reasoning: format!(
                "Confidence {:.2} below threshold {:.2}, continuing exploration",
                state.confidence, state.confidence_threshold
            ),
        };
    }

    // 8. Fallback.
    Decision {
        action: NextAction::Synthesize,
        params: serde_json::json!({}),
        reasoning: "No rule matched; defaulting to synthesis".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> GraphState {
        GraphState {
            paths: vec![],
            iteration_count: 0,
            max_iterations: 5,
            confidence: 0.0,
            confidence_threshold: 0.8,
            is_aggregated: false,
            budget_exhausted: false,
            current_findings: String::new(),
        }
    }

    fn path(status: PathStatus, quality_score: f64) -> PathSnapshot {
        PathSnapshot {
            path_id: PathId::new(),
            status,
            quality_score,
        }
    }

    #[test]
    fn terminates_on_confidence_threshold() {
        let mut state = base();
        state.confidence = 0.9;
        assert_eq!(decide(&state).action, NextAction::Synthesize);
    }

    #[test]
    fn terminates_on_max_iterations() {
        let mut state = base();
        state.iteration_count = 10;
        state.max_iterations = 10;
        state.confidence = 0.4;
        let decision = decide(&state);
        assert_eq!(decision.action, NextAction::Synthesize);
        assert_eq!(decision.reasoning, "Max iterations reached (10/10)");
    }

    #[test]
    fn bootstraps_with_no_paths() {
        let decision = decide(&base());
        assert_eq!(decision.action, NextAction::Generate);
        assert_eq!(decision.params, serde_json::json!({ "k": 3, "strategy": "diverse" }));
    }

    #[test]
    fn waits_on_running_paths() {
        let mut state = base();
        state.paths = vec![path(PathStatus::Running, 0.0)];
        assert_eq!(decide(&state).action, NextAction::Wait);
    }

    #[test]
    fn executes_pending_paths() {
        let mut state = base();
        state.paths = vec![path(PathStatus::Pending, 0.0)];
        assert_eq!(decide(&state).action, NextAction::Execute);
    }

    #[test]
    fn scores_unscored_completed_paths() {
        let mut state = base();
        state.paths = vec![path(PathStatus::Completed, 0.0)];
        assert_eq!(decide(&state).action, NextAction::Score);
    }

    #[test]
    fn aggregates_multiple_high_scorers_when_not_aggregated() {
        let mut state = base();
        state.paths = vec![
            path(PathStatus::Completed, 8.0),
            path(PathStatus::Completed, 7.5),
        ];
        assert_eq!(decide(&state).action, NextAction::Aggregate);
    }

    #[test]
    fn continues_exploration_when_below_threshold() {
        let mut state = base();
        state.paths = vec![path(PathStatus::Completed, 5.0)];
        assert_eq!(decide(&state).action, NextAction::Generate);
    }

    #[test]
    fn decide_is_deterministic_for_identical_state() {
        let mut state = base();
        state.paths = vec![path(PathStatus::Completed, 8.0)];
        let a = decide(&state);
        let b = decide(&state);
        assert_eq!(a.action, b.action);
        assert_eq!(a.params, b.params);
        assert_eq!(a.reasoning, b.reasoning);
    }
}
