//! Session lifecycle, advisory locking, activity log, and checkpoints (C2).

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Row};

use crate::storage::{json_to_text, text_to_json, OptionalExt, Storage};
use crate::types::error::{OrchestratorError, SessionError, StorageError};
use crate::types::ids::{ActivityId, AgentId, CheckpointId, SessionId};
use crate::types::model::{
    ActivityEventType, ActivityLogEntry, Agent, AgentStatus, Checkpoint, ResearchType, Session,
    SessionStatus,
};

/// Locks older than this are considered abandoned and may be stolen.
pub const LOCK_STALE_AFTER: Duration = Duration::minutes(5);

impl Storage {
    pub async fn create_session(
        &self,
        research_topic: String,
        research_type: ResearchType,
        output_directory: String,
        max_iterations: Option<i64>,
        confidence_threshold: Option<f64>,
    ) -> Result<Session, StorageError> {
        if research_topic.trim().is_empty() {
            return Err(StorageError::Serialization(
                "research_topic must not be empty".into(),
            ));
        }
        let session = Session {
            session_id: SessionId::new(),
            research_topic,
            research_type,
            output_directory,
            status: SessionStatus::Initializing,
            current_phase: 0,
            iteration_count: 0,
            confidence: 0.0,
            is_aggregated: false,
            budget_exhausted: false,
            max_iterations: max_iterations.unwrap_or_else(|| research_type.default_max_iterations()),
            confidence_threshold: confidence_threshold
                .unwrap_or_else(|| research_type.default_confidence_threshold()),
            locked_at: None,
            locked_by: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO sessions
                (session_id, research_topic, research_type, output_directory, status,
                 current_phase, iteration_count, confidence, is_aggregated, budget_exhausted,
                 max_iterations, confidence_threshold, locked_at, locked_by, created_at, completed_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
            params![
                session.session_id.to_string(),
                session.research_topic,
                research_type_str(session.research_type),
                session.output_directory,
                session.status.as_str(),
                session.current_phase,
                session.iteration_count,
                session.confidence,
                session.is_aggregated as i32,
                session.budget_exhausted as i32,
                session.max_iterations,
                session.confidence_threshold,
                None::<String>,
                None::<String>,
                session.created_at.to_rfc3339(),
                None::<String>,
            ],
        )?;
        Ok(session)
    }

    pub async fn get_session(&self, session_id: SessionId) -> Result<Session, StorageError> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(SESSION_SELECT)?;
        stmt.query_row(params![session_id.to_string()], row_to_session)
            .optional()?
            .ok_or_else(|| StorageError::NotFound(format!("session {session_id}")))
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>, StorageError> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(&format!("{SESSION_SELECT} ORDER BY created_at DESC"))?;
        let rows = stmt.query_map([], row_to_session)?;
        rows.collect::<rusqlite::Result<_>>().map_err(Into::into)
    }

    pub async fn update_session_status(
        &self,
        session_id: SessionId,
        new_status: SessionStatus,
    ) -> Result<(), OrchestratorError> {
        let session = self.get_session(session_id).await?;
        if !valid_transition(session.status, new_status) {
            return Err(OrchestratorError::Session(SessionError::InvalidStatus {
                session_id,
                from: session.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            }));
        }
        let conn = self.conn().await;
        let completed_at = matches!(new_status, SessionStatus::Completed | SessionStatus::Failed)
            .then(|| Utc::now().to_rfc3339());
        conn.execute(
            "UPDATE sessions SET status = ?1, completed_at = COALESCE(?2, completed_at) WHERE session_id = ?3",
            params![new_status.as_str(), completed_at, session_id.to_string()],
        )?;
        Ok(())
    }

    pub async fn increment_iteration(&self, session_id: SessionId) -> Result<i64, StorageError> {
        let conn = self.conn().await;
        conn.execute(
            "UPDATE sessions SET iteration_count = iteration_count + 1 WHERE session_id = ?1",
            params![session_id.to_string()],
        )?;
        conn.query_row(
            "SELECT iteration_count FROM sessions WHERE session_id = ?1",
            params![session_id.to_string()],
            |row| row.get(0),
        )
        .map_err(Into::into)
    }

    pub async fn update_confidence(
        &self,
        session_id: SessionId,
        confidence: f64,
    ) -> Result<(), StorageError> {
        let conn = self.conn().await;
        conn.execute(
            "UPDATE sessions SET confidence = ?1 WHERE session_id = ?2",
            params![confidence.clamp(0.0, 1.0), session_id.to_string()],
        )?;
        Ok(())
    }

    pub async fn set_aggregated(
        &self,
        session_id: SessionId,
        aggregated: bool,
    ) -> Result<(), StorageError> {
        let conn = self.conn().await;
        conn.execute(
            "UPDATE sessions SET is_aggregated = ?1 WHERE session_id = ?2",
            params![aggregated as i32, session_id.to_string()],
        )?;
        Ok(())
    }

    pub async fn set_budget_exhausted(
        &self,
        session_id: SessionId,
        exhausted: bool,
    ) -> Result<(), StorageError> {
        let conn = self.conn().await;
        conn.execute(
            "UPDATE sessions SET budget_exhausted = ?1 WHERE session_id = ?2",
            params![exhausted as i32, session_id.to_string()],
        )?;
        Ok(())
    }

    pub async fn update_current_phase(
        &self,
        session_id: SessionId,
        phase: i64,
    ) -> Result<(), StorageError> {
        let conn = self.conn().await;
        conn.execute(
            "UPDATE sessions SET current_phase = ?1 WHERE session_id = ?2",
            params![phase, session_id.to_string()],
        )?;
        Ok(())
    }

    /// Acquire the session's advisory lock for `holder`. A lock older than
    /// [`LOCK_STALE_AFTER`] is treated as abandoned and silently stolen.
    pub async fn acquire_lock(
        &self,
        session_id: SessionId,
        holder: &str,
    ) -> Result<(), SessionError> {
        let conn = self.conn().await;
        let (locked_at, locked_by): (Option<String>, Option<String>) = conn
            .query_row(
                "SELECT locked_at, locked_by FROM sessions WHERE session_id = ?1",
                params![session_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|_| SessionError::NotFound(session_id))?;

        if let (Some(at), Some(by)) = (locked_at.as_ref(), locked_by.as_ref()) {
            let locked_since: DateTime<Utc> = at.parse().unwrap_or_else(|_| Utc::now());
            let stale = Utc::now() - locked_since > LOCK_STALE_AFTER;
            if !stale && by != holder {
                return Err(SessionError::LockContention {
                    session_id,
                    locked_by: by.clone(),
                    locked_at: locked_since,
                });
            }
        }

        conn.execute(
            "UPDATE sessions SET locked_at = ?1, locked_by = ?2 WHERE session_id = ?3",
            params![Utc::now().to_rfc3339(), holder, session_id.to_string()],
        )
        .map_err(|e| SessionError::InvalidStatus {
            session_id,
            from: "unknown".into(),
            to: format!("lock error: {e}"),
        })?;
        Ok(())
    }

    /// Clear the lock, but only if `holder` is the current owner or the
    /// lock is already unheld — a stale lock belonging to someone else is
    /// left alone rather than released out from under them.
    pub async fn release_lock(&self, session_id: SessionId, holder: &str) -> Result<(), StorageError> {
        let conn = self.conn().await;
        conn.execute(
            "UPDATE sessions SET locked_at = NULL, locked_by = NULL
             WHERE session_id = ?1 AND (locked_by = ?2 OR locked_by IS NULL)",
            params![session_id.to_string(), holder],
        )?;
        Ok(())
    }

    pub async fn is_locked(&self, session_id: SessionId) -> Result<(bool, Option<String>), StorageError> {
        let session = self.get_session(session_id).await?;
        let held = match session.locked_at {
            Some(at) => Utc::now() - at <= LOCK_STALE_AFTER,
            None => false,
        };
        Ok((held, session.locked_by.filter(|_| held)))
    }

    pub async fn log_activity(
        &self,
        session_id: SessionId,
        phase: i64,
        event_type: ActivityEventType,
        message: String,
        agent_id: Option<AgentId>,
        details: Option<serde_json::Value>,
    ) -> Result<ActivityLogEntry, StorageError> {
        let entry = ActivityLogEntry {
            activity_id: ActivityId::new(),
            session_id,
            phase,
            event_type,
            message,
            agent_id,
            details,
            created_at: Utc::now(),
        };
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO activity_log
                (activity_id, session_id, phase, event_type, message, agent_id, details, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            params![
                entry.activity_id.to_string(),
                entry.session_id.to_string(),
                entry.phase,
                entry.event_type.as_str(),
                entry.message,
                entry.agent_id.map(|a| a.to_string()),
                entry.details.as_ref().map(|d| d.to_string()),
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(entry)
    }

    pub async fn get_activity_log(
        &self,
        session_id: SessionId,
        limit: usize,
    ) -> Result<Vec<ActivityLogEntry>, StorageError> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(
            "SELECT activity_id, session_id, phase, event_type, message, agent_id, details, created_at
             FROM activity_log WHERE session_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![session_id.to_string(), limit as i64], |row| {
            row_to_activity(row)
        })?;
        rows.collect::<rusqlite::Result<_>>().map_err(Into::into)
    }

    pub async fn save_checkpoint(
        &self,
        session_id: SessionId,
        phase_number: i64,
        checkpoint_type: String,
        state_snapshot: serde_json::Value,
    ) -> Result<Checkpoint, StorageError> {
        let checkpoint = Checkpoint {
            checkpoint_id: CheckpointId::new(),
            session_id,
            phase_number,
            checkpoint_type,
            state_snapshot,
            created_at: Utc::now(),
        };
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO checkpoints
                (checkpoint_id, session_id, phase_number, checkpoint_type, state_snapshot, created_at)
             VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                checkpoint.checkpoint_id.to_string(),
                checkpoint.session_id.to_string(),
                checkpoint.phase_number,
                checkpoint.checkpoint_type,
                checkpoint.state_snapshot.to_string(),
                checkpoint.created_at.to_rfc3339(),
            ],
        )?;
        Ok(checkpoint)
    }

    pub async fn get_latest_checkpoint(
        &self,
        session_id: SessionId,
    ) -> Result<Option<Checkpoint>, StorageError> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(
            "SELECT checkpoint_id, session_id, phase_number, checkpoint_type, state_snapshot, created_at
             FROM checkpoints WHERE session_id = ?1 ORDER BY created_at DESC LIMIT 1",
        )?;
        stmt.query_row(params![session_id.to_string()], row_to_checkpoint)
            .optional()
            .map_err(Into::into)
    }

    pub async fn register_agent(
        &self,
        session_id: SessionId,
        agent_type: String,
        agent_role: Option<String>,
        focus_description: Option<String>,
        search_queries: Vec<String>,
    ) -> Result<Agent, StorageError> {
        let agent = Agent {
            agent_id: AgentId::new(),
            session_id,
            agent_type,
            agent_role,
            focus_description,
            search_queries,
            status: AgentStatus::Deploying,
            output_file: None,
            token_usage: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO agents
                (agent_id, session_id, agent_type, agent_role, focus_description, search_queries,
                 status, output_file, token_usage, error_message, created_at, completed_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                agent.agent_id.to_string(),
                agent.session_id.to_string(),
                agent.agent_type,
                agent.agent_role,
                agent.focus_description,
                json_to_text(&agent.search_queries)?,
                agent.status.as_str(),
                agent.output_file,
                agent.token_usage,
                agent.error_message,
                agent.created_at.to_rfc3339(),
                None::<String>,
            ],
        )?;
        Ok(agent)
    }

    pub async fn update_agent_status(
        &self,
        agent_id: AgentId,
        status: AgentStatus,
        output_file: Option<String>,
        token_usage: Option<i64>,
        error_message: Option<String>,
    ) -> Result<(), StorageError> {
        let conn = self.conn().await;
        let completed_at = status.is_terminal().then(|| Utc::now().to_rfc3339());
        conn.execute(
            "UPDATE agents SET status = ?1,
                output_file = COALESCE(?2, output_file),
                token_usage = COALESCE(?3, token_usage),
                error_message = COALESCE(?4, error_message),
                completed_at = COALESCE(?5, completed_at)
             WHERE agent_id = ?6",
            params![
                status.as_str(),
                output_file,
                token_usage,
                error_message,
                completed_at,
                agent_id.to_string(),
            ],
        )?;
        Ok(())
    }

    pub async fn get_active_agents(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Agent>, StorageError> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(
            "SELECT agent_id, session_id, agent_type, agent_role, focus_description, search_queries,
                    status, output_file, token_usage, error_message, created_at, completed_at
             FROM agents WHERE session_id = ?1 AND status IN ('deploying', 'running')
             ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![session_id.to_string()], row_to_agent)?;
        rows.collect::<rusqlite::Result<_>>().map_err(Into::into)
    }
}

const SESSION_SELECT: &str = "SELECT session_id, research_topic, research_type, output_directory, status,
    current_phase, iteration_count, confidence, is_aggregated, budget_exhausted,
    max_iterations, confidence_threshold, locked_at, locked_by, created_at, completed_at
    FROM sessions WHERE 1=1";

fn research_type_str(t: ResearchType) -> &'static str {
    match t {
        ResearchType::Quick => "quick",
        ResearchType::Deep => "deep",
    }
}

fn parse_research_type(s: &str) -> ResearchType {
    match s {
        "deep" => ResearchType::Deep,
        _ => ResearchType::Quick,
    }
}

/// Allowed forward transitions plus `failed`, which is reachable from any
/// non-terminal state.
fn valid_transition(from: SessionStatus, to: SessionStatus) -> bool {
    use SessionStatus::*;
    if to == Failed {
        return !matches!(from, Completed | Failed);
    }
    matches!(
        (from, to),
        (Initializing, Planning)
            | (Planning, Executing)
            | (Executing, Executing)
            | (Executing, Synthesizing)
            | (Synthesizing, Validating)
            | (Validating, Completed)
            | (Validating, Executing)
    )
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    let session_id: String = row.get(0)?;
    let locked_at: Option<String> = row.get(12)?;
    let created_at: String = row.get(14)?;
    let completed_at: Option<String> = row.get(15)?;
    Ok(Session {
        session_id: session_id.parse().unwrap_or_default(),
        research_topic: row.get(1)?,
        research_type: parse_research_type(&row.get::<_, String>(2)?),
        output_directory: row.get(3)?,
        status: SessionStatus::parse(&row.get::<_, String>(4)?).unwrap_or(SessionStatus::Failed),
        current_phase: row.get(5)?,
        iteration_count: row.get(6)?,
        confidence: row.get(7)?,
        is_aggregated: row.get::<_, i64>(8)? != 0,
        budget_exhausted: row.get::<_, i64>(9)? != 0,
        max_iterations: row.get(10)?,
        confidence_threshold: row.get(11)?,
        locked_at: locked_at.and_then(|s| s.parse().ok()),
        locked_by: row.get(13)?,
        created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
        completed_at: completed_at.and_then(|s| s.parse().ok()),
    })
}

fn row_to_activity(row: &Row<'_>) -> rusqlite::Result<ActivityLogEntry> {
    let agent_id: Option<String> = row.get(5)?;
    let details: Option<String> = row.get(6)?;
    let created_at: String = row.get(7)?;
    Ok(ActivityLogEntry {
        activity_id: row.get::<_, String>(0)?.parse().unwrap_or_default(),
        session_id: row.get::<_, String>(1)?.parse().unwrap_or_default(),
        phase: row.get(2)?,
        event_type: parse_event_type(&row.get::<_, String>(3)?),
        message: row.get(4)?,
        agent_id: agent_id.and_then(|s| s.parse().ok()),
        details: details.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
    })
}

fn parse_event_type(s: &str) -> ActivityEventType {
    match s {
        "phase_start" => ActivityEventType::PhaseStart,
        "phase_complete" => ActivityEventType::PhaseComplete,
        "agent_deploy" => ActivityEventType::AgentDeploy,
        "agent_complete" => ActivityEventType::AgentComplete,
        "error" => ActivityEventType::Error,
        _ => ActivityEventType::Info,
    }
}

fn row_to_checkpoint(row: &Row<'_>) -> rusqlite::Result<Checkpoint> {
    let state: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(Checkpoint {
        checkpoint_id: row.get::<_, String>(0)?.parse().unwrap_or_default(),
        session_id: row.get::<_, String>(1)?.parse().unwrap_or_default(),
        phase_number: row.get(2)?,
        checkpoint_type: row.get(3)?,
        state_snapshot: serde_json::from_str(&state).unwrap_or(serde_json::Value::Null),
        created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
    })
}

fn row_to_agent(row: &Row<'_>) -> rusqlite::Result<Agent> {
    let search_queries: String = row.get(5)?;
    let created_at: String = row.get(10)?;
    let completed_at: Option<String> = row.get(11)?;
    Ok(Agent {
        agent_id: row.get::<_, String>(0)?.parse().unwrap_or_default(),
        session_id: row.get::<_, String>(1)?.parse().unwrap_or_default(),
        agent_type: row.get(2)?,
        agent_role: row.get(3)?,
        focus_description: row.get(4)?,
        search_queries: text_to_json(&search_queries).unwrap_or_default(),
        status: AgentStatus::parse(&row.get::<_, String>(6)?).unwrap_or(AgentStatus::Failed),
        output_file: row.get(7)?,
        token_usage: row.get(8)?,
        error_message: row.get(9)?,
        created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
        completed_at: completed_at.and_then(|s| s.parse().ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> Storage {
        Storage::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn create_and_fetch_session() {
        let storage = store().await;
        let session = storage
            .create_session(
                "quantum computing market size".into(),
                ResearchType::Quick,
                "/tmp/out".into(),
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(session.max_iterations, 3);
        let fetched = storage.get_session(session.session_id).await.unwrap();
        assert_eq!(fetched.research_topic, session.research_topic);
        assert_eq!(fetched.status, SessionStatus::Initializing);
    }

    #[tokio::test]
    async fn status_transition_guard() {
        let storage = store().await;
        let session = storage
            .create_session(
                "topic".into(),
                ResearchType::Quick,
                "/tmp".into(),
                None,
                None,
            )
            .await
            .unwrap();
        assert!(storage
            .update_session_status(session.session_id, SessionStatus::Completed)
            .await
            .is_err());
        storage
            .update_session_status(session.session_id, SessionStatus::Planning)
            .await
            .unwrap();
        let fetched = storage.get_session(session.session_id).await.unwrap();
        assert_eq!(fetched.status, SessionStatus::Planning);
    }

    #[tokio::test]
    async fn lock_contention_and_staleness() {
        let storage = store().await;
        let session = storage
            .create_session(
                "topic".into(),
                ResearchType::Quick,
                "/tmp".into(),
                None,
                None,
            )
            .await
            .unwrap();
        storage.acquire_lock(session.session_id, "agent-a").await.unwrap();
        let err = storage
            .acquire_lock(session.session_id, "agent-b")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::LockContention { .. }));
        storage.release_lock(session.session_id, "agent-a").await.unwrap();
        storage.acquire_lock(session.session_id, "agent-b").await.unwrap();
    }

    #[tokio::test]
    async fn cascade_delete_removes_children() {
        let storage = store().await;
        let session = storage
            .create_session(
                "topic".into(),
                ResearchType::Quick,
                "/tmp".into(),
                None,
                None,
            )
            .await
            .unwrap();
        storage
            .register_agent(session.session_id, "researcher".into(), None, None, vec![])
            .await
            .unwrap();
        storage.delete_session_cascade(session.session_id).await.unwrap();
        assert!(storage.get_session(session.session_id).await.is_err());
        assert!(storage.get_active_agents(session.session_id).await.unwrap().is_empty());
    }
}
