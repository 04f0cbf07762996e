//! Graph-of-Thoughts exploration graph (C3): path storage and the four
//! graph operators — generate, refine, score-and-prune, aggregate.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Row};

use crate::extract::{self, ExtractMode};
use crate::storage::{OptionalExt, Storage};
use crate::types::error::{ProcessingError, StorageError};
use crate::types::ids::{OperationId, PathId, SessionId};
use crate::types::model::{FactConflict, GotOperation, GotOperationType, NodeType, Path, PathStatus};

/// Weights for the quality-scoring rubric. Each component is already
/// clamped to its documented range before the weighted sum is rounded to
/// one decimal place.
pub struct ScoreInputs {
    /// 0–3: how well the path's citations back its claims.
    pub citation_quality: f64,
    /// 0–3: how much of the research question the path actually answers.
    pub completeness: f64,
    /// 0–2: internal consistency / absence of contradiction.
    pub accuracy: f64,
    /// 0–2: average source-quality weight across the path's citations.
    pub source_quality: f64,
}

impl ScoreInputs {
    pub fn score(&self) -> f64 {
        let raw = self.citation_quality.clamp(0.0, 3.0)
            + self.completeness.clamp(0.0, 3.0)
            + self.accuracy.clamp(0.0, 2.0)
            + self.source_quality.clamp(0.0, 2.0);
        (raw * 10.0).round() / 10.0
    }
}

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s)]+").unwrap());
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());

/// Derive the four rubric components straight from a path's own content —
/// there is no `path_id` column on `facts`/`citations`, so scoring never
/// joins against those tables. Citations are recognized as bare URLs;
/// a citation counts as "complete" if a four-digit year appears in the
/// same line, a cheap stand-in for an attached publication date.
fn compute_score_inputs(content: &str) -> ScoreInputs {
    let urls: Vec<&str> = URL_RE.find_iter(content).map(|m| m.as_str()).collect();

    let citation_quality = if urls.is_empty() {
        0.0
    } else if urls.len() < 3 {
        0.5
    } else if urls.len() < 5 {
        1.0
    } else {
        let complete = content
            .lines()
            .filter(|line| URL_RE.is_match(line) && YEAR_RE.is_match(line))
            .count();
        let ratio = complete as f64 / urls.len() as f64;
        if ratio >= 0.9 {
            3.0
        } else if ratio >= 0.7 {
            2.5
        } else if ratio >= 0.5 {
            2.0
        } else {
            1.5
        }
    };

    let mut completeness = 0.0;
    let lower = content.to_lowercase();
    if lower.contains("introduction") || lower.contains("overview") || lower.contains("background") {
        completeness += 0.7;
    }
    if content.split_whitespace().count() > 500 {
        completeness += 1.0;
    }
    if lower.contains("for example") || lower.contains("e.g.") || lower.contains("such as") {
        completeness += 0.7;
    }
    if lower.contains("implication") || lower.contains("impact") {
        completeness += 0.6;
    }
    let completeness = completeness.min(3.0);

    let accuracy = match extract::extract(content, ExtractMode::Fact, false) {
        Ok(result) => {
            let conflicts = extract::conflict_detect(&result.facts);
            if conflicts.is_empty() {
                2.0
            } else if conflicts.iter().any(|c| c.severity == crate::types::model::ConflictSeverity::Critical) {
                0.0
            } else if conflicts.len() > 2 {
                0.5
            } else {
                1.0
            }
        }
        Err(_) => 1.0,
    };

    let source_quality = if urls.is_empty() {
        0.0
    } else {
        let sum: f64 = urls.iter().map(|u| extract::rate_source(u).weight()).sum();
        sum / urls.len() as f64
    };

    ScoreInputs {
        citation_quality,
        completeness,
        accuracy,
        source_quality,
    }
}

impl Storage {
    pub async fn create_path(
        &self,
        session_id: SessionId,
        parent_id: Option<PathId>,
        node_type: NodeType,
        content: String,
        summary: Option<String>,
        status: PathStatus,
    ) -> Result<Path, StorageError> {
        let depth = match parent_id {
            Some(parent) => self.get_path(parent).await?.depth + 1,
            None => 0,
        };
        let path = Path {
            path_id: PathId::new(),
            session_id,
            parent_id,
            node_type,
            content,
            summary,
            quality_score: 0.0,
            compression_ratio: 1.0,
            status,
            depth,
            created_at: Utc::now(),
        };
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO got_paths
                (path_id, session_id, parent_id, node_type, content, summary,
                 quality_score, compression_ratio, status, depth, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            params![
                path.path_id.to_string(),
                path.session_id.to_string(),
                path.parent_id.map(|p| p.to_string()),
                path.node_type.as_str(),
                path.content,
                path.summary,
                path.quality_score,
                path.compression_ratio,
                path.status.as_str(),
                path.depth,
                path.created_at.to_rfc3339(),
            ],
        )?;
        Ok(path)
    }

    pub async fn get_path(&self, path_id: PathId) -> Result<Path, StorageError> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(PATH_SELECT)?;
        stmt.query_row(params![path_id.to_string()], row_to_path)
            .optional()?
            .ok_or_else(|| StorageError::NotFound(format!("path {path_id}")))
    }

    pub async fn list_paths(&self, session_id: SessionId) -> Result<Vec<Path>, StorageError> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(&format!("{PATH_SELECT} WHERE session_id = ?1 ORDER BY created_at"))?;
        let rows = stmt.query_map(params![session_id.to_string()], row_to_path)?;
        rows.collect::<rusqlite::Result<_>>().map_err(Into::into)
    }

    /// Non-terminal paths: the frontier eligible for expansion or
    /// aggregation. Named `active_paths` for continuity with callers that
    /// only care "is this still in play", not the (retired) `Active` status.
    pub async fn active_paths(&self, session_id: SessionId) -> Result<Vec<Path>, StorageError> {
        Ok(self
            .list_paths(session_id)
            .await?
            .into_iter()
            .filter(|p| !p.status.is_terminal())
            .collect())
    }

    async fn update_path_status(&self, path_id: PathId, status: PathStatus) -> Result<(), StorageError> {
        let conn = self.conn().await;
        conn.execute(
            "UPDATE got_paths SET status = ?1 WHERE path_id = ?2",
            params![status.as_str(), path_id.to_string()],
        )?;
        Ok(())
    }

    async fn update_path_score(&self, path_id: PathId, score: f64) -> Result<(), StorageError> {
        let conn = self.conn().await;
        conn.execute(
            "UPDATE got_paths SET quality_score = ?1 WHERE path_id = ?2",
            params![score, path_id.to_string()],
        )?;
        Ok(())
    }

    async fn record_operation(
        &self,
        session_id: SessionId,
        operation_type: GotOperationType,
        input_nodes: Vec<PathId>,
        output_nodes: Vec<PathId>,
        parameters: serde_json::Value,
    ) -> Result<GotOperation, StorageError> {
        let op = GotOperation {
            operation_id: OperationId::new(),
            session_id,
            operation_type,
            input_nodes,
            output_nodes,
            parameters,
            created_at: Utc::now(),
        };
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO got_operations
                (operation_id, session_id, operation_type, input_nodes, output_nodes, parameters, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                op.operation_id.to_string(),
                op.session_id.to_string(),
                op.operation_type.as_str(),
                serde_json::to_string(&op.input_nodes).unwrap_or_default(),
                serde_json::to_string(&op.output_nodes).unwrap_or_default(),
                op.parameters.to_string(),
                op.created_at.to_rfc3339(),
            ],
        )?;
        Ok(op)
    }

    /// Generate(session_id, query, k, strategy): create `k` new `pending`
    /// paths. Parents are drawn round-robin from the current frontier (all
    /// non-terminal paths) so a fan-out of `k > 1` doesn't collapse onto a
    /// single parent; the first generation in a session (empty frontier)
    /// creates `k` roots. `query`/`strategy` are advisory metadata carried
    /// in the path's `summary` and the operation's `parameters` — the
    /// server does not itself compose branch content.
    pub async fn generate_paths(
        &self,
        session_id: SessionId,
        query: String,
        k: usize,
        strategy: String,
    ) -> Result<Vec<Path>, ProcessingError> {
        if k == 0 {
            return Err(ProcessingError::Other("generate requires k >= 1".into()));
        }
        let to_processing = |e: StorageError| ProcessingError::Other(e.to_string());
        let frontier = self.active_paths(session_id).await.map_err(to_processing)?;

        let mut created = Vec::with_capacity(k);
        for i in 0..k {
            let parent_id = if frontier.is_empty() {
                None
            } else {
                Some(frontier[i % frontier.len()].path_id)
            };
            let node_type = if parent_id.is_none() { NodeType::Root } else { NodeType::Generated };
            let path = self
                .create_path(
                    session_id,
                    parent_id,
                    node_type,
                    String::new(),
                    Some(query.clone()),
                    PathStatus::Pending,
                )
                .await
                .map_err(to_processing)?;
            created.push(path);
        }
        self.record_operation(
            session_id,
            GotOperationType::Generate,
            frontier.iter().map(|p| p.path_id).collect(),
            created.iter().map(|p| p.path_id).collect(),
            serde_json::json!({ "query": query, "k": k, "strategy": strategy }),
        )
        .await
        .map_err(to_processing)?;
        Ok(created)
    }

    /// Refine a single path in place: a new `refined` child supersedes it.
    pub async fn refine_path(
        &self,
        path_id: PathId,
        refined_content: String,
        summary: Option<String>,
    ) -> Result<Path, ProcessingError> {
        let to_processing = |e: StorageError| ProcessingError::Other(e.to_string());
        let original = self.get_path(path_id).await.map_err(to_processing)?;
        let refined = self
            .create_path(
                original.session_id,
                Some(original.path_id),
                NodeType::Refined,
                refined_content,
                summary,
                PathStatus::Pending,
            )
            .await
            .map_err(to_processing)?;
        self.update_path_status(original.path_id, PathStatus::Refined)
            .await
            .map_err(to_processing)?;
        self.record_operation(
            original.session_id,
            GotOperationType::Refine,
            vec![original.path_id],
            vec![refined.path_id],
            serde_json::json!({}),
        )
        .await
        .map_err(to_processing)?;
        Ok(refined)
    }

    /// Begin execution of a pending path: `pending -> running`.
    pub async fn start_path_execution(&self, path_id: PathId) -> Result<Path, ProcessingError> {
        let to_processing = |e: StorageError| ProcessingError::Other(e.to_string());
        let path = self.get_path(path_id).await.map_err(to_processing)?;
        if path.status != PathStatus::Pending {
            return Err(ProcessingError::Other(format!(
                "path {path_id} is {} not pending",
                path.status.as_str()
            )));
        }
        self.update_path_status(path_id, PathStatus::Running).await.map_err(to_processing)?;
        self.get_path(path_id).await.map_err(to_processing)
    }

    /// Deliver a running path's content: `running -> completed`. A
    /// completed path must carry non-empty content.
    pub async fn complete_path_execution(
        &self,
        path_id: PathId,
        content: String,
        summary: Option<String>,
    ) -> Result<Path, ProcessingError> {
        let to_processing = |e: StorageError| ProcessingError::Other(e.to_string());
        let path = self.get_path(path_id).await.map_err(to_processing)?;
        if path.status != PathStatus::Running {
            return Err(ProcessingError::Other(format!(
                "path {path_id} is {} not running",
                path.status.as_str()
            )));
        }
        if content.trim().is_empty() {
            return Err(ProcessingError::Other("completed path content must not be empty".into()));
        }
        let conn = self.conn().await;
        conn.execute(
            "UPDATE got_paths SET content = ?1, summary = ?2, status = ?3 WHERE path_id = ?4",
            params![content, summary, PathStatus::Completed.as_str(), path_id.to_string()],
        )
        .map_err(StorageError::from)
        .map_err(to_processing)?;
        self.get_path(path_id).await.map_err(to_processing)
    }

    /// Score-and-prune(session_id, threshold, keep_top_n): in one logical
    /// transaction, score every completed-but-unscored path from its own
    /// content, prune everything strictly below `threshold`, then prune all
    /// but the `keep_top_n` highest scorers among the survivors. Ties are
    /// broken by `created_at`: the older path is pruned first.
    pub async fn score_and_prune(
        &self,
        session_id: SessionId,
        threshold: f64,
        keep_top_n: usize,
    ) -> Result<(Vec<Path>, Vec<PathId>), ProcessingError> {
        let to_processing = |e: StorageError| ProcessingError::Other(e.to_string());

        let all = self.list_paths(session_id).await.map_err(to_processing)?;
        let unscored: Vec<&Path> = all
            .iter()
            .filter(|p| p.status == PathStatus::Completed && p.quality_score == 0.0)
            .collect();
        let unscored_ids: Vec<PathId> = unscored.iter().map(|p| p.path_id).collect();

        for path in &unscored {
            let score = compute_score_inputs(&path.content).score();
            self.update_path_score(path.path_id, score).await.map_err(to_processing)?;
        }

        let mut completed: Vec<Path> = self
            .list_paths(session_id)
            .await
            .map_err(to_processing)?
            .into_iter()
            .filter(|p| p.status == PathStatus::Completed)
            .collect();

        let mut pruned_ids = Vec::new();
        completed.retain(|p| {
            if p.quality_score < threshold {
                pruned_ids.push(p.path_id);
                false
            } else {
                true
            }
        });

        completed.sort_by(|a, b| {
            b.quality_score
                .partial_cmp(&a.quality_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        let (survive, excess) = if completed.len() > keep_top_n {
            completed.split_at(keep_top_n)
        } else {
            (completed.as_slice(), [].as_slice())
        };
        pruned_ids.extend(excess.iter().map(|p| p.path_id));

        for id in &pruned_ids {
            self.update_path_status(*id, PathStatus::Pruned).await.map_err(to_processing)?;
        }

        self.record_operation(
            session_id,
            GotOperationType::Score,
            unscored_ids,
            survive.iter().map(|p| p.path_id).collect(),
            serde_json::json!({ "threshold": threshold, "keep_top_n": keep_top_n }),
        )
        .await
        .map_err(to_processing)?;
        self.record_operation(
            session_id,
            GotOperationType::Prune,
            pruned_ids.clone(),
            pruned_ids.clone(),
            serde_json::json!({}),
        )
        .await
        .map_err(to_processing)?;

        Ok((survive.to_vec(), pruned_ids))
    }

    /// Aggregate(session_id, path_ids, strategy): merge the given paths
    /// into one new `aggregated` node. `synthesis` concatenates content in
    /// order; `voting`/`consensus` take the union of distinct paragraphs.
    /// The merged content is then re-extracted and conflict-checked so the
    /// caller sees whether the sources it picked actually agree.
    pub async fn aggregate_paths(
        &self,
        session_id: SessionId,
        path_ids: Vec<PathId>,
        strategy: String,
    ) -> Result<(Path, Vec<FactConflict>), ProcessingError> {
        let to_processing = |e: StorageError| ProcessingError::Other(e.to_string());
        if path_ids.is_empty() {
            return Err(ProcessingError::Other("aggregate requires at least one path".into()));
        }
        let mut sources = Vec::with_capacity(path_ids.len());
        for id in &path_ids {
            let path = self.get_path(*id).await.map_err(to_processing)?;
            if path.session_id != session_id {
                return Err(ProcessingError::Other(format!("path {id} does not belong to session {session_id}")));
            }
            sources.push(path);
        }

        let content = match strategy.as_str() {
            "voting" | "consensus" => {
                let mut seen = std::collections::HashSet::new();
                let mut paragraphs = Vec::new();
                for source in &sources {
                    for para in source.content.split("\n\n") {
                        let para = para.trim();
                        if !para.is_empty() && seen.insert(para.to_string()) {
                            paragraphs.push(para.to_string());
                        }
                    }
                }
                paragraphs.join("\n\n")
            }
            _ => sources.iter().map(|p| p.content.as_str()).collect::<Vec<_>>().join("\n\n"),
        };

        let conflicts = match extract::extract(&content, ExtractMode::Fact, false) {
            Ok(result) => extract::conflict_detect(&result.facts),
            Err(_) => Vec::new(),
        };

        let aggregated = self
            .create_path(
                session_id,
                Some(path_ids[0]),
                NodeType::Aggregated,
                content,
                None,
                PathStatus::Completed,
            )
            .await
            .map_err(to_processing)?;
        for id in &path_ids {
            self.update_path_status(*id, PathStatus::Aggregated).await.map_err(to_processing)?;
        }
        self.record_operation(
            session_id,
            GotOperationType::Aggregate,
            path_ids,
            vec![aggregated.path_id],
            serde_json::json!({ "strategy": strategy }),
        )
        .await
        .map_err(to_processing)?;
        self.set_aggregated(session_id, true).await.map_err(to_processing)?;
        Ok((aggregated, conflicts))
    }
}

const PATH_SELECT: &str = "SELECT path_id, session_id, parent_id, node_type, content, summary,
    quality_score, compression_ratio, status, depth, created_at FROM got_paths";

fn row_to_path(row: &Row<'_>) -> rusqlite::Result<Path> {
    let parent_id: Option<String> = row.get(2)?;
    let created_at: String = row.get(10)?;
    Ok(Path {
        path_id: row.get::<_, String>(0)?.parse().unwrap_or_default(),
        session_id: row.get::<_, String>(1)?.parse().unwrap_or_default(),
        parent_id: parent_id.and_then(|s| s.parse().ok()),
        node_type: parse_node_type(&row.get::<_, String>(3)?),
        content: row.get(4)?,
        summary: row.get(5)?,
        quality_score: row.get(6)?,
        compression_ratio: row.get(7)?,
        status: PathStatus::parse(&row.get::<_, String>(8)?).unwrap_or(PathStatus::Pruned),
        depth: row.get(9)?,
        created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
    })
}

fn parse_node_type(s: &str) -> NodeType {
    match s {
        "root" => NodeType::Root,
        "aggregated" => NodeType::Aggregated,
        "refined" => NodeType::Refined,
        _ => NodeType::Generated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::model::ResearchType;

    async fn session(storage: &Storage) -> SessionId {
        storage
            .create_session("topic".into(), ResearchType::Deep, "/tmp".into(), None, None)
            .await
            .unwrap()
            .session_id
    }

    #[tokio::test]
    async fn generate_creates_pending_paths() {
        let storage = Storage::open_in_memory().await.unwrap();
        let sid = session(&storage).await;
        let paths = storage.generate_paths(sid, "what is X".into(), 3, "diverse".into()).await.unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths.iter().all(|p| p.status == PathStatus::Pending));
    }

    #[tokio::test]
    async fn execution_lifecycle_advances_pending_to_completed() {
        let storage = Storage::open_in_memory().await.unwrap();
        let sid = session(&storage).await;
        let paths = storage.generate_paths(sid, "q".into(), 1, "diverse".into()).await.unwrap();
        let path_id = paths[0].path_id;

        let running = storage.start_path_execution(path_id).await.unwrap();
        assert_eq!(running.status, PathStatus::Running);

        let completed = storage
            .complete_path_execution(path_id, "Some researched content.".into(), None)
            .await
            .unwrap();
        assert_eq!(completed.status, PathStatus::Completed);

        assert!(storage.start_path_execution(path_id).await.is_err());
    }

    #[tokio::test]
    async fn score_and_prune_keeps_highest_scorers_above_threshold() {
        let storage = Storage::open_in_memory().await.unwrap();
        let sid = session(&storage).await;
        let paths = storage
            .generate_paths(sid, "q".into(), 3, "diverse".into())
            .await
            .unwrap();

        let rich_content = "Introduction to the market.\n\
            This is a long analysis for example of trends and their implications, repeated to pad word count. "
            .repeat(60)
            + "See https://example.com/report-2024 and https://example.org/data-2023 \
               and https://gov.example/stats-2024 and https://example.net/2024-summary and https://example.edu/2024";
        let thin_content = "Short note.";

        for (i, path) in paths.iter().enumerate() {
            storage.start_path_execution(path.path_id).await.unwrap();
            let content = if i == 0 { rich_content.clone() } else { thin_content.to_string() };
            storage.complete_path_execution(path.path_id, content, None).await.unwrap();
        }

        let (survivors, pruned_ids) = storage.score_and_prune(sid, 6.0, 2).await.unwrap();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].path_id, paths[0].path_id);
        assert_eq!(pruned_ids.len(), 2);
    }

    #[tokio::test]
    async fn aggregate_merges_completed_paths_and_sets_flag() {
        let storage = Storage::open_in_memory().await.unwrap();
        let sid = session(&storage).await;
        let paths = storage.generate_paths(sid, "q".into(), 2, "diverse".into()).await.unwrap();
        for path in &paths {
            storage.start_path_execution(path.path_id).await.unwrap();
            storage.complete_path_execution(path.path_id, "finding text".into(), None).await.unwrap();
        }

        let (aggregated, _conflicts) = storage
            .aggregate_paths(sid, paths.iter().map(|p| p.path_id).collect(), "synthesis".into())
            .await
            .unwrap();
        assert_eq!(aggregated.node_type, NodeType::Aggregated);

        let session = storage.get_session(sid).await.unwrap();
        assert!(session.is_aggregated);

        let all = storage.list_paths(sid).await.unwrap();
        assert!(all.iter().filter(|p| p.path_id != aggregated.path_id).all(|p| p.status == PathStatus::Aggregated));
    }

    #[tokio::test]
    async fn aggregate_rejects_empty_path_list() {
        let storage = Storage::open_in_memory().await.unwrap();
        let sid = session(&storage).await;
        assert!(storage.aggregate_paths(sid, vec![], "synthesis".into()).await.is_err());
    }
}
