//! Auto-processing pipeline (C7): sweep a directory of markdown research
//! output, run extraction/validation/conflict-detection over it, and emit
//! the artifact files the research loop reads back. Also owns the raw
//! ingest queue that stages payloads ahead of processing.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Row};

use crate::extract::{conflict_detect, extract, ExtractMode};
use crate::storage::Storage;
use crate::types::error::{ProcessingError, StorageError};
use crate::types::ids::{IngestId, SessionId};
use crate::types::model::{Fact, IngestStatus, IngestedItem};

impl Storage {
    /// Stage a single raw payload for later processing.
    pub async fn ingest_content(
        &self,
        session_id: SessionId,
        payload: serde_json::Value,
    ) -> Result<IngestedItem, StorageError> {
        let item = IngestedItem {
            ingest_id: IngestId::new(),
            session_id,
            payload,
            status: IngestStatus::Pending,
            created_at: Utc::now(),
        };
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO ingest_queue (ingest_id, session_id, payload, status, created_at)
             VALUES (?1,?2,?3,?4,?5)",
            params![
                item.ingest_id.to_string(),
                item.session_id.to_string(),
                item.payload.to_string(),
                ingest_status_str(item.status),
                item.created_at.to_rfc3339(),
            ],
        )?;
        Ok(item)
    }

    /// Stage many raw payloads in one transaction — the ingest batch
    /// commit is all-or-nothing.
    pub async fn batch_ingest(
        &self,
        session_id: SessionId,
        payloads: Vec<serde_json::Value>,
    ) -> Result<Vec<IngestedItem>, StorageError> {
        let mut conn = self.conn().await;
        let tx = conn.transaction()?;
        let mut items = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let item = IngestedItem {
                ingest_id: IngestId::new(),
                session_id,
                payload,
                status: IngestStatus::Pending,
                created_at: Utc::now(),
            };
            tx.execute(
                "INSERT INTO ingest_queue (ingest_id, session_id, payload, status, created_at)
                 VALUES (?1,?2,?3,?4,?5)",
                params![
                    item.ingest_id.to_string(),
                    item.session_id.to_string(),
                    item.payload.to_string(),
                    ingest_status_str(item.status),
                    item.created_at.to_rfc3339(),
                ],
            )?;
            items.push(item);
        }
        tx.commit()?;
        Ok(items)
    }

    pub async fn list_ingest_queue(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<IngestedItem>, StorageError> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(
            "SELECT ingest_id, session_id, payload, status, created_at
             FROM ingest_queue WHERE session_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![session_id.to_string()], row_to_ingested_item)?;
        rows.collect::<rusqlite::Result<_>>().map_err(Into::into)
    }
}

fn ingest_status_str(status: IngestStatus) -> &'static str {
    match status {
        IngestStatus::Pending => "pending",
        IngestStatus::Processing => "processing",
        IngestStatus::Completed => "completed",
        IngestStatus::Failed => "failed",
    }
}

fn parse_ingest_status(s: &str) -> IngestStatus {
    match s {
        "processing" => IngestStatus::Processing,
        "completed" => IngestStatus::Completed,
        "failed" => IngestStatus::Failed,
        _ => IngestStatus::Pending,
    }
}

fn row_to_ingested_item(row: &Row<'_>) -> rusqlite::Result<IngestedItem> {
    let payload_text: String = row.get(2)?;
    let status_text: String = row.get(3)?;
    let created_at_text: String = row.get(4)?;
    Ok(IngestedItem {
        ingest_id: row.get::<_, String>(0)?.parse().map_err(|_| {
            rusqlite::Error::InvalidColumnType(0, "ingest_id".into(), rusqlite::types::Type::Text)
        })?,
        session_id: row.get::<_, String>(1)?.parse().map_err(|_| {
            rusqlite::Error::InvalidColumnType(1, "session_id".into(), rusqlite::types::Type::Text)
        })?,
        payload: serde_json::from_str(&payload_text).unwrap_or(serde_json::Value::Null),
        status: parse_ingest_status(&status_text),
        created_at: created_at_text
            .parse()
            .unwrap_or_else(|_| Utc::now()),
    })
}

/// Outcome of one stage of [`auto_process_data`]. `success = true` with a
/// populated `warning` means the stage ran but could not do its full job —
/// that must never be collapsed into a silent, unqualified success.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StageResult {
    pub stage: &'static str,
    pub success: bool,
    pub warning: Option<String>,
    pub detail: String,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ProcessReport {
    pub files_processed: usize,
    pub stages: Vec<StageResult>,
}

/// Result of [`auto_process_data`]: an empty `input_dir` short-circuits
/// before any artifact is written, rather than emitting four empty files
/// that would read as a clean pass over nothing.
pub enum AutoProcessOutcome {
    Empty { message: String },
    Processed(ProcessReport),
}

const KNOWN_OPERATIONS: &[&str] = &[
    "fact_extraction",
    "entity_extraction",
    "citation_validation",
    "conflict_detection",
];

/// Process every `*.md` file in `input_dir`, in lexical filename order,
/// running the requested `operations` and writing `fact_ledger.md`,
/// `entity_graph.md`, `citation_validation.md`, and/or `conflict_report.md`
/// into `output_dir`. When `continue_on_error` is false, the first file
/// that fails to read aborts the sweep.
pub async fn auto_process_data(
    input_dir: &Path,
    output_dir: &Path,
    operations: Vec<String>,
    continue_on_error: bool,
) -> Result<AutoProcessOutcome, ProcessingError> {
    let metadata = tokio::fs::metadata(input_dir)
        .await
        .map_err(|e| ProcessingError::InvalidInputDir(format!("{}: {e}", input_dir.display())))?;
    if !metadata.is_dir() {
        return Err(ProcessingError::InvalidInputDir(format!(
            "{} is not a directory",
            input_dir.display()
        )));
    }
    for op in &operations {
        if !KNOWN_OPERATIONS.contains(&op.as_str()) {
            return Err(ProcessingError::Other(format!("unknown operation: {op}")));
        }
    }

    let mut entries = tokio::fs::read_dir(input_dir)
        .await
        .map_err(|e| ProcessingError::Other(format!("reading {}: {e}", input_dir.display())))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ProcessingError::Other(e.to_string()))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("md") {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        return Ok(AutoProcessOutcome::Empty {
            message: "No files to process".to_string(),
        });
    }

    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| ProcessingError::Other(format!("creating {}: {e}", output_dir.display())))?;

    let run = |op: &str| operations.is_empty() || operations.iter().any(|o| o == op);

    let mut report = ProcessReport::default();
    let mut all_facts: Vec<Fact> = Vec::new();
    let mut fact_lines = Vec::new();
    let mut entity_lines = Vec::new();

    for file in &files {
        let text = match tokio::fs::read_to_string(file).await {
            Ok(t) => t,
            Err(e) => {
                if continue_on_error {
                    report.stages.push(StageResult {
                        stage: "read",
                        success: false,
                        warning: None,
                        detail: format!("{}: {e}", file.display()),
                    });
                    continue;
                }
                return Err(ProcessingError::Other(format!(
                    "reading {}: {e}",
                    file.display()
                )));
            }
        };

        if run("fact_extraction") || run("entity_extraction") {
            let extracted = extract(&text, ExtractMode::All, false)?;
            if run("fact_extraction") {
                for fact in &extracted.facts {
                    fact_lines.push(format!(
                        "- **{}** ({}): {} [{}]",
                        fact.entity,
                        fact.attribute,
                        fact.value,
                        file.file_name().and_then(|n| n.to_str()).unwrap_or("?")
                    ));
                }
                all_facts.extend(extracted.facts.clone());
            }
            if run("entity_extraction") {
                for entity in &extracted.entities {
                    entity_lines.push(format!("- {} ({})", entity.name, entity.entity_type));
                }
            }
        }
        report.files_processed += 1;
    }

    if run("fact_extraction") {
        write_artifact(output_dir, "fact_ledger.md", "# Fact Ledger", &fact_lines).await?;
        report.stages.push(StageResult {
            stage: "fact_extraction",
            success: true,
            warning: None,
            detail: format!("{} facts", fact_lines.len()),
        });
    }

    if run("entity_extraction") {
        write_artifact(output_dir, "entity_graph.md", "# Entity Graph", &entity_lines).await?;
        report.stages.push(StageResult {
            stage: "entity_extraction",
            success: true,
            warning: None,
            detail: format!("{} entities", entity_lines.len()),
        });
    }

    if run("citation_validation") {
        // Citation extraction from free text is not implemented: report the
        // gap explicitly rather than writing an empty file that reads as a
        // clean pass.
        let citation_warning =
            "citation extraction from free text is not yet implemented".to_string();
        write_artifact(
            output_dir,
            "citation_validation.md",
            "# Citation Validation",
            &[format!("> {citation_warning}")],
        )
        .await?;
        report.stages.push(StageResult {
            stage: "citation_validation",
            success: true,
            warning: Some(citation_warning),
            detail: "0 citations validated".into(),
        });
    }

    if run("conflict_detection") {
        let conflicts = conflict_detect(&all_facts);
        let conflict_lines: Vec<String> = conflicts
            .iter()
            .map(|c| {
                format!(
                    "- {:?} conflict ({:?}) between fact {} and fact {}",
                    c.conflict_type, c.severity, c.fact_a, c.fact_b
                )
            })
            .collect();
        write_artifact(output_dir, "conflict_report.md", "# Conflict Report", &conflict_lines)
            .await?;
        report.stages.push(StageResult {
            stage: "conflict_detection",
            success: true,
            warning: None,
            detail: format!("{} conflicts", conflicts.len()),
        });
    }

    Ok(AutoProcessOutcome::Processed(report))
}

async fn write_artifact(
    dir: &Path,
    filename: &str,
    heading: &str,
    lines: &[String],
) -> Result<PathBuf, ProcessingError> {
    let path = dir.join(filename);
    let mut body = format!("{heading}\n\n");
    if lines.is_empty() {
        body.push_str("(none)\n");
    } else {
        for line in lines {
            body.push_str(line);
            body.push('\n');
        }
    }
    tokio::fs::write(&path, body)
        .await
        .map_err(|e| ProcessingError::Other(format!("writing {}: {e}", path.display())))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn unwrap_processed(outcome: AutoProcessOutcome) -> ProcessReport {
        match outcome {
            AutoProcessOutcome::Processed(report) => report,
            AutoProcessOutcome::Empty { message } => panic!("expected Processed, got Empty: {message}"),
        }
    }

    #[tokio::test]
    async fn sweeps_markdown_files_and_warns_on_citations() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        tokio::fs::write(
            input.path().join("agent_1.md"),
            "Acme Corp revenue was $5 billion in 2023.",
        )
        .await
        .unwrap();

        let outcome = auto_process_data(input.path(), output.path(), vec![], true)
            .await
            .unwrap();
        let report = unwrap_processed(outcome);
        assert_eq!(report.files_processed, 1);

        let citation_stage = report
            .stages
            .iter()
            .find(|s| s.stage == "citation_validation")
            .unwrap();
        assert!(citation_stage.success);
        assert!(citation_stage.warning.is_some());

        let fact_ledger = tokio::fs::read_to_string(output.path().join("fact_ledger.md"))
            .await
            .unwrap();
        assert!(fact_ledger.contains("Acme"));
    }

    #[tokio::test]
    async fn continue_on_error_skips_unreadable_files() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        tokio::fs::write(input.path().join("a.md"), "Beta Inc was founded in 1999.")
            .await
            .unwrap();
        let outcome = auto_process_data(input.path(), output.path(), vec![], true)
            .await
            .unwrap();
        assert_eq!(unwrap_processed(outcome).files_processed, 1);
    }

    #[tokio::test]
    async fn empty_input_dir_short_circuits() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        let outcome = auto_process_data(input.path(), output.path(), vec![], true)
            .await
            .unwrap();
        match outcome {
            AutoProcessOutcome::Empty { message } => assert_eq!(message, "No files to process"),
            AutoProcessOutcome::Processed(_) => panic!("expected Empty for a directory with no files"),
        }
    }

    #[tokio::test]
    async fn operations_selector_limits_emitted_artifacts() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        tokio::fs::write(input.path().join("a.md"), "Acme Corp revenue was $5 billion in 2023.")
            .await
            .unwrap();
        let outcome = auto_process_data(
            input.path(),
            output.path(),
            vec!["fact_extraction".to_string()],
            true,
        )
        .await
        .unwrap();
        let report = unwrap_processed(outcome);
        assert_eq!(report.stages.len(), 1);
        assert_eq!(report.stages[0].stage, "fact_extraction");
        assert!(output.path().join("fact_ledger.md").exists());
        assert!(!output.path().join("entity_graph.md").exists());
    }

    #[tokio::test]
    async fn rejects_invalid_input_dir() {
        let output = tempdir().unwrap();
        let err = auto_process_data(
            Path::new("/does/not/exist"),
            output.path(),
            vec![],
            true,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidInputDir(_)));
    }
}
