//! End-to-end exercise of a full research loop: bootstrap, generate, score,
//! prune, aggregate, and terminate, driven entirely by the public API
//! [`orchestrator_core`] exposes to the MCP transport layer.

use orchestrator_core::decision::{decide, GraphState, NextAction, PathSnapshot};
use orchestrator_core::types::model::{NodeType, Path, PathStatus, ResearchType, Session, SessionStatus};
use orchestrator_core::Storage;

fn state_from(paths: &[Path], session: &Session) -> GraphState {
    GraphState {
        paths: paths
            .iter()
            .map(|p| PathSnapshot {
                path_id: p.path_id,
                status: p.status,
                quality_score: p.quality_score,
            })
            .collect(),
        iteration_count: session.iteration_count,
        max_iterations: session.max_iterations,
        confidence: session.confidence,
        confidence_threshold: session.confidence_threshold,
        is_aggregated: session.is_aggregated,
        budget_exhausted: session.budget_exhausted,
        current_findings: String::new(),
    }
}

#[tokio::test]
async fn full_research_loop_terminates_after_aggregation() {
    let storage = Storage::open_in_memory().await.unwrap();
    let session = storage
        .create_session(
            "Impact of rate hikes on regional bank lending".into(),
            ResearchType::Quick,
            "/tmp/research".into(),
            Some(2),
            Some(0.8),
        )
        .await
        .unwrap();

    // No paths yet: the engine should bootstrap with a generate action.
    let paths = storage.list_paths(session.session_id).await.unwrap();
    let state = state_from(&paths, &session);
    assert_eq!(decide(&state).action, NextAction::Generate);

    storage
        .update_session_status(session.session_id, SessionStatus::Planning)
        .await
        .unwrap();
    storage
        .update_session_status(session.session_id, SessionStatus::Executing)
        .await
        .unwrap();

    let generated = storage
        .generate_paths(
            session.session_id,
            "What is driving regional bank lending contraction?".into(),
            3,
            "diverse".into(),
        )
        .await
        .unwrap();
    assert_eq!(generated.len(), 3);
    assert!(generated.iter().all(|p| p.status == PathStatus::Pending));

    // One rich, well-cited path and two thin ones, so score-and-prune has a
    // deterministic single survivor.
    let rich_content = "Introduction to the market.\n\
        This is a long analysis for example of trends and their implications, repeated to pad word count. "
        .repeat(60)
        + "See https://example.com/report-2024 and https://example.org/data-2023 \
           and https://gov.example/stats-2024 and https://example.net/2024-summary and https://example.edu/2024";
    let contents = [
        rich_content,
        "Fed funds rate rose 500bps since early 2022.".to_string(),
        "Deposit costs outpaced loan yield growth in Q2.".to_string(),
    ];

    for (path, content) in generated.iter().zip(contents.into_iter()) {
        storage.start_path_execution(path.path_id).await.unwrap();
        storage.complete_path_execution(path.path_id, content, None).await.unwrap();
    }

    let (survivors, pruned_ids) = storage.score_and_prune(session.session_id, 6.0, 2).await.unwrap();
    assert_eq!(survivors.len(), 1);
    assert_eq!(survivors[0].path_id, generated[0].path_id);
    assert_eq!(pruned_ids.len(), 2);

    let (aggregated, _conflicts) = storage
        .aggregate_paths(
            session.session_id,
            survivors.iter().map(|p| p.path_id).collect(),
            "synthesis".into(),
        )
        .await
        .unwrap();
    assert_eq!(aggregated.node_type, NodeType::Aggregated);

    storage.update_confidence(session.session_id, 0.9).await.unwrap();
    storage
        .update_session_status(session.session_id, SessionStatus::Completed)
        .await
        .unwrap();

    let final_session = storage.get_session(session.session_id).await.unwrap();
    let final_paths = storage.list_paths(session.session_id).await.unwrap();
    let final_state = state_from(&final_paths, &final_session);
    assert_eq!(decide(&final_state).action, NextAction::Synthesize);
}

#[tokio::test]
async fn delete_session_cascade_removes_everything() {
    let storage = Storage::open_in_memory().await.unwrap();
    let session = storage
        .create_session("topic".into(), ResearchType::Quick, "/tmp".into(), None, None)
        .await
        .unwrap();
    storage
        .register_agent(session.session_id, "researcher".into(), None, None, vec![])
        .await
        .unwrap();
    storage
        .generate_paths(session.session_id, "q".into(), 1, "diverse".into())
        .await
        .unwrap();

    storage.delete_session_cascade(session.session_id).await.unwrap();

    assert!(storage.get_session(session.session_id).await.is_err());
    assert!(storage.get_active_agents(session.session_id).await.unwrap().is_empty());
}
