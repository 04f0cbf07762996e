//! MCP server for the research orchestration engine.
//!
//! Exposes session lifecycle, GoT graph, decision-engine, extraction, and
//! batch/pipeline tools over stdio using the rmcp SDK. The transport layer
//! never touches SQLite directly — every tool method is a thin wrapper
//! around [`orchestrator_core`].

mod helpers;
mod params;

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServerHandler, ServiceExt,
};

use orchestrator_core::batch::{self, BatchConfig, CacheFamily, ResultCache};
use orchestrator_core::decision::{self, GraphState};
use orchestrator_core::extract::{self, ExtractMode, ValidateMode};
use orchestrator_core::types::ids::{AgentId, PathId, SessionId};
use orchestrator_core::types::model::{
    ActivityEventType, AgentStatus, Fact, FactConflict, ResearchType, SessionStatus,
};
use orchestrator_core::{OrchestratorError, ServerConfig, Storage};

use helpers::{domain_error_result, json_result, parse_id, text_result};
use params::*;

/// Evaluate `$e`, a `Result<T, E>` where `OrchestratorError: From<E>`. On
/// `Ok` yields `T`; on `Err` returns early from the enclosing tool method
/// with a tool-level `isError` result rather than a protocol-level one.
macro_rules! tool_try {
    ($e:expr) => {
        match $e {
            Ok(value) => value,
            Err(err) => return domain_error_result(OrchestratorError::from(err)),
        }
    };
}

#[derive(Clone)]
pub struct OrchestratorMcpServer {
    storage: Arc<Storage>,
    cache: Arc<ResultCache>,
    config: Arc<ServerConfig>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl OrchestratorMcpServer {
    pub fn new(storage: Arc<Storage>, config: Arc<ServerConfig>) -> Self {
        Self {
            storage,
            cache: Arc::new(ResultCache::new()),
            config,
            tool_router: Self::tool_router(),
        }
    }

    // -- C2: session lifecycle ------------------------------------------

    #[tool(description = "Create a new research session and return its session_id.")]
    async fn create_research_session(
        &self,
        Parameters(params): Parameters<CreateSessionParams>,
    ) -> Result<CallToolResult, McpError> {
        let research_type = match params.research_type.as_str() {
            "quick" => ResearchType::Quick,
            "deep" => ResearchType::Deep,
            other => {
                return Err(McpError::new(
                    ErrorCode::INVALID_PARAMS,
                    format!("research_type must be 'quick' or 'deep', got '{other}'"),
                    None::<serde_json::Value>,
                ))
            }
        };
        let session = tool_try!(
            self.storage
                .create_session(
                    params.research_topic,
                    research_type,
                    params.output_directory,
                    params.max_iterations,
                    params.confidence_threshold,
                )
                .await
        );
        json_result(&session)
    }

    #[tool(description = "Fetch full session state by session_id.")]
    async fn get_session_info(
        &self,
        Parameters(params): Parameters<SessionIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let session = tool_try!(self.storage.get_session(session_id).await);
        json_result(&session)
    }

    #[tool(description = "Transition a session's status (e.g. planning -> executing).")]
    async fn update_session_status(
        &self,
        Parameters(params): Parameters<UpdateSessionStatusParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let status = SessionStatus::parse(&params.status).ok_or_else(|| {
            McpError::new(
                ErrorCode::INVALID_PARAMS,
                format!("unknown status '{}'", params.status),
                None::<serde_json::Value>,
            )
        })?;
        tool_try!(self.storage.update_session_status(session_id, status).await);
        text_result(format!("session {session_id} -> {}", status.as_str()))
    }

    #[tool(description = "Register a new research agent under a session.")]
    async fn register_agent(
        &self,
        Parameters(params): Parameters<RegisterAgentParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let agent = tool_try!(
            self.storage
                .register_agent(
                    session_id,
                    params.agent_type,
                    params.agent_role,
                    params.focus_description,
                    params.search_queries,
                )
                .await
        );
        json_result(&agent)
    }

    #[tool(description = "Update an agent's status, output file, token usage, or error message.")]
    async fn update_agent_status(
        &self,
        Parameters(params): Parameters<UpdateAgentStatusParams>,
    ) -> Result<CallToolResult, McpError> {
        let agent_id: AgentId = parse_id(&params.agent_id, "agent_id")?;
        let status = AgentStatus::parse(&params.status).ok_or_else(|| {
            McpError::new(
                ErrorCode::INVALID_PARAMS,
                format!("unknown agent status '{}'", params.status),
                None::<serde_json::Value>,
            )
        })?;
        tool_try!(
            self.storage
                .update_agent_status(
                    agent_id,
                    status,
                    params.output_file,
                    params.token_usage,
                    params.error_message,
                )
                .await
        );
        text_result(format!("agent {agent_id} -> {}", status.as_str()))
    }

    #[tool(description = "List agents still deploying or running for a session.")]
    async fn get_active_agents(
        &self,
        Parameters(params): Parameters<SessionIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let agents = tool_try!(self.storage.get_active_agents(session_id).await);
        json_result(&agents)
    }

    #[tool(description = "Set a session's current (advisory) research phase.")]
    async fn update_current_phase(
        &self,
        Parameters(params): Parameters<UpdatePhaseParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        tool_try!(self.storage.update_current_phase(session_id, params.phase).await);
        text_result(format!("session {session_id} phase -> {}", params.phase))
    }

    #[tool(description = "Read a session's current research phase.")]
    async fn get_current_phase(
        &self,
        Parameters(params): Parameters<SessionIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let session = tool_try!(self.storage.get_session(session_id).await);
        text_result(session.current_phase.to_string())
    }

    #[tool(description = "Save a point-in-time snapshot of session state for crash recovery.")]
    async fn checkpoint_phase(
        &self,
        Parameters(params): Parameters<CheckpointPhaseParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let checkpoint = tool_try!(
            self.storage
                .save_checkpoint(
                    session_id,
                    params.phase_number,
                    params.checkpoint_type,
                    params.state_snapshot,
                )
                .await
        );
        json_result(&checkpoint)
    }

    #[tool(description = "Append a structured entry to a session's activity log.")]
    async fn log_activity(
        &self,
        Parameters(params): Parameters<LogActivityParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let event_type = match params.event_type.as_str() {
            "phase_start" => ActivityEventType::PhaseStart,
            "phase_complete" => ActivityEventType::PhaseComplete,
            "agent_deploy" => ActivityEventType::AgentDeploy,
            "agent_complete" => ActivityEventType::AgentComplete,
            "error" => ActivityEventType::Error,
            _ => ActivityEventType::Info,
        };
        let agent_id = params
            .agent_id
            .map(|raw| parse_id::<AgentId>(&raw, "agent_id"))
            .transpose()?;
        let entry = tool_try!(
            self.storage
                .log_activity(
                    session_id,
                    params.phase,
                    event_type,
                    params.message,
                    agent_id,
                    params.details,
                )
                .await
        );
        json_result(&entry)
    }

    #[tool(description = "Read a session's activity log, most recent first.")]
    async fn get_activity_log(
        &self,
        Parameters(params): Parameters<GetActivityLogParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let entries = tool_try!(self.storage.get_activity_log(session_id, params.limit).await);
        json_result(&entries)
    }

    #[tool(description = "Fetch the most recent checkpoint saved for a session, if any.")]
    async fn get_latest_checkpoint(
        &self,
        Parameters(params): Parameters<SessionIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let checkpoint = tool_try!(self.storage.get_latest_checkpoint(session_id).await);
        json_result(&checkpoint)
    }

    #[tool(description = "Render a human-readable progress summary for a session: status, iteration budget, active agents, and path counts.")]
    async fn render_progress(
        &self,
        Parameters(params): Parameters<RenderProgressParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let session = tool_try!(self.storage.get_session(session_id).await);
        let agents = tool_try!(self.storage.get_active_agents(session_id).await);
        let paths = tool_try!(self.storage.active_paths(session_id).await);
        text_result(format!(
            "session {session_id}: {} (phase {}, iteration {}/{}, confidence {:.2}/{:.2})\n\
             active agents: {}\nactive paths: {}",
            session.status.as_str(),
            session.current_phase,
            session.iteration_count,
            session.max_iterations,
            session.confidence,
            session.confidence_threshold,
            agents.len(),
            paths.len(),
        ))
    }

    #[tool(description = "Atomically increment a session's iteration counter and return the new count.")]
    async fn increment_iteration(
        &self,
        Parameters(params): Parameters<IncrementIterationParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let count = tool_try!(self.storage.increment_iteration(session_id).await);
        text_result(count.to_string())
    }

    #[tool(description = "Set a session's confidence score, clamped to [0, 1].")]
    async fn update_confidence(
        &self,
        Parameters(params): Parameters<UpdateConfidenceParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        tool_try!(self.storage.update_confidence(session_id, params.confidence).await);
        text_result(format!("session {session_id} confidence -> {}", params.confidence.clamp(0.0, 1.0)))
    }

    #[tool(description = "Mark whether a session's active paths have been aggregated into a final synthesis.")]
    async fn set_aggregated(
        &self,
        Parameters(params): Parameters<SetFlagParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        tool_try!(self.storage.set_aggregated(session_id, params.value).await);
        text_result(format!("session {session_id} is_aggregated -> {}", params.value))
    }

    #[tool(description = "Mark whether a session has exhausted its iteration/token budget.")]
    async fn set_budget_exhausted(
        &self,
        Parameters(params): Parameters<SetFlagParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        tool_try!(self.storage.set_budget_exhausted(session_id, params.value).await);
        text_result(format!("session {session_id} budget_exhausted -> {}", params.value))
    }

    #[tool(description = "Acquire a session's advisory lock for `holder`. Fails if another holder's lock is less than 5 minutes old.")]
    async fn acquire_session_lock(
        &self,
        Parameters(params): Parameters<LockSessionParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        tool_try!(self.storage.acquire_lock(session_id, &params.holder).await);
        text_result(format!("session {session_id} locked by {}", params.holder))
    }

    #[tool(description = "Release a session's advisory lock. No-op if `holder` does not currently own it.")]
    async fn release_session_lock(
        &self,
        Parameters(params): Parameters<LockSessionParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        tool_try!(self.storage.release_lock(session_id, &params.holder).await);
        text_result(format!("session {session_id} lock released by {}", params.holder))
    }

    #[tool(description = "Report whether a session is currently locked, and by whom. Locks older than 5 minutes read as unlocked.")]
    async fn is_session_locked(
        &self,
        Parameters(params): Parameters<SessionIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let (locked, holder) = tool_try!(self.storage.is_locked(session_id).await);
        json_result(&serde_json::json!({ "locked": locked, "holder": holder }))
    }

    // -- C3: Graph-of-Thoughts -------------------------------------------

    #[tool(description = "Generate `k` new candidate paths from a query, as children of the session's current active frontier.")]
    async fn generate_paths(
        &self,
        Parameters(params): Parameters<GeneratePathsParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let paths = tool_try!(
            self.storage
                .generate_paths(session_id, params.query, params.k, params.strategy)
                .await
        );
        json_result(&serde_json::json!({
            "success": true,
            "paths": paths,
            "count": paths.len(),
        }))
    }

    #[tool(description = "Replace a path's content with a refined version; the original is superseded, not deleted.")]
    async fn refine_path(
        &self,
        Parameters(params): Parameters<RefinePathParams>,
    ) -> Result<CallToolResult, McpError> {
        let path_id: PathId = parse_id(&params.path_id, "path_id")?;
        let refined = tool_try!(self.storage.refine_path(path_id, params.refined_content, params.summary).await);
        json_result(&refined)
    }

    #[tool(description = "Begin execution of a pending path, transitioning it to running.")]
    async fn start_path_execution(
        &self,
        Parameters(params): Parameters<PathIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let path_id: PathId = parse_id(&params.path_id, "path_id")?;
        let path = tool_try!(self.storage.start_path_execution(path_id).await);
        json_result(&path)
    }

    #[tool(description = "Deliver a running path's content, transitioning it to completed.")]
    async fn complete_path_execution(
        &self,
        Parameters(params): Parameters<CompletePathExecutionParams>,
    ) -> Result<CallToolResult, McpError> {
        let path_id: PathId = parse_id(&params.path_id, "path_id")?;
        let path = tool_try!(
            self.storage
                .complete_path_execution(path_id, params.content, params.summary)
                .await
        );
        json_result(&path)
    }

    #[tool(description = "Score every completed-but-unscored path in a session and prune all but the top `keep_top_n` scorers above `threshold`.")]
    async fn score_and_prune(
        &self,
        Parameters(params): Parameters<ScoreAndPruneParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let (scored, pruned_ids) = tool_try!(
            self.storage
                .score_and_prune(session_id, params.threshold, params.keep_top_n)
                .await
        );
        json_result(&serde_json::json!({
            "success": true,
            "scored": scored,
            "pruned_ids": pruned_ids,
        }))
    }

    #[tool(description = "Merge the given paths into one aggregated node (synthesis: concatenate; voting/consensus: textual union).")]
    async fn aggregate_paths(
        &self,
        Parameters(params): Parameters<AggregatePathsParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let mut path_ids = Vec::with_capacity(params.path_ids.len());
        for raw in params.path_ids {
            path_ids.push(parse_id::<PathId>(&raw, "path_ids")?);
        }
        let (aggregated, conflicts) = tool_try!(
            self.storage
                .aggregate_paths(session_id, path_ids, params.strategy)
                .await
        );
        json_result(&serde_json::json!({
            "success": true,
            "synthesis_path_id": aggregated.path_id,
            "confidence": aggregated.quality_score,
            "sources": aggregated.parent_id,
            "conflicts": conflicts,
        }))
    }

    #[tool(description = "List every path recorded for a session, including pruned and aggregated ones.")]
    async fn list_paths(
        &self,
        Parameters(params): Parameters<SessionIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let paths = tool_try!(self.storage.list_paths(session_id).await);
        json_result(&paths)
    }

    // -- C4: decision engine ----------------------------------------------

    #[tool(description = "Given a session's current state, decide the next action in the research loop (generate, execute, wait, score, aggregate, or synthesize) with its params and a human-readable reasoning string.")]
    async fn get_next_action(
        &self,
        Parameters(params): Parameters<SessionIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let session = tool_try!(self.storage.get_session(session_id).await);
        let paths = tool_try!(self.storage.list_paths(session_id).await);

        let state = GraphState {
            paths: paths
                .iter()
                .map(|p| decision::PathSnapshot {
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
        };
        let result = decision::decide(&state);
        json_result(&serde_json::json!({
            "action": result.action.as_str(),
            "params": result.params,
            "reasoning": result.reasoning,
        }))
    }

    // -- C5: extraction / validation / conflict detection -----------------

    #[tool(description = "Extract facts and/or entities (and, optionally, relationships between them) from free text. mode: fact, entity, or all.")]
    async fn extract(
        &self,
        Parameters(params): Parameters<ExtractParams>,
    ) -> Result<CallToolResult, McpError> {
        let mode = tool_try!(ExtractMode::parse(&params.mode));
        let extract_relations = params.extract_relations.unwrap_or(true);
        let key = batch::content_hash(&format!("{}:{}:{}", params.text, params.mode, extract_relations));
        if let Some(cached) = self.cache.get(CacheFamily::Fact, &key).await {
            return Ok(CallToolResult::success(vec![Content::text(
                serde_json::to_string_pretty(&cached).unwrap_or_default(),
            )]));
        }
        let result = tool_try!(extract::extract(&params.text, mode, extract_relations));
        let value = serde_json::json!({
            "facts": result.facts,
            "entities": result.entities,
            "edges": result.relationships,
            "metadata": {
                "mode": params.mode,
                "total_facts": result.facts.len(),
                "total_entities": result.entities.len(),
                "total_relationships": result.relationships.len(),
                "extraction_quality": result.extraction_quality,
            },
        });
        self.cache.put(CacheFamily::Fact, key, value.clone()).await;
        json_result(&value)
    }

    #[tool(description = "Validate citation completeness and/or rate source quality (A-E). mode: citation, source, or all.")]
    async fn validate(
        &self,
        Parameters(params): Parameters<ValidateParams>,
    ) -> Result<CallToolResult, McpError> {
        let mode = tool_try!(ValidateMode::parse(&params.mode));
        let citations = deserialize_citations(params.citations)?;
        let validated = extract::validate(citations, mode);
        json_result(&validated)
    }

    #[tool(description = "Pairwise-compare facts for the same entity/attribute and flag numeric or temporal conflicts with severity.")]
    async fn conflict_detect(
        &self,
        Parameters(params): Parameters<ConflictDetectParams>,
    ) -> Result<CallToolResult, McpError> {
        let facts = deserialize_facts(params.facts)?;
        let conflicts: Vec<FactConflict> = extract::conflict_detect(&facts);
        json_result(&conflicts)
    }

    // -- C6: batch / cache --------------------------------------------------

    #[tool(description = "Run extract over many texts with bounded concurrency and per-family result caching.")]
    async fn batch_extract(
        &self,
        Parameters(params): Parameters<BatchExtractParams>,
    ) -> Result<CallToolResult, McpError> {
        let mode = tool_try!(ExtractMode::parse(&params.mode));
        let extract_relations = params.extract_relations.unwrap_or(true);
        let config = BatchConfig {
            max_concurrency: params.max_concurrency.unwrap_or(self.config.batch.max_concurrency),
            use_cache: params.use_cache.unwrap_or(self.config.batch.use_cache),
            stop_on_error: params.stop_on_error.unwrap_or(self.config.batch.stop_on_error),
        };
        let cache = self.cache.clone();
        let use_cache = config.use_cache;
        let results = batch::run_batch(params.texts, config, move |text| {
            let cache = cache.clone();
            async move {
                let key = batch::content_hash(&format!("{text}:{mode:?}:{extract_relations}"));
                if use_cache {
                    if let Some(cached) = cache.get(CacheFamily::Fact, &key).await {
                        return Ok((cached, true));
                    }
                }
                let value = extract::extract(&text, mode, extract_relations)
                    .map(|r| serde_json::json!({
                        "facts": r.facts,
                        "entities": r.entities,
                        "edges": r.relationships,
                        "extraction_quality": r.extraction_quality,
                    }))
                    .map_err(|e| e.to_string())?;
                if use_cache {
                    cache.put(CacheFamily::Fact, key, value.clone()).await;
                }
                Ok((value, false))
            }
        })
        .await;
        json_result(&batch_results_to_json(results))
    }

    #[tool(description = "Run validate over many citation batches with bounded concurrency and per-family result caching.")]
    async fn batch_validate(
        &self,
        Parameters(params): Parameters<BatchValidateParams>,
    ) -> Result<CallToolResult, McpError> {
        let mode = tool_try!(ValidateMode::parse(&params.mode));
        let config = BatchConfig {
            max_concurrency: params.max_concurrency.unwrap_or(self.config.batch.max_concurrency),
            use_cache: params.use_cache.unwrap_or(self.config.batch.use_cache),
            stop_on_error: params.stop_on_error.unwrap_or(self.config.batch.stop_on_error),
        };
        let mut batches = Vec::with_capacity(params.citation_batches.len());
        for raw in params.citation_batches {
            batches.push(deserialize_citations(raw)?);
        }
        let cache = self.cache.clone();
        let use_cache = config.use_cache;
        let results = batch::run_batch(batches, config, move |citations| {
            let cache = cache.clone();
            async move {
                let key = batch::content_hash(&serde_json::to_string(&citations).unwrap_or_default());
                if use_cache {
                    if let Some(cached) = cache.get(CacheFamily::Citation, &key).await {
                        return Ok::<_, String>((cached, true));
                    }
                }
                let value = serde_json::to_value(extract::validate(citations, mode)).unwrap_or_default();
                if use_cache {
                    cache.put(CacheFamily::Citation, key, value.clone()).await;
                }
                Ok((value, false))
            }
        })
        .await;
        json_result(&batch_results_to_json(results))
    }

    #[tool(description = "Run conflict_detect over many fact batches with bounded concurrency and per-family result caching.")]
    async fn batch_conflict_detect(
        &self,
        Parameters(params): Parameters<BatchConflictDetectParams>,
    ) -> Result<CallToolResult, McpError> {
        let config = BatchConfig {
            max_concurrency: params.max_concurrency.unwrap_or(self.config.batch.max_concurrency),
            use_cache: params.use_cache.unwrap_or(self.config.batch.use_cache),
            stop_on_error: params.stop_on_error.unwrap_or(self.config.batch.stop_on_error),
        };
        let mut batches = Vec::with_capacity(params.fact_batches.len());
        for raw in params.fact_batches {
            batches.push(deserialize_facts(raw)?);
        }
        let cache = self.cache.clone();
        let use_cache = config.use_cache;
        let results = batch::run_batch(batches, config, move |facts: Vec<Fact>| {
            let cache = cache.clone();
            async move {
                let key = batch::content_hash(&serde_json::to_string(&facts).unwrap_or_default());
                if use_cache {
                    if let Some(cached) = cache.get(CacheFamily::Conflict, &key).await {
                        return Ok::<_, String>((cached, true));
                    }
                }
                let value = serde_json::to_value(extract::conflict_detect(&facts)).unwrap_or_default();
                if use_cache {
                    cache.put(CacheFamily::Conflict, key, value.clone()).await;
                }
                Ok((value, false))
            }
        })
        .await;
        json_result(&batch_results_to_json(results))
    }

    #[tool(description = "Report per-family (fact, entity, citation, source_rating, conflict) cache size/hit/miss/hit-rate counters.")]
    async fn cache_stats(&self, Parameters(_params): Parameters<EmptyParams>) -> Result<CallToolResult, McpError> {
        json_result(&self.cache.stats().await)
    }

    #[tool(description = "Clear the batch result cache.")]
    async fn cache_clear(&self, Parameters(_params): Parameters<EmptyParams>) -> Result<CallToolResult, McpError> {
        self.cache.clear().await;
        text_result("cache cleared")
    }

    // -- C7: auto-process pipeline / ingestion -----------------------------

    #[tool(description = "Sweep a directory of markdown research output and emit fact_ledger.md, entity_graph.md, citation_validation.md, and/or conflict_report.md for the requested operations.")]
    async fn auto_process_data(
        &self,
        Parameters(params): Parameters<AutoProcessDataParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let outcome = tool_try!(
            orchestrator_core::pipeline::auto_process_data(
                &PathBuf::from(&params.input_dir),
                &PathBuf::from(&params.output_dir),
                params.operations,
                params.continue_on_error.unwrap_or(true),
            )
            .await
        );
        match outcome {
            orchestrator_core::pipeline::AutoProcessOutcome::Empty { message } => {
                json_result(&serde_json::json!({
                    "success": true,
                    "session_id": session_id,
                    "message": message,
                }))
            }
            orchestrator_core::pipeline::AutoProcessOutcome::Processed(report) => {
                let warnings: Vec<&String> = report
                    .stages
                    .iter()
                    .filter_map(|s| s.warning.as_ref())
                    .collect();
                json_result(&serde_json::json!({
                    "success": true,
                    "session_id": session_id,
                    "results": report.stages.iter().map(|s| serde_json::json!({
                        "operation": s.stage,
                        "success": s.success,
                        "detail": s.detail,
                    })).collect::<Vec<_>>(),
                    "summary": { "files_processed": report.files_processed },
                    "warnings": warnings,
                }))
            }
        }
    }

    #[tool(description = "Stage a single payload of raw research content in the ingest queue for later processing.")]
    async fn ingest_content(
        &self,
        Parameters(params): Parameters<IngestContentParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let item = tool_try!(self.storage.ingest_content(session_id, params.payload).await);
        json_result(&item)
    }

    #[tool(description = "Stage many payloads of raw research content in the ingest queue in a single transaction.")]
    async fn batch_ingest(
        &self,
        Parameters(params): Parameters<BatchIngestParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let items = tool_try!(self.storage.batch_ingest(session_id, params.payloads).await);
        json_result(&items)
    }

    #[tool(description = "List everything staged in a session's ingest queue.")]
    async fn list_ingest_queue(
        &self,
        Parameters(params): Parameters<SessionIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        let items = tool_try!(self.storage.list_ingest_queue(session_id).await);
        json_result(&items)
    }

    #[tool(description = "Run extraction, validation, and conflict detection over a raw block of text in one call.")]
    async fn process_raw(
        &self,
        Parameters(params): Parameters<ProcessRawParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        tool_try!(self.storage.get_session(session_id).await);
        let extracted = tool_try!(extract::extract(&params.raw_text, ExtractMode::All, true));
        let conflicts = extract::conflict_detect(&extracted.facts);
        json_result(&serde_json::json!({
            "facts": extracted.facts,
            "entities": extracted.entities,
            "edges": extracted.relationships,
            "extraction_quality": extracted.extraction_quality,
            "conflicts": conflicts,
        }))
    }

    #[tool(description = "Permanently delete a session and every record that references it (agents, paths, facts, citations, conflicts, activity log, checkpoints).")]
    async fn delete_session_cascade(
        &self,
        Parameters(params): Parameters<DeleteSessionParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id: SessionId = parse_id(&params.session_id, "session_id")?;
        tool_try!(self.storage.delete_session_cascade(session_id).await);
        text_result(format!("session {session_id} deleted"))
    }

    #[tool(description = "Sweep session-scoped tables for rows whose session no longer exists; returns the number of orphan rows removed.")]
    async fn cleanup_orphan_records(
        &self,
        Parameters(_params): Parameters<EmptyParams>,
    ) -> Result<CallToolResult, McpError> {
        let removed = tool_try!(self.storage.cleanup_orphan_records().await);
        text_result(format!("removed {removed} orphan record(s)"))
    }

    // -- legacy aliases ------------------------------------------------------
    // Pre-unification tool names, kept for clients that haven't migrated to
    // the unified extract/validate operators.

    #[tool(description = "Legacy alias for extract(mode: fact).")]
    async fn fact_extract(
        &self,
        Parameters(params): Parameters<ExtractParams>,
    ) -> Result<CallToolResult, McpError> {
        let result = tool_try!(extract::extract(&params.text, ExtractMode::Fact, false));
        json_result(&result.facts)
    }

    #[tool(description = "Legacy alias for extract(mode: entity).")]
    async fn entity_extract(
        &self,
        Parameters(params): Parameters<ExtractParams>,
    ) -> Result<CallToolResult, McpError> {
        let result = tool_try!(extract::extract(&params.text, ExtractMode::Entity, false));
        json_result(&result.entities)
    }

    #[tool(description = "Legacy alias for validate(mode: citation).")]
    async fn citation_validate(
        &self,
        Parameters(params): Parameters<ValidateParams>,
    ) -> Result<CallToolResult, McpError> {
        let citations = deserialize_citations(params.citations)?;
        json_result(&extract::validate(citations, ValidateMode::Citation))
    }

    #[tool(description = "Legacy alias for validate(mode: source).")]
    async fn source_rate(
        &self,
        Parameters(params): Parameters<ValidateParams>,
    ) -> Result<CallToolResult, McpError> {
        let citations = deserialize_citations(params.citations)?;
        json_result(&extract::validate(citations, ValidateMode::Source))
    }
}

fn deserialize_facts(raw: Vec<serde_json::Value>) -> Result<Vec<Fact>, McpError> {
    raw.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Fact>, _>>()
        .map_err(|e| McpError::new(ErrorCode::INVALID_PARAMS, format!("invalid fact: {e}"), None::<serde_json::Value>))
}

fn deserialize_citations(
    raw: Vec<serde_json::Value>,
) -> Result<Vec<orchestrator_core::types::model::Citation>, McpError> {
    raw.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| McpError::new(ErrorCode::INVALID_PARAMS, format!("invalid citation: {e}"), None::<serde_json::Value>))
}

fn batch_results_to_json<T: serde::Serialize>(results: Vec<batch::BatchItemResult<T>>) -> serde_json::Value {
    serde_json::json!(results
        .into_iter()
        .map(|r| serde_json::json!({
            "index": r.index,
            "ok": r.result.is_ok(),
            "value": r.result.as_ref().ok(),
            "error": r.result.as_ref().err(),
            "cache_hit": r.cache_hit,
        }))
        .collect::<Vec<_>>())
}

#[tool_handler]
impl ServerHandler for OrchestratorMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Research orchestration server: Graph-of-Thoughts session management, \
                 extraction/validation operators, and the pure decision engine driving \
                 the multi-agent research loop."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Start the MCP server over stdio transport.
pub async fn start_mcp_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let storage = Arc::new(Storage::open(&config.db_path).await?);
    let server = OrchestratorMcpServer::new(storage, Arc::new(config));
    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
