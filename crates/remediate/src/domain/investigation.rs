//! Bounded AI-driven investigation loop.
//!
//! Each step renders a prompt from the session so far, asks the AI backend
//! what to do next, runs any read-only data requests that pass the safety
//! gate, and appends one iteration to the session. The loop ends when the AI
//! sends a valid completion or the step ceiling is reached.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::ai::{AiBackend, PromptManager};
use crate::cluster::ClusterQueryExecutor;
use crate::entities::{
    DataRequest, FinalAnalysis, InvestigationIteration, ReadOnlyQuery, RemediateSession,
    SessionStatus,
};
use crate::errors::{RemediateError, RemediateResult};
use crate::extract::{extract_tool_calls, strip_json_blocks};
use crate::storage::SessionStore;

/// Hard ceiling on investigation steps.
pub const MAX_ITERATIONS: u32 = 20;

/// Tool name the AI uses to request cluster data.
pub const GATHER_DATA_TOOL: &str = "gather_data";

/// Tool name the AI uses to conclude the investigation.
pub const COMPLETE_TOOL: &str = "complete_investigation";

/// What the AI asked for in one response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiDecision {
    /// Prose with the tool blocks removed
    pub analysis: String,
    pub data_requests: Vec<DataRequest>,
    /// A completion that passed validation
    pub completion: Option<FinalAnalysis>,
    /// Blocks that were recognized but not usable, keyed for `gatheredData`
    pub anomalies: BTreeMap<String, Value>,
}

impl AiDecision {
    pub fn is_complete(&self) -> bool {
        self.completion.is_some()
    }
}

/// Interpret a raw AI response.
///
/// Only a `complete_investigation` block whose arguments validate ends the
/// investigation; the absence of data requests does not.
pub fn interpret_response(text: &str) -> AiDecision {
    let prose = strip_json_blocks(text);
    let mut decision = AiDecision {
        analysis: if prose.is_empty() {
            text.trim().to_string()
        } else {
            prose
        },
        ..AiDecision::default()
    };

    for call in extract_tool_calls(text) {
        match call.tool.as_str() {
            GATHER_DATA_TOOL => {
                match serde_json::from_value::<DataRequest>(call.arguments.clone()) {
                    Ok(request) => decision.data_requests.push(request),
                    Err(e) => insert_unique(
                        &mut decision.anomalies,
                        "gather_data_invalid",
                        json!({"error": e.to_string(), "arguments": call.arguments}),
                    ),
                }
            }
            COMPLETE_TOOL => match parse_completion(&call.arguments) {
                Ok(analysis) if decision.completion.is_none() => {
                    decision.completion = Some(analysis);
                }
                Ok(_) => insert_unique(
                    &mut decision.anomalies,
                    "completion_duplicate",
                    call.arguments,
                ),
                Err(reason) => insert_unique(
                    &mut decision.anomalies,
                    "completion_invalid",
                    json!({"error": reason, "arguments": call.arguments}),
                ),
            },
            other => insert_unique(
                &mut decision.anomalies,
                &format!("unknown_tool_{other}"),
                call.arguments,
            ),
        }
    }

    decision
}

fn parse_completion(arguments: &Value) -> Result<FinalAnalysis, String> {
    let mut analysis: FinalAnalysis =
        serde_json::from_value(arguments.clone()).map_err(|e| e.to_string())?;

    analysis.root_cause = analysis.root_cause.trim().to_string();
    if analysis.root_cause.is_empty() {
        return Err("rootCause must not be empty".to_string());
    }
    if !(0.0..=1.0).contains(&analysis.confidence) {
        return Err(format!(
            "confidence must be between 0 and 1, got {}",
            analysis.confidence
        ));
    }
    if analysis
        .remediation
        .actions
        .iter()
        .any(|a| a.description.trim().is_empty())
    {
        return Err("every remediation action needs a description".to_string());
    }

    // The plan is never rated below its riskiest action.
    let plan = &mut analysis.remediation;
    if let Some(max_action_risk) = plan.actions.iter().map(|a| a.risk).max() {
        plan.risk = plan.risk.max(max_action_risk);
    }

    Ok(analysis)
}

/// Insert under `base`, or `base_2`, `base_3`, ... if taken.
fn insert_unique(map: &mut BTreeMap<String, Value>, base: &str, value: Value) {
    let key = if map.contains_key(base) {
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|k| !map.contains_key(k))
            .unwrap_or_else(|| base.to_string())
    } else {
        base.to_string()
    };
    map.insert(key, value);
}

/// Drives sessions through the investigation loop.
pub struct Investigator {
    ai: Arc<dyn AiBackend>,
    cluster: Arc<dyn ClusterQueryExecutor>,
    store: Arc<dyn SessionStore>,
    prompts: PromptManager,
}

impl Investigator {
    pub fn new(
        ai: Arc<dyn AiBackend>,
        cluster: Arc<dyn ClusterQueryExecutor>,
        store: Arc<dyn SessionStore>,
    ) -> RemediateResult<Self> {
        Ok(Self {
            ai,
            cluster,
            store,
            prompts: PromptManager::new()?,
        })
    }

    /// Run `session` to a terminal state.
    ///
    /// Any error ends the session as `failed`; the failed session is saved
    /// before the error is returned.
    pub async fn investigate(&self, session: &mut RemediateSession) -> RemediateResult<()> {
        match self.run(session).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(session_id = %session.session_id, error = %err, "Investigation failed");
                session.status = SessionStatus::Failed;
                session.error = Some(err.to_string());
                session.touch();
                if let Err(save_err) = self.store.save_session(session).await {
                    warn!(
                        session_id = %session.session_id,
                        error = %save_err,
                        "Failed to persist failed session"
                    );
                }
                Err(err)
            }
        }
    }

    async fn run(&self, session: &mut RemediateSession) -> RemediateResult<()> {
        let first_step = u32::try_from(session.iterations.len())
            .unwrap_or(u32::MAX)
            .saturating_add(1);

        for step in first_step..=MAX_ITERATIONS {
            let prompt = self.prompts.investigation_prompt(
                session,
                step,
                MAX_ITERATIONS,
                GATHER_DATA_TOOL,
                COMPLETE_TOOL,
            )?;

            info!(session_id = %session.session_id, step, "Investigation step");
            let reply = self.ai.send_message(&prompt).await?;
            let decision = interpret_response(&reply.content);

            let mut gathered = decision.anomalies;
            if decision.completion.is_some() {
                if !decision.data_requests.is_empty() {
                    debug!(
                        step,
                        skipped = decision.data_requests.len(),
                        "Completion received; data requests not executed"
                    );
                }
            } else {
                self.gather(&decision.data_requests, &mut gathered).await;
            }

            let complete = decision.completion.is_some();
            session.iterations.push(InvestigationIteration {
                step,
                ai_analysis: decision.analysis,
                data_requests: decision.data_requests,
                gathered_data: gathered,
                complete,
                timestamp: Utc::now(),
            });

            if let Some(analysis) = decision.completion {
                info!(
                    session_id = %session.session_id,
                    step,
                    confidence = analysis.confidence,
                    "Investigation complete"
                );
                session.final_analysis = Some(analysis);
                session.status = SessionStatus::AnalysisComplete;
            }

            session.touch();
            self.store.save_session(session).await?;

            if complete {
                return Ok(());
            }
        }

        warn!(
            session_id = %session.session_id,
            max_iterations = MAX_ITERATIONS,
            "Investigation reached the iteration ceiling without a conclusion"
        );
        session.status = SessionStatus::MaxIterationsReached;
        session.final_analysis = Some(FinalAnalysis {
            root_cause: session
                .iterations
                .last()
                .map(|it| it.ai_analysis.clone())
                .unwrap_or_default(),
            ..FinalAnalysis::default()
        });
        session.touch();
        self.store.save_session(session).await
    }

    /// Run every request that passes the safety gate. Nothing here is fatal.
    async fn gather(&self, requests: &[DataRequest], gathered: &mut BTreeMap<String, Value>) {
        for request in requests {
            let key = request.key();
            let query = match ReadOnlyQuery::from_request(request) {
                Ok(query) => query,
                Err(err) => {
                    warn!(
                        request_type = %request.request_type,
                        resource = %request.resource,
                        "Refused unsafe data request"
                    );
                    insert_unique(
                        gathered,
                        &format!("{key}_rejected"),
                        json!({"error": err.to_string(), "rationale": request.rationale}),
                    );
                    continue;
                }
            };

            match self.cluster.execute_read_only_query(&query).await {
                Ok(output) => insert_unique(gathered, &key, Value::String(output)),
                Err(err) => {
                    debug!(%key, error = %err, "Read-only query failed");
                    let err = match err {
                        RemediateError::Cluster(message) => message,
                        other => other.to_string(),
                    };
                    insert_unique(gathered, &format!("{key}_error"), json!({"error": err}));
                }
            }
        }
    }
}
