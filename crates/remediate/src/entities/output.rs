//! Tool-facing input and output shapes for `remediate`.

use serde::{Deserialize, Serialize};

use super::session::{
    FinalAnalysis, RemediateContext, RemediateMode, RemediateSession, RemediationAction,
    RiskLevel, SessionStatus,
};
use crate::errors::{RemediateError, RemediateResult};

/// Maximum issue length in characters.
pub const MAX_ISSUE_CHARS: usize = 2000;

/// Default confidence required before automatic execution is considered.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Raw `remediate` tool arguments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediateInput {
    #[serde(default)]
    pub issue: String,
    #[serde(default)]
    pub context: Option<RemediateContext>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub policy: Option<String>,
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
    #[serde(default)]
    pub max_risk_level: Option<String>,
    /// Look up a finished investigation instead of starting one
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Gates an analysis must pass before automatic execution is considered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionGates {
    pub confidence_threshold: f64,
    pub max_risk_level: RiskLevel,
}

impl Default for ExecutionGates {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_risk_level: RiskLevel::Low,
        }
    }
}

/// Input that passed validation.
#[derive(Debug, Clone)]
pub struct RemediateRequest {
    pub issue: String,
    pub context: Option<RemediateContext>,
    pub mode: RemediateMode,
    pub policy: Option<String>,
    pub gates: ExecutionGates,
}

impl RemediateInput {
    /// Parse the optional execution gates.
    pub fn gates(&self) -> RemediateResult<ExecutionGates> {
        let confidence_threshold = match self.confidence_threshold {
            Some(t) if !(0.0..=1.0).contains(&t) => {
                return Err(RemediateError::InvalidInput(format!(
                    "confidenceThreshold must be between 0 and 1, got {t}"
                )));
            }
            Some(t) => t,
            None => DEFAULT_CONFIDENCE_THRESHOLD,
        };
        let max_risk_level = match self.max_risk_level.as_deref() {
            Some(level) => level.parse()?,
            None => RiskLevel::Low,
        };
        Ok(ExecutionGates {
            confidence_threshold,
            max_risk_level,
        })
    }

    /// Validate a new investigation request.
    pub fn validate(self) -> RemediateResult<RemediateRequest> {
        let issue = self.issue.trim().to_string();
        if issue.is_empty() {
            return Err(RemediateError::InvalidInput(
                "issue must not be empty".to_string(),
            ));
        }
        let issue_chars = issue.chars().count();
        if issue_chars > MAX_ISSUE_CHARS {
            return Err(RemediateError::InvalidInput(format!(
                "issue must be at most {MAX_ISSUE_CHARS} characters, got {issue_chars}"
            )));
        }

        let mode = match self.mode.as_deref() {
            Some(mode) => mode.parse()?,
            None => RemediateMode::Manual,
        };
        let gates = self.gates()?;
        let policy = self
            .policy
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        Ok(RemediateRequest {
            issue,
            context: self.context,
            mode,
            policy,
            gates,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationSummary {
    pub iterations: usize,
    pub data_gathered: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub root_cause: String,
    pub confidence: f64,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationSummary {
    pub summary: String,
    pub actions: Vec<RemediationAction>,
    pub risk: RiskLevel,
}

/// Outcome of the automatic-mode gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoExecutionDecision {
    pub auto_execution_eligible: bool,
    pub fallback_reason: String,
}

/// Result of the `remediate` tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediateOutput {
    pub status: OutputStatus,
    pub session_id: String,
    pub issue: String,
    pub mode: RemediateMode,
    pub terminal_state: SessionStatus,
    pub investigation: InvestigationSummary,
    pub analysis: AnalysisSummary,
    pub remediation: RemediationSummary,
    pub executed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automatic: Option<AutoExecutionDecision>,
    pub message: String,
}

impl RemediateOutput {
    /// Build the tool output from a terminal session.
    pub fn from_session(session: &RemediateSession, gates: &ExecutionGates) -> Self {
        let analysis = session.final_analysis.clone().unwrap_or_default();
        let status = if session.status == SessionStatus::Failed {
            OutputStatus::Failed
        } else {
            OutputStatus::Success
        };

        let message = match session.status {
            SessionStatus::AnalysisComplete => format!(
                "Investigation complete after {} iteration(s)",
                session.iterations.len()
            ),
            SessionStatus::MaxIterationsReached => format!(
                "MAX_ITERATIONS_REACHED: stopped after {} iterations without an explicit conclusion",
                session.iterations.len()
            ),
            SessionStatus::Failed => session
                .error
                .clone()
                .unwrap_or_else(|| "Investigation failed".to_string()),
            SessionStatus::Investigating => "Investigation in progress".to_string(),
        };

        let automatic = (session.mode == RemediateMode::Automatic)
            .then(|| Self::gate_decision(session.status, &analysis, gates));

        Self {
            status,
            session_id: session.session_id.clone(),
            issue: session.issue.clone(),
            mode: session.mode,
            terminal_state: session.status,
            investigation: InvestigationSummary {
                iterations: session.iterations.len(),
                data_gathered: session.data_gathered(),
            },
            analysis: AnalysisSummary {
                root_cause: analysis.root_cause,
                confidence: analysis.confidence,
                factors: analysis.factors,
            },
            remediation: RemediationSummary {
                summary: analysis.remediation.summary,
                actions: analysis.remediation.actions,
                risk: analysis.remediation.risk,
            },
            // Execution is an external collaborator; nothing is run here.
            executed: false,
            automatic,
            message,
        }
    }

    fn gate_decision(
        status: SessionStatus,
        analysis: &FinalAnalysis,
        gates: &ExecutionGates,
    ) -> AutoExecutionDecision {
        let plan = &analysis.remediation;
        let failed_gate = if status != SessionStatus::AnalysisComplete {
            Some("investigation did not reach an explicit conclusion".to_string())
        } else if plan.actions.is_empty() {
            Some("no remediation actions were proposed".to_string())
        } else if analysis.confidence < gates.confidence_threshold {
            Some(format!(
                "confidence {:.2} is below threshold {:.2}",
                analysis.confidence, gates.confidence_threshold
            ))
        } else if plan.risk > gates.max_risk_level {
            Some(format!(
                "risk '{}' exceeds maximum '{}'",
                plan.risk, gates.max_risk_level
            ))
        } else {
            None
        };

        match failed_gate {
            Some(reason) => AutoExecutionDecision {
                auto_execution_eligible: false,
                fallback_reason: format!("{reason}; actions returned for manual review"),
            },
            None => AutoExecutionDecision {
                auto_execution_eligible: true,
                fallback_reason: "no remediation executor is configured; actions returned for manual review"
                    .to_string(),
            },
        }
    }
}
