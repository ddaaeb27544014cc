//! Investigation session entities.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::request::DataRequest;
use crate::errors::RemediateError;

/// Whether remediation actions may be executed without a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemediateMode {
    #[default]
    Manual,
    Automatic,
}

impl fmt::Display for RemediateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Automatic => write!(f, "automatic"),
        }
    }
}

impl FromStr for RemediateMode {
    type Err = RemediateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "automatic" => Ok(Self::Automatic),
            other => Err(RemediateError::InvalidInput(format!(
                "mode must be 'manual' or 'automatic', got '{other}'"
            ))),
        }
    }
}

/// Risk classification for a remediation action or plan.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl FromStr for RiskLevel {
    type Err = RemediateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(RemediateError::InvalidInput(format!(
                "risk level must be low, medium or high, got '{other}'"
            ))),
        }
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Investigating,
    AnalysisComplete,
    MaxIterationsReached,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Investigating)
    }
}

/// Issue context supplied by the caller alongside the issue text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediateContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_spec: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_events: Vec<Value>,
}

impl RemediateContext {
    pub fn is_empty(&self) -> bool {
        self.event.is_none()
            && self.logs.is_empty()
            && self.metrics.is_none()
            && self.pod_spec.is_none()
            && self.related_events.is_empty()
    }
}

/// One proposed remediation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationAction {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub risk: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// The proposed fix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationPlan {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub actions: Vec<RemediationAction>,
    #[serde(default)]
    pub risk: RiskLevel,
}

/// Terminal analysis of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalAnalysis {
    pub root_cause: String,
    pub confidence: f64,
    #[serde(default)]
    pub factors: Vec<String>,
    #[serde(default)]
    pub remediation: RemediationPlan,
}

/// One gather → ask → decide cycle. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationIteration {
    pub step: u32,
    pub ai_analysis: String,
    #[serde(default)]
    pub data_requests: Vec<DataRequest>,
    #[serde(default)]
    pub gathered_data: BTreeMap<String, Value>,
    pub complete: bool,
    pub timestamp: DateTime<Utc>,
}

/// A persisted investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediateSession {
    pub session_id: String,
    pub issue: String,
    pub mode: RemediateMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<RemediateContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(default)]
    pub iterations: Vec<InvestigationIteration>,
    pub status: SessionStatus,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_analysis: Option<FinalAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RemediateSession {
    /// A fresh session with no iterations.
    pub fn new(session_id: impl Into<String>, issue: impl Into<String>, options: SessionOptions) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            issue: issue.into(),
            mode: options.mode,
            context: options.context.filter(|c| !c.is_empty()),
            policy: options.policy,
            iterations: Vec::new(),
            status: SessionStatus::Investigating,
            created: now,
            updated: now,
            final_analysis: None,
            error: None,
        }
    }

    /// Keys of every piece of gathered data, in step order.
    pub fn data_gathered(&self) -> Vec<String> {
        self.iterations
            .iter()
            .flat_map(|it| it.gathered_data.keys().cloned())
            .collect()
    }

    pub fn touch(&mut self) {
        self.updated = Utc::now();
    }
}

/// Options recorded on a session at creation.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub mode: RemediateMode,
    pub context: Option<RemediateContext>,
    pub policy: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("manual".parse::<RemediateMode>().unwrap(), RemediateMode::Manual);
        assert_eq!(
            "automatic".parse::<RemediateMode>().unwrap(),
            RemediateMode::Automatic
        );
        assert!("auto".parse::<RemediateMode>().is_err());
    }

    #[test]
    fn test_risk_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert_eq!("high".parse::<RiskLevel>().unwrap(), RiskLevel::High);
    }

    #[test]
    fn test_session_serializes_camel_case() {
        let session = RemediateSession::new("rem_1", "pod crashlooping", SessionOptions::default());
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["sessionId"], "rem_1");
        assert_eq!(json["status"], "investigating");
        assert_eq!(json["mode"], "manual");
        assert!(json.get("context").is_none());
    }

    #[test]
    fn test_empty_context_dropped() {
        let session = RemediateSession::new(
            "rem_1",
            "issue",
            SessionOptions {
                context: Some(RemediateContext::default()),
                ..Default::default()
            },
        );
        assert!(session.context.is_none());
    }
}
