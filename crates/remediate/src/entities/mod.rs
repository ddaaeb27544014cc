//! Core entities for remediation sessions.

mod output;
mod request;
mod session;

pub use output::{
    AnalysisSummary, AutoExecutionDecision, ExecutionGates, InvestigationSummary, OutputStatus,
    RemediateInput, RemediateOutput, RemediateRequest, RemediationSummary,
    DEFAULT_CONFIDENCE_THRESHOLD, MAX_ISSUE_CHARS,
};
pub use request::{DataRequest, DataRequestType, ReadOnlyQuery};
pub use session::{
    FinalAnalysis, InvestigationIteration, RemediateContext, RemediateMode, RemediateSession,
    RemediationAction, RemediationPlan, RiskLevel, SessionOptions, SessionStatus,
};
