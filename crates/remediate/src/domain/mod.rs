//! Domain facades for remediation.
//!
//! These combine the investigation loop with validation and session storage.

mod investigation;
mod remediate;

pub use investigation::{
    interpret_response, AiDecision, Investigator, COMPLETE_TOOL, GATHER_DATA_TOOL, MAX_ITERATIONS,
};
pub use remediate::RemediateDomain;
