//! Remediate domain facade.

use std::sync::Arc;

use tracing::info;

use super::investigation::Investigator;
use crate::entities::{RemediateInput, RemediateOutput, SessionOptions};
use crate::errors::{RemediateError, RemediateResult};
use crate::storage::SessionStore;

/// Remediate domain facade backing the `remediate` tool.
pub struct RemediateDomain {
    investigator: Investigator,
    store: Arc<dyn SessionStore>,
}

impl RemediateDomain {
    pub fn new(investigator: Investigator, store: Arc<dyn SessionStore>) -> Self {
        Self {
            investigator,
            store,
        }
    }

    /// Investigate an issue, or return a stored result when `sessionId` is set.
    ///
    /// Input is validated before any session exists. An investigation that
    /// fails is returned as [`RemediateError::InvestigationFailed`] carrying
    /// the session id.
    pub async fn remediate(&self, input: RemediateInput) -> RemediateResult<RemediateOutput> {
        if let Some(session_id) = input
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            let gates = input.gates()?;
            let session = self
                .store
                .load_session(session_id)
                .await?
                .ok_or_else(|| RemediateError::SessionNotFound(session_id.to_string()))?;
            return Ok(RemediateOutput::from_session(&session, &gates));
        }

        let request = input.validate()?;
        let mut session = self
            .store
            .create_session(
                &request.issue,
                SessionOptions {
                    mode: request.mode,
                    context: request.context,
                    policy: request.policy,
                },
            )
            .await?;
        info!(session_id = %session.session_id, mode = %session.mode, "Starting investigation");

        self.investigator
            .investigate(&mut session)
            .await
            .map_err(|source| RemediateError::InvestigationFailed {
                session_id: session.session_id.clone(),
                source: Box::new(source),
            })?;

        Ok(RemediateOutput::from_session(&session, &request.gates))
    }
}
