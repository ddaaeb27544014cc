//! Session storage trait definition.

use async_trait::async_trait;

use crate::entities::{RemediateSession, SessionOptions};
use crate::errors::RemediateResult;

/// Persistence for investigation sessions.
///
/// Implementations must make a saved session readable by a later
/// `load_session` in the same or another process.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create and persist a new session in the `investigating` state.
    async fn create_session(
        &self,
        issue: &str,
        options: SessionOptions,
    ) -> RemediateResult<RemediateSession>;

    /// Load a session by id. `Ok(None)` when it does not exist.
    async fn load_session(&self, session_id: &str) -> RemediateResult<Option<RemediateSession>>;

    /// Persist the full session state, replacing any previous copy.
    async fn save_session(&self, session: &RemediateSession) -> RemediateResult<()>;
}
