//! File-based session storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;

use super::traits::SessionStore;
use crate::entities::{RemediateSession, SessionOptions};
use crate::errors::{RemediateError, RemediateResult};

/// New session id: `rem_{YYYYMMDDTHHMMSS}_{8 hex}`.
pub fn generate_session_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("rem_{}_{}", Utc::now().format("%Y%m%dT%H%M%S"), &suffix[..8])
}

/// One pretty-printed JSON file per session: `{dir}/{session_id}.json`.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a session file. Ids that could escape the directory are refused.
    pub fn session_path(&self, session_id: &str) -> RemediateResult<PathBuf> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(RemediateError::InvalidInput(format!(
                "invalid session id '{session_id}'"
            )));
        }
        Ok(self.dir.join(format!("{session_id}.json")))
    }

    async fn ensure_dir(&self) -> RemediateResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| RemediateError::SessionStorage {
                path: self.dir.display().to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create_session(
        &self,
        issue: &str,
        options: SessionOptions,
    ) -> RemediateResult<RemediateSession> {
        self.ensure_dir().await?;
        let session = RemediateSession::new(generate_session_id(), issue, options);
        self.save_session(&session).await?;
        tracing::info!(session_id = %session.session_id, "Created remediation session");
        Ok(session)
    }

    async fn load_session(&self, session_id: &str) -> RemediateResult<Option<RemediateSession>> {
        let path = self.session_path(session_id)?;
        match fs::read_to_string(&path).await {
            Ok(content) => {
                let session = serde_json::from_str(&content).map_err(|e| {
                    RemediateError::SessionStorage {
                        path: path.display().to_string(),
                        reason: format!("corrupt session file: {e}"),
                    }
                })?;
                Ok(Some(session))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RemediateError::SessionStorage {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn save_session(&self, session: &RemediateSession) -> RemediateResult<()> {
        let path = self.session_path(&session.session_id)?;
        self.ensure_dir().await?;

        let content = serde_json::to_string_pretty(session)?;
        fs::write(&path, content)
            .await
            .map_err(|e| RemediateError::SessionStorage {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }
}
