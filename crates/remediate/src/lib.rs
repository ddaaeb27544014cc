#![warn(clippy::pedantic)]
// Allow common pedantic lints that don't affect correctness
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::map_unwrap_or)]

//! # Remediate
//!
//! AI-driven investigation of Kubernetes issues.
//!
//! This crate provides:
//! - A bounded investigation loop where an AI requests read-only cluster data
//!   step by step until it concludes (at most 20 steps)
//! - A fixed read-only query vocabulary (`get`, `describe`, `logs`, `events`,
//!   `top`) enforced before anything reaches the cluster
//! - Tool-call extraction from fenced ```json blocks in AI output
//! - AI calls guarded by the `ai-backend` circuit breaker
//! - File-based session storage and an MCP stdio server
//!
//! ## Example
//!
//! ```rust,ignore
//! use remediate::{RemediateDomain, RemediateInput};
//!
//! let output = domain
//!     .remediate(RemediateInput {
//!         issue: "api pods are crashlooping".to_string(),
//!         ..RemediateInput::default()
//!     })
//!     .await?;
//! println!("{}", output.analysis.root_cause);
//! ```

// Core entities
pub mod entities;

// Error types
pub mod errors;

// Configuration
pub mod config;

// Tool-call extraction
pub mod extract;

// AI integration
pub mod ai;

// Read-only cluster access
pub mod cluster;

// Storage layer
pub mod storage;

// Domain facades
pub mod domain;

// MCP server
pub mod mcp;

// Re-export key types for convenience
pub use cluster::{ClusterQueryExecutor, KubectlExecutor};
pub use config::RemediateConfig;
pub use domain::{Investigator, RemediateDomain, MAX_ITERATIONS};
pub use entities::{
    DataRequest, DataRequestType, ReadOnlyQuery, RemediateInput, RemediateOutput,
    RemediateSession, SessionStatus,
};
pub use errors::{RemediateError, RemediateResult};
pub use extract::{extract_tool_calls, ToolCall};
pub use mcp::McpServer;
pub use storage::{FileSessionStore, SessionStore};

// Re-export AI types
pub use ai::{AIProvider, AiBackend, AnthropicProvider, GuardedAiBackend};
