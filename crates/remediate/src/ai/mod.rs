//! AI backend for investigations.
//!
//! [`AIProvider`] is the raw model API; [`AiBackend`] is the narrow
//! prompt-in/reply-out view the investigation loop depends on, and
//! [`GuardedAiBackend`] puts the `ai-backend` circuit breaker in between.

mod anthropic;
mod backend;
mod prompts;
mod provider;

pub use anthropic::{AnthropicProvider, DEFAULT_MODEL};
pub use backend::{AiBackend, AiReply, GuardedAiBackend, AI_BREAKER_NAME};
pub use prompts::{PromptManager, INVESTIGATION_SYSTEM_PROMPT};
pub use provider::{AIMessage, AIProvider, AIResponse, AIRole, GenerateOptions, TokenUsage};
