//! Investigation prompt templates.

use handlebars::Handlebars;
use serde::Serialize;

use crate::entities::{DataRequestType, RemediateSession};
use crate::errors::{RemediateError, RemediateResult};

/// Characters of one gathered result shown back to the AI.
const MAX_RESULT_CHARS: usize = 4000;

/// System prompt sent with every investigation step.
pub const INVESTIGATION_SYSTEM_PROMPT: &str = "You are a Kubernetes troubleshooting expert. \
You investigate issues by requesting read-only cluster data one step at a time, \
then conclude with a root cause and a remediation plan. \
You never request anything that changes cluster state.";

/// Rendered-context for one investigation step.
#[derive(Debug, Serialize)]
struct InvestigationPromptData<'a> {
    issue: &'a str,
    context: Option<String>,
    policy: Option<&'a str>,
    step: u32,
    max_iterations: u32,
    request_types: Vec<&'static str>,
    gather_tool: &'a str,
    complete_tool: &'a str,
    history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
struct HistoryEntry {
    step: u32,
    analysis: String,
    results: Vec<GatheredEntry>,
}

#[derive(Debug, Serialize)]
struct GatheredEntry {
    key: String,
    value: String,
}

/// Manages Handlebars prompt templates.
pub struct PromptManager {
    handlebars: Handlebars<'static>,
}

impl PromptManager {
    /// Create a prompt manager with the embedded templates.
    pub fn new() -> RemediateResult<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars
            .register_template_string("investigate", INVESTIGATE_TEMPLATE)
            .map_err(|e| RemediateError::Template(e.to_string()))?;
        Ok(Self { handlebars })
    }

    /// Render the user prompt for the next step of `session`.
    pub fn investigation_prompt(
        &self,
        session: &RemediateSession,
        step: u32,
        max_iterations: u32,
        gather_tool: &str,
        complete_tool: &str,
    ) -> RemediateResult<String> {
        let context = session
            .context
            .as_ref()
            .map(serde_json::to_string_pretty)
            .transpose()?;

        let history = session
            .iterations
            .iter()
            .map(|iteration| HistoryEntry {
                step: iteration.step,
                analysis: iteration.ai_analysis.clone(),
                results: iteration
                    .gathered_data
                    .iter()
                    .map(|(key, value)| GatheredEntry {
                        key: key.clone(),
                        value: render_result(value),
                    })
                    .collect(),
            })
            .collect();

        let data = InvestigationPromptData {
            issue: &session.issue,
            context,
            policy: session.policy.as_deref(),
            step,
            max_iterations,
            request_types: DataRequestType::ALL.iter().map(|t| t.as_str()).collect(),
            gather_tool,
            complete_tool,
            history,
        };

        self.handlebars
            .render("investigate", &data)
            .map_err(|e| RemediateError::Template(e.to_string()))
    }
}

fn render_result(value: &serde_json::Value) -> String {
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() <= MAX_RESULT_CHARS {
        return text;
    }
    let truncated: String = text.chars().take(MAX_RESULT_CHARS).collect();
    format!("{truncated}\n... (truncated)")
}

const INVESTIGATE_TEMPLATE: &str = r#"## Issue
{{issue}}
{{#if context}}

## Context
{{context}}
{{/if}}
{{#if policy}}

## Policy
{{policy}}
{{/if}}
{{#if history}}

## Investigation so far
{{#each history}}
### Step {{step}}
{{analysis}}
{{#each results}}
#### {{key}}
{{value}}
{{/each}}
{{/each}}
{{/if}}

## Step {{step}} of {{max_iterations}}
Either request more data or conclude. Reply with your reasoning, then one or
more fenced ```json blocks.

To request read-only cluster data (type must be one of: {{#each request_types}}{{this}}{{#unless @last}}, {{/unless}}{{/each}}):
```json
{"tool": "{{gather_tool}}", "arguments": {"type": "logs", "resource": "pod/example --tail=100", "namespace": "default", "rationale": "why this data helps"}}
```

When you know the root cause:
```json
{"tool": "{{complete_tool}}", "arguments": {"rootCause": "...", "confidence": 0.9, "factors": ["..."], "remediation": {"summary": "...", "actions": [{"description": "...", "command": "kubectl ...", "risk": "low", "rationale": "..."}], "risk": "low"}}}
```
Risk is one of low, medium, high. Confidence is between 0 and 1.
"#;
