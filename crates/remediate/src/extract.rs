//! Tool-call extraction from free-form AI output.
//!
//! The AI embeds structured instructions in fenced ```json blocks. Anything
//! else in the text, including blocks with other language tags, is prose.
//! Malformed blocks are skipped: partial agent output is expected and must
//! not hide the valid blocks around it.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fenced block whose info string is exactly `json`.
static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```json[ \t]*\r?\n(.*?)```").expect("valid fence regex")
});

/// A structured `{tool, arguments}` instruction found in AI output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    pub arguments: Value,
}

/// Extract tool calls from every fenced ```json block in `text`, in source order.
///
/// A block qualifies if it parses to an object with a string `tool` key, or to
/// an array of such objects. Missing or non-object `arguments` become `{}`.
pub fn extract_tool_calls(text: &str) -> Vec<ToolCall> {
    JSON_FENCE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|body| serde_json::from_str::<Value>(body.as_str()).ok())
        .flat_map(|value| match value {
            Value::Array(items) => items,
            other => vec![other],
        })
        .filter_map(into_tool_call)
        .collect()
}

/// Text with every fenced ```json block removed.
pub fn strip_json_blocks(text: &str) -> String {
    JSON_FENCE.replace_all(text, "").trim().to_string()
}

fn into_tool_call(value: Value) -> Option<ToolCall> {
    let Value::Object(mut object) = value else {
        return None;
    };
    let Some(Value::String(tool)) = object.remove("tool") else {
        return None;
    };
    let arguments = match object.remove("arguments") {
        Some(Value::Object(args)) => Value::Object(args),
        _ => Value::Object(Map::new()),
    };
    Some(ToolCall { tool, arguments })
}
