//! JSON-RPC over stdio against an in-memory transport.

use std::sync::Arc;

use async_trait::async_trait;
use circuit_breaker::{CircuitBreakerConfig, CircuitBreakerFactory};
use serde_json::{json, Value};
use tempfile::TempDir;

use remediate::ai::{AiBackend, AiReply};
use remediate::{
    ClusterQueryExecutor, FileSessionStore, Investigator, McpServer, ReadOnlyQuery,
    RemediateDomain, RemediateError, RemediateResult,
};

struct ConcludingAi;

#[async_trait]
impl AiBackend for ConcludingAi {
    async fn send_message(&self, _prompt: &str) -> RemediateResult<AiReply> {
        Ok(AiReply {
            content: r#"```json
{"tool": "complete_investigation", "arguments": {"rootCause": "Image tag does not exist", "confidence": 0.85, "factors": ["ErrImagePull"]}}
```"#
                .to_string(),
            usage: None,
        })
    }
}

struct NoCluster;

#[async_trait]
impl ClusterQueryExecutor for NoCluster {
    async fn execute_read_only_query(&self, _query: &ReadOnlyQuery) -> RemediateResult<String> {
        Err(RemediateError::Cluster("no cluster in tests".to_string()))
    }
}

fn server(dir: &std::path::Path) -> (McpServer, Arc<CircuitBreakerFactory>) {
    let store = Arc::new(FileSessionStore::new(dir));
    let investigator =
        Investigator::new(Arc::new(ConcludingAi), Arc::new(NoCluster), store.clone()).unwrap();
    let breakers = Arc::new(CircuitBreakerFactory::new(CircuitBreakerConfig::default()));
    (
        McpServer::new(RemediateDomain::new(investigator, store), breakers.clone()),
        breakers,
    )
}

async fn exchange(server: &McpServer, requests: &[Value]) -> Vec<Value> {
    let input: String = requests
        .iter()
        .map(|r| format!("{r}\n"))
        .collect();
    let reader = tokio::io::BufReader::new(input.as_bytes());
    let mut output = Vec::new();
    server.serve(reader, &mut output).await.unwrap();

    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn tool_body(response: &Value) -> Value {
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[tokio::test]
async fn test_initialize_and_list_tools() {
    let temp_dir = TempDir::new().unwrap();
    let (server, _) = server(temp_dir.path());

    let responses = exchange(
        &server,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        ],
    )
    .await;

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "remediate-mcp");
    let names: Vec<&str> = responses[1]["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["remediate", "circuit_status"]);
}

#[tokio::test]
async fn test_remediate_tool_call() {
    let temp_dir = TempDir::new().unwrap();
    let (server, _) = server(temp_dir.path());

    let responses = exchange(
        &server,
        &[json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": {"name": "remediate", "arguments": {"issue": "web pods stuck in ImagePullBackOff"}}
        })],
    )
    .await;

    assert_eq!(responses[0]["id"], 7);
    assert!(responses[0]["result"].get("isError").is_none());
    let body = tool_body(&responses[0]);
    assert_eq!(body["status"], "success");
    assert_eq!(body["terminalState"], "analysis_complete");
    assert_eq!(body["analysis"]["rootCause"], "Image tag does not exist");
    assert_eq!(body["executed"], false);
}

#[tokio::test]
async fn test_empty_issue_is_tool_error() {
    let temp_dir = TempDir::new().unwrap();
    let sessions = temp_dir.path().join("sessions");
    let (server, _) = server(&sessions);

    let responses = exchange(
        &server,
        &[json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "remediate", "arguments": {"issue": ""}}
        })],
    )
    .await;

    assert_eq!(responses[0]["result"]["isError"], true);
    let body = tool_body(&responses[0]);
    assert_eq!(body["status"], "failed");
    assert!(body["error"].as_str().unwrap().contains("issue"));
    assert!(!sessions.exists());
}

#[tokio::test]
async fn test_circuit_status_lists_breakers() {
    let temp_dir = TempDir::new().unwrap();
    let (server, breakers) = server(temp_dir.path());
    breakers.get_or_create("ai-backend", None).record_failure();

    let responses = exchange(
        &server,
        &[json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "circuit_status"}
        })],
    )
    .await;

    let body = tool_body(&responses[0]);
    let circuit = &body["circuits"]["ai-backend"];
    assert_eq!(circuit["state"], "CLOSED");
    assert_eq!(circuit["consecutiveFailures"], 1);
}

#[tokio::test]
async fn test_protocol_errors() {
    let temp_dir = TempDir::new().unwrap();
    let (server, _) = server(temp_dir.path());

    let input = "not json\n{\"jsonrpc\":\"2.0\",\"id\":4,\"method\":\"resources/list\"}\n";
    let reader = tokio::io::BufReader::new(input.as_bytes());
    let mut output = Vec::new();
    server.serve(reader, &mut output).await.unwrap();

    let responses: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(responses[0]["error"]["code"], -32700);
    assert_eq!(responses[1]["error"]["code"], -32601);
    assert_eq!(responses[1]["id"], 4);
}
