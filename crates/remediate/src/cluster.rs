//! Read-only cluster queries.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::KubectlConfig;
use crate::entities::{DataRequestType, ReadOnlyQuery};
use crate::errors::{RemediateError, RemediateResult};

/// Characters of command output kept per query.
const MAX_OUTPUT_CHARS: usize = 16_000;

/// Runs validated read-only queries against a cluster.
///
/// Accepting only [`ReadOnlyQuery`] means implementations never see a
/// request that failed the safety gate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterQueryExecutor: Send + Sync {
    async fn execute_read_only_query(&self, query: &ReadOnlyQuery) -> RemediateResult<String>;
}

/// [`ClusterQueryExecutor`] backed by the kubectl binary.
pub struct KubectlExecutor {
    config: KubectlConfig,
}

impl KubectlExecutor {
    pub fn new(config: KubectlConfig) -> Self {
        Self { config }
    }

    /// kubectl arguments for `query`.
    pub fn build_args(&self, query: &ReadOnlyQuery) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        let query_args = query.args();

        match query.kind() {
            DataRequestType::Get => {
                args.push("get".to_string());
                args.extend(query_args.iter().cloned());
                args.extend(["-o".to_string(), "yaml".to_string()]);
            }
            DataRequestType::Describe => {
                args.push("describe".to_string());
                args.extend(query_args.iter().cloned());
            }
            DataRequestType::Logs => {
                args.push("logs".to_string());
                args.extend(query_args.iter().cloned());
                if !query_args.iter().any(|a| a.starts_with("--tail")) {
                    args.push(format!("--tail={}", self.config.log_tail_lines));
                }
            }
            DataRequestType::Events => {
                args.extend(["get".to_string(), "events".to_string()]);
                let (target, rest) = query_args.split_first().map_or((None, &[][..]), |(t, r)| {
                    (Some(t.as_str()), r)
                });
                // "pod/api-0" narrows to that object; a bare kind like "pods" lists everything.
                if let Some((_, name)) = target.and_then(|t| t.split_once('/')) {
                    args.push(format!("--field-selector=involvedObject.name={name}"));
                } else if let Some(t) = target.filter(|t| t.starts_with('-')) {
                    args.push(t.to_string());
                }
                args.extend(rest.iter().cloned());
                args.push("--sort-by=.lastTimestamp".to_string());
            }
            DataRequestType::Top => {
                args.push("top".to_string());
                args.extend(query_args.iter().cloned());
            }
        }

        if !query.all_namespaces() {
            let namespace = query
                .namespace()
                .or(self.config.default_namespace.as_deref());
            if let Some(ns) = namespace {
                args.extend(["-n".to_string(), ns.to_string()]);
            }
        }
        if let Some(kubeconfig) = &self.config.kubeconfig {
            args.push(format!("--kubeconfig={}", kubeconfig.display()));
        }
        if let Some(context) = &self.config.context {
            args.push(format!("--context={context}"));
        }

        args
    }
}

#[async_trait]
impl ClusterQueryExecutor for KubectlExecutor {
    async fn execute_read_only_query(&self, query: &ReadOnlyQuery) -> RemediateResult<String> {
        let args = self.build_args(query);
        tracing::debug!(binary = %self.config.binary, ?args, "Running read-only query");

        let output = Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                RemediateError::Cluster(format!("failed to run {}: {e}", self.config.binary))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RemediateError::Cluster(format!(
                "{} {} exited with {}: {}",
                self.config.binary,
                query.kind(),
                output.status,
                stderr.trim()
            )));
        }

        Ok(truncate(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_OUTPUT_CHARS {
        return text.to_string();
    }
    let kept: String = text.chars().take(MAX_OUTPUT_CHARS).collect();
    format!("{kept}\n... (output truncated)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::DataRequest;
    use std::path::PathBuf;

    fn query(kind: &str, resource: &str, namespace: Option<&str>) -> ReadOnlyQuery {
        ReadOnlyQuery::from_request(&DataRequest {
            request_type: kind.to_string(),
            resource: resource.to_string(),
            namespace: namespace.map(str::to_string),
            rationale: String::new(),
        })
        .unwrap()
    }

    fn executor() -> KubectlExecutor {
        KubectlExecutor::new(KubectlConfig::default())
    }

    #[test]
    fn test_get_outputs_yaml() {
        assert_eq!(
            executor().build_args(&query("get", "pod/api-0", Some("prod"))),
            ["get", "pod/api-0", "-o", "yaml", "-n", "prod"]
        );
    }

    #[test]
    fn test_logs_default_tail() {
        assert_eq!(
            executor().build_args(&query("logs", "pod/api-0 -c server", None)),
            ["logs", "pod/api-0", "-c", "server", "--tail=200"]
        );
        assert_eq!(
            executor().build_args(&query("logs", "pod/api-0 --tail=20", None)),
            ["logs", "pod/api-0", "--tail=20"]
        );
    }

    #[test]
    fn test_events_for_named_object() {
        assert_eq!(
            executor().build_args(&query("events", "pod/api-0", Some("prod"))),
            [
                "get",
                "events",
                "--field-selector=involvedObject.name=api-0",
                "--sort-by=.lastTimestamp",
                "-n",
                "prod"
            ]
        );
        assert_eq!(
            executor().build_args(&query("events", "pods", None)),
            ["get", "events", "--sort-by=.lastTimestamp"]
        );
    }

    #[test]
    fn test_all_namespaces_skips_namespace_flag() {
        let executor = KubectlExecutor::new(KubectlConfig {
            default_namespace: Some("default".to_string()),
            ..KubectlConfig::default()
        });
        assert_eq!(
            executor.build_args(&query("top", "pods -A", Some("prod"))),
            ["top", "pods", "-A"]
        );
        assert_eq!(
            executor.build_args(&query("describe", "node/worker-1", None)),
            ["describe", "node/worker-1", "-n", "default"]
        );
    }

    #[test]
    fn test_kubeconfig_and_context_appended() {
        let executor = KubectlExecutor::new(KubectlConfig {
            kubeconfig: Some(PathBuf::from("/etc/kube/config")),
            context: Some("staging".to_string()),
            ..KubectlConfig::default()
        });
        let args = executor.build_args(&query("get", "pods", None));
        assert_eq!(
            &args[args.len() - 2..],
            ["--kubeconfig=/etc/kube/config", "--context=staging"]
        );
    }

    #[tokio::test]
    async fn test_failed_command_is_cluster_error() {
        let executor = KubectlExecutor::new(KubectlConfig {
            binary: "false".to_string(),
            ..KubectlConfig::default()
        });
        let err = executor
            .execute_read_only_query(&query("get", "pods", None))
            .await
            .unwrap_err();
        assert!(matches!(err, RemediateError::Cluster(_)));
    }

    #[test]
    fn test_truncate_long_output() {
        let long = "y".repeat(MAX_OUTPUT_CHARS + 1);
        assert!(truncate(&long).ends_with("... (output truncated)"));
        assert_eq!(truncate("short"), "short");
    }
}
