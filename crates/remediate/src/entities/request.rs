//! Data requests: read-only cluster queries the AI asks for.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{RemediateError, RemediateResult};

/// The read-only query vocabulary. Nothing outside this set reaches the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataRequestType {
    Get,
    Describe,
    Logs,
    Events,
    Top,
}

impl DataRequestType {
    pub const ALL: [Self; 5] = [
        Self::Get,
        Self::Describe,
        Self::Logs,
        Self::Events,
        Self::Top,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Describe => "describe",
            Self::Logs => "logs",
            Self::Events => "events",
            Self::Top => "top",
        }
    }
}

impl fmt::Display for DataRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataRequestType {
    type Err = RemediateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                RemediateError::UnsafeRequest(format!(
                    "type '{s}' is not one of get, describe, logs, events, top"
                ))
            })
    }
}

/// A data request exactly as the AI declared it.
///
/// `request_type` is kept as the raw string so refused requests stay
/// auditable in the session history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRequest {
    #[serde(rename = "type")]
    pub request_type: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub rationale: String,
}

impl DataRequest {
    /// Key under which this request's result is stored: `{type}_{resource}`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.request_type, self.resource.trim())
    }
}

/// Flags a data request may carry inside its `resource` string.
const ALLOWED_FLAGS: &[&str] = &[
    "-l",
    "--selector",
    "-A",
    "--all-namespaces",
    "--tail",
    "-c",
    "--container",
    "-p",
    "--previous",
    "--since",
    "--field-selector",
    "--sort-by",
    "--containers",
    "--all-containers",
];

/// A data request that passed the safety gate.
///
/// Only [`ReadOnlyQuery::from_request`] constructs one, so a cluster executor
/// can never be handed a query outside the read-only vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOnlyQuery {
    kind: DataRequestType,
    args: Vec<String>,
    namespace: Option<String>,
}

impl ReadOnlyQuery {
    /// Validate a request against the read-only vocabulary.
    pub fn from_request(request: &DataRequest) -> RemediateResult<Self> {
        let kind: DataRequestType = request.request_type.trim().parse()?;

        let args: Vec<String> = request
            .resource
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if args.is_empty() {
            return Err(RemediateError::UnsafeRequest(
                "resource must not be empty".to_string(),
            ));
        }

        for arg in &args {
            if arg.chars().any(char::is_control) {
                return Err(RemediateError::UnsafeRequest(format!(
                    "resource argument '{}' contains control characters",
                    arg.escape_default()
                )));
            }
            if arg.starts_with('-') {
                let flag = arg.split('=').next().unwrap_or(arg);
                if !ALLOWED_FLAGS.contains(&flag) {
                    return Err(RemediateError::UnsafeRequest(format!(
                        "flag '{flag}' is not allowed in a read-only query"
                    )));
                }
            }
        }

        let namespace = request
            .namespace
            .as_deref()
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .map(str::to_string);
        if let Some(ns) = &namespace {
            if !is_dns_label(ns) {
                return Err(RemediateError::UnsafeRequest(format!(
                    "namespace '{ns}' is not a valid namespace name"
                )));
            }
        }

        Ok(Self {
            kind,
            args,
            namespace,
        })
    }

    pub fn kind(&self) -> DataRequestType {
        self.kind
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Whether the query spans all namespaces.
    pub fn all_namespaces(&self) -> bool {
        self.args
            .iter()
            .any(|a| a == "-A" || a == "--all-namespaces")
    }
}

fn is_dns_label(value: &str) -> bool {
    value.len() <= 63
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !value.starts_with('-')
        && !value.ends_with('-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: &str, resource: &str) -> DataRequest {
        DataRequest {
            request_type: kind.to_string(),
            resource: resource.to_string(),
            namespace: Some("default".to_string()),
            rationale: "check".to_string(),
        }
    }

    #[test]
    fn test_safe_types_accepted() {
        for kind in DataRequestType::ALL {
            let query = ReadOnlyQuery::from_request(&request(kind.as_str(), "pod/api-0")).unwrap();
            assert_eq!(query.kind(), kind);
            assert_eq!(query.namespace(), Some("default"));
        }
    }

    #[test]
    fn test_mutating_types_refused() {
        for kind in ["delete", "apply", "patch", "exec", "scale", "GET", ""] {
            let err = ReadOnlyQuery::from_request(&request(kind, "pod/api-0")).unwrap_err();
            assert!(
                matches!(err, RemediateError::UnsafeRequest(_)),
                "expected refusal for {kind:?}"
            );
        }
    }

    #[test]
    fn test_disallowed_flags_refused() {
        for resource in [
            "pods --kubeconfig=/tmp/other",
            "pods -o jsonpath={.items}",
            "pod/x --token abc",
            "pod/x --server=https://evil",
        ] {
            assert!(
                ReadOnlyQuery::from_request(&request("get", resource)).is_err(),
                "expected refusal for {resource:?}"
            );
        }
    }

    #[test]
    fn test_allowed_flags_and_args_split() {
        let query =
            ReadOnlyQuery::from_request(&request("logs", "deploy/api --tail=50 -c server"))
                .unwrap();
        assert_eq!(query.args(), ["deploy/api", "--tail=50", "-c", "server"]);
        assert!(!query.all_namespaces());

        let query = ReadOnlyQuery::from_request(&request("get", "pods -A")).unwrap();
        assert!(query.all_namespaces());
    }

    #[test]
    fn test_empty_resource_and_bad_namespace_refused() {
        assert!(ReadOnlyQuery::from_request(&request("get", "   ")).is_err());

        let mut bad_ns = request("get", "pods");
        bad_ns.namespace = Some("kube-system; rm -rf".to_string());
        assert!(ReadOnlyQuery::from_request(&bad_ns).is_err());
    }

    #[test]
    fn test_key_uses_type_and_resource() {
        assert_eq!(request("describe", "pod/api-0").key(), "describe_pod/api-0");
    }

    #[test]
    fn test_deserialize_from_tool_arguments() {
        let req: DataRequest = serde_json::from_value(serde_json::json!({
            "type": "events",
            "resource": "pod/api-0",
            "rationale": "look for OOMKilled"
        }))
        .unwrap();
        assert_eq!(req.request_type, "events");
        assert!(req.namespace.is_none());
    }
}
