//! Tools available to agents during a turn.
//!
//! A [`ToolProtocol`] is a backend that serves one or more named tools and describes them with
//! [`ToolSpec`]s. An agent's [`ToolRegistry`] binds each spec to the protocol that serves it; the
//! sandboxed file system, for example, is a single protocol that serves `read_file`,
//! `write_file` and `list_directory`.
//!
//! ```text
//! Agent turn → ToolRegistry::execute_tool → ToolProtocol::execute → ToolOutcome (text)
//! ```
//!
//! Whatever happens inside a tool (unknown name, missing parameters, I/O failure, sandbox
//! denial) comes back as a [`ToolOutcome`]. Tool failures never escape the agent's turn.
//!
//! ```rust
//! use conclave::tool_protocol::{ParamKind, ToolParameter, ToolSpec};
//!
//! let spec = ToolSpec::new("read_file", "Read a text file")
//!     .param(ToolParameter::required("path", ParamKind::String, "Path inside the sandbox"));
//! assert_eq!(spec.missing_required(&serde_json::json!({})), vec!["path".to_string()]);
//! ```

use crate::error::ConclaveError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Raw answer of a [`ToolProtocol`]. Folded into a [`ToolOutcome`] before an agent sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: serde_json::Value,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

/// JSON type of a tool parameter, as advertised to the model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Array => "array",
            ParamKind::Object => "object",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
}

impl ToolParameter {
    pub fn required(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// Name, purpose and parameter contract of one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn param(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Names of required parameters that are absent or null in `arguments`.
    pub fn missing_required(&self, arguments: &serde_json::Value) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|p| p.required && arguments.get(&p.name).map_or(true, |v| v.is_null()))
            .map(|p| p.name.clone())
            .collect()
    }
}

/// A backend serving one or more tools.
#[async_trait]
pub trait ToolProtocol: Send + Sync {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>>;

    /// Specs of every tool this protocol serves.
    fn list_tools(&self) -> Vec<ToolSpec>;

    /// Short identifier, e.g. `"filesystem"`.
    fn protocol_name(&self) -> &str;
}

/// Failures detected before a protocol gets to run.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolError {
    UnknownTool(String),
    InvalidParameters(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::UnknownTool(name) => write!(f, "no tool named '{}' is available", name),
            ToolError::InvalidParameters(msg) => write!(f, "invalid parameters: {}", msg),
        }
    }
}

impl Error for ToolError {}

/// The single result type of a tool invocation as seen by the turn loop.
///
/// Both variants carry the text that is appended to the history and shown to the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success(String),
    Error(String),
}

impl ToolOutcome {
    /// Fold a protocol answer for `tool_name` into an outcome.
    pub fn from_result(
        tool_name: &str,
        result: Result<ToolResult, Box<dyn Error + Send + Sync>>,
    ) -> Self {
        let failure = match result {
            Ok(ToolResult {
                success: true,
                output,
                ..
            }) => {
                let rendered = match output {
                    serde_json::Value::String(text) => text,
                    other => serde_json::to_string_pretty(&other)
                        .unwrap_or_else(|_| other.to_string()),
                };
                return ToolOutcome::Success(format!(
                    "Tool '{}' executed successfully. Result: {}",
                    tool_name, rendered
                ));
            }
            Ok(ToolResult { error, .. }) => error.unwrap_or_else(|| "unknown error".to_string()),
            Err(e) => e.to_string(),
        };
        ToolOutcome::Error(format!("Tool '{}' failed. Error: {}", tool_name, failure))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }

    pub fn text(&self) -> &str {
        match self {
            ToolOutcome::Success(text) | ToolOutcome::Error(text) => text,
        }
    }

    /// The failure as a [`ConclaveError::ToolExecution`], if there was one.
    pub fn as_error(&self) -> Option<ConclaveError> {
        match self {
            ToolOutcome::Success(_) => None,
            ToolOutcome::Error(text) => Some(ConclaveError::ToolExecution(text.clone())),
        }
    }
}

/// A spec bound to the protocol that serves it.
#[derive(Clone)]
pub struct BoundTool {
    spec: ToolSpec,
    protocol: Arc<dyn ToolProtocol>,
}

impl BoundTool {
    pub fn new(spec: ToolSpec, protocol: Arc<dyn ToolProtocol>) -> Self {
        Self { spec, protocol }
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    /// Check the parameter contract, then hand the call to the protocol.
    pub async fn execute(
        &self,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let missing = self.spec.missing_required(&parameters);
        if !missing.is_empty() {
            return Err(Box::new(ToolError::InvalidParameters(format!(
                "missing required parameter(s): {}",
                missing.join(", ")
            ))));
        }
        self.protocol.execute(&self.spec.name, parameters).await
    }
}

/// The tools exposed to one agent, ordered by name so prompts list them stably.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, BoundTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every tool `protocol` serves. A later protocol wins on name clashes.
    pub fn add_protocol(&mut self, protocol: Arc<dyn ToolProtocol>) {
        for spec in protocol.list_tools() {
            if self.tools.contains_key(&spec.name) {
                log::warn!(
                    "conclave::tool_protocol: tool '{}' from '{}' replaces an earlier definition",
                    spec.name,
                    protocol.protocol_name()
                );
            }
            self.tools
                .insert(spec.name.clone(), BoundTool::new(spec, protocol.clone()));
        }
    }

    pub fn get_tool(&self, name: &str) -> Option<&BoundTool> {
        self.tools.get(name)
    }

    pub fn list_tools(&self) -> Vec<&ToolSpec> {
        self.tools.values().map(BoundTool::spec).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Run a tool by name. Never fails: every problem ends up in the outcome text.
    pub async fn execute_tool(&self, tool_name: &str, parameters: serde_json::Value) -> ToolOutcome {
        let result = match self.tools.get(tool_name) {
            Some(tool) => tool.execute(parameters).await,
            None => Err(Box::new(ToolError::UnknownTool(tool_name.to_string()))
                as Box<dyn Error + Send + Sync>),
        };
        ToolOutcome::from_result(tool_name, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProtocol;

    #[async_trait]
    impl ToolProtocol for EchoProtocol {
        async fn execute(
            &self,
            tool_name: &str,
            parameters: serde_json::Value,
        ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
            if tool_name == "explode" {
                return Err("kaboom".into());
            }
            if parameters.get("fail").is_some() {
                return Ok(ToolResult::failed("asked to fail"));
            }
            Ok(ToolResult::ok(serde_json::json!({ "echo": parameters["text"] })))
        }

        fn list_tools(&self) -> Vec<ToolSpec> {
            vec![
                ToolSpec::new("echo", "Echoes its input")
                    .param(ToolParameter::required("text", ParamKind::String, "Text to echo")),
                ToolSpec::new("explode", "Always raises"),
            ]
        }

        fn protocol_name(&self) -> &str {
            "echo"
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.add_protocol(Arc::new(EchoProtocol));
        registry
    }

    #[test]
    fn test_protocol_tools_are_listed_by_name() {
        let registry = registry();
        assert_eq!(registry.len(), 2);
        let names: Vec<&str> = registry.list_tools().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "explode"]);
        assert_eq!(
            ToolParameter::optional("n", ParamKind::Number, "").kind.as_str(),
            "number"
        );
    }

    #[tokio::test]
    async fn test_success_outcome() {
        let outcome = registry()
            .execute_tool("echo", serde_json::json!({ "text": "hi" }))
            .await;
        assert!(outcome.is_success());
        assert!(outcome.as_error().is_none());
        assert!(outcome.text().starts_with("Tool 'echo' executed successfully."));
        assert!(outcome.text().contains("\"hi\""));
    }

    #[tokio::test]
    async fn test_every_failure_is_an_error_outcome() {
        let registry = registry();

        let unknown = registry.execute_tool("nope", serde_json::json!({})).await;
        assert_eq!(
            unknown,
            ToolOutcome::Error(
                "Tool 'nope' failed. Error: no tool named 'nope' is available".to_string()
            )
        );

        let raised = registry.execute_tool("explode", serde_json::json!({})).await;
        assert_eq!(raised.text(), "Tool 'explode' failed. Error: kaboom");

        let reported = registry
            .execute_tool("echo", serde_json::json!({ "text": "x", "fail": true }))
            .await;
        assert_eq!(reported.text(), "Tool 'echo' failed. Error: asked to fail");

        let invalid = registry.execute_tool("echo", serde_json::json!({})).await;
        assert!(!invalid.is_success());
        assert!(invalid.text().contains("missing required parameter(s): text"));
        assert_eq!(
            invalid.as_error(),
            Some(ConclaveError::ToolExecution(invalid.text().to_string()))
        );
        assert!(!invalid.as_error().unwrap().is_fatal());
    }
}
