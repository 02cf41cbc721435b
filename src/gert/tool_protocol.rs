//! Tool abstraction layer.
//!
//! A [`Tool`] is an executable capability with a declared input schema and a
//! structured result. The [`ToolRegistry`] maps tool names to capabilities and
//! is the only path through which the tool-calling loop executes anything.
//!
//! ```text
//! Turn loop → ToolRegistry → Tool (trait) → [closure | consensus | recall | ...]
//! ```
//!
//! Concrete heavy tools (web search, file access, code execution) live outside
//! this crate; they plug in by implementing [`Tool`] and enforce their own
//! sandboxing. For quick registrations there is [`FunctionTool`], which wraps
//! a plain Rust closure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the execution succeeded.
    pub success: bool,
    /// Structured output payload; `Null` on failure.
    pub output: serde_json::Value,
    /// Error detail when `success` is false.
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Declared type of a tool parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// One named parameter in a tool's input schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    pub description: Option<String>,
    pub required: bool,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Static description of a tool: its name, purpose, and input schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }
}

/// Error types for tool operations.
#[derive(Debug, Clone)]
pub enum ToolError {
    /// Requested tool is not registered.
    NotFound(String),
    /// Tool ran but reported an application-level failure.
    ExecutionFailed(String),
    /// The provided JSON arguments failed validation.
    InvalidParameters(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "Tool not found: {}", name),
            ToolError::ExecutionFailed(msg) => write!(f, "Tool execution failed: {}", msg),
            ToolError::InvalidParameters(msg) => write!(f, "Invalid parameters: {}", msg),
        }
    }
}

impl Error for ToolError {}

/// An executable capability available to the assistant.
#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> &ToolMetadata;

    /// Execute with the supplied JSON arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>>;
}

/// Type alias for synchronous closures registered as tools.
pub type ToolFunction = Arc<
    dyn Fn(serde_json::Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> + Send + Sync,
>;

/// A [`Tool`] backed by a plain Rust closure.
pub struct FunctionTool {
    metadata: ToolMetadata,
    function: ToolFunction,
}

impl FunctionTool {
    pub fn new(metadata: ToolMetadata, function: ToolFunction) -> Self {
        Self { metadata, function }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        (self.function)(arguments)
    }
}

/// Registry mapping tool names to capabilities.
///
/// Populated once at startup; read-only afterwards and shared across
/// concurrent conversations via `Arc`.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Insert or replace a tool under its metadata name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.metadata().name.clone(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Metadata for every registered tool, sorted by name so that prompt
    /// rendering is stable.
    pub fn list_metadata(&self) -> Vec<&ToolMetadata> {
        let mut entries: Vec<_> = self.tools.values().map(|t| t.metadata()).collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a named tool. An unregistered name yields
    /// [`ToolError::NotFound`]; the caller decides whether that aborts
    /// anything (the turn loop does not — it reports the error to the model).
    pub async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(arguments).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_tool() -> Arc<dyn Tool> {
        Arc::new(FunctionTool::new(
            ToolMetadata::new("echo", "Echoes its arguments back")
                .with_parameter(ToolParameter::new("text", ToolParameterType::String).required()),
            Arc::new(|args| Ok(ToolResult::success(args))),
        ))
    }

    #[tokio::test]
    async fn test_registry_executes_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool());

        let result = registry
            .execute("echo", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output["text"], "hi");
    }

    #[tokio::test]
    async fn test_registry_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("nope", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Tool not found"));
    }

    #[test]
    fn test_list_metadata_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FunctionTool::new(
            ToolMetadata::new("zeta", "last"),
            Arc::new(|_| Ok(ToolResult::success(serde_json::Value::Null))),
        )));
        registry.register(echo_tool());

        let names: Vec<_> = registry
            .list_metadata()
            .iter()
            .map(|m| m.name.clone())
            .collect();
        assert_eq!(names, vec!["echo", "zeta"]);
    }

    #[test]
    fn test_tool_result_constructors() {
        let ok = ToolResult::success(serde_json::json!({"n": 1}));
        assert!(ok.success);
        assert!(ok.error.is_none());

        let bad = ToolResult::failure("boom");
        assert!(!bad.success);
        assert_eq!(bad.output, serde_json::Value::Null);
        assert_eq!(bad.error.as_deref(), Some("boom"));
    }
}
