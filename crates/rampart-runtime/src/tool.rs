use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Async Tool trait
/// Note: Uses async_trait for trait object compatibility with the proxy registry
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name for registration
    fn name(&self) -> &str;

    /// One-line description shown to the model
    fn description(&self) -> &str;

    /// JSON schema describing the argument object
    fn parameters(&self) -> Value;

    /// Free-form metadata (category, side effects)
    fn metadata(&self) -> Value {
        Value::Object(Default::default())
    }

    /// Execute tool with validated input, returns result
    async fn execute(&self, input: Value) -> Result<Value>;
}
