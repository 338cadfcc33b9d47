//! Seams between the scheduler, delivery channels and the tool layer.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ToolDefinition, ToolResult};

/// Outbound channel capability: send `payload` to `recipient`.
///
/// An `Err` is a delivery failure; its display text is what gets recorded
/// on the scheduled job.
#[async_trait]
pub trait DeliveryPort: Send + Sync {
    /// Channel name, used in logs.
    fn name(&self) -> &str;

    async fn deliver(&self, recipient: &str, payload: &str) -> Result<()>;
}

/// A tool the assistant can call with JSON arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    async fn execute(&self, arguments: &str) -> Result<ToolResult>;
}
