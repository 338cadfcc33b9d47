//! Tool registry — lookup, argument validation and dispatch.

use std::sync::Arc;

use herald_core::error::{HeraldError, Result};
use herald_core::traits::Tool;
use herald_core::types::{ToolDefinition, ToolResult};
use herald_scheduler::Scheduler;

use crate::schedule::{CancelScheduledMessageTool, ListScheduledMessagesTool, ScheduleMessageTool};

/// The scheduled-message tools, sharing one scheduler.
pub fn default_tools(scheduler: Arc<Scheduler>) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(ScheduleMessageTool::new(scheduler.clone())),
        Box::new(ListScheduledMessagesTool::new(scheduler.clone())),
        Box::new(CancelScheduledMessageTool::new(scheduler)),
    ]
}

/// Find a tool by name from a list.
pub fn find_tool<'a>(tools: &'a [Box<dyn Tool>], name: &str) -> Option<&'a dyn Tool> {
    tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
}

/// Get all tool definitions from a list.
pub fn list_definitions(tools: &[Box<dyn Tool>]) -> Vec<ToolDefinition> {
    tools.iter().map(|t| t.definition()).collect()
}

/// Validate that a tool call has the required arguments.
pub fn validate_args(
    definition: &ToolDefinition,
    args: &serde_json::Value,
) -> std::result::Result<(), String> {
    let params = &definition.parameters;
    if let Some(required) = params.get("required").and_then(|r| r.as_array()) {
        for req in required {
            if let Some(key) = req.as_str()
                && args.get(key).is_none_or(|v| v.is_null())
            {
                return Err(format!("Missing required argument: {key}"));
            }
        }
    }
    Ok(())
}

/// Run a tool call by name. Unknown tools are an error; everything else is
/// answered by the tool itself.
pub async fn dispatch(
    tools: &[Box<dyn Tool>],
    name: &str,
    arguments: &str,
    tool_call_id: &str,
) -> Result<ToolResult> {
    let tool = find_tool(tools, name)
        .ok_or_else(|| HeraldError::Tool(format!("Unknown tool: {name}")))?;

    if let Ok(args) = serde_json::from_str::<serde_json::Value>(arguments)
        && let Err(reason) = validate_args(&tool.definition(), &args)
    {
        return Ok(ToolResult {
            tool_call_id: tool_call_id.to_string(),
            output: serde_json::json!({ "error": reason }).to_string(),
            success: false,
        });
    }

    tracing::debug!("🔧 Tool call: {name}");
    let mut result = tool.execute(arguments).await?;
    result.tool_call_id = tool_call_id.to_string();
    Ok(result)
}
