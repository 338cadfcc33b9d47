//! Scheduled-message tools.
//!
//! Every tool answers with a JSON envelope: `{"success": true, ...}` or
//! `{"error": "..."}`. Scheduler errors never escape as `Err`.

use std::sync::Arc;

use async_trait::async_trait;
use herald_core::error::Result;
use herald_core::traits::Tool;
use herald_core::types::{ToolDefinition, ToolResult};
use herald_scheduler::{JobStatus, Scheduler, TIME_FORMAT};
use serde_json::{Value, json};

fn success(body: Value) -> ToolResult {
    let mut envelope = json!({ "success": true });
    if let (Some(map), Value::Object(extra)) = (envelope.as_object_mut(), body) {
        map.extend(extra);
    }
    ToolResult {
        tool_call_id: String::new(),
        output: envelope.to_string(),
        success: true,
    }
}

fn failure(message: impl Into<String>) -> ToolResult {
    ToolResult {
        tool_call_id: String::new(),
        output: json!({ "error": message.into() }).to_string(),
        success: false,
    }
}

fn parse_args(arguments: &str) -> std::result::Result<Value, ToolResult> {
    serde_json::from_str(arguments).map_err(|e| failure(format!("Invalid arguments: {e}")))
}

/// Chat ids arrive as numbers or strings; the store keys them as strings.
fn recipient_arg(args: &Value) -> Option<String> {
    match &args["chat_id"] {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `schedule_message(chat_id, message, scheduled_time)`.
pub struct ScheduleMessageTool {
    scheduler: Arc<Scheduler>,
}

impl ScheduleMessageTool {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for ScheduleMessageTool {
    fn name(&self) -> &str {
        "schedule_message"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "schedule_message".into(),
            description: "Schedule a message to be sent to a chat at a specific future time."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "chat_id": {
                        "type": ["string", "integer"],
                        "description": "Chat to deliver the message to"
                    },
                    "message": {
                        "type": "string",
                        "description": "The message to send"
                    },
                    "scheduled_time": {
                        "type": "string",
                        "description": "When to send, local time, format YYYY-MM-DD HH:MM:SS"
                    }
                },
                "required": ["chat_id", "message", "scheduled_time"]
            }),
        }
    }

    async fn execute(&self, arguments: &str) -> Result<ToolResult> {
        let args = match parse_args(arguments) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };
        let Some(recipient) = recipient_arg(&args) else {
            return Ok(failure("Missing 'chat_id'"));
        };
        let Some(message) = args["message"].as_str() else {
            return Ok(failure("Missing 'message'"));
        };
        let Some(scheduled_time) = args["scheduled_time"].as_str() else {
            return Ok(failure("Missing 'scheduled_time'"));
        };

        match self.scheduler.submit(&recipient, message, scheduled_time).await {
            Ok(handle) => Ok(success(json!({
                "message": "Successfully scheduled message",
                "scheduled_time": handle.target_time.format(TIME_FORMAT).to_string(),
                "job_id": handle.id,
            }))),
            Err(e) => {
                tracing::debug!("schedule_message rejected: {e}");
                Ok(failure(e.to_string()))
            }
        }
    }
}

/// `list_scheduled_messages(chat_id?, status?)`.
pub struct ListScheduledMessagesTool {
    scheduler: Arc<Scheduler>,
}

impl ListScheduledMessagesTool {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for ListScheduledMessagesTool {
    fn name(&self) -> &str {
        "list_scheduled_messages"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_scheduled_messages".into(),
            description: "List scheduled messages, optionally for one chat and/or one status."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "chat_id": {
                        "type": ["string", "integer"],
                        "description": "Only messages for this chat"
                    },
                    "status": {
                        "type": "string",
                        "enum": ["pending", "sent", "failed"],
                        "description": "Only messages with this status"
                    }
                }
            }),
        }
    }

    async fn execute(&self, arguments: &str) -> Result<ToolResult> {
        let args = if arguments.trim().is_empty() {
            json!({})
        } else {
            match parse_args(arguments) {
                Ok(args) => args,
                Err(result) => return Ok(result),
            }
        };
        let status = match args["status"].as_str() {
            Some(raw) => match raw.parse::<JobStatus>() {
                Ok(status) => Some(status),
                Err(e) => return Ok(failure(e)),
            },
            None => None,
        };

        let recipient = recipient_arg(&args);
        let jobs: Vec<_> = self
            .scheduler
            .list(recipient.as_deref())
            .await
            .into_iter()
            .filter(|job| status.is_none_or(|s| job.status == s))
            .collect();

        Ok(success(json!({
            "count": jobs.len(),
            "scheduled_messages": jobs,
        })))
    }
}

/// `cancel_scheduled_message(job_id)`.
pub struct CancelScheduledMessageTool {
    scheduler: Arc<Scheduler>,
}

impl CancelScheduledMessageTool {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for CancelScheduledMessageTool {
    fn name(&self) -> &str {
        "cancel_scheduled_message"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "cancel_scheduled_message".into(),
            description: "Cancel a pending scheduled message by its job id.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "job_id": {
                        "type": "string",
                        "description": "Id returned by schedule_message"
                    }
                },
                "required": ["job_id"]
            }),
        }
    }

    async fn execute(&self, arguments: &str) -> Result<ToolResult> {
        let args = match parse_args(arguments) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };
        let Some(job_id) = args["job_id"].as_str() else {
            return Ok(failure("Missing 'job_id'"));
        };

        match self.scheduler.cancel(job_id).await {
            Ok(job) => Ok(success(json!({
                "message": "Cancelled scheduled message",
                "cancelled": job,
            }))),
            Err(e) => Ok(failure(e.to_string())),
        }
    }
}
