//! # Herald Tools
//! Tools the assistant calls to schedule, list and cancel messages.

pub mod registry;
pub mod schedule;

pub use registry::{default_tools, dispatch, find_tool, list_definitions, validate_args};
pub use schedule::{CancelScheduledMessageTool, ListScheduledMessagesTool, ScheduleMessageTool};
