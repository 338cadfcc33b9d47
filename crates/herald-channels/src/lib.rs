//! # Herald Channels
//! Outbound delivery channels used by the scheduler.

pub mod console;
pub mod history;
pub mod telegram;

pub use console::ConsoleChannel;
pub use history::{ConversationHistory, RecordingDelivery, Turn};
pub use telegram::TelegramChannel;
