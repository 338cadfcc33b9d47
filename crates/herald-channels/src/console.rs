//! Console channel — prints deliveries to stdout. Handy for local runs
//! without a bot token.

use async_trait::async_trait;
use herald_core::error::Result;
use herald_core::traits::DeliveryPort;

#[derive(Debug, Default)]
pub struct ConsoleChannel;

impl ConsoleChannel {
    pub fn new() -> Self {
        Self
    }

    pub fn format_line(recipient: &str, payload: &str) -> String {
        format!("[{recipient}] {payload}")
    }
}

#[async_trait]
impl DeliveryPort for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn deliver(&self, recipient: &str, payload: &str) -> Result<()> {
        println!("{}", Self::format_line(recipient, payload));
        Ok(())
    }
}
