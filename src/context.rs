//! Process-wide context, built once in `main` and handed to every command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use herald_channels::{ConsoleChannel, ConversationHistory, RecordingDelivery, TelegramChannel};
use herald_core::{DeliveryPort, HeraldConfig, Tool};
use herald_scheduler::{JobStore, Scheduler, SchedulerOptions, SystemClock};

/// Which outbound channel the scheduler delivers through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Telegram,
    Console,
}

pub struct AppContext {
    pub config: HeraldConfig,
    pub data_dir: PathBuf,
    pub scheduler: Arc<Scheduler>,
    pub tools: Vec<Box<dyn Tool>>,
}

impl AppContext {
    pub async fn build(config: HeraldConfig, delivery: Delivery) -> Result<Self> {
        let data_dir = config.scheduler.data_path();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating data dir {}", data_dir.display()))?;

        let history = Arc::new(
            ConversationHistory::open(&data_dir).context("loading conversation history")?,
        );
        let port: Arc<dyn DeliveryPort> = match delivery {
            Delivery::Telegram => {
                if !config.telegram.enabled {
                    anyhow::bail!(
                        "Telegram is disabled in config; use --console to print deliveries"
                    );
                }
                let telegram = TelegramChannel::new(&config.telegram)?;
                let me = telegram.get_me().await.context("checking Telegram bot token")?;
                tracing::info!(
                    "🤖 Telegram bot @{} ready",
                    me.username.as_deref().unwrap_or(&me.first_name)
                );
                Arc::new(RecordingDelivery::new(telegram, history))
            }
            Delivery::Console => Arc::new(RecordingDelivery::new(ConsoleChannel::new(), history)),
        };

        let scheduler = Scheduler::open(
            JobStore::new(&data_dir),
            port,
            Arc::new(SystemClock),
            SchedulerOptions::from(&config.scheduler),
        )
        .context("opening scheduled message store")?;
        let scheduler = Arc::new(scheduler);
        let tools = herald_tools::default_tools(scheduler.clone());

        Ok(Self {
            config,
            data_dir,
            scheduler,
            tools,
        })
    }

    /// Run a tool by name and return its JSON output.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<(bool, String)> {
        let result =
            herald_tools::dispatch(&self.tools, name, &arguments.to_string(), "cli").await?;
        Ok((result.success, result.output))
    }
}
