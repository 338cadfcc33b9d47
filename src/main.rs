//! # Herald — personal assistant scheduled messages
//!
//! Usage:
//!   herald run                                  # Deliver due messages via Telegram
//!   herald run --console                        # Print deliveries instead
//!   herald schedule 123 "2026-10-17 09:00:00" "Stand-up in 5 minutes"
//!   herald list --chat 123 --status pending
//!   herald cancel <job-id>
//!   herald prune --days 30

mod context;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use herald_core::HeraldConfig;
use tracing_subscriber::EnvFilter;

use crate::context::{AppContext, Delivery};

#[derive(Parser)]
#[command(
    name = "herald",
    version,
    about = "📬 Herald — scheduled messages for your assistant bot"
)]
struct Cli {
    /// Config file (default: ~/.herald/config.toml)
    #[arg(short, long, env = "HERALD_CONFIG")]
    config: Option<String>,

    /// Override the data directory from the config
    #[arg(long)]
    data_dir: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the delivery loop until Ctrl-C
    Run {
        /// Print deliveries to stdout instead of sending via Telegram
        #[arg(long)]
        console: bool,
    },
    /// Schedule a message
    Schedule {
        chat_id: String,
        /// Local time, YYYY-MM-DD HH:MM:SS
        time: String,
        /// Message text
        #[arg(num_args = 1.., trailing_var_arg = true)]
        message: Vec<String>,
    },
    /// List scheduled messages
    List {
        #[arg(long)]
        chat: Option<String>,
        /// pending, sent or failed
        #[arg(long)]
        status: Option<String>,
    },
    /// Cancel a pending message
    Cancel { job_id: String },
    /// Remove sent/failed messages older than N days
    Prune {
        #[arg(long)]
        days: u32,
    },
    /// Print the tool definitions offered to the assistant
    Tools,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

fn load_config(cli: &Cli) -> Result<HeraldConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            HeraldConfig::load_from(&PathBuf::from(expand_path(path)))?.with_env_overrides()
        }
        None => HeraldConfig::load()?,
    };
    if let Some(dir) = &cli.data_dir {
        config.scheduler.data_dir = dir.clone();
    }
    Ok(config)
}

fn print_tool_output(success: bool, output: &str) -> Result<()> {
    let pretty = serde_json::from_str::<serde_json::Value>(output)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or_else(|_| output.to_string());
    println!("{pretty}");
    if !success {
        anyhow::bail!("command failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "herald=debug,herald_scheduler=debug,herald_channels=debug,herald_tools=debug"
    } else {
        "herald=info,herald_scheduler=info,herald_channels=info,herald_tools=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Command::Run { console } => {
            let delivery = if console {
                Delivery::Console
            } else {
                Delivery::Telegram
            };
            let ctx = AppContext::build(config, delivery).await?;

            println!("📬 Herald v{}", env!("CARGO_PKG_VERSION"));
            println!("   📂 Data Dir:  {}", ctx.data_dir.display());
            println!("   ⏰ Interval:  {}s", ctx.config.scheduler.poll_interval_secs);
            println!(
                "   🧹 Retention: {}",
                ctx.config
                    .scheduler
                    .retention_days
                    .map(|d| format!("{d} days"))
                    .unwrap_or_else(|| "keep all".into())
            );
            println!();

            let handle = ctx.scheduler.clone().spawn();
            tokio::signal::ctrl_c().await?;
            tracing::info!("🛑 Shutting down...");
            handle.shutdown().await;
        }
        Command::Schedule { chat_id, time, message } => {
            let ctx = AppContext::build(config, Delivery::Console).await?;
            let args = serde_json::json!({
                "chat_id": chat_id,
                "message": message.join(" "),
                "scheduled_time": time,
            });
            let (success, output) = ctx.call_tool("schedule_message", args).await?;
            print_tool_output(success, &output)?;
        }
        Command::List { chat, status } => {
            let ctx = AppContext::build(config, Delivery::Console).await?;
            let mut args = serde_json::Map::new();
            if let Some(chat) = chat {
                args.insert("chat_id".into(), chat.into());
            }
            if let Some(status) = status {
                args.insert("status".into(), status.into());
            }
            let (success, output) = ctx
                .call_tool("list_scheduled_messages", serde_json::Value::Object(args))
                .await?;
            print_tool_output(success, &output)?;
        }
        Command::Cancel { job_id } => {
            let ctx = AppContext::build(config, Delivery::Console).await?;
            let (success, output) = ctx
                .call_tool("cancel_scheduled_message", serde_json::json!({ "job_id": job_id }))
                .await?;
            print_tool_output(success, &output)?;
        }
        Command::Prune { days } => {
            let ctx = AppContext::build(config, Delivery::Console).await?;
            let retention = std::time::Duration::from_secs(u64::from(days) * 86_400);
            let removed = ctx.scheduler.prune(retention).await?;
            println!("🧹 Removed {removed} finished message(s) older than {days} days");
        }
        Command::Tools => {
            let ctx = AppContext::build(config, Delivery::Console).await?;
            let defs = herald_tools::list_definitions(&ctx.tools);
            println!("{}", serde_json::to_string_pretty(&defs)?);
        }
    }

    Ok(())
}
