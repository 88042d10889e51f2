//! wagerbot main binary.

mod commands;
mod config;

use crate::config::WagerbotConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use wb_slack::{Bot, SlackApi};

#[derive(Debug, Parser)]
#[command(name = "wagerbot", version, about = "Realtime chat bot")]
struct Cli {
    /// Path to the TOML config (default: ~/.wagerbot/config.toml).
    #[arg(long, global = true, env = "WAGERBOT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect and answer commands until interrupted (default).
    Serve,
    /// Validate config and check the bot token against the identity endpoint.
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing()?;
    install_panic_hook();

    let cli = Cli::parse();
    let cfg = WagerbotConfig::load(cli.config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg).await,
        Command::Doctor => doctor(cfg).await,
    }
}

async fn serve(cfg: WagerbotConfig) -> anyhow::Result<()> {
    let bot = Bot::connect(cfg.bot_config()).await?;
    commands::register(&bot)?;
    tracing::info!(
        user_id = %bot.user_id(),
        display_name = %bot.display_name(),
        "wagerbot connected"
    );

    let mut running = {
        let bot = bot.clone();
        tokio::spawn(async move { bot.start().await })
    };

    if let Some(channel) = cfg.greeting.channel.as_deref() {
        if let Err(error) = bot.say(channel, cfg.greeting.text.as_str()).await {
            tracing::warn!(%error, channel, "greeting failed");
        }
    }

    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("interrupt received; shutting down");
            None
        }
        joined = &mut running => Some(joined),
    };

    if let Err(error) = bot.stop().await {
        tracing::warn!(%error, "stop reported an error");
    }
    let joined = match finished {
        Some(joined) => joined,
        None => running.await,
    };
    match joined {
        Ok(Ok(())) => tracing::info!("session ended"),
        Ok(Err(error)) => tracing::warn!(%error, "session ended with error"),
        Err(error) => tracing::error!(%error, "session task failed"),
    }

    bot.wait_for_handlers().await;
    Ok(())
}

async fn doctor(cfg: WagerbotConfig) -> anyhow::Result<()> {
    let bot_cfg = cfg.bot_config();
    let api = SlackApi::new(bot_cfg.token(), bot_cfg.api_base_url(), bot_cfg.http_timeout())?;
    let identity = api.auth_test().await?;
    tracing::info!(
        user_id = %identity.user_id,
        display_name = %identity.display_name,
        api_base_url = %bot_cfg.api_base_url(),
        greeting_channel = ?cfg.greeting.channel,
        "config ok"
    );
    println!(
        "wagerbot doctor: token valid for {} ({})",
        identity.display_name, identity.user_id
    );
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(v) => v,
        Err(_) => EnvFilter::new("info,wagerbot=debug,wb_app=debug,wb_slack=debug"),
    };
    let log_format = std::env::var("WAGERBOT_LOG_FORMAT")
        .unwrap_or_else(|_| "compact".to_string())
        .to_ascii_lowercase();

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .init();
        }
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .pretty()
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .compact()
                .init();
        }
        other => {
            return Err(anyhow::anyhow!(
                "unsupported WAGERBOT_LOG_FORMAT={other:?}; expected one of: json, pretty, compact"
            ));
        }
    }

    tracing::debug!(log_format = %log_format, "tracing initialized");
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        tracing::error!(panic_location = %location, "panic captured");
        default_hook(panic_info);
    }));
}
