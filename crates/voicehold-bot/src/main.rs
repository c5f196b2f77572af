//! Voicehold binary: keeps the bot parked in a voice channel.
//!
//! Loads configuration, initializes structured logging, brings up the
//! gateway, starts the watchdog and the voice-state reactor, and serves the
//! console command surface until SIGINT/SIGTERM or `quit`.

use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;
use voicehold_bot::config::{self, Config};
use voicehold_bot::{console, BotState};
use voicehold_voice::{LoopbackGateway, VoiceGateway};

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("VOICEHOLD_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn build_gateway(config: &Config) -> LoopbackGateway {
    let gateway = LoopbackGateway::new(config.bot.user_id);
    for guild in &config.directory.guilds {
        gateway.add_guild(guild.id, guild.name.clone());
        for channel in guild.voice_channels() {
            gateway.add_channel(channel);
        }
    }
    gateway
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration: the bot cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // The loopback gateway needs no credentials; the token is still required
    // so a deployment config is valid for the platform gateway.
    if config.bot.token.trim().is_empty() {
        tracing::error!(
            severity = "critical",
            "DISCORD_TOKEN not found in environment variables"
        );
        return;
    }

    let gateway = build_gateway(&config);
    tracing::info!("bot connected to gateway");

    let state = BotState::new(Arc::new(gateway.clone()), &config);
    let background = state.spawn_background();

    gateway.mark_ready();
    tracing::info!(
        user = %gateway.bot_user_id(),
        guilds = gateway.guilds().len(),
        "logged in"
    );

    let console_state = state.clone();
    let console_gateway = gateway.clone();
    let console = tokio::spawn(async move {
        let input = BufReader::new(tokio::io::stdin());
        if let Err(e) = console::run(&console_state, &console_gateway, input, tokio::io::stdout()).await {
            tracing::error!(error = %e, "console stopped");
        }
    });

    tokio::select! {
        () = shutdown_signal() => {}
        _ = console => { tracing::info!("console closed, shutting down"); }
    }

    gateway.close();
    background.abort();
    tracing::warn!("bot disconnected from gateway");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicehold_types::{ChannelId, GuildId};

    #[test]
    fn gateway_serves_configured_directory() {
        let config: Config = toml::from_str(
            r#"
[[directory.guilds]]
id = 10
name = "home"
channels = [{ id = 100, name = "lounge" }, { id = 101, name = "studio" }]
"#,
        )
        .unwrap();

        let gateway = build_gateway(&config);

        assert_eq!(gateway.guilds(), vec![GuildId(10)]);
        assert_eq!(gateway.guild_name(GuildId(10)).as_deref(), Some("home"));
        let studio = gateway
            .resolve_channel(GuildId(10), ChannelId(101))
            .expect("studio should resolve");
        assert_eq!(studio.name, "studio");
    }
}
