//! Line-oriented command surface for driving the bot from a terminal.
//!
//! ```text
//! join <guild> <user> [channel] [admin]
//! leave <guild> <user> [admin]
//! drop <guild>
//! status
//! help
//! quit
//! ```
//!
//! `channel` is the voice channel the requesting user is sitting in; omit it
//! to act as a user who is not in voice. `drop` simulates the platform
//! cutting the bot's session.

use crate::commands::{JOIN_DESCRIPTION, LEAVE_DESCRIPTION};
use crate::BotState;
use std::fmt::Write as _;
use std::str::FromStr;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use voicehold_types::{ChannelId, CommandResponse, GuildId, Requester, UserId};
use voicehold_voice::LoopbackGateway;

const JOIN_USAGE: &str = "join <guild> <user> [channel] [admin]";
const LEAVE_USAGE: &str = "leave <guild> <user> [admin]";
const DROP_USAGE: &str = "drop <guild>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Join(Requester),
    Leave(Requester),
    Drop(GuildId),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid id '{0}'")]
    InvalidId(String),
}

fn parse_id<T: FromStr>(raw: &str) -> Result<T, ConsoleError> {
    raw.parse().map_err(|_| ConsoleError::InvalidId(raw.to_string()))
}

fn requester(
    args: &[&str],
    with_channel: bool,
    usage: &'static str,
) -> Result<Requester, ConsoleError> {
    let is_admin = args.contains(&"admin");
    let ids: Vec<&str> = args.iter().copied().filter(|a| *a != "admin").collect();
    let max_ids = if with_channel { 3 } else { 2 };
    if ids.len() < 2 || ids.len() > max_ids {
        return Err(ConsoleError::Usage(usage));
    }

    Ok(Requester {
        guild_id: parse_id::<GuildId>(ids[0])?,
        user_id: parse_id::<UserId>(ids[1])?,
        is_admin,
        voice_channel: ids.get(2).map(|raw| parse_id::<ChannelId>(raw)).transpose()?,
    })
}

/// Parses one console line.
pub fn parse(line: &str) -> Result<ConsoleCommand, ConsoleError> {
    let mut words = line.split_whitespace();
    let command = words.next().ok_or(ConsoleError::Empty)?;
    let args: Vec<&str> = words.collect();

    match command.to_ascii_lowercase().as_str() {
        "join" => requester(&args, true, JOIN_USAGE).map(ConsoleCommand::Join),
        "leave" => requester(&args, false, LEAVE_USAGE).map(ConsoleCommand::Leave),
        "drop" => match args.as_slice() {
            [guild] => Ok(ConsoleCommand::Drop(parse_id(guild)?)),
            _ => Err(ConsoleError::Usage(DROP_USAGE)),
        },
        "status" => Ok(ConsoleCommand::Status),
        "help" => Ok(ConsoleCommand::Help),
        "quit" | "exit" => Ok(ConsoleCommand::Quit),
        other => Err(ConsoleError::Unknown(other.to_string())),
    }
}

fn render_response(response: &CommandResponse) -> String {
    if response.ephemeral {
        format!("(only you) {}", response.content)
    } else {
        response.content.clone()
    }
}

/// Summarises intent, sessions and keep-alive loops.
pub fn render_status(state: &BotState) -> String {
    let intent = state.intent.snapshot();
    let mut out = String::new();
    let desired = intent
        .desired_channel
        .map_or_else(|| "none".to_string(), |c| c.to_string());
    let _ = writeln!(
        out,
        "intent: desired={desired} manual_leave={} reconnecting={}",
        intent.manual_leave,
        state.intent.is_reconnecting()
    );
    for guild in state.gateway.guilds() {
        let session = match state.gateway.voice_connection(guild) {
            Some(vc) if vc.is_connected() => format!(
                "connected to {}{}",
                vc.channel_id()
                    .map_or_else(|| "?".to_string(), |c| c.to_string()),
                if vc.is_playing() { " (playing)" } else { "" }
            ),
            _ => "not connected".to_string(),
        };
        let keepalive = if state.keepalive.is_running(guild) {
            "running"
        } else {
            "idle"
        };
        let _ = writeln!(out, "guild {guild}: {session}, keep-alive {keepalive}");
    }
    out
}

fn help() -> String {
    let entries = [
        (JOIN_USAGE, JOIN_DESCRIPTION),
        (LEAVE_USAGE, LEAVE_DESCRIPTION),
        (DROP_USAGE, "Simulate the platform dropping the session."),
        ("status", "Show the connection intent and every guild's session."),
        ("help", "Show this list."),
        ("quit", "Stop reading commands and shut down."),
    ];
    let mut out = String::new();
    for (usage, description) in entries {
        let _ = writeln!(out, "{usage}\n    {description}");
    }
    out
}

/// Reads commands from `input` until EOF or `quit`, writing replies to
/// `output`.
pub async fn run<R, W>(
    state: &BotState,
    gateway: &LoopbackGateway,
    input: R,
    mut output: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match parse(&line) {
            Ok(ConsoleCommand::Join(requester)) => {
                render_response(&state.controller.join(&requester).await)
            }
            Ok(ConsoleCommand::Leave(requester)) => {
                render_response(&state.controller.leave(&requester).await)
            }
            Ok(ConsoleCommand::Drop(guild)) => {
                if gateway.drop_connection(guild) {
                    format!("dropped session in guild {guild}")
                } else {
                    format!("no session in guild {guild}")
                }
            }
            Ok(ConsoleCommand::Status) => render_status(state),
            Ok(ConsoleCommand::Help) => help(),
            Ok(ConsoleCommand::Quit) => break,
            Err(e) => e.to_string(),
        };
        output.write_all(reply.trim_end().as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_join_with_channel_and_admin() {
        let command = parse("join 10 42 100 admin").unwrap();
        assert_eq!(
            command,
            ConsoleCommand::Join(Requester {
                guild_id: GuildId(10),
                user_id: UserId(42),
                is_admin: true,
                voice_channel: Some(ChannelId(100)),
            })
        );
    }

    #[test]
    fn join_without_channel_means_not_in_voice() {
        let ConsoleCommand::Join(requester) = parse("JOIN 10 42").unwrap() else {
            panic!("expected join");
        };
        assert_eq!(requester.voice_channel, None);
        assert!(!requester.is_admin);
    }

    #[test]
    fn leave_rejects_channel_argument() {
        assert_eq!(
            parse("leave 10 42 100"),
            Err(ConsoleError::Usage(LEAVE_USAGE))
        );
    }

    #[test]
    fn bad_ids_and_unknown_commands_are_reported() {
        assert_eq!(
            parse("drop guild"),
            Err(ConsoleError::InvalidId("guild".to_string()))
        );
        assert_eq!(parse("   "), Err(ConsoleError::Empty));
        assert_eq!(
            parse("dance"),
            Err(ConsoleError::Unknown("dance".to_string()))
        );
    }

    #[test]
    fn help_describes_every_command() {
        let text = help();
        for command in ["join", "leave", "drop", "status", "help", "quit"] {
            let line = text
                .lines()
                .find(|line| line.split_whitespace().next() == Some(command))
                .unwrap_or_else(|| panic!("{command} missing from help"));
            let index = text.lines().position(|l| l == line).unwrap();
            let description = text.lines().nth(index + 1).unwrap_or_default();
            assert!(
                description.starts_with("    ") && !description.trim().is_empty(),
                "{command} has no description"
            );
        }
    }

    #[test]
    fn ephemeral_replies_are_marked() {
        let rendered = render_response(&CommandResponse::ephemeral("nope"));
        assert_eq!(rendered, "(only you) nope");
    }
}
