use anyhow::Context;
use log::{info, warn};
use poise::serenity_prelude::GuildId;
use poise::CreateReply;

use crate::bot::CommandContext;
use crate::schedule::ScheduleError;

pub mod schedule;
pub mod team;

#[poise::command(prefix_command, slash_command, track_edits)]
/// Show the available commands
pub async fn help(
    ctx: CommandContext<'_>,
    #[description = "Command to explain"]
    #[autocomplete = "poise::builtins::autocomplete_command"]
    command: Option<String>,
) -> Result<(), anyhow::Error> {
    poise::builtins::help(
        ctx,
        command.as_deref(),
        poise::builtins::HelpConfiguration {
            extra_text_at_bottom: "Assign scouts with /schedule, configure notifications with /team",
            ephemeral: true,
            ..Default::default()
        },
    )
    .await?;
    Ok(())
}

#[poise::command(prefix_command, owners_only)]
pub async fn register(ctx: CommandContext<'_>) -> Result<(), anyhow::Error> {
    poise::builtins::register_application_commands_buttons(ctx).await?;
    Ok(())
}

/// Writes every invocation to the log and to the audit channel.
pub async fn log_command(ctx: CommandContext<'_>) {
    let team = match ctx.guild_id() {
        Some(guild) => ctx.data().teams.read().await.label(guild),
        None => "direct messages".to_string(),
    };
    let line = format!(
        "received: {} from {} in {}",
        ctx.invocation_string(),
        ctx.author().name,
        team
    );
    info!("{}", line);

    if let Some(channel) = ctx.data().config.discord.audit_channel {
        if let Err(err) = channel.say(ctx.http(), &line).await {
            warn!("failed to mirror the command to the audit channel: {}", err);
        }
    }
}

/// The guild the command was invoked in.
pub fn team_id(ctx: CommandContext<'_>) -> Result<GuildId, anyhow::Error> {
    ctx.guild_id()
        .context("this command can only be used in a server")
}

pub async fn whisper(ctx: CommandContext<'_>, text: impl Into<String>) -> Result<(), anyhow::Error> {
    ctx.send(CreateReply::default().ephemeral(true).content(text))
        .await?;
    Ok(())
}

/// Reminds the user of the missing team settings.
pub async fn advise(ctx: CommandContext<'_>, team: GuildId) -> Result<(), anyhow::Error> {
    let record = ctx.data().teams.read().await.get(team);
    for advisory in record.advisories() {
        whisper(ctx, advisory).await?;
    }
    Ok(())
}

/// Shows user errors of the schedule to the invoking user.
/// Returns `None` when the error was reported, persistence errors are
/// passed on to the framework.
pub async fn settle<T>(
    ctx: CommandContext<'_>,
    result: Result<T, ScheduleError>,
) -> Result<Option<T>, anyhow::Error> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ScheduleError::Persistence(err)) => Err(err),
        Err(err) => {
            whisper(ctx, err.to_string()).await?;
            Ok(None)
        }
    }
}
