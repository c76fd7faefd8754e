use log::error;

use crate::bot::CommandContext;
use crate::commands::{advise, team_id, whisper};

const MISSING_NAME: &str = "Missing name, please reinvite the bot!";

#[poise::command(
    slash_command,
    rename = "team",
    description_localized("en-US", "Configure how your team is notified"),
    subcommands("channel", "event", "show"),
    subcommand_required,
    guild_only
)]
pub async fn root(_: CommandContext<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

#[poise::command(slash_command, guild_only)]
/// Send the match notifications to this channel
pub async fn channel(ctx: CommandContext<'_>) -> Result<(), anyhow::Error> {
    let team = team_id(ctx)?;
    let channel = ctx.channel_id();

    let name = {
        let mut teams = ctx.data().teams.write().await;
        teams.set_channel(team, channel)?;
        teams.name(team)
    };

    whisper(
        ctx,
        format!(
            "✅ Default channel for {} set to <#{}>",
            name.as_deref().unwrap_or(MISSING_NAME),
            channel
        ),
    )
    .await?;
    advise(ctx, team).await
}

#[poise::command(slash_command, guild_only)]
/// Set the competition your team attends
pub async fn event(
    ctx: CommandContext<'_>,
    #[description = "Event key, such as 2025cave"] key: String,
) -> Result<(), anyhow::Error> {
    let team = team_id(ctx)?;
    ctx.defer_ephemeral().await?;

    let event = match ctx.data().events.lookup(&key).await {
        Ok(Some(event)) => event,
        Ok(None) => return whisper(ctx, format!("Event {} was not found", key)).await,
        Err(err) => {
            error!("failed to look up event {}: {:?}", key, err);
            return whisper(ctx, "❌ Could not reach the event service, try again later").await;
        }
    };

    let name = {
        let mut teams = ctx.data().teams.write().await;
        teams.set_event(team, &event.key)?;
        teams.name(team)
    };

    whisper(
        ctx,
        format!(
            "✅ Event for {} successfully set to {}",
            name.as_deref().unwrap_or(MISSING_NAME),
            event.describe()
        ),
    )
    .await?;
    advise(ctx, team).await
}

#[poise::command(slash_command, guild_only)]
/// Show the notification settings of your team
pub async fn show(ctx: CommandContext<'_>) -> Result<(), anyhow::Error> {
    let team = team_id(ctx)?;
    let record = ctx.data().teams.read().await.get(team);

    let channel = record
        .channel
        .map_or("not set".to_string(), |channel| format!("<#{}>", channel));
    whisper(
        ctx,
        format!(
            "**{}**\nChannel: {}\nEvent: {}",
            record.name.as_deref().unwrap_or(MISSING_NAME),
            channel,
            record.event.as_deref().unwrap_or("not set")
        ),
    )
    .await
}
