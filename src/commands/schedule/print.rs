use std::collections::HashMap;

use log::warn;
use poise::serenity_prelude::{GuildId, UserId};

use crate::bot::CommandContext;
use crate::commands::{advise, team_id, whisper};
use crate::notify::DiscordMessenger;
use crate::render;

/// Display names of the scouts. Scouts that could not be looked up
/// are left out.
async fn display_names(
    ctx: CommandContext<'_>,
    team: GuildId,
    users: impl IntoIterator<Item = UserId>,
) -> HashMap<UserId, String> {
    let mut names = HashMap::new();

    for user in users {
        match team.member(ctx.serenity_context(), user).await {
            Ok(member) => {
                names.insert(user, member.display_name().to_string());
            }
            Err(err) => warn!("failed to look up scout {}: {}", user, err),
        }
    }

    names
}

#[poise::command(slash_command, guild_only)]
/// Show the scouting schedule of your team
pub async fn print(
    ctx: CommandContext<'_>,
    #[description = "Mention every scout of the schedule"] ping: Option<bool>,
) -> Result<(), anyhow::Error> {
    let team = team_id(ctx)?;
    // member lookups can take a while
    ctx.defer_ephemeral().await?;

    let blocks = ctx.data().engine.read().await.blocks(team);
    if blocks.is_empty() {
        whisper(ctx, "Your team has no logged scouting schedule").await?;
        return advise(ctx, team).await;
    }

    let names = display_names(ctx, team, render::assignees(&blocks)).await;
    let rows: Vec<String> = blocks
        .iter()
        .map(|block| render::row(block, &names))
        .collect();

    let mut caption = "Here is the scouting schedule!".to_string();
    if ping.unwrap_or(false) {
        if let Some(line) = render::ping_line(&blocks) {
            caption.push(' ');
            caption.push_str(&line);
        }
    }

    let messenger = DiscordMessenger::new(ctx.serenity_context().http.clone());
    render::publish(&messenger, ctx.channel_id(), &rows, &caption).await?;

    whisper(ctx, "✅ Schedule posted").await?;
    advise(ctx, team).await
}
