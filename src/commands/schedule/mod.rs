use log::info;
use poise::serenity_prelude as serenity;

use crate::bot::CommandContext;
use crate::commands::{advise, settle, team_id, whisper};
use crate::notify::{fan_out, DiscordMessenger};
use crate::schedule::{Block, Role};

mod clear;
mod edit;
mod print;

use self::clear::{clear, clear_block};
use self::edit::edit;
use self::print::print;

#[poise::command(
    slash_command,
    rename = "schedule",
    name_localized("en-US", "schedule"),
    description_localized("en-US", "Manage the scouting schedule of your team"),
    subcommands(
        "assign",
        "block_assign",
        "print",
        "clear",
        "clear_block",
        "edit",
        "add_block",
        "call_match"
    ),
    subcommand_required,
    guild_only
)]
pub async fn root(_: CommandContext<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

async fn autocomplete_role<'a>(
    _ctx: CommandContext<'_>,
    partial: &'a str,
) -> impl Iterator<Item = String> + 'a {
    let partial = partial.to_lowercase();
    Role::ALL
        .into_iter()
        .map(Role::alias)
        .filter(move |alias| alias.starts_with(&partial))
        .map(str::to_string)
}

#[poise::command(slash_command, guild_only)]
/// Assign a scout to one position for a range of matches
pub async fn assign(
    ctx: CommandContext<'_>,

    #[description = "Matches covered by the block, such as 1-10"] range: String,

    #[description = "Position to scout"]
    #[autocomplete = "autocomplete_role"]
    role: String,

    #[description = "The scout"] scout: serenity::User,
) -> Result<(), anyhow::Error> {
    let team = team_id(ctx)?;
    let mention = format!("<@{}>", scout.id);

    let result = ctx
        .data()
        .engine
        .write()
        .await
        .assign_one(team, &range, &role, &mention);
    let Some(block) = settle(ctx, result).await? else {
        return Ok(());
    };

    ctx.say(format!(
        "✅ Assigned {} to *{}* for matches {}",
        mention,
        role.to_uppercase(),
        block.range_label()
    ))
    .await?;

    advise(ctx, team).await
}

#[poise::command(slash_command, guild_only, rename = "block-assign")]
/// Assign several scouts at once: block=10-20 blue_1=@a red_2=@b
pub async fn block_assign(
    ctx: CommandContext<'_>,
    #[description = "block=10-20 followed by role=@scout pairs"] assignments: String,
) -> Result<(), anyhow::Error> {
    let team = team_id(ctx)?;

    let result = ctx
        .data()
        .engine
        .write()
        .await
        .assign_many(team, &assignments);
    let Some(assignment) = settle(ctx, result).await? else {
        return Ok(());
    };

    let mut message = "Assigned; ".to_string();
    for (role, user) in &assignment.applied {
        message.push_str(&format!("{}: <@{}> ", role, user));
    }
    message.push_str(&format!("to matches {}", assignment.block.range_label()));
    ctx.say(message).await?;

    advise(ctx, team).await
}

#[poise::command(slash_command, guild_only, rename = "add-block")]
/// Add an empty block after the last one
pub async fn add_block(ctx: CommandContext<'_>) -> Result<(), anyhow::Error> {
    let team = team_id(ctx)?;

    let result = ctx.data().engine.write().await.add_block(team);
    let Some(block) = settle(ctx, result).await? else {
        return Ok(());
    };

    ctx.say(format!(
        "✅ Added block {}, fill it with `/schedule edit`",
        block.range_label()
    ))
    .await?;
    Ok(())
}

#[poise::command(slash_command, guild_only, rename = "call-match")]
/// Ping the scouts of the blocks starting with a match
pub async fn call_match(
    ctx: CommandContext<'_>,
    #[description = "Match number, such as 42"]
    #[rename = "match"]
    number: String,
) -> Result<(), anyhow::Error> {
    let team = team_id(ctx)?;

    let (number, blocks) = {
        let engine = ctx.data().engine.read().await;
        let Some(number) = engine.parser().match_number(&number) else {
            return whisper(ctx, "❌ Please provide a single integer only (e.g. `42`).").await;
        };
        let blocks: Vec<Block> = engine
            .blocks(team)
            .into_iter()
            .filter(|block| block.start == number)
            .collect();
        (number, blocks)
    };

    ctx.defer_ephemeral().await?;
    if blocks.is_empty() {
        return whisper(ctx, format!("No block starts with match {}", number)).await;
    }

    let teams = ctx.data().teams.read().await.all();
    let messenger = DiscordMessenger::new(ctx.serenity_context().http.clone());
    let selected: Vec<&Block> = blocks.iter().collect();
    let dispatch = fan_out(&messenger, &teams, &selected).await;
    info!(
        "match {} called by {}: {} delivered",
        number,
        ctx.author().name,
        dispatch.delivered
    );

    if dispatch.delivered > 0 {
        whisper(ctx, format!("📣 Called match {}", number)).await?;
    } else {
        whisper(ctx, format!("❌ Match {} could not be announced", number)).await?;
    }
    advise(ctx, team).await
}
