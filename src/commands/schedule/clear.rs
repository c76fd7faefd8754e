use std::time::Duration;

use log::info;
use poise::serenity_prelude as serenity;
use poise::CreateReply;

use crate::bot::CommandContext;
use crate::commands::{team_id, whisper};
use crate::schedule::{PendingDelete, ScheduleError};

/// How long the confirmation buttons stay usable.
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(120);

/// Asks the invoking user to confirm a deletion.
/// Returns the button press when it was confirmed.
async fn ask(
    ctx: CommandContext<'_>,
    question: &str,
) -> Result<Option<serenity::ComponentInteraction>, anyhow::Error> {
    let ctx_id = ctx.id();
    let confirm_id = format!("{}confirm", ctx_id);
    let cancel_id = format!("{}cancel", ctx_id);

    let buttons = serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new(&confirm_id)
            .label("Yes, delete it")
            .style(serenity::ButtonStyle::Danger),
        serenity::CreateButton::new(&cancel_id)
            .label("Cancel")
            .style(serenity::ButtonStyle::Primary),
    ]);
    let reply = ctx
        .send(
            CreateReply::default()
                .content(question)
                .components(vec![buttons]),
        )
        .await?;

    let press = serenity::ComponentInteractionCollector::new(ctx.serenity_context())
        .author_id(ctx.author().id)
        .filter(move |press| press.data.custom_id.starts_with(&ctx_id.to_string()))
        .timeout(CONFIRM_TIMEOUT)
        .await;

    match press {
        Some(press) if press.data.custom_id == confirm_id => Ok(Some(press)),
        Some(press) => {
            resolve(ctx, &press, "Canceled").await?;
            Ok(None)
        }
        None => {
            reply
                .edit(
                    ctx,
                    CreateReply::default()
                        .content("Canceled, no answer was given")
                        .components(vec![]),
                )
                .await?;
            Ok(None)
        }
    }
}

/// Replaces the confirmation message with `text`.
async fn resolve(
    ctx: CommandContext<'_>,
    press: &serenity::ComponentInteraction,
    text: &str,
) -> Result<(), anyhow::Error> {
    press
        .create_response(
            ctx.serenity_context(),
            serenity::CreateInteractionResponse::UpdateMessage(
                serenity::CreateInteractionResponseMessage::new()
                    .content(text)
                    .components(vec![]),
            ),
        )
        .await?;
    Ok(())
}

/// Runs a confirmed deletion and reports its outcome.
/// Returns whether something was deleted.
async fn execute(
    ctx: CommandContext<'_>,
    press: &serenity::ComponentInteraction,
    pending: PendingDelete,
    done: &str,
) -> Result<bool, anyhow::Error> {
    let result = ctx.data().engine.write().await.confirm(pending);
    match result {
        Ok(removed) => {
            info!("{} deleted {} blocks", ctx.author().name, removed);
            resolve(ctx, press, done).await?;
            Ok(true)
        }
        Err(ScheduleError::Persistence(err)) => Err(err),
        Err(err) => {
            resolve(ctx, press, &err.to_string()).await?;
            Ok(false)
        }
    }
}

#[poise::command(slash_command, guild_only)]
/// Delete the whole schedule of your team
pub async fn clear(ctx: CommandContext<'_>) -> Result<(), anyhow::Error> {
    let team = team_id(ctx)?;
    let pending = ctx.data().engine.read().await.propose_delete_all(team);

    let Some(press) = ask(
        ctx,
        "⚠️ Are you sure you want to delete your team's *entire schedule*? This cannot be undone!⚠️",
    )
    .await?
    else {
        return Ok(());
    };

    if execute(ctx, &press, pending, "Schedule has been deleted").await? {
        ctx.channel_id()
            .say(
                ctx.http(),
                format!("<@{}> has deleted the entire schedule", ctx.author().id),
            )
            .await?;
    }
    Ok(())
}

#[poise::command(slash_command, guild_only, rename = "clear-block")]
/// Delete one block of the schedule
pub async fn clear_block(
    ctx: CommandContext<'_>,
    #[description = "Matches of the block, such as 1-10"] range: String,
) -> Result<(), anyhow::Error> {
    let team = team_id(ctx)?;

    let pending = {
        let engine = ctx.data().engine.read().await;
        match engine.parser().range(&range) {
            Ok((start, end)) => engine.propose_delete_block(team, start, end),
            Err(err) => return whisper(ctx, err.to_string()).await,
        }
    };
    let Some((start, end)) = pending.range() else {
        return Ok(());
    };

    let Some(press) = ask(
        ctx,
        &format!(
            "⚠️ Are you sure you want to delete block {}-{}? This cannot be undone!⚠️",
            start, end
        ),
    )
    .await?
    else {
        return Ok(());
    };

    if execute(ctx, &press, pending, "Block has been deleted").await? {
        ctx.channel_id()
            .say(
                ctx.http(),
                format!(
                    "<@{}> has deleted block {}-{}",
                    ctx.author().id,
                    start,
                    end
                ),
            )
            .await?;
    }
    Ok(())
}
