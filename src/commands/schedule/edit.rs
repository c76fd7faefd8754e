use std::collections::HashMap;

use poise::serenity_prelude as serenity;
use poise::Modal;

use crate::bot::{ApplicationContext, CommandContext};
use crate::commands::{settle, team_id, whisper};
use crate::schedule::{
    engine::FormFields, parse::format_role_tokens, BlockId, ValidationError,
};

#[derive(Debug, Modal)]
#[name = "Edit block"]
struct BlockForm {
    #[name = "Matches"]
    #[placeholder = "10-20"]
    range: String,
    #[name = "Scouts"]
    #[placeholder = "blue_1=<@123> red_2=<@456>"]
    #[paragraph]
    assignments: Option<String>,
}

async fn autocomplete_block(
    ctx: CommandContext<'_>,
    partial: &str,
) -> impl Iterator<Item = serenity::AutocompleteChoice> {
    let blocks = match ctx.guild_id() {
        Some(team) => ctx.data().engine.read().await.blocks(team),
        None => Vec::new(),
    };

    blocks
        .into_iter()
        .map(|block| (format!("M {}", block.range_label()), block.id))
        .filter(|(label, _)| label.contains(partial))
        .take(25)
        .map(|(label, id)| serenity::AutocompleteChoice::new(label, id.to_string()))
        .collect::<Vec<_>>()
        .into_iter()
}

#[poise::command(slash_command, guild_only)]
/// Edit the matches and scouts of one block
pub async fn edit(
    ctx: ApplicationContext<'_>,
    #[description = "The block to edit"]
    #[autocomplete = "autocomplete_block"]
    block: String,
) -> Result<(), anyhow::Error> {
    let command: CommandContext = poise::Context::Application(ctx);
    let team = team_id(command)?;
    let id = BlockId::from(block);

    let Some(current) = command.data().engine.read().await.block(team, &id) else {
        return whisper(command, ValidationError::UnknownBlock(id.to_string()).to_string()).await;
    };

    let defaults = BlockForm {
        range: current.range_label(),
        assignments: Some(format_role_tokens(&current.assignments)),
    };
    let Some(form) = BlockForm::execute_with_defaults(ctx, defaults).await? else {
        return Ok(());
    };

    let fields = HashMap::from([(
        id.clone(),
        FormFields {
            range: form.range,
            assignments: form.assignments.unwrap_or_default(),
        },
    )]);
    let result = command.data().engine.write().await.reconcile_form(team, &fields);
    let Some(errors) = settle(command, result).await? else {
        return Ok(());
    };

    if errors.is_empty() {
        let label = command
            .data()
            .engine
            .read()
            .await
            .block(team, &id)
            .map_or(current.range_label(), |block| block.range_label());
        whisper(command, format!("✅ Block {} saved", label)).await
    } else {
        let report: Vec<String> = errors.iter().map(ToString::to_string).collect();
        whisper(command, report.join("\n")).await
    }
}
