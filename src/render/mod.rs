use std::collections::{BTreeSet, HashMap};

use log::warn;
use poise::serenity_prelude::{ChannelId, UserId};

use crate::notify::Messenger;
use crate::schedule::{Block, Role};

pub mod picture;

/// Name of the uploaded schedule picture.
pub const PICTURE_NAME: &str = "schedule.png";

pub const HEADER: &str =
    "Block     Blue 1      Blue 2      Blue 3      Red 1       Red 2       Red 3";

/// Discord rejects messages longer than this.
pub const MESSAGE_LIMIT: usize = 2000;

const BLOCK_WIDTH: usize = 10;
const NAME_WIDTH: usize = 12;

/// Pads `name` to the name column, or cuts it with an ellipsis.
fn cell(name: &str) -> String {
    let length = name.chars().count();
    if length >= NAME_WIDTH {
        let cut: String = name.chars().take(NAME_WIDTH - 2).collect();
        format!("{}… ", cut)
    } else {
        format!("{}{}", name, " ".repeat(NAME_WIDTH - length))
    }
}

/// One line of the schedule table.
/// Assignees missing from `names` are shown as `unknown`.
pub fn row(block: &Block, names: &HashMap<UserId, String>) -> String {
    let mut row = format!("{:<width$}", format!("M {}", block.range_label()), width = BLOCK_WIDTH);

    for role in Role::ALL {
        let name = match block.assignments.get(&role) {
            Some(user) => names.get(user).map_or("unknown", String::as_str),
            None => "none",
        };
        row.push_str(&cell(name));
    }

    row.trim_end().to_string()
}

/// Every scout of `blocks`, once, in id order.
pub fn assignees(blocks: &[Block]) -> BTreeSet<UserId> {
    blocks
        .iter()
        .flat_map(|block| block.assignments.values().copied())
        .collect()
}

/// `Scouts: <@1> <@2>`
pub fn ping_line(blocks: &[Block]) -> Option<String> {
    let users = assignees(blocks);
    if users.is_empty() {
        return None;
    }

    let mentions: Vec<String> = users.iter().map(|user| format!("<@{}>", user)).collect();
    Some(format!("Scouts: {}", mentions.join(" ")))
}

/// Splits the table in code blocks that each fit in one message.
pub fn pages(rows: &[String]) -> Vec<String> {
    let open = format!("```\n{}\n", HEADER);
    let close = "```";

    let mut pages = Vec::new();
    let mut page = open.clone();
    let mut has_rows = false;

    for row in rows {
        if has_rows && page.len() + row.len() + 1 + close.len() > MESSAGE_LIMIT {
            page.push_str(close);
            pages.push(page);
            page = open.clone();
        }
        page.push_str(row);
        page.push('\n');
        has_rows = true;
    }

    page.push_str(close);
    pages.push(page);
    pages
}

/// Posts the schedule as a picture captioned with `caption`.
/// When the picture cannot be drawn or uploaded, the caption and the
/// text pages are posted instead.
pub async fn publish(
    messenger: &dyn Messenger,
    channel: ChannelId,
    rows: &[String],
    caption: &str,
) -> Result<(), anyhow::Error> {
    match picture::png(rows) {
        Ok(data) => match messenger.post_file(channel, PICTURE_NAME, data, caption).await {
            Ok(()) => return Ok(()),
            Err(err) => warn!("failed to upload the schedule picture, sending text: {:?}", err),
        },
        Err(err) => warn!("failed to draw the schedule, sending text: {:?}", err),
    }

    messenger.post_message(channel, caption).await?;
    for page in pages(rows) {
        messenger.post_message(channel, &page).await?;
    }
    Ok(())
}
