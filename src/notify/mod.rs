use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use poise::serenity_prelude::{ChannelId, CreateAttachment, CreateMessage, GuildId, Http};

use crate::{
    schedule::{parse::Parser, Block, Role},
    teams::TeamRecord,
};

pub mod debounce;

use self::debounce::ExpiringSet;

/// Outbound side of the chat platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn post_message(&self, channel: ChannelId, text: &str) -> Result<(), anyhow::Error>;

    /// Uploads `data` as a file named `name`, with `caption` as the message.
    async fn post_file(
        &self,
        channel: ChannelId,
        name: &str,
        data: Vec<u8>,
        caption: &str,
    ) -> Result<(), anyhow::Error>;
}

/// Delivers messages through the bot's discord connection.
pub struct DiscordMessenger {
    http: Arc<Http>,
}

impl DiscordMessenger {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Messenger for DiscordMessenger {
    async fn post_message(&self, channel: ChannelId, text: &str) -> Result<(), anyhow::Error> {
        channel.say(&self.http, text).await?;
        Ok(())
    }

    async fn post_file(
        &self,
        channel: ChannelId,
        name: &str,
        data: Vec<u8>,
        caption: &str,
    ) -> Result<(), anyhow::Error> {
        let message = CreateMessage::new()
            .content(caption)
            .add_file(CreateAttachment::bytes(data, name));
        channel.send_message(&self.http, message).await?;
        Ok(())
    }
}

/// Why a "now queuing" notification was ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ignored {
    /// Not a qualification match, or no match number.
    NotQualification,
    /// The same label was handled within the debounce window.
    Duplicate,
}

/// Counters of a fan out, for logs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Decides which "now queuing" notifications are handled.
#[derive(Debug)]
pub struct Notifier {
    recent: ExpiringSet,
}

impl Notifier {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            recent: ExpiringSet::new(window, capacity),
        }
    }

    /// Returns the match number of `label` when it should be announced.
    /// The raw label is remembered for the debounce window.
    pub fn accept(&mut self, parser: &Parser, label: &str) -> Result<i64, Ignored> {
        let number = parser.queuing_match(label).ok_or(Ignored::NotQualification)?;

        if !self.recent.insert(label) {
            return Err(Ignored::Duplicate);
        }

        debug!(
            "accepted {:?} for {:?} ({} labels remembered)",
            label,
            self.recent.window(),
            self.recent.len()
        );
        Ok(number)
    }
}

/// Blocks of every team starting at `number`.
/// When `event` is given, only teams attending it are selected.
pub fn starting_blocks<'a>(
    blocks: &'a [Block],
    teams: &HashMap<GuildId, TeamRecord>,
    number: i64,
    event: Option<&str>,
) -> Vec<&'a Block> {
    blocks
        .iter()
        .filter(|block| block.start == number)
        .filter(|block| match event {
            Some(event) => teams
                .get(&block.team)
                .and_then(|record| record.event.as_deref())
                .is_some_and(|team_event| team_event.eq_ignore_ascii_case(event)),
            None => true,
        })
        .collect()
}

/// The message pinging the scouts of a block.
pub fn roster_message(block: &Block) -> String {
    let mut message = format!(
        "Prepare to scout starting with match {} until match {} \n",
        block.start, block.end
    );

    for (index, role) in Role::ALL.iter().enumerate() {
        if index == 3 {
            message.push('\n');
        }
        message.push_str(role.emoji());
        message.push_str(role.label());
        message.push_str(": ");
        match block.assignments.get(role) {
            Some(user) => message.push_str(&format!("<@{}>\t", user)),
            None => message.push_str("none\t"),
        }
    }

    message
}

/// Sends the roster of every block to its team's channel.
/// A team without an installation or a channel is skipped, and a failed
/// delivery never stops the others.
pub async fn fan_out(
    messenger: &dyn Messenger,
    teams: &HashMap<GuildId, TeamRecord>,
    blocks: &[&Block],
) -> Dispatch {
    let mut dispatch = Dispatch::default();

    for block in blocks {
        let record = teams.get(&block.team).cloned().unwrap_or_default();
        let label = record.name.clone().unwrap_or_else(|| block.team.to_string());

        let channel = match record.channel {
            Some(channel) if record.installed => channel,
            _ => {
                warn!("missing installation or channel for team {}", label);
                dispatch.skipped += 1;
                continue;
            }
        };

        match messenger.post_message(channel, &roster_message(block)).await {
            Ok(()) => {
                info!("sent roster for {} to {}", block.range_label(), label);
                dispatch.delivered += 1;
            }
            Err(err) => {
                error!("failed to send roster to {}: {:?}", label, err);
                dispatch.failed += 1;
            }
        }
    }

    dispatch
}

#[cfg(test)]
pub(crate) mod tests {
    use poise::serenity_prelude::UserId;
    use tokio::sync::Mutex;

    use super::*;

    /// Records every message instead of sending it.
    #[derive(Default)]
    pub(crate) struct RecordingMessenger {
        pub sent: Mutex<Vec<(ChannelId, String)>>,
        /// Uploaded files as `(channel, name, caption)`.
        pub uploads: Mutex<Vec<(ChannelId, String, String)>>,
        pub failing: Option<ChannelId>,
        pub refuse_files: bool,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn post_message(&self, channel: ChannelId, text: &str) -> Result<(), anyhow::Error> {
            if self.failing == Some(channel) {
                anyhow::bail!("channel {} is gone", channel);
            }
            self.sent.lock().await.push((channel, text.to_string()));
            Ok(())
        }

        async fn post_file(
            &self,
            channel: ChannelId,
            name: &str,
            _data: Vec<u8>,
            caption: &str,
        ) -> Result<(), anyhow::Error> {
            if self.refuse_files {
                anyhow::bail!("cannot attach files in {}", channel);
            }
            self.uploads
                .lock()
                .await
                .push((channel, name.to_string(), caption.to_string()));
            Ok(())
        }
    }

    fn team(channel: u64, event: &str) -> TeamRecord {
        TeamRecord {
            name: Some(format!("team {}", channel)),
            installed: true,
            channel: Some(ChannelId::new(channel)),
            event: Some(event.to_string()),
        }
    }

    fn block(team: u64, start: i64, end: i64) -> Block {
        Block::new(GuildId::new(team), start, end)
    }

    #[test]
    fn roster_lists_every_role() {
        let mut block = block(1, 12, 20);
        block.assignments.insert(Role::Blue1, UserId::new(5));
        block.assignments.insert(Role::Red3, UserId::new(6));

        assert_eq!(
            roster_message(&block),
            "Prepare to scout starting with match 12 until match 20 \n\
             🟦Blue 1: <@5>\t🟦Blue 2: none\t🟦Blue 3: none\t\n\
             🟥Red 1: none\t🟥Red 2: none\t🟥Red 3: <@6>\t"
        );
    }

    #[test]
    fn accept_only_qualifications_once() {
        let parser = Parser::new().unwrap();
        let mut notifier = Notifier::new(Duration::from_secs(30), 64);

        assert_eq!(notifier.accept(&parser, "Qualification 12"), Ok(12));
        assert_eq!(
            notifier.accept(&parser, "Qualification 12"),
            Err(Ignored::Duplicate)
        );
        assert_eq!(
            notifier.accept(&parser, "Playoff 4"),
            Err(Ignored::NotQualification)
        );
        assert_eq!(notifier.accept(&parser, "Qualification 13"), Ok(13));
    }

    #[tokio::test(start_paused = true)]
    async fn accept_again_once_the_window_lapsed() {
        let parser = Parser::new().unwrap();
        let mut notifier = Notifier::new(Duration::from_secs(30), 64);

        assert_eq!(notifier.accept(&parser, "Qualification 12"), Ok(12));
        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(
            notifier.accept(&parser, "Qualification 12"),
            Err(Ignored::Duplicate)
        );
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(notifier.accept(&parser, "Qualification 12"), Ok(12));
    }

    #[test]
    fn starting_blocks_filters_on_match_and_event() {
        let blocks = vec![block(1, 12, 20), block(2, 12, 15), block(1, 21, 30), block(3, 12, 14)];
        let mut teams = HashMap::new();
        teams.insert(GuildId::new(1), team(10, "2025cave"));
        teams.insert(GuildId::new(2), team(20, "2025txhou"));

        let all = starting_blocks(&blocks, &teams, 12, None);
        assert_eq!(all.len(), 3);

        let cave = starting_blocks(&blocks, &teams, 12, Some("2025CAVE"));
        assert_eq!(cave.len(), 1);
        assert_eq!(cave[0].team, GuildId::new(1));

        assert!(starting_blocks(&blocks, &teams, 13, None).is_empty());
    }

    #[tokio::test]
    async fn fan_out_skips_unconfigured_teams() {
        let blocks = vec![block(1, 12, 20), block(2, 12, 15), block(3, 12, 14), block(4, 12, 13)];
        let mut teams = HashMap::new();
        teams.insert(GuildId::new(1), team(10, "2025cave"));
        let mut no_channel = team(20, "2025cave");
        no_channel.channel = None;
        teams.insert(GuildId::new(2), no_channel);
        let mut removed = team(30, "2025cave");
        removed.installed = false;
        teams.insert(GuildId::new(3), removed);
        teams.insert(GuildId::new(4), team(40, "2025cave"));

        let messenger = RecordingMessenger {
            failing: Some(ChannelId::new(40)),
            ..Default::default()
        };
        let selected: Vec<&Block> = blocks.iter().collect();
        let dispatch = fan_out(&messenger, &teams, &selected).await;

        assert_eq!(
            dispatch,
            Dispatch {
                delivered: 1,
                skipped: 2,
                failed: 1
            }
        );
        let sent = messenger.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ChannelId::new(10));
        assert!(sent[0].1.starts_with("Prepare to scout starting with match 12 until match 20"));
    }
}
