use std::{collections::HashMap, path::PathBuf};

use log::{error, info};
use poise::serenity_prelude::{ChannelId, GuildId};
use serde::{Deserialize, Serialize};

use crate::schedule::store::{read_json, write_json};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// What the bot knows about a guild using it.
pub struct TeamRecord {
    /// Display name of the guild, recorded when the bot joins it.
    #[serde(default)]
    pub name: Option<String>,
    /// Whether the bot is currently a member of the guild.
    /// Messages are only delivered to installed teams.
    #[serde(default)]
    pub installed: bool,
    /// Channel receiving the match notifications.
    #[serde(default)]
    pub channel: Option<ChannelId>,
    /// Key of the competition the team attends (`2025cave`).
    #[serde(default)]
    pub event: Option<String>,
}

impl TeamRecord {
    /// Warnings shown after commands when the team is not fully configured.
    pub fn advisories(&self) -> Vec<&'static str> {
        let mut advisories = Vec::new();
        if self.channel.is_none() {
            advisories.push(
                "⚠️ Set a default channel using `/team channel` to receive notifications!",
            );
        }
        if self.event.is_none() {
            advisories.push("⚠️ Set an event using `/team event` to receive notifications!");
        }
        advisories
    }
}

/// Per guild configuration, kept in memory and rewritten on every change.
#[derive(Debug)]
pub struct TeamDirectory {
    records: HashMap<GuildId, TeamRecord>,
    save_path: PathBuf,
}

impl TeamDirectory {
    /// Loads the directory. A missing file is an empty directory,
    /// a malformed one is logged and ignored.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let save_path = path.into();
        let records = match read_json(&save_path) {
            Ok(records) => records.unwrap_or_default(),
            Err(err) => {
                error!("failed to read the team directory, starting empty: {:?}", err);
                HashMap::new()
            }
        };

        Self { records, save_path }
    }

    pub fn get(&self, team: GuildId) -> TeamRecord {
        self.records.get(&team).cloned().unwrap_or_default()
    }

    pub fn all(&self) -> HashMap<GuildId, TeamRecord> {
        self.records.clone()
    }

    pub fn name(&self, team: GuildId) -> Option<String> {
        self.records.get(&team).and_then(|record| record.name.clone())
    }

    pub fn set_name(&mut self, team: GuildId, name: &str) -> Result<(), anyhow::Error> {
        self.update(team, |record| record.name = Some(name.to_string()))
    }

    pub fn set_channel(&mut self, team: GuildId, channel: ChannelId) -> Result<(), anyhow::Error> {
        self.update(team, |record| record.channel = Some(channel))
    }

    pub fn set_event(&mut self, team: GuildId, event: &str) -> Result<(), anyhow::Error> {
        self.update(team, |record| record.event = Some(event.to_lowercase()))
    }

    pub fn installed(&self, team: GuildId) -> bool {
        self.records.get(&team).is_some_and(|record| record.installed)
    }

    pub fn set_installed(&mut self, team: GuildId, installed: bool) -> Result<(), anyhow::Error> {
        info!("team {} installed: {}", team, installed);
        self.update(team, |record| record.installed = installed)
    }

    /// Label used in logs: the guild name when known, its id otherwise.
    pub fn label(&self, team: GuildId) -> String {
        self.name(team).unwrap_or_else(|| team.to_string())
    }

    fn update(
        &mut self,
        team: GuildId,
        change: impl FnOnce(&mut TeamRecord),
    ) -> Result<(), anyhow::Error> {
        let previous = self.records.get(&team).cloned();
        change(self.records.entry(team).or_default());

        // memory never gets ahead of the file
        if let Err(err) = write_json(&self.save_path, &self.records) {
            match previous {
                Some(record) => self.records.insert(team, record),
                None => self.records.remove(&team),
            };
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_team_has_an_empty_record() {
        let dir = tempfile::tempdir().unwrap();
        let directory = TeamDirectory::new(dir.path().join("teams.json"));

        let record = directory.get(GuildId::new(1));
        assert_eq!(record, TeamRecord::default());
        assert!(!directory.installed(GuildId::new(1)));
        assert_eq!(directory.label(GuildId::new(1)), "1");
    }

    #[test]
    fn setters_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("teams.json");
        let team = GuildId::new(5);

        let mut directory = TeamDirectory::new(&path);
        directory.set_name(team, "Octopi").unwrap();
        directory.set_channel(team, ChannelId::new(77)).unwrap();
        directory.set_event(team, "2025CAVE").unwrap();
        directory.set_installed(team, true).unwrap();

        let reloaded = TeamDirectory::new(&path);
        assert_eq!(reloaded.name(team).as_deref(), Some("Octopi"));
        let record = reloaded.get(team);
        assert_eq!(record.channel, Some(ChannelId::new(77)));
        assert_eq!(record.event.as_deref(), Some("2025cave"));
        assert!(reloaded.installed(team));
        assert_eq!(reloaded.all().len(), 1);
        assert_eq!(reloaded.label(team), "Octopi");
    }

    #[test]
    fn failed_write_leaves_the_record_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let team = GuildId::new(5);
        let mut directory = TeamDirectory::new(dir.path().join("teams.json"));
        directory.set_channel(team, ChannelId::new(77)).unwrap();

        // a plain file where the directory's parent folder should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        directory.save_path = blocker.join("teams.json");

        assert!(directory.set_channel(team, ChannelId::new(88)).is_err());
        assert_eq!(directory.get(team).channel, Some(ChannelId::new(77)));

        assert!(directory.set_event(GuildId::new(6), "2025cave").is_err());
        assert!(directory.all().get(&GuildId::new(6)).is_none());
    }

    #[test]
    fn advisories_follow_missing_fields() {
        let mut record = TeamRecord::default();
        assert_eq!(record.advisories().len(), 2);

        record.channel = Some(ChannelId::new(1));
        assert_eq!(record.advisories().len(), 1);
        assert!(record.advisories()[0].contains("/team event"));

        record.event = Some("2025cave".to_string());
        assert!(record.advisories().is_empty());
    }

    #[test]
    fn malformed_directory_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("teams.json");
        std::fs::write(&path, "[1, 2").unwrap();

        assert!(TeamDirectory::new(&path).all().is_empty());
    }
}
