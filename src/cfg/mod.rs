use poise::serenity_prelude::ChannelId;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, Default)]
/// Configuration regarding the discord bot configuration
/// this includes the token and the optional audit channel.
pub struct DiscordConfig {
    pub token: String,
    /// Channel where every received command is mirrored.
    /// Left empty, commands are only written to the log.
    #[serde(default)]
    pub audit_channel: Option<ChannelId>,
}

#[derive(Deserialize, Debug, Clone)]
/// Locations of the two json documents owned by the bot.
/// Both paths are expanded (`~`, `$VAR`) before use.
pub struct StorageConfig {
    /// The scouting schedule, shared by every team.
    #[serde(default = "default_schedule_path")]
    pub schedule: String,
    /// The team directory (name, channel and event of each guild).
    #[serde(default = "default_teams_path")]
    pub teams: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            schedule: default_schedule_path(),
            teams: default_teams_path(),
        }
    }
}

fn default_schedule_path() -> String {
    "~/.octoshift/schedule.json".to_string()
}

fn default_teams_path() -> String {
    "~/.octoshift/teams.json".to_string()
}

#[derive(Deserialize, Debug, Clone)]
/// The http endpoint receiving "now queuing" notifications.
pub struct WebhookConfig {
    /// Address the server listens on.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Shared secret expected in the `token` field of every payload.
    /// When unset, every payload is accepted.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            token: None,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3001".to_string()
}

#[derive(Deserialize, Debug, Clone)]
/// Access to the event-data api used to validate event keys.
pub struct EventsConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_events_url")]
    pub base_url: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_events_url(),
        }
    }
}

fn default_events_url() -> String {
    "https://www.thebluealliance.com/api/v3".to_string()
}

#[derive(Deserialize, Debug, Clone)]
/// Tuning of the match-start notifications.
pub struct NotifyConfig {
    /// How long a "now queuing" label is ignored after it was handled.
    /// This uses the humantime syntax (`30s`, `1m`...).
    #[serde(default = "default_debounce")]
    pub debounce: String,
    /// Maximum amount of labels remembered at once.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            debounce: default_debounce(),
            capacity: default_capacity(),
        }
    }
}

fn default_debounce() -> String {
    "30s".to_string()
}

fn default_capacity() -> usize {
    1024
}

#[derive(Deserialize, Debug, Clone, Default)]
/// Main configuration structure
/// This does not have any particular meaning; It just contains
/// all the configuration blocks.
pub struct Config {
    pub discord: DiscordConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Expands `~` and environment variables in a configured path.
pub fn expand_path(path: &str) -> String {
    shellexpand::full_with_context_no_errors(
        path,
        || dirs::home_dir().and_then(|p| p.to_str().map(|s| s.to_string())),
        |f| std::env::var(f).ok(),
    )
    .to_string()
}
