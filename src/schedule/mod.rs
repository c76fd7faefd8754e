use std::{collections::BTreeMap, fmt, str::FromStr};

use poise::serenity_prelude::{GuildId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod engine;
pub mod parse;
pub mod store;

pub use engine::{Engine, PendingDelete};

/// One of the six alliance positions a scout watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "Blue 1")]
    Blue1,
    #[serde(rename = "Blue 2")]
    Blue2,
    #[serde(rename = "Blue 3")]
    Blue3,
    #[serde(rename = "Red 1")]
    Red1,
    #[serde(rename = "Red 2")]
    Red2,
    #[serde(rename = "Red 3")]
    Red3,
}

impl Role {
    /// Display order; blue alliance first.
    pub const ALL: [Role; 6] = [
        Role::Blue1,
        Role::Blue2,
        Role::Blue3,
        Role::Red1,
        Role::Red2,
        Role::Red3,
    ];

    /// Canonical label, as stored in the schedule document.
    pub fn label(self) -> &'static str {
        match self {
            Role::Blue1 => "Blue 1",
            Role::Blue2 => "Blue 2",
            Role::Blue3 => "Blue 3",
            Role::Red1 => "Red 1",
            Role::Red2 => "Red 2",
            Role::Red3 => "Red 3",
        }
    }

    /// Alias typed by users in commands.
    pub fn alias(self) -> &'static str {
        match self {
            Role::Blue1 => "blue_1",
            Role::Blue2 => "blue_2",
            Role::Blue3 => "blue_3",
            Role::Red1 => "red_1",
            Role::Red2 => "red_2",
            Role::Red3 => "red_3",
        }
    }

    pub fn is_blue(self) -> bool {
        matches!(self, Role::Blue1 | Role::Blue2 | Role::Blue3)
    }

    pub fn emoji(self) -> &'static str {
        if self.is_blue() {
            "🟦"
        } else {
            "🟥"
        }
    }

    /// Comma separated list of the accepted aliases, used in error messages.
    pub fn allowed_aliases() -> String {
        Role::ALL
            .iter()
            .map(|role| role.alias())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    /// Parses a user supplied alias (`blue_1`, `RED_3`...).
    fn from_str(alias: &str) -> Result<Self, Self::Err> {
        let lower = alias.to_lowercase();
        Role::ALL
            .into_iter()
            .find(|role| role.alias() == lower)
            .ok_or_else(|| ValidationError::UnknownRole(alias.to_string()))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Opaque identifier of a block, assigned at creation and never reused.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    pub fn generate() -> Self {
        Self(format!("block_{}", Uuid::new_v4().simple()))
    }
}

impl From<String> for BlockId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// This struct is stored in the schedule document.
/// A block assigns scouts to every match of an inclusive range for one team.
pub struct Block {
    /// Unique id of the block.
    pub id: BlockId,
    /// Guild owning the block.
    pub team: GuildId,
    /// First match of the block.
    pub start: i64,
    /// Last match of the block (inclusive).
    pub end: i64,
    /// Who scouts which position. Missing roles are unassigned.
    #[serde(default)]
    pub assignments: BTreeMap<Role, UserId>,
}

impl Block {
    pub fn new(team: GuildId, start: i64, end: i64) -> Self {
        Self {
            id: BlockId::generate(),
            team,
            start,
            end,
            assignments: BTreeMap::new(),
        }
    }

    /// Whether the block is the `(start, end)` range of `team`.
    pub fn is_range(&self, team: GuildId, start: i64, end: i64) -> bool {
        self.team == team && self.start == start && self.end == end
    }

    pub fn range_label(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }
}

/// Invalid user input. The message is shown as is to the invoking user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("❌ Invalid format. Please input a block such as \"1-10\" (got \"{0}\")")]
    InvalidRange(String),

    #[error("❌ Invalid role \"{0}\". Please use one of: {aliases}", aliases = Role::allowed_aliases())]
    UnknownRole(String),

    #[error("❌ Invalid user \"{0}\". Mention the scout, for example `@someone`")]
    InvalidMention(String),

    #[error("❌ Please specify a block using `block=10-20`.")]
    MissingBlockMarker,

    #[error("Block {start}-{end} wasn't saved! (out of order)")]
    OutOfOrder { start: i64, end: i64 },

    #[error("Block {start}-{end} wasn't saved! (another block already covers this range)")]
    RangeCollision { start: i64, end: i64 },

    #[error("Syntax error in match number \"{0}\"")]
    RangeSyntax(String),

    #[error("❌ Block {0} no longer exists")]
    UnknownBlock(String),

    #[error("❌ No block can follow match {0}")]
    NoFollowingMatch(i64),
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Block {start}-{end} does not exist!")]
    NotFound { start: i64, end: i64 },

    #[error("failed to persist the schedule: {0}")]
    Persistence(#[from] anyhow::Error),
}
