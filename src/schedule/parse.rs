use std::num::NonZeroU64;

use anyhow::Context;
use poise::serenity_prelude::UserId;
use regex::Regex;

use super::{Role, ValidationError};

/// A parsed `block=S-E role=@user...` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockAssignment {
    pub start: i64,
    pub end: i64,
    pub assignments: Vec<(Role, UserId)>,
}

/// Every pattern understood by the bot, compiled once at startup.
#[derive(Debug, Clone)]
pub struct Parser {
    range: Regex,
    form_range: Regex,
    mention: Regex,
    block_marker: Regex,
    role_token: Regex,
    match_number: Regex,
    queuing_label: Regex,
}

impl Parser {
    pub fn new() -> Result<Self, anyhow::Error> {
        Ok(Self {
            range: Regex::new(r"^(\d+)-(\d+)$").context("failed to build the range regex")?,
            form_range: Regex::new(r"^\s*(-?\d+)\s*-\s*(-?\d+)\s*$")
                .context("failed to build the form range regex")?,
            mention: Regex::new(r"^<@!?(\d+)>$").context("failed to build the mention regex")?,
            block_marker: Regex::new(r"block=(\d+)-(\d+)")
                .context("failed to build the block marker regex")?,
            role_token: Regex::new(r"(\w+)=\s*<@!?(\d+)>")
                .context("failed to build the role token regex")?,
            match_number: Regex::new(r"^\d+$").context("failed to build the match regex")?,
            queuing_label: Regex::new(r"Qualification.*?(\d+)$")
                .context("failed to build the queuing label regex")?,
        })
    }

    /// Parses a `start-end` range typed in a command.
    pub fn range(&self, text: &str) -> Result<(i64, i64), ValidationError> {
        let text = text.trim();
        let captures = self
            .range
            .captures(text)
            .ok_or_else(|| ValidationError::InvalidRange(text.to_string()))?;

        let start = captures[1]
            .parse()
            .map_err(|_| ValidationError::InvalidRange(text.to_string()))?;
        let end = captures[2]
            .parse()
            .map_err(|_| ValidationError::InvalidRange(text.to_string()))?;

        Ok((start, end))
    }

    /// Parses the range field of the edit form, which tolerates spaces
    /// and signs. Ordering is checked by the caller.
    pub fn form_range(&self, text: &str) -> Result<(i64, i64), ValidationError> {
        let captures = self
            .form_range
            .captures(text)
            .ok_or_else(|| ValidationError::RangeSyntax(text.to_string()))?;

        let start = captures[1]
            .parse()
            .map_err(|_| ValidationError::RangeSyntax(text.to_string()))?;
        let end = captures[2]
            .parse()
            .map_err(|_| ValidationError::RangeSyntax(text.to_string()))?;

        Ok((start, end))
    }

    /// Parses a user mention (`<@123>` or `<@!123>`).
    pub fn mention(&self, text: &str) -> Result<UserId, ValidationError> {
        let text = text.trim();
        self.mention
            .captures(text)
            .and_then(|captures| captures[1].parse::<u64>().ok())
            .and_then(NonZeroU64::new)
            .map(UserId::from)
            .ok_or_else(|| ValidationError::InvalidMention(text.to_string()))
    }

    /// Collects every `alias=@user` token of `text`.
    /// The first unknown alias fails the whole text.
    pub fn role_tokens(&self, text: &str) -> Result<Vec<(Role, UserId)>, ValidationError> {
        let mut tokens = Vec::new();

        for captures in self.role_token.captures_iter(text) {
            let role: Role = captures[1].parse()?;
            let user = captures[2]
                .parse::<u64>()
                .ok()
                .and_then(NonZeroU64::new)
                .map(UserId::from)
                .ok_or_else(|| ValidationError::InvalidMention(captures[0].to_string()))?;

            tokens.push((role, user));
        }

        Ok(tokens)
    }

    /// Parses the text of a multi assignment command:
    /// `block=10-20 blue_1=@a red_2=@b`.
    pub fn block_assignment(&self, text: &str) -> Result<BlockAssignment, ValidationError> {
        let captures = self
            .block_marker
            .captures(text)
            .ok_or(ValidationError::MissingBlockMarker)?;

        let start = captures[1]
            .parse()
            .map_err(|_| ValidationError::InvalidRange(captures[0].to_string()))?;
        let end = captures[2]
            .parse()
            .map_err(|_| ValidationError::InvalidRange(captures[0].to_string()))?;

        Ok(BlockAssignment {
            start,
            end,
            assignments: self.role_tokens(text)?,
        })
    }

    /// Parses the argument of a manual match call.
    pub fn match_number(&self, text: &str) -> Option<i64> {
        let text = text.trim();
        if !self.match_number.is_match(text) {
            return None;
        }
        text.parse().ok()
    }

    /// Extracts the match number of a "now queuing" label.
    /// Only qualification matches are recognised.
    pub fn queuing_match(&self, label: &str) -> Option<i64> {
        self.queuing_label
            .captures(label.trim())
            .and_then(|captures| captures[1].parse().ok())
    }
}

/// Renders assignments back into the `alias=<@id>` syntax.
pub fn format_role_tokens<'a>(assignments: impl IntoIterator<Item = (&'a Role, &'a UserId)>) -> String {
    assignments
        .into_iter()
        .map(|(role, user)| format!("{}=<@{}>", role.alias(), user))
        .collect::<Vec<_>>()
        .join(" ")
}
