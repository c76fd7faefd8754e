use anyhow::Context;
use chrono::NaiveDate;
use log::{debug, warn};
use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::cfg::EventsConfig;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
/// The part of an event returned by the event-data api we care about.
pub struct EventInfo {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl EventInfo {
    /// `Name (start - end)` when the dates are known.
    pub fn describe(&self) -> String {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => format!(
                "{} ({} - {})",
                self.name,
                start.format("%b %-d"),
                end.format("%b %-d, %Y")
            ),
            _ => self.name.clone(),
        }
    }
}

/// Client of The Blue Alliance api, used to validate event keys.
#[derive(Debug, Clone)]
pub struct EventClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    /// Season followed by the event code, such as `2025cave`.
    key: Regex,
}

impl EventClient {
    pub fn new(config: &EventsConfig) -> Result<Self, anyhow::Error> {
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            key: Regex::new(r"^\d{4}[a-z0-9]+$").context("invalid event key pattern")?,
        })
    }

    /// Looks an event up. `Ok(None)` means the key does not exist.
    /// Malformed keys never reach the service.
    pub async fn lookup(&self, key: &str) -> Result<Option<EventInfo>, anyhow::Error> {
        let key = key.trim().to_lowercase();
        if !self.key.is_match(&key) {
            warn!("refusing to look up malformed event key {:?}", key);
            return Ok(None);
        }

        let url = format!("{}/event/{}", self.base_url, key);
        debug!("looking up event at {}", url);

        let response = self
            .http
            .get(&url)
            .header("X-TBA-Auth-Key", &self.api_key)
            .send()
            .await
            .context("failed to reach the event service")?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(
                response
                    .json()
                    .await
                    .context("failed to decode the event")?,
            )),
            status => anyhow::bail!("event service answered {}", status),
        }
    }
}
