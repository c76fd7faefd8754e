use std::sync::Arc;

use bot::Bot;
use config::{Config, Environment, File};

mod bot;
mod cfg;
mod commands;
mod events;
mod notify;
mod render;
mod schedule;
mod teams;
mod webhook;

/// Loads the configuration using the `config` crate
fn load_config() -> Result<cfg::Config, anyhow::Error> {
    let settings = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::with_prefix("OCTOSHIFT").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[tokio::main]
/// Entrypoint for the octoshift discord bot.
/// It keeps the scouting schedule of every team using it and pings the
/// scouts of a block when its first match is queuing.
async fn main() -> Result<(), anyhow::Error> {
    pretty_env_logger::init();

    // load the config
    let config = Arc::new(load_config()?);

    Bot::new(config).await?.start().await
}
