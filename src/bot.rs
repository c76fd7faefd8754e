use crate::cfg::{expand_path, Config};
use crate::commands;
use crate::events::EventClient;
use crate::notify::{DiscordMessenger, Notifier};
use crate::schedule::{parse::Parser, store::ScheduleStore, Engine};
use crate::teams::TeamDirectory;
use crate::webhook::{self, WebhookState};
use anyhow::Context;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::{error, info, warn};
use poise::serenity_prelude::{self as serenity, ClientBuilder, GatewayIntents};
use poise::CreateReply;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;
use tokio::{
    signal,
    sync::{broadcast::Sender, Mutex, RwLock},
};

pub type CommandContext<'a> = poise::Context<'a, Arc<Data>, anyhow::Error>;
pub type ApplicationContext<'a> = poise::ApplicationContext<'a, Arc<Data>, anyhow::Error>;

// User data, which is stored and accessible in all command invocations
pub struct Data {
    pub config: Arc<Config>,
    pub engine: RwLock<Engine>,
    pub teams: RwLock<TeamDirectory>,
    pub notifier: Mutex<Notifier>,
    pub events: EventClient,
}

impl Data {
    pub fn new(config: Arc<Config>) -> Result<Self, anyhow::Error> {
        let parser = Parser::new()?;
        let store = ScheduleStore::new(expand_path(&config.storage.schedule));
        info!("schedule stored in {}", store.path().display());
        let teams = TeamDirectory::new(expand_path(&config.storage.teams));

        let window = humantime::parse_duration(&config.notify.debounce)
            .context("invalid format in the notify.debounce duration")?;

        Ok(Self {
            engine: RwLock::new(Engine::new(store, parser)),
            teams: RwLock::new(teams),
            notifier: Mutex::new(Notifier::new(window, config.notify.capacity)),
            events: EventClient::new(&config.events)?,
            config,
        })
    }
}

pub struct Bot {
    pub data: Arc<Data>,
    pub shutdown: Receiver<()>,
    shutdown_send: Sender<()>,
}

/// Sends a message through `shutdown_send` when a stop signal is detected.
/// Used to start the bot stop sequence.
async fn wait_for_stop_signal(bot: Arc<Bot>) -> Result<(), anyhow::Error> {
    let mut shutdown = bot.shutdown.resubscribe();
    tokio::select! {
        result = signal::ctrl_c() => {
            match result {
                Ok(()) => {
                    bot.shutdown_send
                        .send(())
                        .context("failed to send a shutdown signal")?;
                    Ok(())
                }
                Err(err) => Err(anyhow::anyhow!(err)),
            }
        },
        _ = shutdown.recv() => { Ok(()) }
    }
}

async fn on_error(error: poise::FrameworkError<'_, Arc<Data>, anyhow::Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => panic!("Failed to start bot: {:?}", error),
        poise::FrameworkError::Command { error, ctx, .. } => {
            let f = CreateReply::default()
                .ephemeral(true)
                .content(format!("{}", error));
            std::mem::drop(ctx.send(f).await);
            error!("Error in command `{}`: {:?}", ctx.command().name, error);
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

/// Keeps the team directory in sync with the guilds the bot is in,
/// and greets users mentioning the bot.
async fn on_event(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    data: &Arc<Data>,
) -> Result<(), anyhow::Error> {
    match event {
        serenity::FullEvent::GuildCreate { guild, .. } => {
            let mut teams = data.teams.write().await;
            if teams.name(guild.id).as_deref() != Some(guild.name.as_str()) {
                teams.set_name(guild.id, &guild.name)?;
            }
            if !teams.installed(guild.id) {
                info!("{} has installed the bot", guild.name);
                teams.set_installed(guild.id, true)?;
            }
        }
        serenity::FullEvent::GuildDelete { incomplete, .. } => {
            // an unavailable guild is an outage, not a removal
            if !incomplete.unavailable {
                let mut teams = data.teams.write().await;
                info!("{} has removed the bot", teams.label(incomplete.id));
                teams.set_installed(incomplete.id, false)?;
            }
        }
        serenity::FullEvent::Message { new_message } => {
            let me = ctx.cache.current_user().id;
            if new_message.author.bot || !new_message.mentions_user_id(me) {
                return Ok(());
            }

            if let Some(guild) = new_message.guild_id {
                info!(
                    "mentioned by {} in {}",
                    new_message.author.name,
                    data.teams.read().await.label(guild)
                );
            }
            new_message
                .channel_id
                .say(&ctx.http, format!("👋 Hello, <@{}>!", new_message.author.id))
                .await?;
        }
        _ => {}
    }

    Ok(())
}

impl Bot {
    pub async fn new(config: Arc<Config>) -> Result<Arc<Self>, anyhow::Error> {
        // Theses signals are used to stop the many tasks trigered.
        // this is called by the task listening for a stop signal.
        let (shutdown_send, shutdown) = tokio::sync::broadcast::channel(1);

        let data = Arc::new(Data::new(config)?);

        Ok(Arc::new(Self {
            data,
            shutdown,
            shutdown_send,
        }))
    }

    pub async fn start(self: Arc<Self>) -> Result<(), anyhow::Error> {
        let mut shutdown = self.shutdown.resubscribe();
        let mut tasks = FuturesUnordered::new();

        let options = poise::FrameworkOptions {
            commands: vec![
                commands::help(),
                commands::register(),
                commands::schedule::root(),
                commands::team::root(),
            ],
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: None,
                edit_tracker: Some(Arc::new(poise::EditTracker::for_timespan(
                    Duration::from_secs(3600),
                ))),
                mention_as_prefix: true,
                ..Default::default()
            },
            on_error: |error| Box::pin(on_error(error)),
            pre_command: |ctx| Box::pin(commands::log_command(ctx)),
            event_handler: |ctx, event, _framework, data| Box::pin(on_event(ctx, event, data)),
            ..Default::default()
        };
        let data = self.data.clone();
        let framework = poise::Framework::builder()
            .options(options)
            .setup(move |ctx, _ready, framework| {
                Box::pin(async move {
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                    Ok(data)
                })
            })
            .build();
        let client = ClientBuilder::new(
            self.data.config.discord.token.clone(),
            GatewayIntents::non_privileged(),
        )
        .framework(framework);

        let mut client = client.await.context("failed to create the discord client")?;
        let http = client.http.clone();

        tasks.push(tokio::spawn(async move {
            // wait until the bot terminates or a shutdown signal is received.
            tokio::select! {
                result = client.start_autosharded() => {
                    if let Err(err) = result {
                        error!("Client error: {}", err);
                    }
                },
                _ = shutdown.recv() => {
                    // shutdown the bot properly
                    client.shard_manager.shutdown_all().await;
                }
            };
        }));

        let state = WebhookState {
            data: self.data.clone(),
            messenger: Arc::new(DiscordMessenger::new(http)),
        };
        let bind = self.data.config.webhook.bind.clone();
        let shutdown = self.shutdown.resubscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(err) = webhook::serve(&bind, state, shutdown).await {
                error!("Webhook server error: {:?}", err);
            }
        }));

        let self_clone = self.clone();
        tasks.push(tokio::spawn(async {
            if let Err(err) = wait_for_stop_signal(self_clone).await {
                warn!("failed to wait for a stop signal: {}", err);
            }
        }));

        // wait for a task to finish.
        let task = tasks
            .next()
            .await
            .context("no tasks started, illegal state")?
            .context("failed to join task");

        // when a task is finished, we must terminate all the others,
        // hence we send a signal talling all tasks to stop processing
        // and return.
        std::mem::drop(self.shutdown_send.send(()));

        while let Some(operation) = tasks.next().await {
            operation.context("failed to join task")?;
        }

        task?;
        Ok(())
    }
}
