use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use hmac::{Hmac, Mac};
use log::{debug, info, warn};
use serde::Deserialize;
use sha2::Sha256;
use tokio::{net::TcpListener, sync::broadcast::Receiver};

use crate::{
    bot::Data,
    notify::{fan_out, starting_blocks, Dispatch, Ignored, Messenger},
};

type HmacSha256 = Hmac<Sha256>;

/// Key of the tags compared by [`authorized`]. Both sides are tagged with
/// the same key, so its value has no meaning of its own.
const TAG_KEY: &[u8] = b"octoshift-webhook-token";

#[derive(Clone)]
pub struct WebhookState {
    pub data: Arc<Data>,
    pub messenger: Arc<dyn Messenger>,
}

/// Body posted by the match-status service.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueuingPayload {
    #[serde(default)]
    pub token: Option<String>,
    /// Label of the match being queued (`Qualification 12`).
    #[serde(default)]
    pub now_queuing: Option<String>,
    #[serde(default)]
    pub event_key: Option<String>,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", post(receive))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

/// Runs the webhook server until a shutdown signal is received.
pub async fn serve(
    bind: &str,
    state: WebhookState,
    mut shutdown: Receiver<()>,
) -> Result<(), anyhow::Error> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind the webhook server on {}", bind))?;
    info!("webhook server listening on {}", bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            std::mem::drop(shutdown.recv().await);
        })
        .await
        .context("webhook server stopped")
}

/// Compares two secrets through their HMAC tags, in constant time.
fn authorized(expected: &str, provided: &str) -> bool {
    let tag = |value: &str| {
        HmacSha256::new_from_slice(TAG_KEY).map(|mut mac| {
            mac.update(value.as_bytes());
            mac
        })
    };

    match (tag(expected), tag(provided)) {
        (Ok(expected), Ok(provided)) => expected
            .verify_slice(&provided.finalize().into_bytes())
            .is_ok(),
        _ => false,
    }
}

async fn receive(
    State(state): State<WebhookState>,
    Json(payload): Json<QueuingPayload>,
) -> (StatusCode, &'static str) {
    if let Some(expected) = &state.data.config.webhook.token {
        let provided = payload.token.as_deref().unwrap_or_default();
        if !authorized(expected, provided) {
            warn!("rejected a webhook call with an invalid token");
            return (StatusCode::UNAUTHORIZED, "Unauthorized");
        }
    }

    let Some(label) = payload.now_queuing else {
        debug!("webhook registration ping");
        return (StatusCode::OK, "OK");
    };

    // the caller only needs to know we got it
    let event = payload.event_key;
    tokio::spawn(async move {
        announce(&state, &label, event.as_deref()).await;
    });

    (StatusCode::OK, "OK")
}

/// Sends the roster of every block starting with the queued match.
/// Returns `None` when the label was ignored.
pub async fn announce(state: &WebhookState, label: &str, event: Option<&str>) -> Option<Dispatch> {
    let number = {
        let engine = state.data.engine.read().await;
        let mut notifier = state.data.notifier.lock().await;
        match notifier.accept(engine.parser(), label) {
            Ok(number) => number,
            Err(Ignored::NotQualification) => {
                debug!("ignoring {:?}, not a qualification match", label);
                return None;
            }
            Err(Ignored::Duplicate) => {
                debug!("ignoring {:?}, already announced", label);
                return None;
            }
        }
    };

    let blocks = state.data.engine.read().await.all_blocks();
    let teams = state.data.teams.read().await.all();
    let selected = starting_blocks(&blocks, &teams, number, event);
    info!(
        "match {} is queuing, {} blocks start with it",
        number,
        selected.len()
    );

    let dispatch = fan_out(state.messenger.as_ref(), &teams, &selected).await;
    info!(
        "match {}: {} delivered, {} skipped, {} failed",
        number, dispatch.delivered, dispatch.skipped, dispatch.failed
    );
    Some(dispatch)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{body::Body, http::Request};
    use poise::serenity_prelude::{ChannelId, GuildId};
    use tower::ServiceExt;

    use super::*;
    use crate::cfg::Config;
    use crate::notify::tests::RecordingMessenger;

    struct Fixture {
        _dir: tempfile::TempDir,
        state: WebhookState,
        messenger: Arc<RecordingMessenger>,
    }

    fn fixture(token: Option<&str>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.schedule = dir.path().join("schedule.json").display().to_string();
        config.storage.teams = dir.path().join("teams.json").display().to_string();
        config.webhook.token = token.map(str::to_string);

        let data = Arc::new(Data::new(Arc::new(config)).unwrap());
        let messenger = Arc::new(RecordingMessenger::default());

        Fixture {
            _dir: dir,
            state: WebhookState {
                data,
                messenger: messenger.clone(),
            },
            messenger,
        }
    }

    async fn install(state: &WebhookState, guild: u64, channel: u64) {
        let mut teams = state.data.teams.write().await;
        let id = GuildId::new(guild);
        teams.set_installed(id, true).unwrap();
        teams.set_channel(id, ChannelId::new(channel)).unwrap();
        teams.set_event(id, "2025cave").unwrap();
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn tokens_are_compared_exactly() {
        assert!(authorized("secret", "secret"));
        assert!(!authorized("secret", "secreT"));
        assert!(!authorized("secret", ""));
    }

    #[tokio::test]
    async fn wrong_token_is_unauthorized() {
        let f = fixture(Some("secret"));

        let response = router(f.state.clone())
            .oneshot(post_json(r#"{"token":"nope","nowQueuing":"Qualification 1"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router(f.state)
            .oneshot(post_json(r#"{"nowQueuing":"Qualification 1"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn registration_ping_is_acknowledged() {
        let f = fixture(Some("secret"));

        let response = router(f.state)
            .oneshot(post_json(r#"{"token":"secret"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(f.messenger.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let f = fixture(None);

        let response = router(f.state)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn same_label_is_announced_once() {
        let f = fixture(None);
        install(&f.state, 1, 10).await;
        {
            let engine = f.state.data.engine.read().await;
            engine
                .assign_one(GuildId::new(1), "12-20", "blue_1", "<@5>")
                .unwrap();
        }

        let first = announce(&f.state, "Qualification 12", None).await;
        assert_eq!(first.map(|d| d.delivered), Some(1));
        assert!(announce(&f.state, "Qualification 12", None).await.is_none());

        let sent = f.messenger.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ChannelId::new(10));
        assert!(sent[0].1.contains("<@5>"));
    }

    #[tokio::test(start_paused = true)]
    async fn label_is_announced_again_after_the_window() {
        let f = fixture(None);
        install(&f.state, 1, 10).await;
        f.state
            .data
            .engine
            .read()
            .await
            .assign_one(GuildId::new(1), "3-4", "red_1", "<@6>")
            .unwrap();

        assert!(announce(&f.state, "Qualification 3", None).await.is_some());
        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(announce(&f.state, "Qualification 3", None).await.is_none());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(announce(&f.state, "Qualification 3", None).await.is_some());

        assert_eq!(f.messenger.sent.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn queued_match_is_acknowledged_then_delivered() {
        let f = fixture(Some("secret"));
        install(&f.state, 1, 10).await;
        f.state
            .data
            .engine
            .read()
            .await
            .assign_one(GuildId::new(1), "12-20", "blue_1", "<@5>")
            .unwrap();

        let response = router(f.state.clone())
            .oneshot(post_json(
                r#"{"token":"secret","nowQueuing":"Qualification 12","eventKey":"2025cave"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"OK");

        // the announcement runs in its own task
        for _ in 0..100 {
            if !f.messenger.sent.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let sent = f.messenger.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ChannelId::new(10));
        assert!(sent[0].1.starts_with("Prepare to scout starting with match 12 until match 20"));
    }

    #[tokio::test]
    async fn event_key_restricts_the_teams() {
        let f = fixture(None);
        install(&f.state, 1, 10).await;
        install(&f.state, 2, 20).await;
        f.state
            .data
            .teams
            .write()
            .await
            .set_event(GuildId::new(2), "2025txhou")
            .unwrap();
        {
            let engine = f.state.data.engine.read().await;
            engine.assign_one(GuildId::new(1), "7-9", "blue_2", "<@1>").unwrap();
            engine.assign_one(GuildId::new(2), "7-9", "blue_2", "<@2>").unwrap();
        }

        let dispatch = announce(&f.state, "Qualification 7", Some("2025TXHOU"))
            .await
            .unwrap();
        assert_eq!(dispatch.delivered, 1);
        assert_eq!(f.messenger.sent.lock().await[0].0, ChannelId::new(20));
    }

    #[tokio::test]
    async fn playoffs_are_ignored() {
        let f = fixture(None);
        assert!(announce(&f.state, "Playoff 3", None).await.is_none());
    }
}
