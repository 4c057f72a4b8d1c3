//! Fixed-interval HTTP polling routed through the same handlers as sockets.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::FeedError;
use crate::handler::{HandlerKind, MessageOrigin, Transport};
use crate::supervisor::{ConnectionState, Shared};

/// An HTTP endpoint polled on a fixed interval.
#[derive(Debug, Clone, PartialEq)]
pub struct PollTarget {
    pub name: String,
    pub url: String,
    pub interval: Duration,
    /// Explicit handler; when absent it is derived from the name prefix.
    pub handler: Option<HandlerKind>,
}

impl PollTarget {
    pub fn new(name: impl Into<String>, url: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            interval,
            handler: None,
        }
    }

    pub fn with_handler(mut self, handler: HandlerKind) -> Self {
        self.handler = Some(handler);
        self
    }
}

async fn fetch(client: &reqwest::Client, url: &str, timeout: Duration) -> Result<String, FeedError> {
    let response = client.get(url).timeout(timeout).send().await?;
    let body = response.error_for_status()?.text().await?;
    Ok(body)
}

pub(crate) async fn run_poller(
    shared: Arc<Shared>,
    client: reqwest::Client,
    target: PollTarget,
    kind: HandlerKind,
    mut shutdown: watch::Receiver<bool>,
) {
    let timeout = shared.config.connection_timeout;
    let origin = MessageOrigin {
        connection: target.name.clone(),
        kind,
        uri: target.url.clone(),
        transport: Transport::HttpPoll,
    };
    let mut ticker = interval(target.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_body: Option<String> = None;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        match fetch(&client, &target.url, timeout).await {
            Ok(body) => {
                shared
                    .update(&target.name, |s| {
                        if !s.connected {
                            s.established_at = Some(Utc::now());
                        }
                        s.state = ConnectionState::Connected;
                        s.connected = true;
                        s.retry_count = 0;
                        s.last_error = None;
                    })
                    .await;

                if last_body.as_deref() == Some(body.as_str()) {
                    debug!("{} unchanged since last poll", target.name);
                    continue;
                }
                shared.dispatch(&origin, &body).await;
                last_body = Some(body);
            }
            Err(e) => {
                warn!("Polling {} failed: {}", target.url, e);
                let message = e.to_string();
                shared
                    .update(&target.name, |s| {
                        s.state = ConnectionState::Error;
                        s.connected = false;
                        s.retry_count = s.retry_count.saturating_add(1);
                        s.last_error = Some(message);
                    })
                    .await;
            }
        }
    }

    shared
        .update(&target.name, |s| {
            s.state = ConnectionState::Closed;
            s.connected = false;
        })
        .await;
    info!("Stopped polling {}", target.name);
}
