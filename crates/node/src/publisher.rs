//! Periodic publishing of posts to a single remote persister.
//!
//! The publisher connects once, then on every tick opens a fresh stream,
//! writes one post and lets the stream close. A failed tick is logged and
//! skipped. If the connection itself has gone away, the publisher redials
//! with exponential backoff before the next tick.

use core::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::select;
use tokio::sync::watch;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use postmesh_network::address::PeerAddress;
use postmesh_network::client::NetworkClient;
use postmesh_network::errors::{ConnectError, OpenStreamError};
use postmesh_network::stream::{StreamError, POST_PROTOCOL};
use postmesh_primitives::common::serde_duration;
use postmesh_primitives::post::{EncodeError, Post};

use crate::source::PostSource;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublisherState {
    Idle,
    Connecting,
    Connected,
    Publishing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    #[serde(rename = "interval_ms", with = "serde_duration")]
    pub interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Backoff applied when the connection to the persister is lost.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    #[serde(rename = "initial_delay_ms", with = "serde_duration")]
    pub initial_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "serde_duration")]
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Open(#[from] OpenStreamError),
    #[error(transparent)]
    Write(#[from] StreamError),
}

#[derive(Debug)]
pub struct Publisher<S> {
    client: NetworkClient,
    peer: PeerAddress,
    source: S,
    config: PublisherConfig,
    state: watch::Sender<PublisherState>,
}

impl<S: PostSource> Publisher<S> {
    pub fn new(
        client: NetworkClient,
        peer: PeerAddress,
        source: S,
        config: PublisherConfig,
    ) -> Self {
        let (state, _) = watch::channel(PublisherState::Idle);

        Self {
            client,
            peer,
            source,
            config,
            state,
        }
    }

    #[must_use]
    pub fn state(&self) -> PublisherState {
        *self.state.borrow()
    }

    /// Observes state transitions while [`Publisher::run`] owns the
    /// publisher.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PublisherState> {
        self.state.subscribe()
    }

    /// Connects to the configured peer and publishes one post per interval
    /// until `token` is cancelled.
    ///
    /// Fails if the first connection attempt fails, or if a lost connection
    /// cannot be re-established within the reconnect budget.
    pub async fn run(mut self, token: CancellationToken) -> Result<(), ConnectError> {
        let _ignored = self.state.send_replace(PublisherState::Connecting);

        let connected = select! {
            () = token.cancelled() => None,
            result = self.client.dial(&self.peer) => Some(result),
        };

        match connected {
            None => {
                self.stop();
                return Ok(());
            }
            Some(Err(err)) => {
                error!(peer = %self.peer, error = %err, "Failed to connect to peer");
                let _ignored = self.state.send_replace(PublisherState::Idle);
                return Err(err);
            }
            Some(Ok(())) => {}
        }

        info!(peer = %self.peer, "Connected to peer");
        let _ignored = self.state.send_replace(PublisherState::Connected);

        let period = self.config.interval.max(MIN_INTERVAL);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let post = self.source.next_post();
            let _ignored = self.state.send_replace(PublisherState::Publishing);

            let outcome = select! {
                () = token.cancelled() => break,
                outcome = self.publish(&post) => outcome,
            };

            match outcome {
                Ok(()) => info!(
                    peer_id = %self.peer.peer_id(),
                    user_id = %post.user_id,
                    title = %post.title,
                    "Published post"
                ),
                Err(err) => {
                    warn!(peer_id = %self.peer.peer_id(), error = %err, "Failed to publish post");

                    if !self.client.is_connected(self.peer.peer_id()).await {
                        let _ignored = self.state.send_replace(PublisherState::Connecting);

                        if !self.reconnect(&token).await? {
                            break;
                        }
                    }
                }
            }

            let _ignored = self.state.send_replace(PublisherState::Connected);
        }

        self.stop();

        Ok(())
    }

    /// Writes `post` on a new stream to the configured peer.
    pub async fn publish(&self, post: &Post) -> Result<(), PublishError> {
        let payload = post.encode()?;

        let stream = self
            .client
            .open_stream(self.peer.peer_id(), POST_PROTOCOL)
            .await?;

        stream.send(Bytes::from(payload)).await?;

        Ok(())
    }

    /// Redials with exponential backoff. Returns `Ok(false)` if cancelled
    /// before a connection was made.
    async fn reconnect(&self, token: &CancellationToken) -> Result<bool, ConnectError> {
        let policy = self.config.reconnect;
        let mut delay = policy.initial_delay;
        let mut attempt = 0_u32;

        loop {
            attempt += 1;

            let result = select! {
                () = token.cancelled() => return Ok(false),
                result = self.client.dial(&self.peer) => result,
            };

            match result {
                Ok(()) => {
                    info!(peer = %self.peer, attempt, "Reconnected to peer");
                    return Ok(true);
                }
                Err(err) if !err.is_transient() || attempt >= policy.max_attempts => {
                    error!(peer = %self.peer, attempt, error = %err, "Giving up on peer");
                    let _ignored = self.state.send_replace(PublisherState::Idle);
                    return Err(err);
                }
                Err(err) => {
                    warn!(peer = %self.peer, attempt, ?delay, error = %err, "Reconnect failed");
                }
            }

            select! {
                () = token.cancelled() => return Ok(false),
                () = sleep(delay) => {}
            }

            delay = delay.saturating_mul(2).min(policy.max_delay);
        }
    }

    fn stop(&self) {
        debug!(peer = %self.peer, "Publisher stopped");
        let _ignored = self.state.send_replace(PublisherState::Idle);
    }
}
