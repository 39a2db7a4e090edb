use std::sync::Arc;

use futures_util::{Stream as FuturesStream, StreamExt};
use libp2p::PeerId;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use postmesh_network::stream::{Stream, StreamError};
use postmesh_primitives::post::{DecodeError, Post, PostId};

use crate::store::{PostStore, StoreError};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to read post: {0}")]
    Read(#[from] StreamError),
    #[error("failed to decode post: {0}")]
    Decode(#[from] DecodeError),
    #[error("failed to persist post: {0}")]
    Store(#[from] StoreError),
}

/// Standing handler for inbound post streams.
///
/// Every stream is served by its own task, so a peer that sends garbage or
/// stalls affects only its own stream.
#[derive(Debug)]
pub struct Receiver<S> {
    store: Arc<S>,
    tracker: TaskTracker,
}

impl<S> Receiver<S>
where
    S: PostStore + 'static,
{
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            tracker: TaskTracker::new(),
        }
    }

    /// Serves `incoming` until it ends or `token` is cancelled, then waits
    /// for in-flight streams to finish.
    pub async fn run<I, T>(self, mut incoming: I, token: CancellationToken)
    where
        I: FuturesStream<Item = (PeerId, Stream<T>)> + Unpin,
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        loop {
            let next = select! {
                () = token.cancelled() => break,
                next = incoming.next() => next,
            };

            let Some((peer_id, stream)) = next else {
                debug!("Inbound stream source closed");
                break;
            };

            let store = Arc::clone(&self.store);

            let _ignored = self.tracker.spawn(async move {
                match handle_stream(&*store, peer_id, stream).await {
                    Ok(post_id) => info!(%peer_id, %post_id, "Persisted post"),
                    Err(err) => warn!(%peer_id, error = %err, "Dropped inbound post"),
                }
            });
        }

        self.tracker.close();

        if !self.tracker.is_empty() {
            debug!(in_flight = self.tracker.len(), "Waiting for inbound streams");
        }

        self.tracker.wait().await;
    }
}

/// Reads one post from `stream` and hands it to `store`.
pub async fn handle_stream<S, T>(
    store: &S,
    peer_id: PeerId,
    stream: Stream<T>,
) -> Result<PostId, DispatchError>
where
    S: PostStore + ?Sized,
    T: AsyncRead + AsyncWrite + Unpin,
{
    let payload = stream.recv().await?;
    let post = Post::decode(&payload)?;

    debug!(%peer_id, user_id = %post.user_id, title = %post.title, "Received post");

    Ok(store.create_post(&post).await?)
}
