use core::fmt;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::io;

use eyre::{eyre, Result as EyreResult};
use futures_util::{Stream as FuturesStream, StreamExt};
use libp2p::{PeerId, StreamProtocol};
use libp2p_stream::{Control, IncomingStreams, OpenStreamError as P2pOpenStreamError};
use multiaddr::Multiaddr;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::address::PeerAddress;
use crate::commands::Command;
use crate::config::StreamConfig;
use crate::errors::{AcceptError, ConnectError, OpenStreamError};
use crate::stream::Stream;

/// Cloneable handle onto the network event loop.
#[derive(Clone)]
pub struct NetworkClient {
    local_peer_id: PeerId,
    sender: mpsc::Sender<Command>,
    control: Control,
    config: StreamConfig,
}

impl NetworkClient {
    pub(crate) const fn new(
        local_peer_id: PeerId,
        sender: mpsc::Sender<Command>,
        control: Control,
        config: StreamConfig,
    ) -> Self {
        Self {
            local_peer_id,
            sender,
            control,
            config,
        }
    }

    #[must_use]
    pub const fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    pub async fn listen_on(&self, addr: Multiaddr) -> EyreResult<()> {
        let (sender, receiver) = oneshot::channel();

        self.sender
            .send(Command::ListenOn { addr, sender })
            .await
            .map_err(|_| eyre!("network event loop has shut down"))?;

        receiver
            .await
            .map_err(|_| eyre!("network event loop has shut down"))?
    }

    /// Connects to `peer`, or returns immediately if a connection to it is
    /// already open.
    pub async fn dial(&self, peer: &PeerAddress) -> Result<(), ConnectError> {
        let (sender, receiver) = oneshot::channel();

        self.sender
            .send(Command::Dial {
                peer: peer.clone(),
                sender,
            })
            .await
            .map_err(|_| ConnectError::Shutdown)?;

        match timeout(self.config.connect_timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConnectError::Shutdown),
            Err(_) => Err(ConnectError::Timeout {
                peer_id: peer.peer_id(),
                after: self.config.connect_timeout,
            }),
        }
    }

    pub async fn is_connected(&self, peer_id: PeerId) -> bool {
        let (sender, receiver) = oneshot::channel();

        if self
            .sender
            .send(Command::IsConnected { peer_id, sender })
            .await
            .is_err()
        {
            return false;
        }

        receiver.await.unwrap_or(false)
    }

    pub async fn open_stream(
        &self,
        peer_id: PeerId,
        protocol: StreamProtocol,
    ) -> Result<Stream, OpenStreamError> {
        let mut control = self.control.clone();
        let open_timeout = self.config.open_timeout;

        let stream = match timeout(open_timeout, control.open_stream(peer_id, protocol)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(P2pOpenStreamError::UnsupportedProtocol(protocol))) => {
                return Err(OpenStreamError::ProtocolMismatch { peer_id, protocol });
            }
            Ok(Err(P2pOpenStreamError::Io(err))) => return Err(OpenStreamError::Io(err)),
            #[allow(
                unreachable_patterns,
                reason = "The upstream error is marked non-exhaustive"
            )]
            Ok(Err(err)) => return Err(OpenStreamError::Io(io::Error::other(err))),
            Err(_) => {
                return Err(OpenStreamError::Timeout {
                    peer_id,
                    after: open_timeout,
                })
            }
        };

        Ok(Stream::new(stream, &self.config))
    }

    /// Registers the standing handler for `protocol`. Each protocol can be
    /// accepted only once per swarm.
    pub fn accept(&self, protocol: StreamProtocol) -> Result<Incoming, AcceptError> {
        let inner = self
            .control
            .clone()
            .accept(protocol.clone())
            .map_err(|_| AcceptError(protocol))?;

        Ok(Incoming {
            inner,
            config: self.config,
        })
    }
}

impl fmt::Debug for NetworkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkClient")
            .field("local_peer_id", &self.local_peer_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Inbound streams for one protocol, each wrapped as a single-frame
/// [`Stream`].
pub struct Incoming {
    inner: IncomingStreams,
    config: StreamConfig,
}

impl FuturesStream for Incoming {
    type Item = (PeerId, Stream);

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let config = self.config;

        self.inner
            .poll_next_unpin(cx)
            .map(|next| next.map(|(peer_id, stream)| (peer_id, Stream::new(stream, &config))))
    }
}

impl fmt::Debug for Incoming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Incoming")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
