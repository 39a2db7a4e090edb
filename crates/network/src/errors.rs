use core::time::Duration;
use std::io;

use libp2p::swarm::DialError;
use libp2p::{PeerId, StreamProtocol};
use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum ConnectError {
    #[error("peer {peer_id} is unreachable: {reason}")]
    Unreachable { peer_id: PeerId, reason: String },
    #[error("expected peer {expected} but the remote identified as {obtained}")]
    IdentityMismatch { expected: PeerId, obtained: PeerId },
    #[error("connecting to {peer_id} timed out after {after:?}")]
    Timeout { peer_id: PeerId, after: Duration },
    #[error("network event loop has shut down")]
    Shutdown,
}

impl ConnectError {
    pub(crate) fn from_dial(expected: PeerId, error: &DialError) -> Self {
        match error {
            DialError::WrongPeerId { obtained, .. } => Self::IdentityMismatch {
                expected,
                obtained: *obtained,
            },
            other => Self::Unreachable {
                peer_id: expected,
                reason: other.to_string(),
            },
        }
    }

    /// Whether dialing again could succeed without a configuration change.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Timeout { .. })
    }
}

#[derive(Debug, Error)]
pub enum OpenStreamError {
    #[error("peer {peer_id} does not support protocol {protocol}")]
    ProtocolMismatch {
        peer_id: PeerId,
        protocol: StreamProtocol,
    },
    #[error("failed to open stream: {0}")]
    Io(#[from] io::Error),
    #[error("opening a stream to {peer_id} timed out after {after:?}")]
    Timeout { peer_id: PeerId, after: Duration },
}

#[derive(Debug, Error)]
#[error("protocol {0} already has a registered handler")]
pub struct AcceptError(pub StreamProtocol);
