use core::time::Duration;

use libp2p::identity::Keypair;
use multiaddr::Multiaddr;
use postmesh_primitives::common::serde_duration;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1_024;

#[derive(Debug)]
#[non_exhaustive]
pub struct NetworkConfig {
    pub identity: Keypair,
    pub swarm: SwarmConfig,
    pub stream: StreamConfig,
}

impl NetworkConfig {
    #[must_use]
    pub const fn new(identity: Keypair, swarm: SwarmConfig, stream: StreamConfig) -> Self {
        Self {
            identity,
            swarm,
            stream,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SwarmConfig {
    pub listen: Vec<Multiaddr>,
}

impl SwarmConfig {
    #[must_use]
    pub const fn new(listen: Vec<Multiaddr>) -> Self {
        Self { listen }
    }
}

/// Limits applied to every connection and stream.
///
/// Each network operation that can suspend (dial, stream open, frame
/// read or write) is bounded by one of these timeouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub max_frame_size: usize,
    #[serde(rename = "connect_timeout_ms", with = "serde_duration")]
    pub connect_timeout: Duration,
    #[serde(rename = "open_timeout_ms", with = "serde_duration")]
    pub open_timeout: Duration,
    #[serde(rename = "io_timeout_ms", with = "serde_duration")]
    pub io_timeout: Duration,
    #[serde(rename = "idle_connection_timeout_ms", with = "serde_duration")]
    pub idle_connection_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            connect_timeout: Duration::from_secs(10),
            open_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(5),
            idle_connection_timeout: Duration::from_secs(60),
        }
    }
}
