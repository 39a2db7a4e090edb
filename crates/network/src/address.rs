//! Remote peer descriptors.
//!
//! A descriptor is a multiaddr whose last component names the peer, e.g.
//! `/ip4/127.0.0.1/tcp/60841/p2p/12D3KooW...`. It is parsed once at startup
//! and never mutated afterwards.

use core::fmt;
use core::str::FromStr;

use libp2p::PeerId;
use multiaddr::{Multiaddr, Protocol};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    peer_id: PeerId,
    addr: Multiaddr,
}

impl PeerAddress {
    #[must_use]
    pub const fn new(peer_id: PeerId, addr: Multiaddr) -> Self {
        Self { peer_id, addr }
    }

    #[must_use]
    pub const fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Network location, without the trailing `/p2p` component.
    #[must_use]
    pub const fn addr(&self) -> &Multiaddr {
        &self.addr
    }

    #[must_use]
    pub fn to_multiaddr(&self) -> Multiaddr {
        self.addr.clone().with(Protocol::P2p(self.peer_id))
    }
}

impl FromStr for PeerAddress {
    type Err = AddressParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut addr = input
            .trim()
            .parse::<Multiaddr>()
            .map_err(|source| AddressParseError::InvalidMultiaddr {
                input: input.to_owned(),
                source,
            })?;

        let Some(Protocol::P2p(peer_id)) = addr.pop() else {
            return Err(AddressParseError::MissingPeerId {
                input: input.to_owned(),
            });
        };

        if addr.is_empty() {
            return Err(AddressParseError::MissingTransport {
                input: input.to_owned(),
            });
        }

        Ok(Self { peer_id, addr })
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/p2p/{}", self.addr, self.peer_id)
    }
}

impl Serialize for PeerAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PeerAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let input = String::deserialize(deserializer)?;
        input.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Error)]
pub enum AddressParseError {
    #[error("invalid peer address `{input}`: {source}")]
    InvalidMultiaddr {
        input: String,
        #[source]
        source: multiaddr::Error,
    },
    #[error("peer address `{input}` does not end with a /p2p/<peer-id> component")]
    MissingPeerId { input: String },
    #[error("peer address `{input}` has no network location")]
    MissingTransport { input: String },
}

#[cfg(test)]
mod tests {
    use libp2p::identity::Keypair;

    use super::*;

    fn random_peer_id() -> PeerId {
        Keypair::generate_ed25519().public().to_peer_id()
    }

    #[test]
    fn test_parse_splits_location_and_identity() {
        let peer_id = random_peer_id();
        let input = format!("/ip4/127.0.0.1/tcp/60841/p2p/{peer_id}");

        let address: PeerAddress = input.parse().unwrap();

        assert_eq!(address.peer_id(), peer_id, "wrong peer id");
        assert_eq!(
            address.addr(),
            &"/ip4/127.0.0.1/tcp/60841".parse::<Multiaddr>().unwrap(),
            "location should not keep the /p2p component"
        );
        assert_eq!(address.to_string(), input, "display should restore the input");
        assert_eq!(
            address.to_multiaddr().to_string(),
            input,
            "multiaddr should restore the input"
        );
    }

    #[test]
    fn test_parse_tolerates_surrounding_whitespace() {
        let peer_id = random_peer_id();

        let address: PeerAddress = format!("  /ip4/10.0.0.1/udp/4001/quic-v1/p2p/{peer_id}\n")
            .parse()
            .unwrap();

        assert_eq!(address.peer_id(), peer_id, "wrong peer id");
    }

    #[test]
    fn test_parse_rejects_missing_peer_id() {
        let result = "/ip4/127.0.0.1/tcp/60841".parse::<PeerAddress>();

        assert!(
            matches!(result, Err(AddressParseError::MissingPeerId { .. })),
            "got {result:?}"
        );
    }

    #[test]
    fn test_parse_rejects_bare_peer_id() {
        let result = format!("/p2p/{}", random_peer_id()).parse::<PeerAddress>();

        assert!(
            matches!(result, Err(AddressParseError::MissingTransport { .. })),
            "got {result:?}"
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in ["localhost:60841", "/ip4/127.0.0.1/tcp/60841/p2p/not-a-peer"] {
            let result = input.parse::<PeerAddress>();

            assert!(
                matches!(result, Err(AddressParseError::InvalidMultiaddr { .. })),
                "{input} should be rejected, got {result:?}"
            );
        }
    }

    #[test]
    fn test_serde_uses_descriptor_string() {
        let peer_id = random_peer_id();
        let input = format!("/ip4/127.0.0.1/tcp/60841/p2p/{peer_id}");
        let address: PeerAddress = input.parse().unwrap();

        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{input}\""), "unexpected encoding");

        let decoded: PeerAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, address, "descriptor changed across serde");

        let invalid = serde_json::from_str::<PeerAddress>("\"/ip4/127.0.0.1/tcp/1\"");
        assert!(invalid.is_err(), "descriptor without peer id must fail");
    }
}
