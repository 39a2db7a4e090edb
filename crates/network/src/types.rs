use libp2p::core::transport::ListenerId;
pub use libp2p::identity::PeerId;
use multiaddr::Multiaddr;

#[derive(Debug)]
#[non_exhaustive]
pub enum NetworkEvent {
    ListeningOn {
        listener_id: ListenerId,
        address: Multiaddr,
    },
    PeerConnected {
        peer_id: PeerId,
    },
    PeerDisconnected {
        peer_id: PeerId,
    },
}
