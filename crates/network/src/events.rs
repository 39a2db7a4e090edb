use libp2p::swarm::SwarmEvent;
use owo_colors::OwoColorize;
use tracing::{debug, info, trace, warn};

use crate::errors::ConnectError;
use crate::types::NetworkEvent;
use crate::{BehaviourEvent, EventLoop};

mod identify;
mod ping;

pub(crate) trait EventHandler<E> {
    async fn handle(&mut self, event: E);
}

impl EventHandler<SwarmEvent<BehaviourEvent>> for EventLoop {
    async fn handle(&mut self, event: SwarmEvent<BehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(BehaviourEvent::Identify(event)) => self.handle(event).await,
            SwarmEvent::Behaviour(BehaviourEvent::Ping(event)) => self.handle(event).await,
            SwarmEvent::NewListenAddr {
                listener_id,
                address,
            } => {
                let local_peer_id = *self.swarm.local_peer_id();
                info!("Listening on {}/p2p/{}", address, local_peer_id);

                self.send_event(NetworkEvent::ListeningOn {
                    listener_id,
                    address,
                })
                .await;
            }
            SwarmEvent::ConnectionEstablished {
                peer_id, endpoint, ..
            } => {
                debug!(%peer_id, address = %endpoint.get_remote_address(), "Connection established");

                self.resolve_dial(peer_id, &Ok(()));
                self.send_event(NetworkEvent::PeerConnected { peer_id })
                    .await;
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                cause,
                ..
            } => {
                debug!(%peer_id, ?cause, "Connection closed");

                if num_established == 0 {
                    self.send_event(NetworkEvent::PeerDisconnected { peer_id })
                        .await;
                }
            }
            SwarmEvent::OutgoingConnectionError {
                peer_id: Some(peer_id),
                error,
                ..
            } => {
                let err = ConnectError::from_dial(peer_id, &error);
                warn!(%peer_id, %err, "Outgoing connection failed");

                self.resolve_dial(peer_id, &Err(err));
            }
            SwarmEvent::IncomingConnectionError {
                send_back_addr,
                error,
                ..
            } => {
                debug!(%send_back_addr, %error, "Incoming connection failed");
            }
            event => trace!("{}: {:?}", "swarm".yellow(), event),
        }
    }
}
