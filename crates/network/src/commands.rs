use std::collections::hash_map::Entry;

use eyre::Result as EyreResult;
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::PeerId;
use multiaddr::Multiaddr;
use tokio::sync::oneshot;
use tracing::debug;

use crate::address::PeerAddress;
use crate::errors::ConnectError;
use crate::EventLoop;

#[derive(Debug)]
pub(crate) enum Command {
    ListenOn {
        addr: Multiaddr,
        sender: oneshot::Sender<EyreResult<()>>,
    },
    Dial {
        peer: PeerAddress,
        sender: oneshot::Sender<Result<(), ConnectError>>,
    },
    IsConnected {
        peer_id: PeerId,
        sender: oneshot::Sender<bool>,
    },
}

impl EventLoop {
    pub(crate) fn handle_command(&mut self, command: Command) {
        match command {
            Command::ListenOn { addr, sender } => {
                let result = self.swarm.listen_on(addr).map(drop).map_err(Into::into);
                let _ignored = sender.send(result);
            }
            Command::Dial { peer, sender } => self.dial(&peer, sender),
            Command::IsConnected { peer_id, sender } => {
                let _ignored = sender.send(self.swarm.is_connected(&peer_id));
            }
        }
    }

    fn dial(&mut self, peer: &PeerAddress, sender: oneshot::Sender<Result<(), ConnectError>>) {
        let peer_id = peer.peer_id();

        if self.swarm.is_connected(&peer_id) {
            debug!(%peer_id, "Reusing existing connection");
            let _ignored = sender.send(Ok(()));
            return;
        }

        match self.pending_dial.entry(peer_id) {
            Entry::Occupied(mut entry) => entry.get_mut().push(sender),
            Entry::Vacant(entry) => {
                let opts = DialOpts::peer_id(peer_id)
                    .addresses(vec![peer.addr().clone()])
                    .build();

                match self.swarm.dial(opts) {
                    Ok(()) => {
                        let _ignored = entry.insert(vec![sender]);
                    }
                    Err(err) => {
                        let _ignored = sender.send(Err(ConnectError::from_dial(peer_id, &err)));
                    }
                }
            }
        }
    }

    pub(crate) fn resolve_dial(&mut self, peer_id: PeerId, result: &Result<(), ConnectError>) {
        let Some(senders) = self.pending_dial.remove(&peer_id) else {
            return;
        };

        for sender in senders {
            let _ignored = sender.send(result.clone());
        }
    }
}
