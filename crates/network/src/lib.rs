use std::collections::HashMap;

use eyre::Result as EyreResult;
use futures_util::StreamExt;
use libp2p::identify::{Behaviour as IdentifyBehaviour, Config as IdentifyConfig};
use libp2p::noise::Config as NoiseConfig;
use libp2p::ping::Behaviour as PingBehaviour;
use libp2p::swarm::{NetworkBehaviour, Swarm};
use libp2p::tcp::Config as TcpConfig;
use libp2p::tls::Config as TlsConfig;
use libp2p::yamux::Config as YamuxConfig;
use libp2p::{PeerId, SwarmBuilder};
use libp2p_stream::Behaviour as StreamBehaviour;
use tokio::sync::{mpsc, oneshot};
use tokio::{select, spawn};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::NetworkClient;
use crate::commands::Command;
use crate::config::NetworkConfig;
use crate::errors::ConnectError;
use crate::events::EventHandler;
use crate::types::NetworkEvent;

pub mod address;
pub mod client;
mod commands;
pub mod config;
pub mod errors;
mod events;
pub mod stream;
pub mod types;

const PROTOCOL_VERSION: &str = concat!("/", env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(NetworkBehaviour)]
struct Behaviour {
    identify: IdentifyBehaviour,
    ping: PingBehaviour,
    stream: StreamBehaviour,
}

/// Builds the swarm, spawns its event loop and starts listening on every
/// configured address.
///
/// The event loop runs until `token` is cancelled or every [`NetworkClient`]
/// clone has been dropped. Stopping it drops the swarm, which closes all
/// listeners and connections.
pub async fn run(
    config: &NetworkConfig,
    token: CancellationToken,
) -> EyreResult<(NetworkClient, mpsc::Receiver<NetworkEvent>)> {
    let (client, event_receiver, event_loop) = init(config)?;

    drop(spawn(event_loop.run(token)));

    for addr in &config.swarm.listen {
        client.listen_on(addr.clone()).await?;
    }

    Ok((client, event_receiver))
}

fn init(
    config: &NetworkConfig,
) -> EyreResult<(NetworkClient, mpsc::Receiver<NetworkEvent>, EventLoop)> {
    let peer_id = config.identity.public().to_peer_id();
    let idle_connection_timeout = config.stream.idle_connection_timeout;

    let swarm = SwarmBuilder::with_existing_identity(config.identity.clone())
        .with_tokio()
        .with_tcp(
            TcpConfig::default(),
            (TlsConfig::new, NoiseConfig::new),
            YamuxConfig::default,
        )?
        .with_quic()
        .with_behaviour(|key| Behaviour {
            identify: IdentifyBehaviour::new(
                IdentifyConfig::new(PROTOCOL_VERSION.to_owned(), key.public())
                    .with_push_listen_addr_updates(true),
            ),
            ping: PingBehaviour::default(),
            stream: StreamBehaviour::new(),
        })?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle_connection_timeout))
        .build();

    let control = swarm.behaviour().stream.new_control();

    let (command_sender, command_receiver) = mpsc::channel(32);
    let (event_sender, event_receiver) = mpsc::channel(32);

    let client = NetworkClient::new(peer_id, command_sender, control, config.stream);

    let event_loop = EventLoop::new(swarm, command_receiver, event_sender);

    Ok((client, event_receiver, event_loop))
}

pub(crate) struct EventLoop {
    swarm: Box<Swarm<Behaviour>>,
    command_receiver: mpsc::Receiver<Command>,
    event_sender: mpsc::Sender<NetworkEvent>,
    pending_dial: HashMap<PeerId, Vec<oneshot::Sender<Result<(), ConnectError>>>>,
}

impl EventLoop {
    fn new(
        swarm: Swarm<Behaviour>,
        command_receiver: mpsc::Receiver<Command>,
        event_sender: mpsc::Sender<NetworkEvent>,
    ) -> Self {
        Self {
            swarm: Box::new(swarm),
            command_receiver,
            event_sender,
            pending_dial: HashMap::default(),
        }
    }

    pub(crate) async fn run(mut self, token: CancellationToken) {
        #[expect(clippy::redundant_pub_crate, reason = "Needed for Tokio code")]
        loop {
            select! {
                () = token.cancelled() => break,
                event = self.swarm.next() => {
                    let Some(event) = event else { break };
                    self.handle(event).await;
                }
                command = self.command_receiver.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command);
                }
            }
        }

        for (_, senders) in self.pending_dial.drain() {
            for sender in senders {
                let _ignored = sender.send(Err(ConnectError::Shutdown));
            }
        }

        info!("Network event loop stopped");
    }

    async fn send_event(&mut self, event: NetworkEvent) {
        // Nobody listening for events is not an error.
        let _ignored = self.event_sender.send(event).await;
    }
}
