use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use const_format::concatcp;
use eyre::{bail, Result as EyreResult};
use postmesh_config::ConfigFile;
use postmesh_network::client::NetworkClient;
use postmesh_network::config::NetworkConfig;
use postmesh_network::types::NetworkEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::defaults;

mod init;
mod persist;
mod publish;

use init::InitCommand;
use persist::PersistCommand;
use publish::PublishCommand;

pub const EXAMPLES: &str = r"
  # Initialize a persister listening on the default port
  $ postd --home data/persister init --graphql-endpoint http://localhost:4002/graphql

  # Run it; it logs the address publishers should dial
  $ postd --home data/persister persist

  # Initialize a publisher on an ephemeral port, pointed at the persister
  $ postd --home data/publisher init --port 0 --peer /ip4/127.0.0.1/tcp/60841/p2p/12D3KooW...

  # Publish a post every 500ms
  $ postd --home data/publisher publish --interval-ms 500
";

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(after_help = concatcp!(
    "Environment variables:\n",
    "  POSTMESH_HOME    Directory for config\n\n",
    "Examples:",
    EXAMPLES
))]
pub struct RootCommand {
    #[command(flatten)]
    pub args: RootArgs,

    #[command(subcommand)]
    pub action: SubCommands,
}

#[derive(Debug, Subcommand)]
pub enum SubCommands {
    Init(InitCommand),
    #[command(alias = "pub")]
    Publish(PublishCommand),
    Persist(PersistCommand),
}

#[derive(Debug, Parser)]
pub struct RootArgs {
    /// Directory for config
    #[arg(long, value_name = "PATH", default_value_t = defaults::default_home())]
    #[arg(env = "POSTMESH_HOME", hide_env_values = true)]
    pub home: Utf8PathBuf,
}

impl RootCommand {
    pub async fn run(self) -> EyreResult<()> {
        match self.action {
            SubCommands::Init(init) => init.run(&self.args),
            SubCommands::Publish(publish) => publish.run(&self.args).await,
            SubCommands::Persist(persist) => persist.run(&self.args).await,
        }
    }
}

fn load_config(root_args: &RootArgs) -> EyreResult<ConfigFile> {
    if !ConfigFile::exists(&root_args.home) {
        bail!(
            "Node is not initialized in {:?}, run `postd init` first",
            root_args.home
        );
    }

    ConfigFile::load(&root_args.home)
}

async fn start_network(
    config: &ConfigFile,
    token: &CancellationToken,
) -> EyreResult<NetworkClient> {
    let network_config = NetworkConfig::new(
        config.identity.clone(),
        config.swarm.clone(),
        config.stream,
    );

    let (client, events) = postmesh_network::run(&network_config, token.child_token()).await?;

    drop(tokio::spawn(log_events(events)));

    Ok(client)
}

async fn log_events(mut events: mpsc::Receiver<NetworkEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            NetworkEvent::PeerConnected { peer_id } => info!(%peer_id, "Peer connected"),
            NetworkEvent::PeerDisconnected { peer_id } => info!(%peer_id, "Peer disconnected"),
            NetworkEvent::ListeningOn { address, .. } => debug!(%address, "New listen address"),
            _ => {}
        }
    }
}

/// Cancels `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    drop(tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl-C");
            return;
        }

        info!("Shutting down");
        token.cancel();
    }));
}
