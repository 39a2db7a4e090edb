use core::time::Duration;

use clap::Parser;
use eyre::{eyre, Result as EyreResult};
use postmesh_network::address::PeerAddress;
use postmesh_node::publisher::Publisher;
use postmesh_node::source::RandomPosts;
use tokio_util::sync::CancellationToken;

use crate::cli::{cancel_on_ctrl_c, load_config, start_network, RootArgs};

/// Publish a synthetic post to a persister on a fixed interval
#[derive(Debug, Parser)]
pub struct PublishCommand {
    /// Override the persister address from config.toml
    #[arg(long, value_name = "ADDR")]
    pub peer: Option<PeerAddress>,

    /// Override the publish interval from config.toml
    #[arg(long, value_name = "MILLIS")]
    pub interval_ms: Option<u64>,
}

impl PublishCommand {
    pub async fn run(self, root_args: &RootArgs) -> EyreResult<()> {
        let config = load_config(root_args)?;

        let peer = self
            .peer
            .or_else(|| config.publisher.peer.clone())
            .ok_or_else(|| eyre!("no persister configured, pass --peer or set publisher.peer"))?;

        let mut settings = config.publisher.settings;

        if let Some(interval_ms) = self.interval_ms {
            settings.interval = Duration::from_millis(interval_ms);
        }

        if settings.interval.is_zero() {
            return Err(eyre!("publish interval must be greater than zero"));
        }

        let token = CancellationToken::new();
        cancel_on_ctrl_c(token.clone());

        let client = start_network(&config, &token).await?;

        let publisher = Publisher::new(client, peer, RandomPosts::new(), settings);
        let result = publisher.run(token.clone()).await;

        token.cancel();

        result.map_err(Into::into)
    }
}
