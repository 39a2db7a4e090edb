use clap::Parser;
use eyre::{Result as EyreResult, WrapErr};
use postmesh_network::stream::POST_PROTOCOL;
use postmesh_node::receiver::Receiver;
use postmesh_node::store::GraphqlStore;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use crate::cli::{cancel_on_ctrl_c, load_config, start_network, RootArgs};

/// Accept posts from publishers and persist them
#[derive(Debug, Parser)]
pub struct PersistCommand {
    /// Override the GraphQL endpoint from config.toml
    #[arg(long, value_name = "URL")]
    pub graphql_endpoint: Option<Url>,
}

impl PersistCommand {
    pub async fn run(self, root_args: &RootArgs) -> EyreResult<()> {
        let mut config = load_config(root_args)?;

        if let Some(endpoint) = self.graphql_endpoint {
            config.persister.endpoint = endpoint;
        }

        let store = GraphqlStore::from_config(&config.persister)
            .wrap_err("failed to build persistence client")?;

        let token = CancellationToken::new();
        cancel_on_ctrl_c(token.clone());

        let client = start_network(&config, &token).await?;
        let incoming = client.accept(POST_PROTOCOL)?;

        info!(
            peer_id = %client.local_peer_id(),
            endpoint = %store.endpoint(),
            "Persister ready"
        );

        Receiver::new(store).run(incoming, token.clone()).await;

        token.cancel();

        Ok(())
    }
}
