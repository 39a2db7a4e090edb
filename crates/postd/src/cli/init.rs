use core::time::Duration;
use std::fs::create_dir_all;

use clap::Parser;
use eyre::{bail, Result as EyreResult, WrapErr};
use libp2p::identity::Keypair;
use multiaddr::Multiaddr;
use postmesh_config::{ConfigFile, PublisherSection};
use postmesh_network::address::PeerAddress;
use postmesh_network::config::{StreamConfig, SwarmConfig};
use postmesh_node::publisher::PublisherConfig;
use postmesh_node::store::StoreConfig;
use tracing::{info, warn};
use url::Url;

use crate::cli::RootArgs;
use crate::defaults;

/// Initialize a node identity and configuration
#[derive(Debug, Parser)]
pub struct InitCommand {
    /// Addresses to listen on
    #[arg(long, value_name = "ADDR", conflicts_with = "port")]
    #[arg(default_values = [defaults::DEFAULT_LISTEN_TCP, defaults::DEFAULT_LISTEN_QUIC])]
    pub listen: Vec<Multiaddr>,

    /// Listen on TCP and QUIC on this port instead of the default addresses
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Persister to publish to
    #[arg(long, value_name = "ADDR")]
    pub peer: Option<PeerAddress>,

    /// Delay between published posts
    #[arg(long, value_name = "MILLIS")]
    pub interval_ms: Option<u64>,

    /// GraphQL endpoint received posts are persisted to
    #[arg(long, value_name = "URL")]
    pub graphql_endpoint: Option<Url>,

    /// Overwrite an existing configuration, keeping its identity
    #[arg(long)]
    pub force: bool,
}

impl InitCommand {
    pub fn run(self, root_args: &RootArgs) -> EyreResult<()> {
        let home = &root_args.home;

        create_dir_all(home).wrap_err_with(|| format!("failed to create directory {home:?}"))?;

        let identity = if ConfigFile::exists(home) {
            if !self.force {
                bail!("Node is already initialized in {home:?}, use --force to overwrite");
            }

            match ConfigFile::load(home) {
                Ok(existing) => {
                    warn!("Overwriting config.toml in {home:?}, keeping identity");
                    existing.identity
                }
                Err(err) => {
                    warn!(error = %err, "Existing configuration is unreadable, generating a new identity");
                    Keypair::generate_ed25519()
                }
            }
        } else {
            Keypair::generate_ed25519()
        };

        let peer_id = identity.public().to_peer_id();
        info!(%peer_id, "Using identity");

        let listen = self.listen_addresses()?;
        let publisher = self.publisher_config();
        let persister = self.store_config();

        let config = ConfigFile::new(
            identity,
            SwarmConfig::new(listen),
            StreamConfig::default(),
            PublisherSection::new(self.peer, publisher),
            persister,
        );

        config.save(home)?;

        info!(path = %home.join(postmesh_config::CONFIG_FILE), "Initialized node");

        Ok(())
    }

    fn listen_addresses(&self) -> EyreResult<Vec<Multiaddr>> {
        let Some(port) = self.port else {
            return Ok(self.listen.clone());
        };

        Ok(vec![
            format!("/ip4/{}/tcp/{port}", defaults::DEFAULT_SWARM_HOST).parse()?,
            format!("/ip4/{}/udp/{port}/quic-v1", defaults::DEFAULT_SWARM_HOST).parse()?,
        ])
    }

    fn publisher_config(&self) -> PublisherConfig {
        let mut config = PublisherConfig::default();

        if let Some(interval_ms) = self.interval_ms {
            config.interval = Duration::from_millis(interval_ms);
        }

        config
    }

    fn store_config(&self) -> StoreConfig {
        let mut config = StoreConfig::default();

        if let Some(endpoint) = &self.graphql_endpoint {
            config.endpoint = endpoint.clone();
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use clap::Parser;

    use super::*;
    use crate::cli::{RootCommand, SubCommands};

    fn parse(args: &[&str]) -> (RootArgs, InitCommand) {
        let command = RootCommand::try_parse_from(args).unwrap();

        match command.action {
            SubCommands::Init(init) => (command.args, init),
            other => panic!("expected init, got {other:?}"),
        }
    }

    #[test]
    fn test_init_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let home = Utf8PathBuf::from_path_buf(dir.path().join("persister")).unwrap();

        let (root_args, init) = parse(&["postd", "--home", home.as_str(), "init"]);
        init.run(&root_args).unwrap();

        let config = ConfigFile::load(&home).unwrap();
        let listen: Vec<String> = config.swarm.listen.iter().map(ToString::to_string).collect();

        assert_eq!(
            listen,
            vec!["/ip4/0.0.0.0/tcp/60841", "/ip4/0.0.0.0/udp/60841/quic-v1"],
            "default listen addresses"
        );
        assert!(config.publisher.peer.is_none(), "no peer unless given");
        assert_eq!(
            config.persister,
            StoreConfig::default(),
            "default persistence endpoint"
        );
    }

    #[test]
    fn test_init_stores_every_override() {
        let dir = tempfile::tempdir().unwrap();
        let home = Utf8PathBuf::from_path_buf(dir.path().to_owned()).unwrap();
        let peer = format!(
            "/ip4/127.0.0.1/tcp/60841/p2p/{}",
            Keypair::generate_ed25519().public().to_peer_id()
        );

        let (root_args, init) = parse(&[
            "postd",
            "--home",
            home.as_str(),
            "init",
            "--peer",
            &peer,
            "--interval-ms",
            "500",
            "--graphql-endpoint",
            "http://posts.internal:4002/graphql",
        ]);
        init.run(&root_args).unwrap();

        let config = ConfigFile::load(&home).unwrap();

        assert_eq!(
            config.publisher.peer.map(|peer| peer.to_string()),
            Some(peer),
            "peer was not stored"
        );
        assert_eq!(
            config.publisher.settings.interval,
            Duration::from_millis(500),
            "interval was not stored"
        );
        assert_eq!(
            config.persister.endpoint.as_str(),
            "http://posts.internal:4002/graphql",
            "endpoint was not stored"
        );
    }

    #[test]
    fn test_init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let home = Utf8PathBuf::from_path_buf(dir.path().to_owned()).unwrap();

        let (root_args, init) = parse(&["postd", "--home", home.as_str(), "init"]);
        init.run(&root_args).unwrap();
        let first = ConfigFile::load(&home).unwrap().identity.public().to_peer_id();

        let (root_args, init) = parse(&["postd", "--home", home.as_str(), "init"]);
        assert!(init.run(&root_args).is_err(), "second init must fail");

        let (root_args, init) = parse(&[
            "postd",
            "--home",
            home.as_str(),
            "init",
            "--port",
            "0",
            "--interval-ms",
            "250",
            "--force",
        ]);
        init.run(&root_args).unwrap();

        let config = ConfigFile::load(&home).unwrap();
        assert_eq!(
            config.identity.public().to_peer_id(),
            first,
            "--force keeps the identity"
        );
        assert_eq!(
            config.publisher.settings.interval,
            Duration::from_millis(250),
            "interval was not overwritten"
        );
        assert_eq!(
            config.swarm.listen[0].to_string(),
            "/ip4/0.0.0.0/tcp/0",
            "--port replaces the listen addresses"
        );
    }

    #[test]
    fn test_port_conflicts_with_listen() {
        let result = RootCommand::try_parse_from([
            "postd",
            "init",
            "--port",
            "1",
            "--listen",
            "/ip4/127.0.0.1/tcp/2",
        ]);

        assert!(result.is_err(), "--port and --listen are exclusive");
    }
}
