use std::fs::{read_to_string, write};

use camino::Utf8Path;
use eyre::{Result as EyreResult, WrapErr};
use libp2p_identity::Keypair;
use postmesh_network::address::PeerAddress;
use postmesh_network::config::{StreamConfig, SwarmConfig};
use postmesh_node::publisher::PublisherConfig;
use postmesh_node::store::StoreConfig;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct ConfigFile {
    #[serde(with = "serde_identity")]
    pub identity: Keypair,

    #[serde(default)]
    pub swarm: SwarmConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub publisher: PublisherSection,

    #[serde(default)]
    pub persister: StoreConfig,
}

/// Publisher settings plus the persister it publishes to.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[non_exhaustive]
pub struct PublisherSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<PeerAddress>,

    #[serde(flatten)]
    pub settings: PublisherConfig,
}

impl PublisherSection {
    #[must_use]
    pub const fn new(peer: Option<PeerAddress>, settings: PublisherConfig) -> Self {
        Self { peer, settings }
    }
}

impl ConfigFile {
    #[must_use]
    pub const fn new(
        identity: Keypair,
        swarm: SwarmConfig,
        stream: StreamConfig,
        publisher: PublisherSection,
        persister: StoreConfig,
    ) -> Self {
        Self {
            identity,
            swarm,
            stream,
            publisher,
            persister,
        }
    }

    #[must_use]
    pub fn exists(dir: &Utf8Path) -> bool {
        dir.join(CONFIG_FILE).is_file()
    }

    pub fn load(dir: &Utf8Path) -> EyreResult<Self> {
        let path = dir.join(CONFIG_FILE);
        let content = read_to_string(&path)
            .wrap_err_with(|| format!("failed to read configuration from {path:?}"))?;

        toml::from_str(&content)
            .wrap_err_with(|| format!("failed to parse configuration in {path:?}"))
    }

    pub fn save(&self, dir: &Utf8Path) -> EyreResult<()> {
        let path = dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)?;

        write(&path, content)
            .wrap_err_with(|| format!("failed to write configuration to {path:?}"))?;

        Ok(())
    }
}

/// Stores the keypair as base58 protobuf next to its peer id, and refuses
/// to load a file where the two disagree.
pub mod serde_identity {
    use core::fmt::{self, Formatter};

    use libp2p_identity::Keypair;
    use serde::de::{self, MapAccess};
    use serde::ser::{self, SerializeMap};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(key: &Keypair, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut keypair = serializer.serialize_map(Some(2))?;
        keypair.serialize_entry("peer_id", &key.public().to_peer_id().to_base58())?;
        keypair.serialize_entry(
            "keypair",
            &bs58::encode(&key.to_protobuf_encoding().map_err(ser::Error::custom)?).into_string(),
        )?;
        keypair.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Keypair, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdentityVisitor;

        impl<'de> de::Visitor<'de> for IdentityVisitor {
            type Value = Keypair;

            fn expecting(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
                formatter.write_str("an identity with `peer_id` and `keypair` keys")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut peer_id = None::<String>;
                let mut priv_key = None::<String>;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "peer_id" => peer_id = Some(map.next_value()?),
                        "keypair" => priv_key = Some(map.next_value()?),
                        _ => {
                            let _ignored = map.next_value::<de::IgnoredAny>()?;
                        }
                    }
                }

                let peer_id = peer_id.ok_or_else(|| de::Error::missing_field("peer_id"))?;
                let priv_key = priv_key.ok_or_else(|| de::Error::missing_field("keypair"))?;

                let decoded = bs58::decode(&priv_key)
                    .into_vec()
                    .map_err(de::Error::custom)?;
                let keypair =
                    Keypair::from_protobuf_encoding(&decoded).map_err(de::Error::custom)?;

                let derived = keypair.public().to_peer_id().to_base58();

                if derived != peer_id {
                    return Err(de::Error::custom(format!(
                        "peer_id {peer_id} does not match keypair (derived {derived})"
                    )));
                }

                Ok(keypair)
            }
        }

        deserializer.deserialize_map(IdentityVisitor)
    }
}
