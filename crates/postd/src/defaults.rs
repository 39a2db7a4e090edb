use camino::Utf8PathBuf;
use const_format::concatcp;
use dirs::home_dir;

pub const DEFAULT_POSTMESH_HOME: &str = ".postmesh";

/// Port persisters listen on unless told otherwise.
pub const DEFAULT_PORT: u16 = 60841;

pub const DEFAULT_SWARM_HOST: &str = "0.0.0.0";

pub const DEFAULT_LISTEN_TCP: &str = concatcp!("/ip4/", DEFAULT_SWARM_HOST, "/tcp/", DEFAULT_PORT);
pub const DEFAULT_LISTEN_QUIC: &str = concatcp!(
    "/ip4/",
    DEFAULT_SWARM_HOST,
    "/udp/",
    DEFAULT_PORT,
    "/quic-v1"
);

pub fn default_home() -> Utf8PathBuf {
    home_dir()
        .and_then(|home| Utf8PathBuf::from_path_buf(home).ok())
        .map(|home| home.join(DEFAULT_POSTMESH_HOME))
        .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_POSTMESH_HOME))
}

#[cfg(test)]
mod tests {
    use multiaddr::Multiaddr;

    use super::*;

    #[test]
    fn test_default_listen_addresses_parse() {
        let tcp: Multiaddr = DEFAULT_LISTEN_TCP.parse().unwrap();
        let quic: Multiaddr = DEFAULT_LISTEN_QUIC.parse().unwrap();

        assert_eq!(tcp.to_string(), "/ip4/0.0.0.0/tcp/60841", "tcp address");
        assert_eq!(
            quic.to_string(),
            "/ip4/0.0.0.0/udp/60841/quic-v1",
            "quic address"
        );
    }

    #[test]
    fn test_default_home_ends_with_postmesh_dir() {
        assert!(
            default_home().ends_with(DEFAULT_POSTMESH_HOME),
            "home is {}",
            default_home()
        );
    }
}
