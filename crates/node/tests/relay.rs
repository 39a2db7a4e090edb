use core::time::Duration;

use libp2p::identity::Keypair;
use postmesh_network::address::PeerAddress;
use postmesh_network::client::NetworkClient;
use postmesh_network::config::{NetworkConfig, StreamConfig, SwarmConfig};
use postmesh_network::errors::ConnectError;
use postmesh_network::stream::POST_PROTOCOL;
use postmesh_network::types::NetworkEvent;
use postmesh_node::publisher::{Publisher, PublisherConfig, PublisherState, ReconnectConfig};
use postmesh_node::receiver::Receiver;
use postmesh_node::store::GraphqlStore;
use postmesh_primitives::post::Post;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn stream_config() -> StreamConfig {
    StreamConfig {
        connect_timeout: Duration::from_secs(5),
        open_timeout: Duration::from_secs(2),
        io_timeout: Duration::from_secs(2),
        ..StreamConfig::default()
    }
}

fn publisher_config() -> PublisherConfig {
    PublisherConfig {
        interval: Duration::from_millis(100),
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            max_attempts: 2,
        },
    }
}

fn fixed_post() -> Post {
    Post::new("042", "abc1234567", "Zq8kLm2NpX4rTs6VwY0a")
}

async fn start_node(token: &CancellationToken) -> (NetworkClient, PeerAddress) {
    let config = NetworkConfig::new(
        Keypair::generate_ed25519(),
        SwarmConfig::new(vec!["/ip4/127.0.0.1/tcp/0".parse().unwrap()]),
        stream_config(),
    );

    let (client, mut events) = postmesh_network::run(&config, token.clone())
        .await
        .unwrap();

    let address = timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Some(NetworkEvent::ListeningOn { address, .. }) => break address,
                Some(_) => {}
                None => panic!("event loop stopped before listening"),
            }
        }
    })
    .await
    .expect("node never reported a listen address");

    let peer_address = PeerAddress::new(client.local_peer_id(), address);

    (client, peer_address)
}

async fn graphql_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "createPost": { "id": "1" } } })),
        )
        .mount(&server)
        .await;

    server
}

/// Starts a persister that forwards posts to `server`. The returned client
/// must outlive the test so the event loop keeps running.
async fn start_persister(
    server: &MockServer,
    token: &CancellationToken,
) -> (NetworkClient, PeerAddress, JoinHandle<()>) {
    let (client, address) = start_node(token).await;

    let store = GraphqlStore::new(
        format!("{}/graphql", server.uri()).parse().unwrap(),
        Duration::from_secs(5),
    )
    .unwrap();

    let incoming = client.accept(POST_PROTOCOL).unwrap();
    let receiver = tokio::spawn(Receiver::new(store).run(incoming, token.clone()));

    (client, address, receiver)
}

async fn wait_for_requests(server: &MockServer) -> Vec<Value> {
    timeout(Duration::from_secs(15), async {
        loop {
            let requests = server.received_requests().await.unwrap();

            if !requests.is_empty() {
                break requests
                    .iter()
                    .map(|request| serde_json::from_slice(&request.body).unwrap())
                    .collect();
            }

            sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("no post reached the persistence endpoint")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_published_post_reaches_persistence_endpoint() {
    let server = graphql_server().await;
    let persister_token = CancellationToken::new();
    let (_persister, persister_addr, receiver) = start_persister(&server, &persister_token).await;

    let publisher_token = CancellationToken::new();
    let (client, _) = start_node(&publisher_token).await;
    let publisher = Publisher::new(client, persister_addr, fixed_post, publisher_config());
    let publishing = tokio::spawn(publisher.run(publisher_token.clone()));

    let requests = wait_for_requests(&server).await;

    assert_eq!(
        requests[0]["variables"],
        json!({
            "title": "abc1234567",
            "content": "Zq8kLm2NpX4rTs6VwY0a",
            "userId": "042",
        }),
        "post fields were not forwarded intact"
    );

    publisher_token.cancel();
    let result = timeout(Duration::from_secs(5), publishing)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok(), "got {result:?}");

    persister_token.cancel();
    timeout(Duration::from_secs(5), receiver)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wrong_identity_fails_before_publishing() {
    let server = graphql_server().await;
    let token = CancellationToken::new();
    let (_persister, persister_addr, _receiver) = start_persister(&server, &token).await;

    let impostor = PeerAddress::new(
        Keypair::generate_ed25519().public().to_peer_id(),
        persister_addr.addr().clone(),
    );

    let (client, _) = start_node(&token).await;
    let publisher = Publisher::new(client, impostor, fixed_post, publisher_config());
    let state = publisher.subscribe();

    let err = timeout(Duration::from_secs(10), publisher.run(token.clone()))
        .await
        .unwrap()
        .unwrap_err();

    assert!(
        matches!(err, ConnectError::IdentityMismatch { .. }),
        "got {err:?}"
    );
    assert_eq!(
        *state.borrow(),
        PublisherState::Idle,
        "failed connect leaves the publisher idle"
    );
    assert!(
        server.received_requests().await.unwrap().is_empty(),
        "nothing may be published after a failed connect"
    );

    token.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancelled_publisher_stops_idle() {
    let server = graphql_server().await;
    let token = CancellationToken::new();
    let (_persister, persister_addr, _receiver) = start_persister(&server, &token).await;

    let publisher_token = CancellationToken::new();
    let (client, _) = start_node(&publisher_token).await;
    let publisher = Publisher::new(
        client,
        persister_addr,
        fixed_post,
        PublisherConfig {
            interval: Duration::from_secs(3_600),
            ..publisher_config()
        },
    );
    let mut state = publisher.subscribe();
    let publishing = tokio::spawn(publisher.run(publisher_token.clone()));

    timeout(
        Duration::from_secs(10),
        state.wait_for(|state| *state == PublisherState::Connected),
    )
    .await
    .unwrap()
    .unwrap();

    publisher_token.cancel();

    let result = timeout(Duration::from_secs(5), publishing)
        .await
        .expect("publisher ignored cancellation")
        .unwrap();

    assert!(result.is_ok(), "got {result:?}");
    assert_eq!(
        *state.borrow(),
        PublisherState::Idle,
        "cancelled publisher must report idle"
    );
    assert!(
        server.received_requests().await.unwrap().is_empty(),
        "no post is due within the first interval"
    );

    token.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_lost_persister_exhausts_reconnect_budget() {
    let server = graphql_server().await;
    let persister_token = CancellationToken::new();
    let (persister, persister_addr, _receiver) = start_persister(&server, &persister_token).await;

    let publisher_token = CancellationToken::new();
    let (client, _) = start_node(&publisher_token).await;
    let publisher = Publisher::new(client, persister_addr, fixed_post, publisher_config());
    let publishing = tokio::spawn(publisher.run(publisher_token.clone()));

    let _ignored = wait_for_requests(&server).await;

    persister_token.cancel();
    drop(persister);

    let result = timeout(Duration::from_secs(30), publishing)
        .await
        .expect("publisher kept running without its peer")
        .unwrap();

    assert!(
        matches!(result, Err(ConnectError::Unreachable { .. } | ConnectError::Timeout { .. })),
        "got {result:?}"
    );

    publisher_token.cancel();
}
