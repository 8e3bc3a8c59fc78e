//! End-to-end scenarios driven purely through the public `Server` facade,
//! talking real TCP over loopback (port 0 so the OS picks a free one).

use network::{AddrInfo, Config, FileSecretsManager, NullMetrics, PeerId, Server};
use std::sync::Arc;
use std::time::Duration;

fn secrets_dir(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("network-join-test-{label}-{}", std::process::id()))
}

async fn start_node(label: &str) -> Arc<Server> {
    let config = Config {
        listen_addr: "127.0.0.1".parse().unwrap(),
        listen_port: 0,
        no_discover: true,
        ..Config::default()
    };
    let dir = secrets_dir(label);
    let secrets = FileSecretsManager::new(&dir);
    let server = Server::new(config, &secrets, Arc::new(NullMetrics)).expect("server construction");
    server.start().await.expect("server start");
    server
}

#[tokio::test]
async fn join_completes_when_the_remote_peer_is_listening() {
    let listener = start_node("listener").await;
    let dialer = start_node("dialer").await;

    let addr = listener
        .addrs()
        .into_iter()
        .next()
        .expect("listener bound at least one address");
    let target = AddrInfo::new(listener.id(), vec![addr]);

    dialer
        .join(target, Duration::from_secs(5))
        .await
        .expect("join should succeed against a reachable listener");

    assert!(dialer.has_peer(&listener.id()));
    assert_eq!(dialer.num_peers(), 1);

    listener.close();
    dialer.close();
}

#[tokio::test]
async fn join_fails_against_an_address_nobody_listens_on() {
    let dialer = start_node("unreachable-dialer").await;

    // Port 1 is a privileged port almost never bound in test environments;
    // dialing it either refuses immediately or never completes the libp2p
    // handshake, both of which the join watcher surfaces as an error.
    let unreachable = "/ip4/127.0.0.1/tcp/1".parse().unwrap();
    let target = AddrInfo::new(PeerId::random(), vec![unreachable]);

    let result = dialer.join(target, Duration::from_millis(500)).await;
    assert!(result.is_err());

    dialer.close();
}

#[tokio::test]
async fn disconnect_removes_the_peer_on_both_sides() {
    let listener = start_node("disc-listener").await;
    let dialer = start_node("disc-dialer").await;

    let addr = listener.addrs().into_iter().next().unwrap();
    let target = AddrInfo::new(listener.id(), vec![addr]);
    dialer.join(target, Duration::from_secs(5)).await.unwrap();
    assert!(dialer.has_peer(&listener.id()));

    dialer.disconnect(listener.id(), "test teardown").await;
    assert!(!dialer.has_peer(&listener.id()));

    listener.close();
    dialer.close();
}
