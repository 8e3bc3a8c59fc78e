//! End-to-end exercise of the protocol registry: register a simple echo
//! protocol on one node, open a stream to it from another, and round-trip
//! a payload over it.

use futures::{AsyncReadExt, AsyncWriteExt};
use network::{AddrInfo, ClientWrapper, Config, FileSecretsManager, NullMetrics, ProtocolHandlerPair, Server};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ECHO_PROTOCOL: &str = "/test/echo/1.0.0";

struct EchoHandler;

#[async_trait::async_trait]
impl network::StreamHandler for EchoHandler {
    async fn handle(&self, _peer_id: network::PeerId, mut stream: network::BoxedStream) {
        let mut buf = [0u8; 5];
        if stream.read_exact(&mut buf).await.is_ok() {
            let _ = stream.write_all(&buf).await;
            let _ = stream.close().await;
        }
    }
}

fn secrets_dir(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("network-protocol-test-{label}-{}", std::process::id()))
}

async fn start_node(label: &str) -> Arc<Server> {
    let config = Config {
        listen_addr: "127.0.0.1".parse().unwrap(),
        listen_port: 0,
        no_discover: true,
        ..Config::default()
    };
    let secrets = FileSecretsManager::new(secrets_dir(label));
    let server = Server::new(config, &secrets, Arc::new(NullMetrics)).expect("server construction");
    server.start().await.expect("server start");
    server
}

#[tokio::test]
async fn echo_protocol_round_trips_over_an_opened_stream() {
    let listener = start_node("proto-listener").await;
    let dialer = start_node("proto-dialer").await;

    listener.register_protocol(
        ECHO_PROTOCOL,
        ProtocolHandlerPair {
            server_handler: Arc::new(EchoHandler),
            client_wrapper: Arc::new(|stream| Box::new(Mutex::new(Some(stream))) as Box<dyn std::any::Any + Send>)
                as ClientWrapper,
        },
    );

    let addr = listener.addrs().into_iter().next().unwrap();
    let target = AddrInfo::new(listener.id(), vec![addr]);
    dialer.join(target, Duration::from_secs(5)).await.unwrap();

    let any = dialer
        .new_proto_stream(ECHO_PROTOCOL, listener.id())
        .await
        .expect("opening the echo stream should succeed once the peers are connected");
    let holder = any
        .downcast::<Mutex<Option<network::BoxedStream>>>()
        .expect("client_wrapper returns the boxed stream unchanged");
    let mut stream = holder.lock().unwrap().take().unwrap();

    stream.write_all(b"hello").await.unwrap();
    let mut reply = [0u8; 5];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"hello");

    listener.close();
    dialer.close();
}
