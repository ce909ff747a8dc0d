//! End-to-end relay scenarios over loopback TCP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use skymesh::client::ClientName;
use skymesh::geo::Coordinate;
use skymesh::link::{LinkReader, LinkWriter};
use skymesh::message::{ALL_DRONES, Message};
use skymesh::registry::ClientRegistry;
use skymesh::relay::router::{LIST_DRONES, RELAY_COMPONENT};
use skymesh::{AgentConfig, DroneAgent, Link, Relay, RelayConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

struct TestRelay {
    addr: SocketAddr,
    registry: Arc<ClientRegistry>,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TestRelay {
    async fn start() -> Self {
        Self::start_with(RelayConfig::builder().port(0).build()).await
    }

    async fn start_with(config: RelayConfig) -> Self {
        let relay = Relay::bind(config).await.unwrap();
        let addr = relay.local_addr().unwrap();
        let registry = relay.registry();
        let (stop, stopped) = oneshot::channel();
        let handle = tokio::spawn(relay.run_until(async {
            let _ = stopped.await;
        }));
        Self {
            addr,
            registry,
            stop,
            handle,
        }
    }

    /// Connect and identify, returning once the relay has registered the client.
    async fn connect(&self, name: &str) -> Client {
        let previous = self.registry.session_id(&ClientName::from(name));
        let link = Link::connect(self.addr, name).await.unwrap();
        self.wait_until(|registry| registry.session_id(&ClientName::from(name)) != previous)
            .await;
        let (_, reader, writer) = link.into_parts();
        Client { reader, writer }
    }

    async fn wait_until(&self, condition: impl Fn(&ClientRegistry) -> bool) {
        tokio::time::timeout(WAIT, async {
            while !condition(&self.registry) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn stop(self) {
        self.stop.send(()).unwrap();
        tokio::time::timeout(WAIT, self.handle)
            .await
            .expect("relay did not stop in time")
            .unwrap();
    }
}

struct Client {
    reader: LinkReader,
    writer: LinkWriter,
}

impl Client {
    async fn send(&mut self, message: &Message) {
        self.writer.send(message).await.unwrap();
    }

    async fn send_raw(&mut self, record: &[u8]) {
        self.writer.write_record(record).await.unwrap();
    }

    async fn recv(&mut self) -> Bytes {
        tokio::time::timeout(WAIT, self.reader.next_record())
            .await
            .expect("nothing received in time")
            .unwrap()
            .expect("connection closed")
    }

    async fn recv_message(&mut self) -> Message {
        Message::decode(&self.recv().await).unwrap()
    }

    async fn expect_silence(&mut self) {
        let result = tokio::time::timeout(QUIET, self.reader.next_record()).await;
        assert!(result.is_err(), "unexpected record: {result:?}");
    }

    async fn expect_closed(&mut self) {
        let result = tokio::time::timeout(WAIT, self.reader.next_record())
            .await
            .expect("connection still open");
        assert!(matches!(result, Ok(None) | Err(_)), "unexpected record: {result:?}");
    }
}

fn moveto(target: &str) -> Message {
    Message::drone_command(target, "moveto", json!([-0.39, 39.47]))
}

#[tokio::test]
async fn test_status_forwarded_verbatim_to_data_system_only() {
    let relay = TestRelay::start().await;
    let mut data = relay.connect("DataSystem").await;
    let mut drone = relay.connect("Drone-1").await;
    let mut control = relay.connect("ControlSystem").await;

    let record = br#"{"type": "dstat", "component": "Drone-1", "location": {"x": -0.4, "y": 39.4628, "z": 0}, "orientation": {"roll": 0, "pitch": 0, "yaw": 0}, "speed": 1.5, "autonomy": 99.0}"#;
    drone.send_raw(record).await;

    assert_eq!(data.recv().await, Bytes::from_static(record));
    drone.expect_silence().await;
    control.expect_silence().await;

    relay.stop().await;
}

#[tokio::test]
async fn test_command_to_all_reaches_every_drone() {
    let relay = TestRelay::start().await;
    let mut data = relay.connect("DataSystem").await;
    let mut first = relay.connect("Drone-1").await;
    let mut second = relay.connect("Drone-2").await;
    let mut control = relay.connect("ControlSystem").await;

    control.send(&moveto(ALL_DRONES)).await;

    assert_eq!(first.recv_message().await, moveto(ALL_DRONES));
    assert_eq!(second.recv_message().await, moveto(ALL_DRONES));
    data.expect_silence().await;
    control.expect_silence().await;

    relay.stop().await;
}

#[tokio::test]
async fn test_command_to_disconnected_drone_goes_nowhere() {
    let relay = TestRelay::start().await;
    let mut data = relay.connect("DataSystem").await;
    let first = relay.connect("Drone-1").await;
    let mut second = relay.connect("Drone-2").await;
    let mut control = relay.connect("ControlSystem").await;

    drop(first);
    relay
        .wait_until(|registry| !registry.contains(&ClientName::from("Drone-1")))
        .await;

    control.send(&moveto("Drone-1")).await;
    second.expect_silence().await;
    data.expect_silence().await;
    assert_eq!(relay.registry.len(), 3);

    // The relay keeps serving everyone else.
    control.send(&moveto("Drone-2")).await;
    assert_eq!(second.recv_message().await, moveto("Drone-2"));

    relay.stop().await;
}

#[tokio::test]
async fn test_first_record_must_identify() {
    let relay = TestRelay::start().await;

    let mut stream = TcpStream::connect(relay.addr).await.unwrap();
    stream
        .write_all(b"{\"type\":\"log\",\"component\":\"Drone-1\",\"message\":\"hi\"}\n")
        .await
        .unwrap();

    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(WAIT, stream.read(&mut buf))
        .await
        .expect("connection still open");
    assert!(matches!(read, Ok(0) | Err(_)));
    assert!(relay.registry.is_empty());

    relay.stop().await;
}

#[tokio::test]
async fn test_silent_connection_times_out() {
    let config = RelayConfig::builder()
        .port(0)
        .handshake_timeout(Duration::from_millis(200))
        .build();
    let relay = TestRelay::start_with(config).await;

    let mut stream = TcpStream::connect(relay.addr).await.unwrap();

    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(WAIT, stream.read(&mut buf))
        .await
        .expect("connection still open");
    assert!(matches!(read, Ok(0) | Err(_)));
    assert!(relay.registry.is_empty());

    relay.stop().await;
}

#[tokio::test]
async fn test_oversized_record_closes_connection() {
    let config = RelayConfig::builder().port(0).max_record_len(128).build();
    let relay = TestRelay::start_with(config).await;
    let mut data = relay.connect("DataSystem").await;
    let mut drone = relay.connect("Drone-1").await;

    let message = Message::log("Drone-1", "x".repeat(512));
    drone.send(&message).await;

    drone.expect_closed().await;
    relay
        .wait_until(|registry| !registry.contains(&ClientName::from("Drone-1")))
        .await;
    data.expect_silence().await;

    relay.stop().await;
}

#[tokio::test]
async fn test_duplicate_name_supersedes_previous_connection() {
    let relay = TestRelay::start().await;
    let mut control = relay.connect("ControlSystem").await;
    let mut old = relay.connect("Drone-1").await;
    let mut new = relay.connect("Drone-1").await;

    old.expect_closed().await;
    assert_eq!(relay.registry.len(), 2);

    control.send(&moveto("Drone-1")).await;
    assert_eq!(new.recv_message().await, moveto("Drone-1"));

    relay.stop().await;
}

#[tokio::test]
async fn test_list_drones_replies_to_sender() {
    let relay = TestRelay::start().await;
    let mut data = relay.connect("DataSystem").await;
    let _second = relay.connect("Drone-2").await;
    let _first = relay.connect("Drone-1").await;
    let mut control = relay.connect("ControlSystem").await;

    control.send(&Message::server_command(LIST_DRONES)).await;

    assert_eq!(
        control.recv_message().await,
        Message::log(RELAY_COMPONENT, "drones: Drone-1, Drone-2")
    );
    data.expect_silence().await;

    relay.stop().await;
}

#[tokio::test]
async fn test_malformed_record_keeps_connection() {
    let relay = TestRelay::start().await;
    let mut data = relay.connect("DataSystem").await;
    let mut drone = relay.connect("Drone-1").await;

    drone.send_raw(b"this is not json").await;
    drone.send_raw(br#"{"type":"teleport","component":"Drone-1"}"#).await;
    drone.send(&Message::log("Drone-1", "still here")).await;

    assert_eq!(
        data.recv_message().await,
        Message::log("Drone-1", "still here")
    );
    assert!(relay.registry.contains(&ClientName::from("Drone-1")));

    relay.stop().await;
}

#[tokio::test]
async fn test_agent_status_reaches_data_system() {
    let relay = TestRelay::start().await;
    let mut data = relay.connect("DataSystem").await;

    let start = Coordinate::new(-0.4, 39.4628);
    let agent = DroneAgent::new(
        AgentConfig::builder()
            .id("1")
            .start(start)
            .tick(Duration::from_millis(10))
            .route(Vec::new())
            .build(),
    );
    let (stop_agent, agent_stopped) = oneshot::channel::<()>();
    let addr = relay.addr;
    let agent = tokio::spawn(agent.run_until(addr, async {
        let _ = agent_stopped.await;
    }));

    match data.recv_message().await {
        Message::Status(status) => {
            assert_eq!(status.component, "Drone-1");
            assert_eq!(status.location, start);
        }
        other => panic!("expected dstat, got {other:?}"),
    }

    stop_agent.send(()).unwrap();
    let state = agent.await.unwrap().unwrap();
    assert_eq!(state.position, start);

    relay.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_every_connection() {
    let relay = TestRelay::start().await;
    let mut data = relay.connect("DataSystem").await;
    let mut drone = relay.connect("Drone-1").await;
    let registry = Arc::clone(&relay.registry);

    relay.stop().await;

    data.expect_closed().await;
    drone.expect_closed().await;
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_shutdown_with_stalled_reader() {
    let relay = TestRelay::start().await;
    // Never reads, so its socket buffers fill and the relay's writer blocks.
    let _data = relay.connect("DataSystem").await;
    let mut drone = relay.connect("Drone-1").await;
    let registry = Arc::clone(&relay.registry);

    let message = Message::log("Drone-1", "x".repeat(1000));
    for _ in 0..40_000 {
        drone.send(&message).await;
    }

    relay.stop().await;

    drone.expect_closed().await;
    assert!(registry.is_empty());
}
