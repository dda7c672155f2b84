use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;

use line_chat_server::{Listener, RegistryHandle, ServerConfig};

const READ_TIMEOUT: Duration = Duration::from_secs(3);
const QUIET_PERIOD: Duration = Duration::from_millis(200);
const WELCOME: &str = "Welcome to the chat!";

struct TestServer {
    addr: SocketAddr,
    registry: RegistryHandle,
    _shutdown: oneshot::Sender<()>,
}

async fn start_server(max_connections: i64) -> TestServer {
    let config = ServerConfig::new(None, Some(max_connections), Some(WELCOME.into())).unwrap();
    let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener = Listener::from_listener(socket, &config);
    let addr = listener.local_addr().unwrap();
    let registry = listener.registry();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(listener.run_until(async {
        let _ = shutdown_rx.await;
    }));

    TestServer {
        addr,
        registry,
        _shutdown: shutdown_tx,
    }
}

struct ChatClient {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl ChatClient {
    /// Connect and consume the welcome line
    async fn connect(addr: SocketAddr) -> Self {
        let mut client = Self::connect_raw(addr).await;
        assert_eq!(client.recv().await.as_deref(), Some(WELCOME));
        client
    }

    async fn connect_raw(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    /// Connect and claim `name`, waiting until the server has applied it
    async fn named(addr: SocketAddr, name: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(&format!(":meet {name}")).await;
        client.send(":who").await;
        let names = client.recv().await.unwrap();
        assert!(names.contains(name), "{names}");
        client
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\r\n").await.unwrap();
    }

    async fn recv(&mut self) -> Option<String> {
        timeout(READ_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .unwrap()
    }

    /// Assert nothing arrives for a short while
    async fn expect_silence(&mut self) {
        if let Ok(line) = timeout(QUIET_PERIOD, self.lines.next_line()).await {
            panic!("expected no message, got {:?}", line);
        }
    }
}

async fn wait_for_count(registry: &RegistryHandle, expected: usize) {
    timeout(READ_TIMEOUT, async {
        while registry.connection_count().await.unwrap() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection count never settled");
}

#[tokio::test]
async fn broadcast_excludes_sender() {
    let server = start_server(10).await;
    let mut a = ChatClient::named(server.addr, "A").await;
    let mut b = ChatClient::named(server.addr, "B").await;
    let mut c = ChatClient::named(server.addr, "C").await;

    a.send("hi").await;

    assert_eq!(b.recv().await.as_deref(), Some("A said: hi"));
    assert_eq!(c.recv().await.as_deref(), Some("A said: hi"));

    // The next thing A hears is its own :who reply
    a.send(":who").await;
    assert_eq!(
        a.recv().await.as_deref(),
        Some("The names are: A  ---  B  ---  C")
    );
}

#[tokio::test]
async fn whisper_reaches_only_recipient() {
    let server = start_server(10).await;
    let mut a = ChatClient::named(server.addr, "A").await;
    let mut b = ChatClient::named(server.addr, "B").await;
    let mut c = ChatClient::named(server.addr, "C").await;

    a.send(":whisper B,secret").await;
    assert_eq!(b.recv().await.as_deref(), Some("A said: secret"));

    a.send(":whisper ZZZ,hi").await;
    a.send(":whisper onlyname").await;
    assert_eq!(a.recv().await.as_deref(), Some("Invalid command!"));

    b.expect_silence().await;
    c.expect_silence().await;
}

#[tokio::test]
async fn names_are_unique() {
    let server = start_server(10).await;
    let mut x = ChatClient::named(server.addr, "alice").await;
    let mut y = ChatClient::connect(server.addr).await;

    y.send(":meet alice").await;
    assert_eq!(
        y.recv().await.as_deref(),
        Some("Name is already taken. Try with another name.")
    );

    // Y cannot chat until it has a name
    y.send("anyone there?").await;
    assert_eq!(
        y.recv().await.as_deref(),
        Some("Invalid name or Name is already taken. Try with another name.")
    );
    x.expect_silence().await;
}

#[tokio::test]
async fn who_lists_guests() {
    let server = start_server(10).await;
    let mut alice = ChatClient::named(server.addr, "alice").await;
    let _bob = ChatClient::named(server.addr, "bob").await;
    let _guest = ChatClient::connect(server.addr).await;
    wait_for_count(&server.registry, 3).await;

    alice.send(":who").await;
    let names = alice.recv().await.unwrap();
    assert!(names.starts_with("The names are: "), "{names}");
    for name in ["alice", "bob", "Guest"] {
        assert!(names.contains(name), "{names} is missing {name}");
    }
}

#[tokio::test]
async fn unknown_command_is_reported() {
    let server = start_server(10).await;
    let mut a = ChatClient::named(server.addr, "A").await;

    a.send(":dance").await;
    assert_eq!(a.recv().await.as_deref(), Some("Unknown command!"));
}

#[tokio::test]
async fn quit_frees_name_and_slot() {
    let server = start_server(10).await;
    let mut alice = ChatClient::named(server.addr, "alice").await;
    let mut bob = ChatClient::named(server.addr, "bob").await;

    alice.send(":quit").await;
    assert_eq!(alice.recv().await, None);
    wait_for_count(&server.registry, 1).await;

    bob.send(":who").await;
    assert_eq!(bob.recv().await.as_deref(), Some("The names are: bob"));

    // The freed name can be claimed again and routing still works
    let mut again = ChatClient::named(server.addr, "alice").await;
    bob.send("welcome back").await;
    assert_eq!(again.recv().await.as_deref(), Some("bob said: welcome back"));
}

#[tokio::test]
async fn abrupt_disconnect_does_not_disturb_others() {
    let server = start_server(10).await;
    let gone = ChatClient::named(server.addr, "gone").await;
    let mut a = ChatClient::named(server.addr, "A").await;
    let mut b = ChatClient::named(server.addr, "B").await;

    drop(gone);
    wait_for_count(&server.registry, 2).await;

    a.send("still here").await;
    assert_eq!(b.recv().await.as_deref(), Some("A said: still here"));

    a.send(":whisper gone,hello?").await;
    a.send(":who").await;
    assert_eq!(a.recv().await.as_deref(), Some("The names are: A  ---  B"));
}

#[tokio::test]
async fn admission_control_caps_connections() {
    let server = start_server(2).await;
    let mut first = ChatClient::connect(server.addr).await;
    let _second = ChatClient::connect(server.addr).await;

    let mut third = ChatClient::connect_raw(server.addr).await;
    assert_eq!(third.recv().await, None);
    assert_eq!(server.registry.connection_count().await.unwrap(), 2);

    // A slot opens once someone leaves
    first.send(":quit").await;
    assert_eq!(first.recv().await, None);
    wait_for_count(&server.registry, 1).await;

    let _fourth = ChatClient::connect(server.addr).await;
    assert_eq!(server.registry.connection_count().await.unwrap(), 2);
}
