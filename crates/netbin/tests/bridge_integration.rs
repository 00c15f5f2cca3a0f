#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Integration tests use unwrap for brevity

//! End-to-end tests driving a real `Server` over loopback sockets.
//!
//! Each test binds an ephemeral port (or a socket in a temp directory), runs
//! the bridge on a background task and talks to it like a remote peer would.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use netbin::{Phase, Server, ServerError};
use netbin_core::{Config, Domain};

const TIMEOUT: Duration = Duration::from_secs(10);

struct Running {
    addr: String,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), ServerError>>,
    phases: watch::Receiver<Phase>,
}

impl Running {
    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    async fn stop(mut self) -> watch::Receiver<Phase> {
        self.shutdown();
        tokio::time::timeout(TIMEOUT, self.task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
        self.phases
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("netbin=debug")
        .with_test_writer()
        .try_init();
}

fn tcp_config<const N: usize>(command: [&str; N]) -> Config {
    Config::new(command).unwrap().with_addr("127.0.0.1:0")
}

async fn start(config: Config) -> Running {
    init_tracing();
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr();
    let phases = server.phases();
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.run_until(async move {
        let _ = stopped.await;
    }));
    Running {
        addr,
        stop: Some(stop),
        task,
        phases,
    }
}

async fn echo_once(addr: &str, payload: &[u8]) -> Vec<u8> {
    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(payload).await.unwrap();
    client.shutdown().await.unwrap();
    let mut received = Vec::new();
    tokio::time::timeout(TIMEOUT, client.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    received
}

#[tokio::test]
async fn line_echo_round_trip() {
    let server = start(tcp_config(["cat"])).await;

    assert_eq!(echo_once(&server.addr, b"hello\n").await, b"hello\n");

    server.stop().await;
}

#[tokio::test]
async fn large_payload_is_byte_exact_and_ordered() {
    let server = start(tcp_config(["cat"])).await;
    let payload: Vec<u8> = (0..1024 * 1024u32)
        .map(|i| (i.wrapping_mul(31) ^ (i >> 7)) as u8)
        .collect();

    let client = TcpStream::connect(&server.addr).await.unwrap();
    let (mut read_half, mut write_half) = client.into_split();
    let send = payload.clone();
    let writer = tokio::spawn(async move {
        for chunk in send.chunks(7919) {
            write_half.write_all(chunk).await.unwrap();
        }
        write_half.shutdown().await.unwrap();
    });

    let mut received = Vec::new();
    tokio::time::timeout(TIMEOUT, read_half.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    writer.await.unwrap();

    assert_eq!(received.len(), payload.len());
    assert!(received == payload, "payload corrupted in transit");

    server.stop().await;
}

#[tokio::test]
async fn missing_command_closes_session_and_frees_slot() {
    let server = start(
        tcp_config(["/nonexistent/netbin-test-program"]).with_max_concurrent(1),
    )
    .await;

    // With a single slot, every one of these is only accepted if the
    // previous session released its token.
    for _ in 0..3 {
        let mut client = TcpStream::connect(&server.addr).await.unwrap();
        let mut received = Vec::new();
        let read = tokio::time::timeout(TIMEOUT, client.read_to_end(&mut received))
            .await
            .expect("session was not closed");
        assert_eq!(read.unwrap_or(0), 0);
    }

    server.stop().await;
}

#[tokio::test]
async fn single_slot_serialises_sessions() {
    let server = start(tcp_config(["cat"]).with_max_concurrent(1)).await;

    let mut first = TcpStream::connect(&server.addr).await.unwrap();
    first.write_all(b"a").await.unwrap();
    let mut one = [0u8; 1];
    tokio::time::timeout(TIMEOUT, first.read_exact(&mut one))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&one, b"a");

    // Connected at the socket level, but not served until `first` is done.
    let mut second = TcpStream::connect(&server.addr).await.unwrap();
    second.write_all(b"b").await.unwrap();
    let waiting = tokio::time::timeout(Duration::from_millis(300), second.read_exact(&mut one));
    assert!(waiting.await.is_err(), "second session served too early");

    first.shutdown().await.unwrap();
    let mut rest = Vec::new();
    tokio::time::timeout(TIMEOUT, first.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(rest.is_empty());

    tokio::time::timeout(TIMEOUT, second.read_exact(&mut one))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&one, b"b");
    second.shutdown().await.unwrap();

    server.stop().await;
}

#[tokio::test]
async fn unlimited_admission_serves_everyone_at_once() {
    const CLIENTS: usize = 8;
    let server = start(tcp_config(["cat"]).with_max_concurrent(0)).await;

    let mut clients = Vec::new();
    for i in 0..CLIENTS {
        let mut client = TcpStream::connect(&server.addr).await.unwrap();
        let message = format!("client-{i}\n");
        client.write_all(message.as_bytes()).await.unwrap();
        clients.push((client, message));
    }

    // All sessions are still open here, so each reply proves concurrency.
    for (client, message) in &mut clients {
        let mut buf = vec![0u8; message.len()];
        tokio::time::timeout(TIMEOUT, client.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(buf, message.as_bytes());
    }

    for (mut client, _) in clients {
        client.shutdown().await.unwrap();
    }
    server.stop().await;
}

#[tokio::test]
async fn shutdown_drains_running_sessions() {
    let mut server = start(tcp_config([
        "sh",
        "-c",
        "echo started; read line; sleep 0.2; echo \"got $line\"; echo finishing >&2",
    ]))
    .await;

    let mut client = TcpStream::connect(&server.addr).await.unwrap();
    let mut started = [0u8; 8];
    tokio::time::timeout(TIMEOUT, client.read_exact(&mut started))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&started, b"started\n");

    server.shutdown();
    tokio::time::timeout(TIMEOUT, async {
        while *server.phases.borrow_and_update() != Phase::ShuttingDown {
            server.phases.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    // No new connections once shutdown has begun.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(TcpStream::connect(&server.addr).await.is_err());
    assert!(!server.task.is_finished(), "exited with a session in flight");

    client.write_all(b"x\n").await.unwrap();
    let mut received = Vec::new();
    tokio::time::timeout(TIMEOUT, client.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, b"got x\n");

    let phases = server.stop().await;
    assert_eq!(*phases.borrow(), Phase::Drained);
}

#[tokio::test]
async fn unix_domain_sessions_are_bridged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("netbin.sock");
    let config = Config::new(["tr", "a-z", "A-Z"])
        .unwrap()
        .with_domain(Domain::Unix)
        .with_addr(path.to_str().unwrap());
    let server = start(config).await;
    assert_eq!(server.addr, path.display().to_string());

    let mut client = UnixStream::connect(&path).await.unwrap();
    client.write_all(b"quiet words\n").await.unwrap();
    client.shutdown().await.unwrap();
    let mut received = Vec::new();
    tokio::time::timeout(TIMEOUT, client.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, b"QUIET WORDS\n");

    server.stop().await;
    assert!(!path.exists(), "socket file left behind");
}

#[tokio::test]
async fn occupied_address_fails_to_bind() {
    let server = start(tcp_config(["cat"])).await;

    let err = Server::bind(tcp_config(["cat"]).with_addr(server.addr.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::Listen { .. }));

    server.stop().await;
}

#[tokio::test]
async fn invalid_config_is_rejected_before_binding() {
    let config = tcp_config(["cat"]).with_domain(Domain::Tcp6);
    let err = Server::bind(config).await.unwrap_err();
    assert!(matches!(err, ServerError::Config(_)));
}
