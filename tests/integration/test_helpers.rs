// tests/integration/test_helpers.rs

//! Test helpers: a scripted loopback backend standing in for the legacy
//! chat server, plus common config and tracing setup.

use chatbridge::config::BridgeConfig;
use chatbridge::core::commands::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// The backend's greeting line. The message fragment is the welcome sentinel.
pub const WELCOME_LINE: &str = r#"{"success":true,"message":"Welcome to the chat server"}"#;
/// The backend's registration confirmation line.
pub const REGISTERED_LINE: &str = r#"{"success":true,"message":"Registration successful"}"#;

/// Sets up minimal tracing for tests (ignore error if already initialized).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_test_writer()
        .try_init();
}

/// A config pointed at a loopback backend, with timeouts short enough for tests.
pub fn test_config(port: u16) -> BridgeConfig {
    BridgeConfig {
        backend_host: "127.0.0.1".to_string(),
        backend_port: port,
        command_timeout: Duration::from_secs(2),
        connect_timeout: Duration::from_secs(2),
        handshake_timeout: Duration::from_secs(2),
        sweep_interval: Duration::from_millis(100),
        ..BridgeConfig::default()
    }
}

/// Binds a fresh loopback listener for tests that script the backend inline.
pub async fn bind_backend() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// The backend's side of one accepted connection.
pub struct ScriptedConn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl ScriptedConn {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    /// Writes one terminated line.
    pub async fn send_line(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    /// Writes raw bytes with no terminator.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    /// Reads one line, or `None` once the bridge closed the connection.
    pub async fn recv_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line).await.unwrap() {
            0 => None,
            _ => Some(line),
        }
    }

    /// Reads one line and parses it as a bridge command.
    pub async fn recv_command(&mut self) -> Command {
        let line = self.recv_line().await.expect("bridge closed the connection");
        serde_json::from_str(line.trim()).expect("line parses as a command")
    }

    /// Plays the backend's half of the registration handshake and returns
    /// the REGISTER command the bridge sent.
    pub async fn handshake(&mut self) -> Command {
        self.send_line(WELCOME_LINE).await;
        let register = self.recv_command().await;
        self.send_line(REGISTERED_LINE).await;
        register
    }

    /// Answers every subsequent command with a fixed success line until the
    /// bridge disconnects.
    pub async fn respond_forever(&mut self, message: &str) {
        let reply = format!(r#"{{"success":true,"message":"{message}"}}"#);
        while self.recv_line().await.is_some() {
            self.send_line(&reply).await;
        }
    }
}

/// A loopback listener serving every accepted connection with the same script.
pub struct MockBackend {
    pub port: u16,
    accepted: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockBackend {
    /// Serves each accepted connection with its own invocation of `script`.
    pub async fn spawn<F, Fut>(script: F) -> Self
    where
        F: Fn(ScriptedConn) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (listener, port) = bind_backend().await;
        let accepted = Arc::new(AtomicUsize::new(0));
        let accepted_in_task = accepted.clone();
        let task = tokio::spawn(async move {
            let script = Arc::new(script);
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                accepted_in_task.fetch_add(1, Ordering::SeqCst);
                let script = script.clone();
                tokio::spawn(async move { script(ScriptedConn::new(stream)).await });
            }
        });
        Self {
            port,
            accepted,
            task,
        }
    }

    /// Spawns a backend that registers every connection and answers every
    /// command with `{"success":true,"message":"ok"}`.
    pub async fn spawn_responder() -> Self {
        Self::spawn(|mut conn| async move {
            conn.handshake().await;
            conn.respond_forever("ok").await;
        })
        .await
    }

    /// How many connections the backend has accepted so far.
    pub fn accepted_count(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}
