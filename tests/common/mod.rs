#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use limitprobe::{LimitConfiguration, ProcessInventory, SettlePolicy, SuiteConfig};
use std::collections::HashMap;
use std::net::TcpListener as StdTcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

pub const LIMIT_ERROR_FRAME: &str = "error: cmd=internal kind=limitreached";

/// Test utilities for integration tests
pub fn get_free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Limits the mock server enforces, independent of what the suite is told.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerLimits {
    pub max_documents: usize,
    pub max_connections: usize,
    /// Keep a worker alive after its document's last connection closes
    pub leak_workers: bool,
}

impl ServerLimits {
    pub fn new(max_documents: usize, max_connections: usize) -> Self {
        Self {
            max_documents,
            max_connections,
            leak_workers: false,
        }
    }

    pub fn leaking(mut self) -> Self {
        self.leak_workers = true;
        self
    }
}

struct ServerState {
    limits: ServerLimits,
    open: Mutex<HashMap<String, usize>>,
    /// One spare worker plus one per open document
    workers: AtomicUsize,
    accepted: AtomicUsize,
    rejected: Mutex<Vec<Vec<String>>>,
}

impl ServerState {
    fn admit(&self, path: &str) -> bool {
        let mut open = self.open.lock().unwrap();
        match open.get_mut(path) {
            Some(count) => {
                if self.limits.max_connections > 0 && *count >= self.limits.max_connections {
                    return false;
                }
                *count += 1;
                true
            }
            None => {
                if self.limits.max_documents > 0 && open.len() >= self.limits.max_documents {
                    return false;
                }
                open.insert(path.to_string(), 1);
                self.workers.fetch_add(1, Ordering::SeqCst);
                true
            }
        }
    }

    /// Returns true when the document lost its last connection.
    fn release(&self, path: &str) -> bool {
        let mut open = self.open.lock().unwrap();
        let Some(count) = open.get_mut(path) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            open.remove(path);
            true
        } else {
            false
        }
    }
}

/// WebSocket document server that admits sessions up to its limits and
/// closes anything beyond them with 1008 after reading the handshake.
pub struct MockDocumentServer {
    pub port: u16,
    pub base_url: String,
    state: Arc<ServerState>,
    handle: JoinHandle<()>,
}

impl MockDocumentServer {
    pub async fn start(limits: ServerLimits) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(ServerState {
            limits,
            open: Mutex::new(HashMap::new()),
            workers: AtomicUsize::new(1),
            accepted: AtomicUsize::new(0),
            rejected: Mutex::new(Vec::new()),
        });

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(serve_connection(state, stream));
            }
        });

        Self {
            port,
            base_url: format!("http://127.0.0.1:{port}"),
            state,
            handle,
        }
    }

    pub fn workers(&self) -> WorkerGauge {
        WorkerGauge(self.state.clone())
    }

    pub fn accepted_connections(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    pub fn open_documents(&self) -> usize {
        self.state.open.lock().unwrap().len()
    }

    /// Text frames read from each rejected session before it was closed
    pub fn rejected_handshakes(&self) -> Vec<Vec<String>> {
        self.state.rejected.lock().unwrap().clone()
    }
}

impl Drop for MockDocumentServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_connection(state: Arc<ServerState>, stream: TcpStream) {
    let mut path = String::new();
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        path = request.uri().path().to_string();
        Ok(response)
    };
    let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
        return;
    };
    state.accepted.fetch_add(1, Ordering::SeqCst);

    if !state.admit(&path) {
        reject(&state, ws).await;
        return;
    }

    serve_admitted(&mut ws).await;

    if state.release(&path) && !state.limits.leak_workers {
        // Workers exit a little after their document is unloaded.
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            state.workers.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

async fn serve_admitted(ws: &mut WebSocketStream<TcpStream>) {
    while let Some(message) = ws.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(_) => continue,
            Err(_) => break,
        };

        let reply = if text.as_str().starts_with("loolclient ") {
            "loolserver 0.1"
        } else if text.as_str().starts_with("load ") {
            "status: type=text parts=1 current=0 width=12240 height=15840"
        } else if text.as_str().starts_with("partpagerectangles") {
            "partpagerectangles: 0, 0, 12240, 15840"
        } else {
            continue;
        };

        if ws.send(Message::text(reply)).await.is_err() {
            break;
        }
    }
}

async fn reject(state: &ServerState, mut ws: WebSocketStream<TcpStream>) {
    let mut frames = Vec::new();
    while frames.len() < 3 {
        match timeout(Duration::from_millis(200), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => frames.push(text.as_str().to_string()),
            Ok(Some(Ok(_))) => {}
            _ => break,
        }
    }
    state.rejected.lock().unwrap().push(frames);

    let _ = ws.send(Message::text(LIMIT_ERROR_FRAME)).await;
    let _ = ws
        .close(Some(CloseFrame {
            code: CloseCode::Policy,
            reason: "Server limit reached".into(),
        }))
        .await;
    while let Some(Ok(_)) = ws.next().await {}
}

/// Worker count as tracked by a mock server.
pub struct WorkerGauge(Arc<ServerState>);

impl ProcessInventory for WorkerGauge {
    fn count_workers(&self) -> std::io::Result<usize> {
        Ok(self.0.workers.load(Ordering::SeqCst))
    }
}

pub struct FixedInventory(pub usize);

impl ProcessInventory for FixedInventory {
    fn count_workers(&self) -> std::io::Result<usize> {
        Ok(self.0)
    }
}

/// Temporary fixture directory holding `empty.odt` and a work directory for copies.
pub struct FixtureDir {
    dir: TempDir,
}

impl FixtureDir {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data").join("empty.odt"), b"PK\x03\x04fixture").unwrap();
        Self { dir }
    }

    pub fn fixture_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn leftover_copies(&self) -> usize {
        match std::fs::read_dir(self.work_dir()) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

pub fn suite_config(
    server_uri: &str,
    fixtures: &FixtureDir,
    max_documents: usize,
    max_connections: usize,
) -> SuiteConfig {
    SuiteConfig {
        server_uri: server_uri.to_string(),
        limits: LimitConfiguration::new(max_documents, max_connections),
        fixture_dir: fixtures.fixture_dir(),
        work_dir: Some(fixtures.work_dir()),
        settle: SettlePolicy {
            attempts: 20,
            initial_delay_ms: 10,
            max_delay_ms: 50,
        },
        connect_timeout_secs: 2,
        receive_timeout_secs: 2,
        load_timeout_secs: 2,
        ..Default::default()
    }
}
