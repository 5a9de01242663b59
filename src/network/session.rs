use crate::config::settings::DOC_URL_PLACEHOLDER;
use crate::core::document::DocumentHandle;
use crate::error::{ProbeError, Result};
use crate::network::tls::TlsConfig;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open, upgraded connection to the server for one document. Dropping it
/// releases the server-side slot, so scenarios keep it alive on purpose.
pub struct Session {
    id: String,
    handle: DocumentHandle,
    stream: WsStream,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn handle(&self) -> &DocumentHandle {
        &self.handle
    }

    pub async fn send_text(&mut self, text: &str) -> std::result::Result<(), WsError> {
        debug!(session = %self.id, "send: {}", text);
        self.stream.send(Message::Text(text.to_string().into())).await
    }

    pub async fn next_message(&mut self) -> Option<std::result::Result<Message, WsError>> {
        self.stream.next().await
    }

    /// Close handshake, then drain until the server ends the stream. Errors
    /// are ignored: the server may already have closed the connection.
    pub async fn close(mut self, drain_timeout: Duration) {
        if let Err(e) = self.stream.close(None).await {
            debug!(session = %self.id, "close: {}", e);
            return;
        }

        let drained = timeout(drain_timeout, async {
            while let Some(Ok(_)) = self.stream.next().await {}
        })
        .await;

        if drained.is_err() {
            debug!(session = %self.id, "server did not finish close handshake in time");
        }
    }
}

/// Opens upgraded connections to per-document WebSocket URLs.
pub struct SessionOpener {
    base: Url,
    path_template: String,
    connect_timeout: Duration,
    connector: Option<Connector>,
}

impl SessionOpener {
    pub fn new(
        server_uri: &str,
        path_template: &str,
        connect_timeout: Duration,
        tls: &TlsConfig,
    ) -> Result<Self> {
        let base = websocket_base(server_uri)?;
        let connector = if base.scheme() == "wss" {
            Some(tls.connector()?)
        } else {
            None
        };

        Ok(Self {
            base,
            path_template: path_template.to_string(),
            connect_timeout,
            connector,
        })
    }

    /// WebSocket URL for a document: the path template with the document URL
    /// percent-encoded into a single segment.
    pub fn url_for(&self, handle: &DocumentHandle) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ProbeError::Config(format!("server URI cannot carry a path: {}", self.base))
            })?;
            segments.clear();
            for part in self.path_template.split('/').filter(|p| !p.is_empty()) {
                if part == DOC_URL_PLACEHOLDER {
                    segments.push(handle.doc_url());
                } else {
                    segments.push(part);
                }
            }
        }
        Ok(url)
    }

    pub async fn open(&self, handle: &DocumentHandle) -> Result<Session> {
        let url = self.url_for(handle)?;
        let connecting = connect_async_tls_with_config(
            url.as_str(),
            None,
            false,
            self.connector.clone(),
        );

        let (stream, response) = match timeout(self.connect_timeout, connecting).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => {
                return Err(ProbeError::transport(
                    format!("opening session to {url}"),
                    describe_ws_error(&e),
                ))
            }
            Err(_) => {
                return Err(ProbeError::transport(
                    format!("opening session to {url}"),
                    format!("no upgrade within {}s", self.connect_timeout.as_secs()),
                ))
            }
        };

        let session = Session {
            id: format!("{:06}", next_session_number()),
            handle: handle.clone(),
            stream,
        };
        debug!(
            session = %session.id,
            status = response.status().as_u16(),
            document = %handle.doc_url(),
            "session opened"
        );
        Ok(session)
    }
}

fn next_session_number() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Map http(s) to ws(s); ws(s) pass through.
pub fn websocket_base(server_uri: &str) -> Result<Url> {
    let mut url = Url::parse(server_uri)
        .map_err(|e| ProbeError::Config(format!("invalid server URI {server_uri:?}: {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ProbeError::Config(format!(
                "unsupported scheme {other:?} in server URI {server_uri}"
            )))
        }
    };

    url.set_scheme(scheme)
        .map_err(|_| ProbeError::Config(format!("cannot use {scheme} for {server_uri}")))?;
    Ok(url)
}

pub(crate) fn describe_ws_error(error: &WsError) -> String {
    match error {
        WsError::Http(response) => format!(
            "upgrade rejected with HTTP {}",
            response.status().as_u16()
        ),
        other => other.to_string(),
    }
}
