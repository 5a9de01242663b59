use crate::core::document::DocumentHandle;
use crate::error::{ProbeError, Result};
use crate::network::session::{describe_ws_error, Session};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::debug;

pub const CLIENT_FRAME: &str = "loolclient ";
pub const LOAD_FRAME: &str = "load ";
pub const LAYOUT_FRAME: &str = "partpagerectangles ";

/// Close status for a rejected admission (RFC 6455, 1008).
pub const POLICY_VIOLATION: u16 = 1008;

const ERROR_FRAME: &str = "error:";
const STATUS_FRAME: &str = "status:";

/// How the server answered the handshake on the probed connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClosureOutcome {
    /// The server closed the connection. `code` is absent when the close
    /// frame carried no status. `errors` holds `error:` frames sent before it.
    Closed {
        code: Option<u16>,
        message: String,
        errors: Vec<String>,
    },
    /// The server answered with ordinary protocol traffic instead of closing.
    Continued { frame: String },
}

impl ClosureOutcome {
    pub fn code(&self) -> Option<u16> {
        match self {
            ClosureOutcome::Closed { code, .. } => *code,
            ClosureOutcome::Continued { .. } => None,
        }
    }

    pub fn is_policy_violation(&self) -> bool {
        self.code() == Some(POLICY_VIOLATION)
    }
}

impl fmt::Display for ClosureOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClosureOutcome::Closed {
                code: Some(code),
                message,
                ..
            } if message.is_empty() => write!(f, "closed with {code}"),
            ClosureOutcome::Closed {
                code: Some(code),
                message,
                ..
            } => write!(f, "closed with {code} ({message})"),
            ClosureOutcome::Closed { code: None, .. } => write!(f, "closed without status"),
            ClosureOutcome::Continued { frame } => {
                write!(f, "connection continued with {:?}", preview(frame))
            }
        }
    }
}

/// Drives the three-frame client handshake and reports how the server
/// reacted to it.
#[derive(Debug, Clone)]
pub struct HandshakeDriver {
    client_version: String,
    receive_timeout: Duration,
}

impl HandshakeDriver {
    pub fn new(client_version: impl Into<String>, receive_timeout: Duration) -> Self {
        Self {
            client_version: client_version.into(),
            receive_timeout,
        }
    }

    /// The frames sent on a probed connection, in order.
    pub fn frames_for(&self, handle: &DocumentHandle) -> [String; 3] {
        [
            format!("{CLIENT_FRAME}{}", self.client_version),
            format!("{LOAD_FRAME}url={}", handle.doc_url()),
            LAYOUT_FRAME.to_string(),
        ]
    }

    /// Send the handshake and wait for the server to close or carry on.
    pub async fn probe(&self, session: &mut Session) -> Result<ClosureOutcome> {
        let frames = self.frames_for(session.handle());

        // The server may close as soon as it sees the first frame; a failed
        // write is only fatal if no close frame can be read afterwards.
        let mut send_error = None;
        for frame in &frames {
            if let Err(e) = session.send_text(frame).await {
                debug!(session = %session.id(), "send failed: {}", e);
                send_error = Some(describe_ws_error(&e));
                break;
            }
        }

        match self.read_outcome(session).await {
            Ok(outcome) => Ok(outcome),
            Err(read_error) => match send_error {
                Some(detail) => Err(ProbeError::transport("sending handshake", detail)),
                None => Err(read_error),
            },
        }
    }

    /// Introduce the client on a session that should fit within the limit and
    /// wait for the server's first reply. A close instead of a reply means the
    /// server refused the session; `what` names it in the assertion.
    pub async fn confirm_admission(&self, session: &mut Session, what: &str) -> Result<()> {
        let frame = format!("{CLIENT_FRAME}{}", self.client_version);
        let sent = session.send_text(&frame).await;

        let outcome = match (sent, self.read_outcome(session).await) {
            (_, Ok(outcome)) => outcome,
            (Err(e), Err(_)) => {
                return Err(ProbeError::transport(
                    "sending client frame",
                    describe_ws_error(&e),
                ))
            }
            (Ok(()), Err(read_error)) => return Err(read_error),
        };

        match outcome {
            ClosureOutcome::Continued { frame } => {
                debug!(session = %session.id(), "admitted: {}", preview(&frame));
                Ok(())
            }
            closed => Err(ProbeError::assertion(what, "an open session", closed)),
        }
    }

    async fn read_outcome(&self, session: &mut Session) -> Result<ClosureOutcome> {
        let deadline = Instant::now() + self.receive_timeout;
        let mut errors = Vec::new();

        loop {
            let message = match timeout_at(deadline, session.next_message()).await {
                Err(_) => {
                    return Err(ProbeError::transport(
                        "waiting for handshake response",
                        format!(
                            "no close or reply within {}s",
                            self.receive_timeout.as_secs()
                        ),
                    ))
                }
                Ok(None) => {
                    return Err(ProbeError::transport(
                        "waiting for handshake response",
                        "connection dropped without a close frame",
                    ))
                }
                Ok(Some(Err(e))) => {
                    return Err(ProbeError::transport(
                        "waiting for handshake response",
                        describe_ws_error(&e),
                    ))
                }
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Close(frame) => {
                    let (code, message) = match frame {
                        Some(frame) => (
                            Some(u16::from(frame.code)),
                            frame.reason.as_str().to_string(),
                        ),
                        None => (None, String::new()),
                    };
                    debug!(session = %session.id(), ?code, "server closed: {}", message);
                    return Ok(ClosureOutcome::Closed {
                        code,
                        message,
                        errors,
                    });
                }
                Message::Text(text) if text.as_str().starts_with(ERROR_FRAME) => {
                    debug!(session = %session.id(), "error frame: {}", text.as_str());
                    errors.push(text.as_str().to_string());
                }
                Message::Text(text) => {
                    return Ok(ClosureOutcome::Continued {
                        frame: text.as_str().to_string(),
                    })
                }
                Message::Binary(data) => {
                    return Ok(ClosureOutcome::Continued {
                        frame: format!("<{} binary bytes>", data.len()),
                    })
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    /// Ask the server to load the session's document and wait for its
    /// `status:` reply, proving the session was admitted.
    pub async fn load_document(
        &self,
        session: &mut Session,
        load_timeout: Duration,
    ) -> Result<()> {
        let frame = format!("{LOAD_FRAME}url={}", session.handle().doc_url());
        session
            .send_text(&frame)
            .await
            .map_err(|e| ProbeError::transport("sending load", describe_ws_error(&e)))?;

        let deadline = Instant::now() + load_timeout;
        loop {
            match timeout_at(deadline, session.next_message()).await {
                Err(_) => {
                    return Err(ProbeError::transport(
                        "loading document",
                        format!("no status within {}s", load_timeout.as_secs()),
                    ))
                }
                Ok(None) => {
                    return Err(ProbeError::transport(
                        "loading document",
                        "connection dropped without a close frame",
                    ))
                }
                Ok(Some(Err(e))) => {
                    return Err(ProbeError::transport("loading document", describe_ws_error(&e)))
                }
                Ok(Some(Ok(Message::Text(text)))) if text.as_str().starts_with(STATUS_FRAME) => {
                    debug!(session = %session.id(), "document loaded: {}", text.as_str());
                    return Ok(());
                }
                Ok(Some(Ok(Message::Close(frame)))) => {
                    let actual = match frame {
                        Some(frame) => format!(
                            "closed with {} ({})",
                            u16::from(frame.code),
                            frame.reason.as_str()
                        ),
                        None => "closed without status".to_string(),
                    };
                    return Err(ProbeError::assertion(
                        format!("admission of {} within the limit", session.handle().doc_url()),
                        "status: reply",
                        actual,
                    ));
                }
                Ok(Some(Ok(_))) => {}
            }
        }
    }
}

fn preview(frame: &str) -> String {
    if frame.chars().count() > 80 {
        let head: String = frame.chars().take(80).collect();
        format!("{head}...")
    } else {
        frame.to_string()
    }
}
