//! Shared fixtures for the workspace integration tests: a scripted PVWS
//! gateway on a loopback port and helpers for waiting on store changes.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use lib_pvcore::StoreReader;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

/// How long a test waits for anything asynchronous before giving up.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A WebSocket server standing in for the PVWS gateway. Every accepted
/// client becomes a [`GatewaySession`].
pub struct MockGateway {
    socket: String,
    sessions: mpsc::UnboundedReceiver<GatewaySession>,
}

/// One client socket on the mock gateway. Dropping it closes the socket.
pub struct GatewaySession {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<Message>,
}

impl MockGateway {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let socket = listener.local_addr()?.to_string();
        let (session_tx, sessions) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let ws = match accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(e) => {
                        log::warn!("Mock gateway handshake failed: {e}");
                        continue;
                    }
                };
                let (in_tx, incoming) = mpsc::unbounded_channel();
                let (outgoing, mut out_rx) = mpsc::unbounded_channel::<Message>();
                if session_tx.send(GatewaySession { incoming, outgoing }).is_err() {
                    break;
                }

                tokio::spawn(async move {
                    let (mut sink, mut stream) = ws.split();
                    loop {
                        tokio::select! {
                            out = out_rx.recv() => match out {
                                Some(message) => {
                                    if sink.send(message).await.is_err() {
                                        break;
                                    }
                                }
                                None => {
                                    let _ = sink.close().await;
                                    break;
                                }
                            },
                            frame = stream.next() => match frame {
                                Some(Ok(Message::Text(text))) => {
                                    let _ = in_tx.send(text.as_str().to_string());
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                        }
                    }
                });
            }
        });

        Ok(Self { socket, sessions })
    }

    /// `host:port` to hand to the client configuration.
    pub fn socket(&self) -> &str {
        &self.socket
    }

    pub async fn next_session(&mut self) -> Option<GatewaySession> {
        tokio::time::timeout(TEST_TIMEOUT, self.sessions.recv())
            .await
            .ok()
            .flatten()
    }
}

impl GatewaySession {
    /// Next client frame, parsed as JSON.
    pub async fn recv_json(&mut self) -> Option<serde_json::Value> {
        let text = tokio::time::timeout(TEST_TIMEOUT, self.incoming.recv())
            .await
            .ok()
            .flatten()?;
        serde_json::from_str(&text).ok()
    }

    pub fn send_json(&self, frame: serde_json::Value) -> bool {
        self.outgoing
            .send(Message::Text(frame.to_string().into()))
            .is_ok()
    }
}

/// Waits until `check` holds for the store, re-checking after every applied
/// action. Returns `false` on timeout or when the store goes away.
pub async fn wait_until(reader: &mut StoreReader, mut check: impl FnMut(&StoreReader) -> bool) -> bool {
    tokio::time::timeout(TEST_TIMEOUT, async {
        loop {
            if check(reader) {
                return true;
            }
            if !reader.changed().await {
                return false;
            }
        }
    })
    .await
    .unwrap_or(false)
}
