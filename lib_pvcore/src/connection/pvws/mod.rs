//! # PVWS Gateway Client
//!
//! Connects to a PV Web Socket gateway (`{ws|wss}://host/pvws/pv`) and serves
//! every protocol the gateway proxies: `ca://`, `pva://`, `loc://`, `sim://`
//! and friends.
//!
//! The bookkeeping lives in [`session::PvwsSession`], which is plain data and
//! fully testable without a socket. [`PvwsPlugin`] owns a session behind a
//! mutex and a background task that drives the real WebSocket: it connects,
//! replays subscriptions on open, forwards outbound frames, feeds inbound text
//! to the session and reconnects after a fixed delay whenever the socket
//! drops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

// Traits required for async WebSocket operations
use futures_util::sink::{Sink, SinkExt}; // Provides .send()
use futures_util::stream::StreamExt; // Provides .next()

use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use url::Url;

use super::{Connection, ConnectionCallbacks, ConnectionError, SubscriptionType};
use crate::dtypes::DType;
use crate::utils::lock;

pub mod session;
pub mod wire;

use session::PvwsSession;
use wire::ClientMessage;

/// Delay before a dropped gateway socket is reopened.
pub const DEFAULT_RECONNECT: Duration = Duration::from_millis(5000);

/// Where and how to reach the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvwsOptions {
    /// `host:port` of the gateway.
    pub socket: String,
    /// Use `wss` instead of `ws`.
    pub ssl: bool,
    pub reconnect_delay: Duration,
}

impl PvwsOptions {
    pub fn new(socket: impl Into<String>, ssl: bool) -> Self {
        Self {
            socket: socket.into(),
            ssl,
            reconnect_delay: DEFAULT_RECONNECT,
        }
    }

    pub fn endpoint(&self) -> Result<Url, ConnectionError> {
        let scheme = if self.ssl { "wss" } else { "ws" };
        let raw = format!("{scheme}://{}/pvws/pv", self.socket);
        Url::parse(&raw).map_err(|e| ConnectionError::InvalidEndpoint(format!("{raw}: {e}")))
    }
}

/// A frame tagged with the socket generation it was produced for.
#[derive(Debug)]
struct Outbound {
    generation: u64,
    message: ClientMessage,
}

pub struct PvwsPlugin {
    url: Url,
    reconnect_delay: Duration,
    session: Arc<Mutex<PvwsSession>>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
    started: AtomicBool,
    shutdown: CancellationToken,
}

impl PvwsPlugin {
    pub fn new(options: PvwsOptions) -> Result<Self, ConnectionError> {
        let url = options.endpoint()?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Ok(Self {
            url,
            reconnect_delay: options.reconnect_delay,
            session: Arc::new(Mutex::new(PvwsSession::new())),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Stops the background task. Subscribed PVs are reported disconnected.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn send(&self, generation: u64, message: ClientMessage) -> Result<(), ConnectionError> {
        self.outbound_tx
            .send(Outbound {
                generation,
                message,
            })
            .map_err(|_| ConnectionError::TransportClosed(self.url.to_string()))
    }
}

impl Drop for PvwsPlugin {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Connection for PvwsPlugin {
    fn connect(&self, callbacks: Arc<dyn ConnectionCallbacks>) -> Result<(), ConnectionError> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|_| ConnectionError::NoRuntime)?;
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ConnectionError::AlreadyConnected);
        }
        let outbound = lock(&self.outbound_rx)
            .take()
            .ok_or(ConnectionError::AlreadyConnected)?;
        lock(&self.session).set_callbacks(callbacks);

        handle.spawn(run_socket(
            self.url.clone(),
            self.reconnect_delay,
            Arc::clone(&self.session),
            outbound,
            self.shutdown.clone(),
        ));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.session).is_open()
    }

    fn subscribe(
        &self,
        pv_name: &str,
        _sub_type: Option<SubscriptionType>,
    ) -> Result<String, ConnectionError> {
        let mut session = lock(&self.session);
        if let Some(message) = session.subscribe(pv_name) {
            self.send(session.generation(), message)?;
        }
        Ok(pv_name.to_string())
    }

    fn unsubscribe(&self, pv_name: &str) -> Result<(), ConnectionError> {
        let mut session = lock(&self.session);
        if let Some(message) = session.unsubscribe(pv_name) {
            self.send(session.generation(), message)?;
        }
        Ok(())
    }

    fn put_pv(&self, pv_name: &str, value: &DType) -> Result<(), ConnectionError> {
        let mut session = lock(&self.session);
        if let Some(message) = session.write(pv_name, value)? {
            self.send(session.generation(), message)?;
        }
        Ok(())
    }

    fn get_device(&self, device: &str) -> Result<(), ConnectionError> {
        log::debug!("Device queries are not served by the gateway ({device})");
        Ok(())
    }
}

async fn send_frame<S>(sink: &mut S, message: &ClientMessage) -> bool
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = match message.to_json() {
        Ok(text) => text,
        Err(e) => {
            log::error!("Could not encode {message:?}: {e}");
            return true;
        }
    };
    match sink.send(WsMessage::Text(text.into())).await {
        Ok(()) => true,
        Err(e) => {
            log::error!("Send failed: {e}");
            false
        }
    }
}

/// Socket lifecycle: connect, pump frames until the socket drops, report the
/// close to the session, wait, repeat. Returns only on shutdown.
async fn run_socket(
    url: Url,
    reconnect_delay: Duration,
    session: Arc<Mutex<PvwsSession>>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    shutdown: CancellationToken,
) {
    loop {
        lock(&session).begin_connect();
        log::debug!("Connecting to {url}");

        let attempt = tokio::select! {
            _ = shutdown.cancelled() => return,
            attempt = connect_async(url.as_str()) => attempt,
        };

        match attempt {
            Ok((ws_stream, _)) => {
                log::debug!("Connected to {url}");
                let (mut sink, mut stream) = ws_stream.split();
                let (generation, greeting) = {
                    let mut session = lock(&session);
                    let frames = session.on_open();
                    (session.generation(), frames)
                };

                let mut healthy = true;
                for frame in &greeting {
                    if !send_frame(&mut sink, frame).await {
                        healthy = false;
                        break;
                    }
                }

                while healthy {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            lock(&session).begin_close();
                            let _ = sink.close().await;
                            lock(&session).on_close();
                            return;
                        }

                        Some(frame) = outbound.recv() => {
                            if frame.generation != generation {
                                log::trace!("Discarding frame for closed socket: {:?}", frame.message);
                                continue;
                            }
                            healthy = send_frame(&mut sink, &frame.message).await;
                        }

                        incoming = stream.next() => match incoming {
                            Some(Ok(WsMessage::Text(text))) => {
                                lock(&session).on_message(text.as_str());
                            }
                            Some(Ok(WsMessage::Close(frame))) => {
                                match frame {
                                    Some(frame) => log::debug!(
                                        "Web socket closed ({}, {})",
                                        u16::from(frame.code),
                                        frame.reason.as_str()
                                    ),
                                    None => log::debug!("Web socket closed"),
                                }
                                healthy = false;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                log::error!("Error from {url}: {e}");
                                healthy = false;
                            }
                            None => healthy = false,
                        }
                    }
                }

                lock(&session).begin_close();
                let _ = sink.close().await;
                lock(&session).on_close();
            }
            Err(e) => {
                log::error!("Failed to connect to {url}: {e}");
                lock(&session).on_close();
            }
        }

        log::debug!(
            "Scheduling re-connect to {url} in {}ms",
            reconnect_delay.as_millis()
        );
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = sleep(reconnect_delay) => {}
        }
    }
}
