//! Socket-independent bookkeeping for one PVWS gateway connection.
//!
//! The session never performs I/O. Methods return the frames that must go out
//! on the current socket, and the driver in `mod.rs` reports open, message and
//! close events back. Every socket instance gets a new generation number so
//! frames produced for a socket that has since closed can be recognised and
//! discarded.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use super::wire::{ClientMessage, ServerMessage};
use crate::connection::{ConnectionCallbacks, ConnectionError, ConnectionState};
use crate::dtypes::DType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

pub struct PvwsSession {
    state: SocketState,
    generation: u64,
    /// PVs subscribed on the current socket.
    subscriptions: BTreeSet<String>,
    /// PVs waiting for the next open, replayed last-in first-out.
    disconnected: Vec<String>,
    pending_writes: Vec<ClientMessage>,
    /// PVs that delivered at least one update on the current socket.
    seen: HashSet<String>,
    callbacks: Option<Arc<dyn ConnectionCallbacks>>,
}

impl Default for PvwsSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PvwsSession {
    pub fn new() -> Self {
        Self {
            state: SocketState::Disconnected,
            generation: 0,
            subscriptions: BTreeSet::new(),
            disconnected: Vec::new(),
            pending_writes: Vec::new(),
            seen: HashSet::new(),
            callbacks: None,
        }
    }

    pub fn set_callbacks(&mut self, callbacks: Arc<dyn ConnectionCallbacks>) {
        self.callbacks = Some(callbacks);
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SocketState::Open
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn subscribed(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.iter().map(String::as_str)
    }

    pub fn queued(&self) -> &[String] {
        &self.disconnected
    }

    pub fn subscribe(&mut self, pv_name: &str) -> Option<ClientMessage> {
        if self.subscriptions.contains(pv_name) || self.disconnected.iter().any(|p| p == pv_name) {
            return None;
        }
        if self.is_open() {
            self.subscriptions.insert(pv_name.to_string());
            Some(ClientMessage::subscribe(pv_name))
        } else {
            self.disconnected.push(pv_name.to_string());
            None
        }
    }

    pub fn unsubscribe(&mut self, pv_name: &str) -> Option<ClientMessage> {
        self.disconnected.retain(|p| p != pv_name);
        self.seen.remove(pv_name);
        if self.subscriptions.remove(pv_name) && self.is_open() {
            Some(ClientMessage::clear(pv_name))
        } else {
            None
        }
    }

    /// Returns the frame to send now, or queues it until the socket opens.
    pub fn write(
        &mut self,
        pv_name: &str,
        value: &DType,
    ) -> Result<Option<ClientMessage>, ConnectionError> {
        let message = ClientMessage::write(pv_name, value)
            .ok_or_else(|| ConnectionError::EmptyWrite(pv_name.to_string()))?;
        if self.is_open() {
            Ok(Some(message))
        } else {
            self.pending_writes.push(message);
            Ok(None)
        }
    }

    pub fn begin_connect(&mut self) {
        self.state = SocketState::Connecting;
    }

    /// A new socket is open: returns the replayed subscriptions followed by
    /// the writes queued while disconnected.
    pub fn on_open(&mut self) -> Vec<ClientMessage> {
        self.state = SocketState::Open;
        self.generation += 1;

        let mut frames = Vec::with_capacity(self.disconnected.len() + self.pending_writes.len());
        while let Some(pv_name) = self.disconnected.pop() {
            if self.subscriptions.insert(pv_name.clone()) {
                frames.push(ClientMessage::subscribe(&pv_name));
            }
        }
        frames.append(&mut self.pending_writes);
        frames
    }

    pub fn on_message(&mut self, text: &str) {
        let update = match ServerMessage::parse(text) {
            Ok(ServerMessage::Update(update)) => update,
            Ok(ServerMessage::Other) => {
                log::trace!("Ignoring gateway frame: {text}");
                return;
            }
            Err(e) => {
                log::warn!("Dropping gateway frame: {e}");
                return;
            }
        };
        let value = match update.to_dtype() {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Dropping update for {}: {e}", update.pv);
                return;
            }
        };
        let Some(callbacks) = &self.callbacks else {
            return;
        };

        let first = self.seen.insert(update.pv.clone());
        if first || update.readonly.is_some() {
            callbacks.connection_changed(
                &update.pv,
                ConnectionState::new(true, update.readonly.unwrap_or(true)),
            );
        }
        callbacks.value_changed(&update.pv, value);
    }

    pub fn begin_close(&mut self) {
        if self.state != SocketState::Disconnected {
            self.state = SocketState::Closing;
        }
    }

    /// The socket is gone: every subscribed PV goes disconnected and read-only
    /// and waits in the replay queue. Also used after a failed connect.
    pub fn on_close(&mut self) {
        let subscriptions = std::mem::take(&mut self.subscriptions);
        for pv_name in subscriptions {
            if let Some(callbacks) = &self.callbacks {
                callbacks.connection_changed(&pv_name, ConnectionState::new(false, true));
            }
            self.disconnected.push(pv_name);
        }
        self.seen.clear();
        self.state = SocketState::Disconnected;
    }
}
