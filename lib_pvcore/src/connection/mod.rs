//! # Connection Layer
//!
//! The capability contract every PV transport implements, plus the router that
//! selects a transport by URL-scheme prefix.
//!
//! ## Contained Modules:
//! - **`forwarder`**: ordered `(prefix, transport)` table, first match wins.
//! - **`pvws`** (feature `pvws`): WebSocket client for the PV Web Socket gateway.
//! - **`sim`** (feature `simulator`): synthetic PVs for offline use.
//!
//! Transports never touch the store. They report asynchronous events through
//! the [`ConnectionCallbacks`] handed to [`Connection::connect`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dtypes::DType;

/// Routes PV names to transports by prefix.
pub mod forwarder;
/// PV Web Socket gateway client.
#[cfg(feature = "pvws")]
pub mod pvws;
/// Local simulated PVs.
#[cfg(feature = "simulator")]
pub mod sim;

pub use forwarder::ConnectionForwarder;
#[cfg(feature = "pvws")]
pub use pvws::{PvwsOptions, PvwsPlugin};
#[cfg(feature = "simulator")]
pub use sim::SimulatorPlugin;

/// Per-PV connectivity as seen by a transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub is_connected: bool,
    pub is_readonly: bool,
}

impl ConnectionState {
    pub fn new(is_connected: bool, is_readonly: bool) -> Self {
        Self {
            is_connected,
            is_readonly,
        }
    }
}

/// Representations a subscriber is interested in. Transports may ignore it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionType {
    #[serde(default)]
    pub string: bool,
    #[serde(default)]
    pub double: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("No connection plugin found for PV {0}")]
    NoMatchingConnection(String),

    #[error("Can only connect once")]
    AlreadyConnected,

    #[error("Transport used before connect()")]
    NotConnected,

    #[error("Transport must be started inside a tokio runtime")]
    NoRuntime,

    #[error("Invalid gateway endpoint {0}")]
    InvalidEndpoint(String),

    #[error("Transport task for {0} has stopped")]
    TransportClosed(String),

    #[error("Could not create a simulated process variable for {0}")]
    UnknownSimulatedPv(String),

    #[error("Cannot set value on {kind} ({pv})")]
    ReadOnlySimulatedPv { pv: String, kind: &'static str },

    #[error("Nothing to write to {0}: value has neither string nor number")]
    EmptyWrite(String),
}

/// Receiver for the asynchronous events a transport produces.
pub trait ConnectionCallbacks: Send + Sync {
    fn connection_changed(&self, pv_name: &str, state: ConnectionState);
    fn value_changed(&self, pv_name: &str, value: DType);
    fn device_queried(&self, device: &str, value: DType);
}

/// A backend able to serve PVs.
///
/// Methods take `&self` because one transport instance is usually shared by
/// several forwarder prefixes; implementations keep their own interior state.
/// Calls never block on the network: requests are handed to the transport's
/// background task and results come back through the callbacks.
pub trait Connection: Send + Sync {
    /// Installs the callbacks used for every future event. A transport may
    /// only be connected once.
    fn connect(&self, callbacks: Arc<dyn ConnectionCallbacks>) -> Result<(), ConnectionError>;

    fn is_connected(&self) -> bool;

    /// Starts (or joins) a subscription and returns the effective PV name the
    /// transport will report events under.
    fn subscribe(
        &self,
        pv_name: &str,
        sub_type: Option<SubscriptionType>,
    ) -> Result<String, ConnectionError>;

    fn unsubscribe(&self, pv_name: &str) -> Result<(), ConnectionError>;

    fn put_pv(&self, pv_name: &str, value: &DType) -> Result<(), ConnectionError>;

    fn get_device(&self, device: &str) -> Result<(), ConnectionError>;
}
