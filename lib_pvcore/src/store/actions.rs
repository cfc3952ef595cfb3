use serde_json::Value;
use tokio::sync::mpsc;

use crate::connection::{ConnectionCallbacks, ConnectionState, SubscriptionType};
use crate::dtypes::DType;

/// One value event for one PV.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChanged {
    pub pv_name: String,
    pub value: DType,
}

/// Everything that can change the store. Actions are applied strictly in the
/// order they are dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ConnectionChanged {
        pv_name: String,
        value: ConnectionState,
    },
    /// `effective_pv_name` is filled in by the connection middleware.
    Subscribe {
        component_id: String,
        pv_name: String,
        effective_pv_name: Option<String>,
        sub_type: Option<SubscriptionType>,
    },
    Unsubscribe {
        component_id: String,
        pv_name: String,
    },
    ValueChanged(ValueChanged),
    /// A throttled batch, applied in arrival order.
    ValuesChanged(Vec<ValueChanged>),
    WritePv {
        pv_name: String,
        value: DType,
    },
    DeviceQueried {
        device: String,
        value: DType,
    },
    QueryDevice {
        device: String,
    },
    /// Drops a cached device so the next query reaches the transport.
    RefreshDevice {
        device: String,
    },
    FileChanged {
        file: String,
        contents: Value,
    },
    RefreshFile {
        file: String,
    },
}

impl Action {
    pub fn subscribe(
        component_id: impl Into<String>,
        pv_name: impl Into<String>,
        sub_type: Option<SubscriptionType>,
    ) -> Self {
        Action::Subscribe {
            component_id: component_id.into(),
            pv_name: pv_name.into(),
            effective_pv_name: None,
            sub_type,
        }
    }

    pub fn unsubscribe(component_id: impl Into<String>, pv_name: impl Into<String>) -> Self {
        Action::Unsubscribe {
            component_id: component_id.into(),
            pv_name: pv_name.into(),
        }
    }

    pub fn write_pv(pv_name: impl Into<String>, value: DType) -> Self {
        Action::WritePv {
            pv_name: pv_name.into(),
            value,
        }
    }

    pub fn query_device(device: impl Into<String>) -> Self {
        Action::QueryDevice {
            device: device.into(),
        }
    }

    pub fn value_changed(pv_name: impl Into<String>, value: DType) -> Self {
        Action::ValueChanged(ValueChanged {
            pv_name: pv_name.into(),
            value,
        })
    }

    pub fn connection_changed(pv_name: impl Into<String>, value: ConnectionState) -> Self {
        Action::ConnectionChanged {
            pv_name: pv_name.into(),
            value,
        }
    }
}

/// Cloneable handle that feeds actions into a [`Store`](super::Store).
///
/// Transports receive it as their [`ConnectionCallbacks`]; widgets use the
/// convenience methods to subscribe, write and query.
#[derive(Clone)]
pub struct ActionSender {
    tx: mpsc::UnboundedSender<Action>,
}

impl ActionSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Action>) -> Self {
        Self { tx }
    }

    /// Queues an action. Returns `false` once the store is gone.
    pub fn send(&self, action: Action) -> bool {
        match self.tx.send(action) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Store stopped, dropping {:?}", e.0);
                false
            }
        }
    }

    pub fn subscribe(&self, component_id: &str, pv_name: &str, sub_type: Option<SubscriptionType>) {
        self.send(Action::subscribe(component_id, pv_name, sub_type));
    }

    pub fn unsubscribe(&self, component_id: &str, pv_name: &str) {
        self.send(Action::unsubscribe(component_id, pv_name));
    }

    pub fn write_pv(&self, pv_name: &str, value: DType) {
        self.send(Action::write_pv(pv_name, value));
    }

    pub fn query_device(&self, device: &str) {
        self.send(Action::query_device(device));
    }
}

impl ConnectionCallbacks for ActionSender {
    fn connection_changed(&self, pv_name: &str, state: ConnectionState) {
        self.send(Action::connection_changed(pv_name, state));
    }

    fn value_changed(&self, pv_name: &str, value: DType) {
        self.send(Action::value_changed(pv_name, value));
    }

    fn device_queried(&self, device: &str, value: DType) {
        self.send(Action::DeviceQueried {
            device: device.to_string(),
            value,
        });
    }
}
