//! Test doubles shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::connection::{
    Connection, ConnectionCallbacks, ConnectionError, ConnectionState, SubscriptionType,
};
use crate::dtypes::DType;
use crate::utils::lock;

/// Callbacks that drop every event.
pub struct NullCallbacks;

impl ConnectionCallbacks for NullCallbacks {
    fn connection_changed(&self, _pv_name: &str, _state: ConnectionState) {}
    fn value_changed(&self, _pv_name: &str, _value: DType) {}
    fn device_queried(&self, _device: &str, _value: DType) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connection(String, ConnectionState),
    Value(String, DType),
    Device(String, DType),
}

/// Callbacks that keep every event in arrival order.
#[derive(Default)]
pub struct RecordingCallbacks {
    events: Mutex<Vec<Event>>,
}

impl RecordingCallbacks {
    pub fn events(&self) -> Vec<Event> {
        lock(&self.events).clone()
    }

    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *lock(&self.events))
    }

    pub fn values(&self) -> Vec<(String, DType)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Value(pv, v) => Some((pv, v)),
                _ => None,
            })
            .collect()
    }

    pub fn connections(&self) -> Vec<(String, ConnectionState)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Connection(pv, s) => Some((pv, s)),
                _ => None,
            })
            .collect()
    }
}

impl ConnectionCallbacks for RecordingCallbacks {
    fn connection_changed(&self, pv_name: &str, state: ConnectionState) {
        lock(&self.events).push(Event::Connection(pv_name.to_string(), state));
    }

    fn value_changed(&self, pv_name: &str, value: DType) {
        lock(&self.events).push(Event::Value(pv_name.to_string(), value));
    }

    fn device_queried(&self, device: &str, value: DType) {
        lock(&self.events).push(Event::Device(device.to_string(), value));
    }
}

/// A transport that records the calls made on it. Names listed in `aliases`
/// resolve to a different effective name on subscribe.
#[derive(Default)]
pub struct RecordingConnection {
    calls: Mutex<Vec<String>>,
    connected: AtomicBool,
    pub aliases: HashMap<String, String>,
    pub fail_writes: bool,
}

impl RecordingConnection {
    pub fn with_alias(raw: &str, effective: &str) -> Self {
        let mut aliases = HashMap::new();
        aliases.insert(raw.to_string(), effective.to_string());
        Self {
            aliases,
            ..Default::default()
        }
    }

    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        lock(&self.calls).push(call);
    }
}

impl Connection for RecordingConnection {
    fn connect(&self, _callbacks: Arc<dyn ConnectionCallbacks>) -> Result<(), ConnectionError> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(ConnectionError::AlreadyConnected);
        }
        self.record("connect".to_string());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(
        &self,
        pv_name: &str,
        _sub_type: Option<SubscriptionType>,
    ) -> Result<String, ConnectionError> {
        self.record(format!("subscribe {pv_name}"));
        Ok(self
            .aliases
            .get(pv_name)
            .cloned()
            .unwrap_or_else(|| pv_name.to_string()))
    }

    fn unsubscribe(&self, pv_name: &str) -> Result<(), ConnectionError> {
        self.record(format!("unsubscribe {pv_name}"));
        Ok(())
    }

    fn put_pv(&self, pv_name: &str, _value: &DType) -> Result<(), ConnectionError> {
        self.record(format!("put {pv_name}"));
        if self.fail_writes {
            return Err(ConnectionError::TransportClosed(pv_name.to_string()));
        }
        Ok(())
    }

    fn get_device(&self, device: &str) -> Result<(), ConnectionError> {
        self.record(format!("device {device}"));
        Ok(())
    }
}
