//! # Simulator
//!
//! Serves synthetic PVs without any network: `loc://` variables that hold
//! whatever is written to them, and `sim://` generators (sine, ramp, random,
//! enum, limit, disconnector, flip-flop). One generator and at most one timer
//! exist per canonical key, however many times or spellings a PV is requested.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{Connection, ConnectionCallbacks, ConnectionError, SubscriptionType};
use crate::dtypes::DType;
use crate::utils::lock;

pub mod generators;
pub mod name;

use generators::{Schedule, SimPv, Tick};
use name::parse_name;

#[derive(Default)]
struct SimState {
    pvs: HashMap<String, SimPv>,
    callbacks: Option<Arc<dyn ConnectionCallbacks>>,
}

impl SimState {
    fn publish(&mut self, key: &str) {
        let Some(callbacks) = self.callbacks.clone() else {
            return;
        };
        if let Some(pv) = self.pvs.get_mut(key) {
            if pv.subscribed {
                callbacks.value_changed(key, pv.next_value());
            }
        }
    }

    fn publish_connection(&self, key: &str) {
        if let (Some(callbacks), Some(pv)) = (&self.callbacks, self.pvs.get(key)) {
            callbacks.connection_changed(key, pv.connection());
        }
    }

    fn tick(&mut self, key: &str, tick: Tick) {
        match tick {
            Tick::Value => self.publish(key),
            Tick::Connection => self.publish_connection(key),
        }
    }
}

pub struct SimulatorPlugin {
    state: Arc<Mutex<SimState>>,
    shutdown: CancellationToken,
}

impl Default for SimulatorPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatorPlugin {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::default())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Current value of a simulated PV, creating the generator if needed.
    pub fn value_of(&self, pv_name: &str) -> Option<DType> {
        let mut state = lock(&self.state);
        let key = self.init_simulator(&mut state, pv_name)?;
        state.pvs.get_mut(&key).map(SimPv::next_value)
    }

    /// Stops every generator timer.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Looks up or creates the generator for `pv_name` and returns its key.
    fn init_simulator(&self, state: &mut SimState, pv_name: &str) -> Option<String> {
        let info = parse_name(pv_name);
        if state.pvs.contains_key(&info.key_name) {
            return Some(info.key_name);
        }

        let (pv, schedule) = SimPv::create(&info)?;
        let key = pv.key.clone();
        log::debug!("Created {} for {key}", pv.kind.name());
        state.pvs.insert(key.clone(), pv);
        state.publish_connection(&key);
        if let Some(schedule) = schedule {
            self.spawn_timer(key.clone(), schedule);
        }
        Some(key)
    }

    fn spawn_timer(&self, key: String, schedule: Schedule) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::warn!("No runtime: {key} will only update on demand");
            return;
        };
        let state: Weak<Mutex<SimState>> = Arc::downgrade(&self.state);
        let token = self.shutdown.child_token();

        handle.spawn(async move {
            let mut ticker = interval(schedule.every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(state) = state.upgrade() else {
                    break;
                };
                lock(&state).tick(&key, schedule.tick);
            }
            log::trace!("Timer for {key} stopped");
        });
    }
}

impl Drop for SimulatorPlugin {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Connection for SimulatorPlugin {
    fn connect(&self, callbacks: Arc<dyn ConnectionCallbacks>) -> Result<(), ConnectionError> {
        let mut state = lock(&self.state);
        if state.callbacks.is_some() {
            return Err(ConnectionError::AlreadyConnected);
        }
        state.callbacks = Some(callbacks);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).callbacks.is_some()
    }

    fn subscribe(
        &self,
        pv_name: &str,
        _sub_type: Option<SubscriptionType>,
    ) -> Result<String, ConnectionError> {
        let mut state = lock(&self.state);
        let Some(key) = self.init_simulator(&mut state, pv_name) else {
            log::warn!("No simulated process variable matches {pv_name}");
            return Ok(pv_name.to_string());
        };
        if let Some(pv) = state.pvs.get_mut(&key) {
            pv.subscribed = true;
        }
        state.publish(&key);
        Ok(key)
    }

    fn unsubscribe(&self, pv_name: &str) -> Result<(), ConnectionError> {
        log::debug!("Unsubscribing from {pv_name}.");
        let key = parse_name(pv_name).key_name;
        if let Some(pv) = lock(&self.state).pvs.get_mut(&key) {
            pv.subscribed = false;
        }
        Ok(())
    }

    fn put_pv(&self, pv_name: &str, value: &DType) -> Result<(), ConnectionError> {
        let mut state = lock(&self.state);
        let key = self
            .init_simulator(&mut state, pv_name)
            .ok_or_else(|| ConnectionError::UnknownSimulatedPv(pv_name.to_string()))?;
        let publish = match state.pvs.get_mut(&key) {
            Some(pv) => pv.update_value(value)?,
            None => false,
        };
        if publish {
            state.publish(&key);
        }
        Ok(())
    }

    fn get_device(&self, device: &str) -> Result<(), ConnectionError> {
        log::debug!("Device queries are not simulated ({device})");
        Ok(())
    }
}
