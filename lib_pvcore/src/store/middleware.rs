use std::sync::Arc;

use super::actions::Action;
use super::state::CsState;
use crate::connection::{Connection, ConnectionCallbacks, ConnectionError};

/// Turns registry actions into transport calls.
///
/// Runs before the reducer and sees the state as it was before the action.
/// Transport failures are logged and swallowed: the bookkeeping proceeds as if
/// the call had succeeded and the PV simply never reports as connected.
pub struct ConnectionMiddleware {
    connection: Arc<dyn Connection>,
    callbacks: Arc<dyn ConnectionCallbacks>,
}

impl ConnectionMiddleware {
    pub fn new(connection: Arc<dyn Connection>, callbacks: Arc<dyn ConnectionCallbacks>) -> Self {
        Self {
            connection,
            callbacks,
        }
    }

    /// Hands the callbacks to the transport. Safe to call on a transport that
    /// was connected elsewhere.
    pub fn connect(&self) {
        match self.connection.connect(Arc::clone(&self.callbacks)) {
            Ok(()) => log::debug!("Connection established"),
            Err(ConnectionError::AlreadyConnected) => log::debug!("Connection was already established"),
            Err(e) => log::error!("Failed to connect: {e}"),
        }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Performs the side effects of `action` and returns the action to reduce,
    /// rewritten where the transport decides something (the effective name).
    pub fn handle(&self, state: &CsState, action: Action) -> Action {
        match action {
            Action::Subscribe {
                component_id,
                pv_name,
                sub_type,
                ..
            } => {
                let effective = match self.connection.subscribe(&pv_name, sub_type) {
                    Ok(effective) => effective,
                    Err(e) => {
                        log::error!("Failed to subscribe to pv {pv_name}: {e}");
                        pv_name.clone()
                    }
                };
                Action::Subscribe {
                    component_id,
                    pv_name,
                    effective_pv_name: Some(effective),
                    sub_type,
                }
            }
            Action::Unsubscribe {
                ref component_id,
                ref pv_name,
            } => {
                let effective = state.effective_name(pv_name);
                let last = state
                    .subscriptions
                    .get(effective)
                    .is_some_and(|components| matches!(components.as_slice(), [only] if only == component_id));
                if last {
                    if let Err(e) = self.connection.unsubscribe(effective) {
                        log::error!("Failed to unsubscribe from pv {pv_name}: {e}");
                    }
                }
                action
            }
            Action::WritePv {
                ref pv_name,
                ref value,
            } => {
                let effective = state.effective_name(pv_name);
                if let Err(e) = self.connection.put_pv(effective, value) {
                    log::error!("Failed to put to pv {pv_name}: {e}");
                }
                action
            }
            Action::QueryDevice { ref device } => {
                if !state.device_cache.contains_key(device) {
                    if let Err(e) = self.connection.get_device(device) {
                        log::error!("Failed to query device {device}: {e}");
                    }
                }
                action
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtypes::DType;
    use crate::testing::{NullCallbacks, RecordingConnection};

    fn middleware(connection: Arc<RecordingConnection>) -> ConnectionMiddleware {
        ConnectionMiddleware::new(connection, Arc::new(NullCallbacks))
    }

    #[test]
    fn subscribe_fills_effective_name() {
        let connection = Arc::new(RecordingConnection::with_alias("loc://x(1)", "loc://x"));
        let mw = middleware(connection.clone());
        let action = mw.handle(&CsState::default(), Action::subscribe("w1", "loc://x(1)", None));
        assert_eq!(
            action,
            Action::Subscribe {
                component_id: "w1".into(),
                pv_name: "loc://x(1)".into(),
                effective_pv_name: Some("loc://x".into()),
                sub_type: None,
            }
        );
        assert_eq!(connection.calls(), vec!["subscribe loc://x(1)"]);
    }

    #[test]
    fn unsubscribe_only_for_last_component() {
        let connection = Arc::new(RecordingConnection::default());
        let mw = middleware(connection.clone());
        let mut state = CsState::default();
        state
            .subscriptions
            .insert("A".into(), vec!["w1".into(), "w2".into()]);

        mw.handle(&state, Action::unsubscribe("w1", "A"));
        assert_eq!(connection.count("unsubscribe"), 0);

        state.subscriptions.insert("A".into(), vec!["w2".into()]);
        mw.handle(&state, Action::unsubscribe("w2", "A"));
        assert_eq!(connection.calls(), vec!["unsubscribe A"]);

        // Unknown component or PV: nothing to release.
        state.subscriptions.insert("A".into(), vec!["w2".into()]);
        mw.handle(&state, Action::unsubscribe("w9", "A"));
        mw.handle(&state, Action::unsubscribe("w1", "B"));
        assert_eq!(connection.count("unsubscribe"), 1);
    }

    #[test]
    fn write_resolves_alias() {
        let connection = Arc::new(RecordingConnection::default());
        let mw = middleware(connection.clone());
        let mut state = CsState::default();
        state
            .effective_pv_name_map
            .insert("loc://x(1)".into(), "loc://x".into());

        mw.handle(&state, Action::write_pv("loc://x(1)", DType::from_double(2.0)));
        mw.handle(&state, Action::write_pv("pva://y", DType::from_double(2.0)));
        assert_eq!(connection.calls(), vec!["put loc://x", "put pva://y"]);
    }

    #[test]
    fn write_failure_is_swallowed() {
        let connection = Arc::new(RecordingConnection::failing_writes());
        let mw = middleware(connection.clone());
        let action = Action::write_pv("pva://y", DType::from_double(2.0));
        assert_eq!(mw.handle(&CsState::default(), action.clone()), action);
    }

    #[test]
    fn cached_device_is_not_queried() {
        let connection = Arc::new(RecordingConnection::default());
        let mw = middleware(connection.clone());
        let mut state = CsState::default();
        state
            .device_cache
            .insert("dev://motor".into(), DType::from_string("{}"));

        mw.handle(&state, Action::query_device("dev://motor"));
        assert!(connection.calls().is_empty());

        mw.handle(&state, Action::query_device("dev://slit"));
        assert_eq!(connection.calls(), vec!["device dev://slit"]);
    }

    #[test]
    fn connect_is_idempotent() {
        let connection = Arc::new(RecordingConnection::default());
        let mw = middleware(connection.clone());
        mw.connect();
        mw.connect();
        assert_eq!(connection.calls(), vec!["connect"]);
    }
}
