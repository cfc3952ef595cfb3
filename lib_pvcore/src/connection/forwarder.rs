use std::sync::Arc;

use super::{Connection, ConnectionCallbacks, ConnectionError, SubscriptionType};
use crate::dtypes::DType;

/// Dispatches each PV name to the first transport whose prefix matches.
///
/// Order matters: register more specific prefixes before general ones. The
/// same transport may appear under several prefixes; it is still connected
/// only once.
pub struct ConnectionForwarder {
    prefix_connections: Vec<(String, Arc<dyn Connection>)>,
}

impl ConnectionForwarder {
    pub fn new(prefix_connections: Vec<(String, Arc<dyn Connection>)>) -> Self {
        Self { prefix_connections }
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.prefix_connections.iter().map(|(p, _)| p.as_str())
    }

    fn route(&self, pv_name: &str) -> Result<&Arc<dyn Connection>, ConnectionError> {
        self.prefix_connections
            .iter()
            .find(|(prefix, _)| pv_name.starts_with(prefix.as_str()))
            .map(|(_, connection)| connection)
            .ok_or_else(|| ConnectionError::NoMatchingConnection(pv_name.to_string()))
    }

    /// Each distinct transport, in registration order.
    fn distinct(&self) -> Vec<&Arc<dyn Connection>> {
        let mut seen: Vec<&Arc<dyn Connection>> = Vec::new();
        for (_, connection) in &self.prefix_connections {
            if !seen.iter().any(|c| Arc::ptr_eq(c, connection)) {
                seen.push(connection);
            }
        }
        seen
    }
}

impl Connection for ConnectionForwarder {
    fn connect(&self, callbacks: Arc<dyn ConnectionCallbacks>) -> Result<(), ConnectionError> {
        for connection in self.distinct() {
            connection.connect(Arc::clone(&callbacks))?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.distinct().iter().all(|c| c.is_connected())
    }

    fn subscribe(
        &self,
        pv_name: &str,
        sub_type: Option<SubscriptionType>,
    ) -> Result<String, ConnectionError> {
        self.route(pv_name)?.subscribe(pv_name, sub_type)
    }

    fn unsubscribe(&self, pv_name: &str) -> Result<(), ConnectionError> {
        self.route(pv_name)?.unsubscribe(pv_name)
    }

    fn put_pv(&self, pv_name: &str, value: &DType) -> Result<(), ConnectionError> {
        self.route(pv_name)?.put_pv(pv_name, value)
    }

    fn get_device(&self, device: &str) -> Result<(), ConnectionError> {
        self.route(device)?.get_device(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{NullCallbacks, RecordingConnection};

    fn forwarder() -> (ConnectionForwarder, Arc<RecordingConnection>, Arc<RecordingConnection>) {
        let pva = Arc::new(RecordingConnection::default());
        let sim = Arc::new(RecordingConnection::default());
        let forwarder = ConnectionForwarder::new(vec![
            ("pva://".to_string(), pva.clone() as Arc<dyn Connection>),
            ("sim://".to_string(), sim.clone() as Arc<dyn Connection>),
        ]);
        (forwarder, pva, sim)
    }

    #[test]
    fn first_matching_prefix_wins() {
        let (forwarder, pva, sim) = forwarder();
        forwarder.subscribe("pva://X", None).unwrap();
        forwarder.put_pv("pva://X", &DType::from_double(1.0)).unwrap();

        assert_eq!(pva.calls(), vec!["subscribe pva://X", "put pva://X"]);
        assert!(sim.calls().is_empty());
    }

    #[test]
    fn unmatched_name_is_a_routing_error() {
        let (forwarder, _, _) = forwarder();
        let err = forwarder.subscribe("ca://NOPE", None).unwrap_err();
        assert_eq!(err, ConnectionError::NoMatchingConnection("ca://NOPE".to_string()));
        assert!(err.to_string().contains("ca://NOPE"));
    }

    #[test]
    fn shared_transport_is_connected_once() {
        let shared = Arc::new(RecordingConnection::default());
        let forwarder = ConnectionForwarder::new(vec![
            ("ca://".to_string(), shared.clone() as Arc<dyn Connection>),
            ("pva://".to_string(), shared.clone() as Arc<dyn Connection>),
        ]);

        assert!(!forwarder.is_connected());
        forwarder.connect(Arc::new(NullCallbacks)).unwrap();
        assert!(forwarder.is_connected());
        assert_eq!(shared.calls(), vec!["connect"]);
    }

    #[test]
    fn connected_only_when_every_transport_is() {
        let (forwarder, pva, _) = forwarder();
        pva.connect(Arc::new(NullCallbacks)).unwrap();
        assert!(!forwarder.is_connected());
    }
}
