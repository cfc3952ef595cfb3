//! The registry state and its reducer.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use super::actions::{Action, ValueChanged};
use crate::dtypes::DType;

/// Cached state of one effective PV.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PvState {
    pub value: Option<DType>,
    pub connected: bool,
    pub readonly: bool,
    /// The name the entry was first created under.
    pub initializing_pv_name: String,
}

impl PvState {
    fn new(pv_name: &str) -> Self {
        Self {
            initializing_pv_name: pv_name.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsState {
    /// Effective name → cached state. Entries are never evicted.
    pub value_cache: HashMap<String, PvState>,
    /// Raw name → effective name, only where they differ.
    pub effective_pv_name_map: HashMap<String, String>,
    /// Effective name → subscribed component ids, without duplicates.
    pub subscriptions: HashMap<String, Vec<String>>,
    pub device_cache: HashMap<String, DType>,
    pub file_cache: HashMap<String, Value>,
}

impl CsState {
    /// The name events for `pv_name` are reported under.
    pub fn effective_name<'a>(&'a self, pv_name: &'a str) -> &'a str {
        self.effective_pv_name_map
            .get(pv_name)
            .map_or(pv_name, String::as_str)
    }

    pub fn subscriber_count(&self, effective_pv_name: &str) -> usize {
        self.subscriptions.get(effective_pv_name).map_or(0, Vec::len)
    }

    pub fn reduce(&mut self, action: Action) {
        match action {
            Action::ValueChanged(update) => self.update_value_cache(update),
            Action::ValuesChanged(updates) => {
                for update in updates {
                    self.update_value_cache(update);
                }
            }
            Action::ConnectionChanged { pv_name, value } => {
                let entry = self
                    .value_cache
                    .entry(pv_name)
                    .or_insert_with_key(|name| PvState::new(name));
                entry.connected = value.is_connected;
                entry.readonly = value.is_readonly;
            }
            Action::Subscribe {
                component_id,
                pv_name,
                effective_pv_name,
                ..
            } => {
                let effective = effective_pv_name.unwrap_or_else(|| pv_name.clone());
                let components = self.subscriptions.entry(effective.clone()).or_default();
                if !components.contains(&component_id) {
                    components.push(component_id);
                }
                if effective != pv_name {
                    self.effective_pv_name_map.insert(pv_name, effective);
                }
            }
            Action::Unsubscribe {
                component_id,
                pv_name,
            } => {
                let effective = self.effective_name(&pv_name).to_string();
                let now_empty = match self.subscriptions.get_mut(&effective) {
                    Some(components) => {
                        components.retain(|c| *c != component_id);
                        components.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    self.subscriptions.remove(&effective);
                    self.effective_pv_name_map.retain(|_, e| *e != effective);
                }
            }
            Action::DeviceQueried { device, value } => {
                self.device_cache.insert(device, value);
            }
            Action::RefreshDevice { device } => {
                self.device_cache.remove(&device);
            }
            Action::FileChanged { file, contents } => {
                self.file_cache.insert(file, contents);
            }
            Action::RefreshFile { file } => {
                self.file_cache.remove(&file);
            }
            Action::WritePv { .. } | Action::QueryDevice { .. } => {}
        }
    }

    fn update_value_cache(&mut self, update: ValueChanged) {
        let entry = self
            .value_cache
            .entry(update.pv_name)
            .or_insert_with_key(|name| PvState::new(name));
        entry.value = Some(DType::merge(entry.value.as_ref(), update.value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use crate::dtypes::{AlarmQuality, DAlarm};

    #[test]
    fn batch_applies_in_order() {
        let mut state = CsState::default();
        state.reduce(Action::ValuesChanged(vec![
            ValueChanged {
                pv_name: "A".into(),
                value: DType::from_double(1.0),
            },
            ValueChanged {
                pv_name: "A".into(),
                value: DType::from_double(2.0),
            },
        ]));
        let a = &state.value_cache["A"];
        assert_eq!(a.value.as_ref().and_then(DType::get_double_value), Some(2.0));
    }

    #[test]
    fn batch_merges_partial_updates() {
        let mut state = CsState::default();
        state.reduce(Action::ValuesChanged(vec![
            ValueChanged {
                pv_name: "A".into(),
                value: DType::from_double(1.0),
            },
            ValueChanged {
                pv_name: "A".into(),
                value: DType::default().with_alarm(DAlarm::major()).into_partial(),
            },
        ]));
        let value = state.value_cache["A"].value.clone().unwrap();
        assert_eq!(value.get_double_value(), Some(1.0));
        assert_eq!(value.get_alarm().quality, AlarmQuality::Alarm);
    }

    #[test]
    fn connection_event_creates_default_entry() {
        let mut state = CsState::default();
        state.reduce(Action::connection_changed("pv", ConnectionState::new(true, false)));
        assert_eq!(
            state.value_cache["pv"],
            PvState {
                value: None,
                connected: true,
                readonly: false,
                initializing_pv_name: "pv".into(),
            }
        );
    }

    #[test]
    fn subscribe_records_alias_and_deduplicates() {
        let mut state = CsState::default();
        for _ in 0..2 {
            state.reduce(Action::Subscribe {
                component_id: "w1".into(),
                pv_name: "loc://x(1)".into(),
                effective_pv_name: Some("loc://x".into()),
                sub_type: None,
            });
        }
        assert_eq!(state.subscriptions["loc://x"], vec!["w1".to_string()]);
        assert_eq!(state.effective_name("loc://x(1)"), "loc://x");
        assert_eq!(state.effective_name("other"), "other");
    }

    #[test]
    fn last_unsubscribe_drops_aliases_but_keeps_cache() {
        let mut state = CsState::default();
        state.reduce(Action::Subscribe {
            component_id: "w1".into(),
            pv_name: "raw".into(),
            effective_pv_name: Some("eff".into()),
            sub_type: None,
        });
        state.reduce(Action::value_changed("eff", DType::from_double(1.0)));
        state.reduce(Action::unsubscribe("w1", "raw"));

        assert!(state.subscriptions.is_empty());
        assert!(state.effective_pv_name_map.is_empty());
        assert!(state.value_cache.contains_key("eff"));
    }

    #[test]
    fn device_and_file_caches_refresh() {
        let mut state = CsState::default();
        state.reduce(Action::DeviceQueried {
            device: "dev://motor".into(),
            value: DType::from_string("{}"),
        });
        state.reduce(Action::FileChanged {
            file: "/opi/main.json".into(),
            contents: serde_json::json!({"type": "display"}),
        });
        assert!(state.device_cache.contains_key("dev://motor"));
        assert_eq!(state.file_cache["/opi/main.json"]["type"], "display");

        state.reduce(Action::RefreshDevice {
            device: "dev://motor".into(),
        });
        state.reduce(Action::RefreshFile {
            file: "/opi/main.json".into(),
        });
        assert!(state.device_cache.is_empty());
        assert!(state.file_cache.is_empty());
    }
}
