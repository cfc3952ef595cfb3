//! Read-side queries over [`CsState`].

use std::collections::HashMap;

use super::state::{CsState, PvState};
use crate::dtypes::DType;

/// Requested name → (cached state if any, effective name).
pub type PvArrayResults = HashMap<String, (Option<PvState>, String)>;

pub fn select_pv_state(state: &CsState, pv_name: &str) -> (Option<PvState>, String) {
    let effective = state.effective_name(pv_name);
    (state.value_cache.get(effective).cloned(), effective.to_string())
}

pub fn select_pv_states<S: AsRef<str>>(state: &CsState, pv_names: &[S]) -> PvArrayResults {
    pv_names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            (name.to_string(), select_pv_state(state, name))
        })
        .collect()
}

pub fn select_device(state: &CsState, device: &str) -> Option<DType> {
    state.device_cache.get(device).cloned()
}

/// `true` when a consumer holding `before` has nothing to redraw.
pub fn pv_state_comparator(before: &PvArrayResults, after: &PvArrayResults) -> bool {
    before.len() == after.len()
        && before.iter().all(|(name, (state, effective))| {
            after.get(name).is_some_and(|(other, other_effective)| {
                effective == other_effective
                    && match (state, other) {
                        (Some(a), Some(b)) => {
                            a.value == b.value && a.connected == b.connected && a.readonly == b.readonly
                        }
                        (None, None) => true,
                        _ => false,
                    }
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::actions::Action;

    fn state() -> CsState {
        let mut state = CsState::default();
        state.reduce(Action::Subscribe {
            component_id: "w1".into(),
            pv_name: "loc://x(1)".into(),
            effective_pv_name: Some("loc://x".into()),
            sub_type: None,
        });
        state.reduce(Action::value_changed("loc://x", DType::from_double(1.0)));
        state
    }

    #[test]
    fn resolves_aliases() {
        let results = select_pv_states(&state(), &["loc://x(1)", "pva://missing"]);
        let (cached, effective) = &results["loc://x(1)"];
        assert_eq!(effective, "loc://x");
        assert_eq!(
            cached.as_ref().and_then(|s| s.value.as_ref()).and_then(DType::get_double_value),
            Some(1.0)
        );
        assert_eq!(results["pva://missing"], (None, "pva://missing".to_string()));
    }

    #[test]
    fn comparator_detects_value_changes() {
        let mut s = state();
        let before = select_pv_states(&s, &["loc://x(1)"]);
        assert!(pv_state_comparator(&before, &select_pv_states(&s, &["loc://x(1)"])));

        s.reduce(Action::value_changed("loc://x", DType::from_double(2.0)));
        assert!(!pv_state_comparator(&before, &select_pv_states(&s, &["loc://x(1)"])));
    }

    #[test]
    fn device_lookup() {
        let mut s = CsState::default();
        assert_eq!(select_device(&s, "dev://a"), None);
        s.reduce(Action::DeviceQueried {
            device: "dev://a".into(),
            value: DType::from_string("{}"),
        });
        assert_eq!(select_device(&s, "dev://a"), Some(DType::from_string("{}")));
    }
}
