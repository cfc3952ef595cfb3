//! Simulator name grammar.
//!
//! `loc://name[<Type>](init, ...)` declares a local variable with an optional
//! type tag and a JSON initializer list. Everything else is
//! `sim://<generator>[(args)][#instance]`: the part before `#` selects the
//! generator and the full name identifies the instance.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::dtypes::{DAlarm, DDisplay, DTime, DType, DTypeValue, NumberArray};

pub const LOCAL_PROTOCOL: &str = "loc://";

/// A simulator name broken into its parts.
#[derive(Debug, Clone, PartialEq)]
pub struct NameInfo {
    /// Selects the generator: `loc://` or e.g. `sim://sine`.
    pub protocol: String,
    /// Identifies the instance. Different spellings of the same local
    /// variable share one key.
    pub key_name: String,
    pub initial_value: Option<DType>,
}

fn local_grammar() -> &'static Regex {
    static GRAMMAR: OnceLock<Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| {
        Regex::new(r"^loc://([^<(]*)(?:<([^>]*)>)?(?:\(([^)]*)\))?")
            .unwrap_or_else(|e| panic!("local PV grammar does not compile: {e}"))
    })
}

pub fn parse_name(pv_name: &str) -> NameInfo {
    if !pv_name.starts_with(LOCAL_PROTOCOL) {
        let protocol = pv_name.split('#').next().unwrap_or(pv_name);
        return NameInfo {
            protocol: protocol.to_string(),
            key_name: pv_name.to_string(),
            initial_value: None,
        };
    }

    let Some(groups) = local_grammar().captures(pv_name) else {
        return NameInfo {
            protocol: LOCAL_PROTOCOL.to_string(),
            key_name: pv_name.to_string(),
            initial_value: None,
        };
    };
    let key_name = format!("{LOCAL_PROTOCOL}{}", groups.get(1).map_or("", |m| m.as_str()));
    let type_name = groups.get(2).map(|m| m.as_str());
    let initial_value = groups
        .get(3)
        .and_then(|init| initial_value(pv_name, type_name, init.as_str()));

    NameInfo {
        protocol: LOCAL_PROTOCOL.to_string(),
        key_name,
        initial_value,
    }
}

fn initial_value(pv_name: &str, type_name: Option<&str>, init: &str) -> Option<DType> {
    let items: Vec<Value> = match serde_json::from_str(&format!("[{init}]")) {
        Ok(items) => items,
        Err(e) => {
            log::warn!("Ignoring initializer of {pv_name}: {e}");
            return None;
        }
    };

    if type_name == Some("VEnum") {
        // First element is the 1-based selected index, the rest are labels.
        let index = items.first().and_then(Value::as_f64).unwrap_or(1.0) - 1.0;
        let choices = items.iter().skip(1).map(json_label).collect();
        return Some(
            DType::from_double(index)
                .with_alarm(DAlarm::none())
                .with_time(DTime::now())
                .with_display(DDisplay {
                    choices: Some(choices),
                    ..Default::default()
                }),
        );
    }

    match items.as_slice() {
        [] => None,
        [single] => Some(scalar(single)),
        many => {
            let numbers: Option<Vec<f64>> = many.iter().map(Value::as_f64).collect();
            Some(match numbers {
                Some(numbers) => DType::from_array(NumberArray::Float64(numbers)),
                None => DType::new(DTypeValue {
                    string_array: Some(many.iter().map(json_label).collect()),
                    ..Default::default()
                }),
            })
        }
    }
}

fn scalar(item: &Value) -> DType {
    match item {
        Value::Number(n) => DType::from_double(n.as_f64().unwrap_or(f64::NAN)),
        Value::Bool(b) => DType::from_double(f64::from(u8::from(*b))),
        Value::String(s) => DType::from_string(s.clone()),
        other => DType::from_string(other.to_string()),
    }
}

fn json_label(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
