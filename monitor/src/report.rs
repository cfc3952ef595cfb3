//! Formatting of PV state for the terminal.

use lib_pvcore::store::PvArrayResults;
use lib_pvcore::{DType, PvState};

/// Parses a `--write` argument of the form `pv=value`.
pub fn parse_write(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((pv, value)) if !pv.trim().is_empty() => {
            Ok((pv.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected pv=value, got '{arg}'")),
    }
}

/// Numbers are written as doubles, anything else as a string.
pub fn parse_value(text: &str) -> DType {
    match text.trim().parse::<f64>() {
        Ok(number) => DType::from_double(number),
        Err(_) => DType::from_string(text),
    }
}

pub fn format_line(pv: &str, state: Option<&PvState>, effective: &str) -> String {
    let name = if pv == effective {
        pv.to_string()
    } else {
        format!("{pv} ({effective})")
    };

    let Some(state) = state else {
        return format!("{name}: <no data>");
    };

    let value = match &state.value {
        Some(value) => {
            let mut text = value.coerce_string();
            if let Some(units) = value.get_display().units.as_deref().filter(|u| !u.is_empty()) {
                text.push(' ');
                text.push_str(units);
            }
            format!("{text} [{}]", value.get_alarm().quality)
        }
        None => "<no value>".to_string(),
    };

    let connection = if state.connected { "connected" } else { "disconnected" };
    let access = if state.readonly { "readonly" } else { "writable" };
    format!("{name}: {value} ({connection}, {access})")
}

/// Lines for every PV in `pvs` whose entry differs between the two results,
/// in the order the PVs were requested.
pub fn changed_lines(pvs: &[String], before: &PvArrayResults, after: &PvArrayResults) -> Vec<String> {
    pvs.iter()
        .filter_map(|pv| {
            let (state, effective) = after.get(pv)?;
            if before.get(pv) == Some(&(state.clone(), effective.clone())) {
                return None;
            }
            Some(format_line(pv, state.as_ref(), effective))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_pvcore::{DAlarm, DDisplay};

    fn state(value: Option<DType>, connected: bool, readonly: bool) -> PvState {
        PvState {
            value,
            connected,
            readonly,
            ..Default::default()
        }
    }

    #[test]
    fn write_arguments() {
        assert_eq!(parse_write("loc://x=5"), Ok(("loc://x".into(), "5".into())));
        assert_eq!(parse_write("loc://s=a=b"), Ok(("loc://s".into(), "a=b".into())));
        assert!(parse_write("=5").is_err());
        assert!(parse_write("loc://x").is_err());

        assert_eq!(parse_value(" 2.5 ").get_double_value(), Some(2.5));
        assert_eq!(parse_value("open").get_string_value().as_deref(), Some("open"));
    }

    #[test]
    fn formats_value_alarm_and_access() {
        let value = DType::from_double(1.5)
            .with_alarm(DAlarm::minor())
            .with_display(DDisplay {
                units: Some("mm".into()),
                ..Default::default()
            });
        let line = format_line("sim://sine", Some(&state(Some(value), true, true)), "sim://sine");
        assert_eq!(line, "sim://sine: 1.5 mm [WARNING] (connected, readonly)");

        let line = format_line("loc://x(1)", Some(&state(None, false, false)), "loc://x");
        assert_eq!(line, "loc://x(1) (loc://x): <no value> (disconnected, writable)");

        assert_eq!(format_line("pva://A", None, "pva://A"), "pva://A: <no data>");
    }

    #[test]
    fn only_changed_entries_are_reported() {
        let pvs = vec!["a".to_string(), "b".to_string()];
        let mut before = PvArrayResults::new();
        before.insert("a".into(), (None, "a".into()));
        before.insert("b".into(), (None, "b".into()));

        let mut after = before.clone();
        after.insert(
            "b".into(),
            (Some(state(Some(DType::from_string("on")), true, false)), "b".into()),
        );

        let lines = changed_lines(&pvs, &before, &after);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("b: on"));
    }
}
