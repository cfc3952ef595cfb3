//! # DType
//!
//! A snapshot of one channel: value, alarm, timestamp and display metadata.
//!
//! A `DType` is either authoritative (`partial == false`) and replaces whatever
//! was cached, or a delta (`partial == true`) that must be folded onto the
//! previous cached value with [`DType::merge`]. Transports that only send
//! changed fields, such as the PVWS gateway, always produce partial values.
//!
//! The accessor family (`get_*`, `coerce_*`) lets consumers read a value in the
//! representation they need without knowing what the source delivered.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::alarm::DAlarm;
use super::display::DDisplay;
use super::time::DTime;
use super::value::{format_number, DTypeValue, NumberArray};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DType {
    pub value: DTypeValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm: Option<DAlarm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DTime>,
    #[serde(default)]
    pub display: DDisplay,
    #[serde(default)]
    pub partial: bool,
}

impl DType {
    /// A complete (non-partial) value with no alarm, time or metadata.
    pub fn new(value: DTypeValue) -> Self {
        Self {
            value,
            ..Default::default()
        }
    }

    pub fn from_double(value: f64) -> Self {
        Self::new(DTypeValue::double(value))
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self::new(DTypeValue::string(value))
    }

    pub fn from_array(value: NumberArray) -> Self {
        Self::new(DTypeValue::array(value))
    }

    pub fn with_alarm(mut self, alarm: DAlarm) -> Self {
        self.alarm = Some(alarm);
        self
    }

    pub fn with_time(mut self, time: DTime) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_display(mut self, display: DDisplay) -> Self {
        self.display = display;
        self
    }

    /// Marks this value as a delta against the cached state.
    pub fn into_partial(mut self) -> Self {
        self.partial = true;
        self
    }

    /// Folds `update` onto `original`.
    ///
    /// A non-partial update is returned unchanged. A partial update takes each
    /// value field, the alarm, the time and every display field from `update`
    /// when present and from `original` otherwise. The result is complete.
    pub fn merge(original: Option<&DType>, update: DType) -> DType {
        if !update.partial {
            return update;
        }

        let DType {
            value,
            alarm,
            time,
            display,
            ..
        } = update;
        let prior = original.map(|o| &o.value);

        DType {
            value: DTypeValue {
                string_value: value
                    .string_value
                    .or_else(|| prior.and_then(|p| p.string_value.clone())),
                double_value: value.double_value.or_else(|| prior.and_then(|p| p.double_value)),
                array_value: value
                    .array_value
                    .or_else(|| prior.and_then(|p| p.array_value.clone())),
                string_array: value
                    .string_array
                    .or_else(|| prior.and_then(|p| p.string_array.clone())),
            },
            alarm: alarm.or_else(|| original.and_then(|o| o.alarm.clone())),
            time: time.or_else(|| original.and_then(|o| o.time)),
            display: DDisplay::merge(original.map(|o| &o.display), Some(&display)),
            partial: false,
        }
    }

    pub fn get_double_value(&self) -> Option<f64> {
        self.value.double_value
    }

    pub fn get_array_value(&self) -> Option<&NumberArray> {
        self.value.array_value.as_ref()
    }

    pub fn get_string_array_value(&self) -> Option<&[String]> {
        self.value.string_array.as_deref()
    }

    /// The string form: the string field, or for enum channels the choice
    /// label selected by the double value.
    pub fn get_string_value(&self) -> Option<String> {
        if let Some(s) = &self.value.string_value {
            return Some(s.clone());
        }
        let index = self.value.double_value?;
        let choices = self.display.choices.as_ref()?;
        if index < 0.0 || index.fract() != 0.0 {
            return None;
        }
        choices.get(index as usize).cloned()
    }

    /// Double, else a numeric parse of the string field, else `NaN`.
    pub fn coerce_double(&self) -> f64 {
        if let Some(d) = self.value.double_value {
            return d;
        }
        match &self.value.string_value {
            Some(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
            None => f64::NAN,
        }
    }

    /// String, else the formatted double, else the comma-joined array, else `""`.
    pub fn coerce_string(&self) -> String {
        if let Some(s) = self.get_string_value() {
            s
        } else if let Some(d) = self.value.double_value {
            format_number(d)
        } else if let Some(a) = &self.value.array_value {
            a.join()
        } else {
            String::new()
        }
    }

    /// Array, else a single-element array holding the double, else empty.
    pub fn coerce_array(&self) -> NumberArray {
        if let Some(a) = &self.value.array_value {
            a.clone()
        } else if let Some(d) = self.value.double_value {
            NumberArray::Float64(vec![d])
        } else {
            NumberArray::Float64(Vec::new())
        }
    }

    /// Alarm with an explicit default: absent means no alarm.
    pub fn get_alarm(&self) -> DAlarm {
        self.alarm.clone().unwrap_or_default()
    }

    pub fn get_time(&self) -> Option<DTime> {
        self.time
    }

    pub fn get_display(&self) -> &DDisplay {
        &self.display
    }
}

/// Accessors over an optional value, for callers reading a cache entry that
/// may not exist yet.
pub fn coerce_double(dtype: Option<&DType>) -> f64 {
    dtype.map_or(f64::NAN, DType::coerce_double)
}

pub fn coerce_string(dtype: Option<&DType>) -> String {
    dtype.map(DType::coerce_string).unwrap_or_default()
}

pub fn get_alarm(dtype: Option<&DType>) -> DAlarm {
    dtype.map(DType::get_alarm).unwrap_or_default()
}

/// Decodes a NUL-terminated character buffer (e.g. an EPICS `char[]` record)
/// into a string.
pub fn byte_array_to_string(array: &NumberArray) -> String {
    array
        .to_f64_vec()
        .into_iter()
        .take_while(|c| *c != 0.0)
        .filter_map(|c| char::from_u32(c as u32))
        .collect()
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DType: {}", self.coerce_string())
    }
}
