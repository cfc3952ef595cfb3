//! Display metadata carried alongside a PV value: units, ranges, enum labels.

use serde::{Deserialize, Serialize};

/// Access role of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelRole {
    RO,
    WO,
    RW,
}

/// Preferred rendering of a numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayForm {
    Default,
    String,
    Binary,
    Decimal,
    Hex,
    Exponential,
    Engineering,
}

/// Closed numeric interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DRange {
    pub min: f64,
    pub max: f64,
}

impl DRange {
    pub const NONE: DRange = DRange { min: 0.0, max: 0.0 };

    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Display metadata. Every field is optional; the default instance has all
/// fields absent and is what a [`DType`](super::DType) carries when its source
/// sent no metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DDisplay {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ChannelRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_range: Option<DRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_range: Option<DRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_range: Option<DRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<DisplayForm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

impl DDisplay {
    /// True when no field carries information.
    pub fn is_empty(&self) -> bool {
        *self == DDisplay::default()
    }

    /// Field-wise merge: each field of `update` wins when present, otherwise
    /// the field of `original` is kept.
    pub fn merge(original: Option<&DDisplay>, update: Option<&DDisplay>) -> DDisplay {
        fn pick<T: Clone>(update: Option<&T>, original: Option<&T>) -> Option<T> {
            update.or(original).cloned()
        }

        DDisplay {
            description: pick(
                update.and_then(|u| u.description.as_ref()),
                original.and_then(|o| o.description.as_ref()),
            ),
            role: pick(
                update.and_then(|u| u.role.as_ref()),
                original.and_then(|o| o.role.as_ref()),
            ),
            control_range: pick(
                update.and_then(|u| u.control_range.as_ref()),
                original.and_then(|o| o.control_range.as_ref()),
            ),
            alarm_range: pick(
                update.and_then(|u| u.alarm_range.as_ref()),
                original.and_then(|o| o.alarm_range.as_ref()),
            ),
            warning_range: pick(
                update.and_then(|u| u.warning_range.as_ref()),
                original.and_then(|o| o.warning_range.as_ref()),
            ),
            units: pick(
                update.and_then(|u| u.units.as_ref()),
                original.and_then(|o| o.units.as_ref()),
            ),
            precision: pick(
                update.and_then(|u| u.precision.as_ref()),
                original.and_then(|o| o.precision.as_ref()),
            ),
            form: pick(
                update.and_then(|u| u.form.as_ref()),
                original.and_then(|o| o.form.as_ref()),
            ),
            choices: pick(
                update.and_then(|u| u.choices.as_ref()),
                original.and_then(|o| o.choices.as_ref()),
            ),
        }
    }
}
