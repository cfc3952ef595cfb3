use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality of a PV reading as reported by its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmQuality {
    /// Reading is within normal limits.
    Valid,
    /// Minor alarm.
    Warning,
    /// Major alarm.
    Alarm,
    /// Reading cannot be trusted.
    Invalid,
    /// Source never produced a reading.
    Undefined,
    /// Value is in transition (e.g. a motor still moving).
    Changing,
}

impl fmt::Display for AlarmQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AlarmQuality::Valid => "VALID",
            AlarmQuality::Warning => "WARNING",
            AlarmQuality::Alarm => "ALARM",
            AlarmQuality::Invalid => "INVALID",
            AlarmQuality::Undefined => "UNDEFINED",
            AlarmQuality::Changing => "CHANGING",
        };
        f.write_str(label)
    }
}

/// Alarm state attached to a [`DType`](super::DType).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DAlarm {
    pub quality: AlarmQuality,
    pub message: String,
}

impl DAlarm {
    pub fn new(quality: AlarmQuality, message: impl Into<String>) -> Self {
        Self {
            quality,
            message: message.into(),
        }
    }

    /// No alarm.
    pub fn none() -> Self {
        Self::new(AlarmQuality::Valid, "")
    }

    pub fn minor() -> Self {
        Self::new(AlarmQuality::Warning, "")
    }

    pub fn major() -> Self {
        Self::new(AlarmQuality::Alarm, "")
    }
}

impl Default for DAlarm {
    fn default() -> Self {
        Self::none()
    }
}
