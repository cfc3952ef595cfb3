use serde::{Deserialize, Serialize};

/// Fixed-width numeric array as delivered by a transport. The element type is
/// preserved so that consumers can tell a byte buffer from a waveform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "numberType", content = "values", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NumberArray {
    Int8(Vec<i8>),
    Uint8(Vec<u8>),
    Int16(Vec<i16>),
    Uint16(Vec<u16>),
    Int32(Vec<i32>),
    Uint32(Vec<u32>),
    Int64(Vec<i64>),
    Uint64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

macro_rules! for_each_array {
    ($self:expr, $v:ident => $body:expr) => {
        match $self {
            NumberArray::Int8($v) => $body,
            NumberArray::Uint8($v) => $body,
            NumberArray::Int16($v) => $body,
            NumberArray::Uint16($v) => $body,
            NumberArray::Int32($v) => $body,
            NumberArray::Uint32($v) => $body,
            NumberArray::Int64($v) => $body,
            NumberArray::Uint64($v) => $body,
            NumberArray::Float32($v) => $body,
            NumberArray::Float64($v) => $body,
        }
    };
}

impl NumberArray {
    pub fn len(&self) -> usize {
        for_each_array!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widens every element to `f64`. 64-bit integers beyond 2^53 lose precision.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        for_each_array!(self, v => v.iter().map(|x| *x as f64).collect())
    }

    /// Elements formatted as numbers and joined with `,`.
    pub fn join(&self) -> String {
        match self {
            NumberArray::Float32(v) => v
                .iter()
                .map(|x| format_number(f64::from(*x)))
                .collect::<Vec<_>>()
                .join(","),
            NumberArray::Float64(v) => v
                .iter()
                .map(|x| format_number(*x))
                .collect::<Vec<_>>()
                .join(","),
            other => for_each_array!(other, v => v
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<_>>()
                .join(",")),
        }
    }
}

impl From<Vec<f64>> for NumberArray {
    fn from(values: Vec<f64>) -> Self {
        NumberArray::Float64(values)
    }
}

/// Formats a double the way display strings expect: integral values without
/// a fractional part, `NaN` and `Infinity` spelled out.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        value.to_string()
    }
}

/// The payload part of a [`DType`](super::DType). Only the representations the
/// source actually supplied are populated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DTypeValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub double_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_value: Option<NumberArray>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_array: Option<Vec<String>>,
}

impl DTypeValue {
    pub fn double(value: f64) -> Self {
        Self {
            double_value: Some(value),
            ..Default::default()
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self {
            string_value: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn array(value: NumberArray) -> Self {
        Self {
            array_value: Some(value),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.string_value.is_none()
            && self.double_value.is_none()
            && self.array_value.is_none()
            && self.string_array.is_none()
    }
}
