//! JSON frames exchanged with the PVWS gateway.
//!
//! Inbound text is decoded once into [`ServerMessage`]; anything that does
//! not parse is reported as a [`WireError`] and the frame is dropped by the
//! session. Arrays arrive base64 encoded, little-endian, with the element
//! type given by the field name.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::dtypes::{
    format_number, AlarmQuality, DAlarm, DDisplay, DRange, DTime, DType, DTypeValue, NumberArray,
};

#[derive(Debug, Error)]
pub enum WireError {
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bad base64 payload in {field}: {source}")]
    Base64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("{field} holds {len} bytes, not a multiple of {width}")]
    ArrayLength {
        field: &'static str,
        len: usize,
        width: usize,
    },
}

/// Frames sent to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe { pvs: Vec<String> },
    Clear { pvs: Vec<String> },
    Write { pv: String, value: WriteValue },
}

impl ClientMessage {
    pub fn subscribe(pv: &str) -> Self {
        ClientMessage::Subscribe {
            pvs: vec![pv.to_string()],
        }
    }

    pub fn clear(pv: &str) -> Self {
        ClientMessage::Clear {
            pvs: vec![pv.to_string()],
        }
    }

    /// A write frame carrying the string form when there is one, the double
    /// otherwise. `None` when the value has neither.
    pub fn write(pv: &str, value: &DType) -> Option<Self> {
        let value = match (&value.value.string_value, value.value.double_value) {
            (Some(s), _) => WriteValue::Text(s.clone()),
            (None, Some(d)) => WriteValue::Number(d),
            (None, None) => return None,
        };
        Some(ClientMessage::Write {
            pv: pv.to_string(),
            value,
        })
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WriteValue {
    Text(String),
    Number(f64),
}

/// Frames received from the gateway. Only updates carry data for us.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Update(PvUpdate),
    #[serde(other)]
    Other,
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireScalar {
    Number(f64),
    Bool(bool),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PvUpdate {
    pub pv: String,
    pub value: Option<WireScalar>,
    pub text: Option<String>,
    pub b64dbl: Option<String>,
    pub b64flt: Option<String>,
    pub b64int: Option<String>,
    pub b64srt: Option<String>,
    pub b64byt: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub seconds: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub nanos: Option<f64>,
    pub severity: Option<String>,
    pub readonly: Option<bool>,
    pub units: Option<String>,
    pub precision: Option<i32>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub alarm_low: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub alarm_high: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub warn_low: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub warn_high: Option<f64>,
    pub labels: Option<Vec<String>>,
}

/// Numbers may arrive as JSON numbers or as strings (`"NaN"`, `"Infinity"`).
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Lenient>::deserialize(deserializer)? {
        Some(Lenient::Number(n)) => Some(n),
        Some(Lenient::Text(s)) => s.trim().parse::<f64>().ok(),
        None => None,
    })
}

impl PvUpdate {
    /// Converts the update into a partial [`DType`]. Fields absent on the wire
    /// stay absent so the cached value keeps them.
    pub fn to_dtype(&self) -> Result<DType, WireError> {
        let alarm = self.severity.as_deref().map(|severity| match severity {
            "MAJOR" => DAlarm::new(AlarmQuality::Alarm, ""),
            "MINOR" => DAlarm::new(AlarmQuality::Warning, ""),
            _ => DAlarm::new(AlarmQuality::Valid, ""),
        });

        let display = DDisplay {
            alarm_range: range(self.alarm_low, self.alarm_high),
            warning_range: range(self.warn_low, self.warn_high),
            units: self.units.clone(),
            precision: self.precision,
            choices: self.labels.clone(),
            ..Default::default()
        };

        let time = self.seconds.and_then(|seconds| match self.nanos {
            Some(nanos) if seconds.fract() == 0.0 && (0.0..1e9).contains(&nanos) => {
                DTime::from_seconds_nanos(seconds as i64, nanos as u32)
            }
            _ => DTime::from_unix_seconds(seconds),
        });

        let (mut string_value, double_value) = match &self.value {
            Some(WireScalar::Number(n)) => (Some(format_number(*n)), Some(*n)),
            Some(WireScalar::Bool(b)) => (Some(b.to_string()), Some(f64::from(u8::from(*b)))),
            Some(WireScalar::Text(s)) => (Some(s.clone()), None),
            None => (None, None),
        };
        if let Some(text) = &self.text {
            string_value = Some(text.clone());
        }

        Ok(DType {
            value: DTypeValue {
                string_value,
                double_value,
                array_value: self.array()?,
                string_array: None,
            },
            alarm,
            time,
            display,
            partial: true,
        })
    }

    fn array(&self) -> Result<Option<NumberArray>, WireError> {
        if let Some(b64) = &self.b64dbl {
            let bytes = decode_base64("b64dbl", b64)?;
            return Ok(Some(NumberArray::Float64(le_values("b64dbl", &bytes, f64::from_le_bytes)?)));
        }
        if let Some(b64) = &self.b64flt {
            let bytes = decode_base64("b64flt", b64)?;
            return Ok(Some(NumberArray::Float32(le_values("b64flt", &bytes, f32::from_le_bytes)?)));
        }
        if let Some(b64) = &self.b64int {
            let bytes = decode_base64("b64int", b64)?;
            return Ok(Some(NumberArray::Int32(le_values("b64int", &bytes, i32::from_le_bytes)?)));
        }
        if let Some(b64) = &self.b64srt {
            let bytes = decode_base64("b64srt", b64)?;
            return Ok(Some(NumberArray::Int16(le_values("b64srt", &bytes, i16::from_le_bytes)?)));
        }
        if let Some(b64) = &self.b64byt {
            let bytes = decode_base64("b64byt", b64)?;
            return Ok(Some(NumberArray::Int8(le_values("b64byt", &bytes, i8::from_le_bytes)?)));
        }
        Ok(None)
    }
}

fn range(low: Option<f64>, high: Option<f64>) -> Option<DRange> {
    Some(DRange::new(low?, high?))
}

fn decode_base64(field: &'static str, b64: &str) -> Result<Vec<u8>, WireError> {
    general_purpose::STANDARD
        .decode(b64)
        .map_err(|source| WireError::Base64 { field, source })
}

fn le_values<T, const N: usize>(
    field: &'static str,
    bytes: &[u8],
    convert: fn([u8; N]) -> T,
) -> Result<Vec<T>, WireError> {
    if bytes.len() % N != 0 {
        return Err(WireError::ArrayLength {
            field,
            len: bytes.len(),
            width: N,
        });
    }
    Ok(bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut buf = [0u8; N];
            buf.copy_from_slice(chunk);
            convert(buf)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(json: &str) -> PvUpdate {
        match ServerMessage::parse(json).unwrap() {
            ServerMessage::Update(u) => u,
            ServerMessage::Other => panic!("not an update: {json}"),
        }
    }

    #[test]
    fn decodes_int32_array() {
        let dtype = update(r#"{"type":"update","pv":"hello","b64int":"AAAAAAEAAAACAAAA"}"#)
            .to_dtype()
            .unwrap();
        assert_eq!(dtype.value.array_value, Some(NumberArray::Int32(vec![0, 1, 2])));
        assert!(dtype.partial);
    }

    #[test]
    fn decodes_float64_array() {
        let b64 = general_purpose::STANDARD.encode(
            [1.5f64, -2.0]
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect::<Vec<u8>>(),
        );
        let json = format!(r#"{{"type":"update","pv":"wave","b64dbl":"{b64}"}}"#);
        let dtype = update(&json).to_dtype().unwrap();
        assert_eq!(dtype.value.array_value, Some(NumberArray::Float64(vec![1.5, -2.0])));
    }

    #[test]
    fn rejects_truncated_array() {
        let one = update(r#"{"type":"update","pv":"x","b64int":"AQAAAA=="}"#)
            .to_dtype()
            .unwrap();
        assert_eq!(one.value.array_value, Some(NumberArray::Int32(vec![1])));

        let err = update(r#"{"type":"update","pv":"x","b64int":"AAAAAAA="}"#)
            .to_dtype()
            .unwrap_err();
        assert!(matches!(err, WireError::ArrayLength { len: 5, width: 4, .. }));
    }

    #[test]
    fn numeric_value_sets_string_and_double() {
        let dtype = update(r#"{"type":"update","pv":"hello","value":42}"#)
            .to_dtype()
            .unwrap();
        assert_eq!(dtype.value.double_value, Some(42.0));
        assert_eq!(dtype.value.string_value.as_deref(), Some("42"));
        assert!(dtype.alarm.is_none());
        assert!(dtype.time.is_none());
    }

    #[test]
    fn enum_text_overrides_string() {
        let dtype = update(
            r#"{"type":"update","pv":"mode","value":1,"text":"On","labels":["Off","On"]}"#,
        )
        .to_dtype()
        .unwrap();
        assert_eq!(dtype.value.string_value.as_deref(), Some("On"));
        assert_eq!(dtype.display.choices, Some(vec!["Off".to_string(), "On".to_string()]));
    }

    #[test]
    fn maps_severity_and_metadata() {
        let dtype = update(
            r#"{"type":"update","pv":"t","severity":"MAJOR","units":"mA","precision":3,
                "alarm_low":"NaN","alarm_high":10,"warn_low":1,"warn_high":9}"#,
        )
        .to_dtype()
        .unwrap();
        assert_eq!(dtype.get_alarm().quality, AlarmQuality::Alarm);
        assert_eq!(dtype.display.units.as_deref(), Some("mA"));
        assert_eq!(dtype.display.precision, Some(3));
        assert_eq!(dtype.display.warning_range, Some(DRange::new(1.0, 9.0)));
        let alarm_range = dtype.display.alarm_range.unwrap();
        assert!(alarm_range.min.is_nan());
        assert_eq!(alarm_range.max, 10.0);

        let minor = update(r#"{"type":"update","pv":"t","severity":"MINOR"}"#);
        assert_eq!(minor.to_dtype().unwrap().get_alarm().quality, AlarmQuality::Warning);
        let none = update(r#"{"type":"update","pv":"t","severity":"NONE"}"#);
        assert_eq!(none.to_dtype().unwrap().get_alarm().quality, AlarmQuality::Valid);
    }

    #[test]
    fn seconds_become_timestamp() {
        let dtype = update(r#"{"type":"update","pv":"hello","seconds":1483272000}"#)
            .to_dtype()
            .unwrap();
        assert_eq!(dtype.time.unwrap().to_iso_string(), "2017-01-01T12:00:00.000Z");

        let precise = update(r#"{"type":"update","pv":"hello","seconds":1483272000,"nanos":250000000}"#)
            .to_dtype()
            .unwrap();
        assert_eq!(precise.time.unwrap().to_iso_string(), "2017-01-01T12:00:00.250Z");
    }

    #[test]
    fn ignores_other_frame_types() {
        assert_eq!(ServerMessage::parse(r#"{"type":"ping"}"#).unwrap(), ServerMessage::Other);
        assert!(ServerMessage::parse("not json").is_err());
        assert!(ServerMessage::parse(r#"{"type":"update"}"#).is_err());
    }

    #[test]
    fn encodes_outbound_frames() {
        assert_eq!(
            ClientMessage::subscribe("pva://a").to_json().unwrap(),
            r#"{"type":"subscribe","pvs":["pva://a"]}"#
        );
        assert_eq!(
            ClientMessage::clear("pva://a").to_json().unwrap(),
            r#"{"type":"clear","pvs":["pva://a"]}"#
        );

        let both = DType::new(DTypeValue {
            string_value: Some("on".into()),
            double_value: Some(1.0),
            ..Default::default()
        });
        assert_eq!(
            ClientMessage::write("pv", &both).unwrap().to_json().unwrap(),
            r#"{"type":"write","pv":"pv","value":"on"}"#
        );
        assert_eq!(
            ClientMessage::write("pv", &DType::from_double(2.5)).unwrap().to_json().unwrap(),
            r#"{"type":"write","pv":"pv","value":2.5}"#
        );
        assert!(ClientMessage::write("pv", &DType::default()).is_none());
    }
}
