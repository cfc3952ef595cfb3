//! # Value Model
//!
//! Typed representation of a process variable reading, shared by every
//! transport and by the store. See [`DType`] for the merge rules that let
//! partial updates be folded onto cached values.

/// Alarm quality and message.
pub mod alarm;
/// Units, ranges and enum labels.
pub mod display;
/// The value snapshot and its merge/coercion rules.
pub mod dtype;
/// Serializable timestamps.
pub mod time;
/// Scalar/array payloads.
pub mod value;

pub use alarm::{AlarmQuality, DAlarm};
pub use display::{ChannelRole, DDisplay, DRange, DisplayForm};
pub use dtype::{byte_array_to_string, DType};
pub use time::DTime;
pub use value::{format_number, DTypeValue, NumberArray};
