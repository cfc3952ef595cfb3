//! The simulated PV kinds.
//!
//! Each kind is a variant of [`SimKind`]; [`SimPv`] wraps one with its key and
//! subscription flag. Creating a generator yields an optional [`Schedule`]
//! describing what the owner's timer should do and how often. Nothing here
//! spawns tasks or talks to callbacks.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{Timelike, Utc};
use rand::Rng;

use super::name::{NameInfo, LOCAL_PROTOCOL};
use crate::connection::{ConnectionError, ConnectionState};
use crate::dtypes::{AlarmQuality, DAlarm, DDisplay, DTime, DType, DTypeValue, NumberArray};

pub const DEFAULT_UPDATE_RATE: Duration = Duration::from_millis(500);
pub const RAMP_UPDATE_RATE: Duration = Duration::from_millis(100);
const SINE_ARRAY_LENGTH: usize = 100;
const SIM_ENUM_CHOICES: [&str; 4] = ["one", "two", "three", "four"];

/// What a periodic timer does on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Publish the next value to subscribers.
    Value,
    /// Re-evaluate and publish the connection state.
    Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub every: Duration,
    pub tick: Tick,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimKind {
    /// `loc://` variable holding whatever was last written.
    Local { value: DType },
    /// `loc://name<VEnum>(...)`: index into a writable choice list.
    LocalEnum { value: DType },
    Sine,
    SineArray { history: VecDeque<f64> },
    /// 0..99 derived from the wall clock, with alarms near both ends.
    Ramp,
    Random,
    /// Random values and a connection that randomly comes and goes.
    Disconnector,
    /// Picks a random label every tick.
    SimEnum { value: DType },
    /// Writable value whose alarm follows fixed limits 10/20/80/90.
    Limit { value: DType },
    FlipFlop { high: bool },
}

impl SimKind {
    pub fn name(&self) -> &'static str {
        match self {
            SimKind::Local { .. } => "LocalPv",
            SimKind::LocalEnum { .. } => "EnumPv",
            SimKind::Sine => "SinePv",
            SimKind::SineArray { .. } => "SineArrayPv",
            SimKind::Ramp => "RampPv",
            SimKind::Random => "RandomPv",
            SimKind::Disconnector => "Disconnector",
            SimKind::SimEnum { .. } => "SimEnumPv",
            SimKind::Limit { .. } => "LimitData",
            SimKind::FlipFlop { .. } => "FlipFlopPv",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimPv {
    pub key: String,
    pub kind: SimKind,
    pub subscribed: bool,
}

impl SimPv {
    /// Builds the generator a parsed name asks for, or `None` when the name
    /// matches no known kind.
    pub fn create(info: &NameInfo) -> Option<(SimPv, Option<Schedule>)> {
        let value_every = |every| Some(Schedule { every, tick: Tick::Value });
        let protocol = info.protocol.as_str();

        let (kind, schedule) = if protocol == LOCAL_PROTOCOL {
            match &info.initial_value {
                Some(value) if value.display.choices.is_some() => (
                    SimKind::LocalEnum {
                        value: value.clone(),
                    },
                    value_every(DEFAULT_UPDATE_RATE),
                ),
                Some(value) => (
                    SimKind::Local {
                        value: value.clone(),
                    },
                    None,
                ),
                None => (
                    SimKind::Local {
                        value: DType::from_double(0.0),
                    },
                    None,
                ),
            }
        } else if protocol.starts_with("sim://flipflop") {
            (
                SimKind::FlipFlop { high: true },
                value_every(flipflop_period(protocol)),
            )
        } else {
            match protocol {
                "sim://disconnector" => (
                    SimKind::Disconnector,
                    Some(Schedule {
                        every: DEFAULT_UPDATE_RATE,
                        tick: Tick::Connection,
                    }),
                ),
                "sim://sine" => (SimKind::Sine, value_every(DEFAULT_UPDATE_RATE)),
                "sim://sinearray" => (
                    SimKind::SineArray {
                        history: VecDeque::with_capacity(SINE_ARRAY_LENGTH + 1),
                    },
                    value_every(DEFAULT_UPDATE_RATE),
                ),
                "sim://enum" => (
                    SimKind::SimEnum {
                        value: enum_value(0),
                    },
                    value_every(DEFAULT_UPDATE_RATE),
                ),
                "sim://random" => (SimKind::Random, value_every(DEFAULT_UPDATE_RATE)),
                "sim://limit" => (
                    SimKind::Limit {
                        value: DType::from_double(50.0),
                    },
                    None,
                ),
                "sim://ramp" => (SimKind::Ramp, value_every(RAMP_UPDATE_RATE)),
                _ => return None,
            }
        };

        Some((
            SimPv {
                key: info.key_name.clone(),
                kind,
                subscribed: false,
            },
            schedule,
        ))
    }

    pub fn connection(&self) -> ConnectionState {
        match self.kind {
            SimKind::Local { .. } | SimKind::LocalEnum { .. } | SimKind::Limit { .. } => {
                ConnectionState::new(true, false)
            }
            SimKind::Disconnector => ConnectionState::new(rand::random::<bool>(), true),
            _ => ConnectionState::new(true, true),
        }
    }

    /// The current value. Generators advance their state on every call.
    pub fn next_value(&mut self) -> DType {
        match &mut self.kind {
            SimKind::Local { value }
            | SimKind::LocalEnum { value }
            | SimKind::Limit { value } => value.clone(),
            SimKind::Sine => {
                let now = Utc::now();
                let phase = f64::from(now.second()) + f64::from(now.timestamp_subsec_millis()) * 0.001;
                DType::from_double(phase.sin()).with_display(DDisplay {
                    units: Some("yoonits!".to_string()),
                    ..Default::default()
                })
            }
            SimKind::SineArray { history } => {
                history.push_back((Utc::now().timestamp_millis() as f64 * 0.001).sin());
                while history.len() > SINE_ARRAY_LENGTH {
                    history.pop_front();
                }
                DType::from_array(NumberArray::Float64(history.iter().copied().collect()))
            }
            SimKind::Ramp => {
                let now = Utc::now();
                let value = f64::from((now.second() % 10) * 10 + now.timestamp_subsec_millis() / 100);
                DType::from_double(value).with_alarm(ramp_alarm(value))
            }
            SimKind::Random | SimKind::Disconnector => DType::from_double(rand::random::<f64>()),
            SimKind::SimEnum { value } => {
                let index = rand::rng().random_range(0..SIM_ENUM_CHOICES.len());
                *value = enum_value(index);
                value.clone()
            }
            SimKind::FlipFlop { high } => {
                *high = !*high;
                DType::from_double(if *high { 1.0 } else { 0.0 })
            }
        }
    }

    /// Applies a write. Returns whether subscribers should see the change.
    pub fn update_value(&mut self, update: &DType) -> Result<bool, ConnectionError> {
        match &mut self.kind {
            SimKind::Local { value } => {
                *value = update.clone();
                Ok(true)
            }
            SimKind::LocalEnum { value } => {
                update_enum(value, update);
                Ok(true)
            }
            SimKind::Limit { value } => {
                let v = update.coerce_double();
                if v.is_nan() {
                    log::warn!("Ignoring non-numeric write to {}", self.key);
                    return Ok(false);
                }
                *value = DType::from_double(v)
                    .with_alarm(DAlarm::new(limit_quality(v), ""))
                    .with_time(DTime::now());
                Ok(true)
            }
            other => Err(ConnectionError::ReadOnlySimulatedPv {
                pv: self.key.clone(),
                kind: other.name(),
            }),
        }
    }
}

/// Flip-flop period from `sim://flipflop(<secs>)`; one second when absent or
/// unusable.
fn flipflop_period(protocol: &str) -> Duration {
    let secs = protocol
        .split_once('(')
        .and_then(|(_, rest)| rest.split_once(')'))
        .and_then(|(arg, _)| arg.trim().parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s > 0.0)
        .unwrap_or(1.0);
    Duration::from_secs_f64(secs).max(Duration::from_millis(1))
}

fn ramp_alarm(value: f64) -> DAlarm {
    if !(10.0..=90.0).contains(&value) {
        DAlarm::major()
    } else if !(20.0..=80.0).contains(&value) {
        DAlarm::minor()
    } else {
        DAlarm::none()
    }
}

fn limit_quality(value: f64) -> AlarmQuality {
    if !(10.0..=90.0).contains(&value) {
        AlarmQuality::Alarm
    } else if !(20.0..=80.0).contains(&value) {
        AlarmQuality::Warning
    } else {
        AlarmQuality::Valid
    }
}

fn enum_value(index: usize) -> DType {
    DType::new(DTypeValue {
        string_value: Some(SIM_ENUM_CHOICES[index].to_string()),
        double_value: Some(index as f64),
        ..Default::default()
    })
    .with_alarm(DAlarm::none())
    .with_time(DTime::now())
    .with_display(DDisplay {
        choices: Some(SIM_ENUM_CHOICES.iter().map(|c| c.to_string()).collect()),
        ..Default::default()
    })
}

/// Numbers select by index, strings by label; anything out of range is
/// ignored. New choices replace the old list first.
fn update_enum(value: &mut DType, update: &DType) {
    if let Some(choices) = &update.display.choices {
        value.display.choices = Some(choices.clone());
    }
    let choices = value.display.choices.clone().unwrap_or_default();
    match (update.get_double_value(), &update.value.string_value) {
        (Some(index), _) if !index.is_nan() => {
            if index >= 0.0 && index < choices.len() as f64 {
                value.value.double_value = Some(index);
            }
        }
        (_, Some(label)) if !label.is_empty() => {
            if let Some(index) = choices.iter().position(|c| c == label) {
                value.value.double_value = Some(index as f64);
            }
        }
        _ => {}
    }
}
