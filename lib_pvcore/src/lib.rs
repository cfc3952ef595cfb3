//! # lib_pvcore
//!
//! Core of a live process-variable (PV) display runtime: widgets subscribe to
//! named PVs, transports deliver values, and a single store keeps the merged,
//! reference-counted view every widget reads from.
//!
//! ## Layout
//! - **`dtypes`**: the value model and its partial-update merge rules.
//! - **`pv`**: `protocol://name` handling.
//! - **`connection`**: the transport contract, the prefix router and the
//!   gateway/simulator transports (feature gated).
//! - **`store`**: actions, middleware, update throttle, reducer, selectors.
//! - **`configs`** / **`loggers`**: runtime configuration and logging setup
//!   for binaries.

#![forbid(unsafe_code)]

pub mod connection;
pub mod dtypes;
pub mod pv;
pub mod store;
pub mod utils;

#[cfg(feature = "configs")]
pub mod configs;
#[cfg(feature = "loggers")]
pub mod loggers;

#[cfg(test)]
mod testing;

// Re-export the types most callers need
pub use connection::{
    Connection, ConnectionCallbacks, ConnectionError, ConnectionForwarder, ConnectionState,
    SubscriptionType,
};
pub use dtypes::{AlarmQuality, DAlarm, DDisplay, DTime, DType, DTypeValue, NumberArray};
pub use pv::PvName;
pub use store::{Action, ActionSender, CsState, PvState, Store, StoreReader};
