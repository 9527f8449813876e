//! Relays textual commands from web clients to IoT devices and device
//! telegrams back.
//!
//! [`repository`] holds the durable, deduplicating command store and
//! [`buffer`] the volatile, time-bounded telegram buffer. The two share no
//! state and no locks.

pub mod buffer;
pub mod clock;
pub mod error;
pub mod repository;
pub mod settings;

pub use error::{RelayError, Result};
