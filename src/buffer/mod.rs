//! Volatile buffer of telegrams pushed by devices.
//!
//! Entries are appended in arrival order and carry the clock reading taken
//! under the buffer lock, so the front of the queue is always the oldest
//! entry. Capacity overflow and expiry both remove from the front.

mod sweeper;

pub use sweeper::{spawn_sweeper, SweeperHandle};

use crate::clock::Clock;
use crate::error::{RelayError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Default number of telegrams held at once.
pub const DEFAULT_MESSAGE_CAPACITY: usize = 50;

/// Default age after which a telegram is dropped, in seconds.
pub const DEFAULT_MESSAGE_TTL_SECS: u64 = 15 * 60;

/// Message is a single telegram received from a device.
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub device_id: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferConfig {
    pub capacity: usize,
    pub ttl: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_MESSAGE_CAPACITY,
            ttl: Duration::seconds(DEFAULT_MESSAGE_TTL_SECS as i64),
        }
    }
}

#[derive(Debug, Default)]
struct Log {
    entries: VecDeque<Message>,
    last_id: u64,
}

/// MessageBuffer holds the most recent device telegrams in memory.
///
#[derive(Debug)]
pub struct MessageBuffer {
    log: Mutex<Log>,
    clock: Arc<dyn Clock>,
    config: BufferConfig,
}

impl MessageBuffer {
    pub fn new(config: BufferConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            log: Mutex::new(Log {
                entries: VecDeque::with_capacity(config.capacity + 1),
                last_id: 0,
            }),
            clock,
            config,
        }
    }

    #[inline(always)]
    fn log(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline(always)]
    fn is_expired(&self, m: &Message, now: DateTime<Utc>) -> bool {
        now - m.timestamp > self.config.ttl
    }

    /// Stores a new telegram and drops the oldest one when over capacity.
    ///
    pub fn push(&self, device_id: Option<&str>, message: &str) -> Result<Message> {
        if message.trim().is_empty() {
            return Err(RelayError::InvalidInput(
                "message must not be empty".to_string(),
            ));
        }
        let device_id = device_id
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        let mut log = self.log();
        log.last_id += 1;
        let entry = Message {
            id: log.last_id,
            device_id,
            message: message.to_string(),
            timestamp: self.clock.now(),
        };
        log.entries.push_back(entry.clone());
        let dropped = if log.entries.len() > self.config.capacity {
            log.entries.pop_front()
        } else {
            None
        };
        drop(log);

        debug!(id = entry.id, device_id = ?entry.device_id, "device message stored");
        if let Some(old) = dropped {
            debug!(id = old.id, "dropped oldest device message");
        }

        Ok(entry)
    }

    /// Returns live telegrams, newest first.
    ///
    pub fn list(&self) -> Vec<Message> {
        let now = self.clock.now();
        self.log()
            .entries
            .iter()
            .rev()
            .take_while(|m| !self.is_expired(m, now))
            .cloned()
            .collect()
    }

    /// Removes the run of expired telegrams at the old end.
    /// Stops at the first live entry, so the cost is the number removed.
    ///
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut log = self.log();
        let mut removed = 0;
        while log
            .entries
            .front()
            .is_some_and(|m| self.is_expired(m, now))
        {
            log.entries.pop_front();
            removed += 1;
        }
        let remaining = log.entries.len();
        drop(log);

        if removed > 0 {
            info!(removed, remaining, "swept expired device messages");
        }
        removed
    }

    /// Number of held telegrams, including expired ones not yet swept.
    ///
    pub fn len(&self) -> usize {
        self.log().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
