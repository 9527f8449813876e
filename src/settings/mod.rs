use crate::buffer::{BufferConfig, DEFAULT_MESSAGE_CAPACITY, DEFAULT_MESSAGE_TTL_SECS};
use crate::repository::entities::DEFAULT_COMMAND_CAPACITY;
use chrono::Duration as Ttl;
use serde::{Deserialize, Serialize};
use std::io::{Error, ErrorKind, Result};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Setup contains relay setup parameters.
/// Every field is optional in the file, missing ones take the default.
///
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Setup {
    ip: IpAddr,
    port: u16,
    database: String,
    command_capacity: usize,
    message_capacity: usize,
    message_ttl_secs: u64,
    sweep_interval_secs: u64,
    log_filter: String,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8000,
            database: "sqlite::memory:".to_string(),
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            message_capacity: DEFAULT_MESSAGE_CAPACITY,
            message_ttl_secs: DEFAULT_MESSAGE_TTL_SECS,
            sweep_interval_secs: DEFAULT_MESSAGE_TTL_SECS,
            log_filter: "info".to_string(),
        }
    }
}

/// Converts whole seconds into a TTL, or none when the value cannot be represented.
///
#[inline]
fn whole_seconds(secs: u64) -> Option<Ttl> {
    i64::try_from(secs).ok().and_then(Ttl::try_seconds)
}

impl Setup {
    /// Deserializes Setup from file under given path.
    ///
    pub fn from_file(path: &str) -> Result<Setup> {
        let f = std::fs::File::open(path)?;
        Self::from_reader(f)
    }

    pub fn from_reader<R: std::io::Read>(r: R) -> Result<Setup> {
        let s: Setup = match serde_yaml::from_reader(r) {
            Ok(s) => s,
            Err(e) => {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("cannot read the setup: {e}"),
                ))
            }
        };
        s.validate()?;
        Ok(s)
    }

    /// Rejects bounds that would make the stores unusable.
    /// Periods must be positive and fit a signed duration.
    ///
    pub fn validate(&self) -> Result<()> {
        let invalid = |what: &str, reason: &str| -> Result<()> {
            Err(Error::new(
                ErrorKind::InvalidInput,
                format!("{what} {reason}"),
            ))
        };
        if self.command_capacity == 0 {
            return invalid("command_capacity", "must be greater than zero");
        }
        if self.message_capacity == 0 {
            return invalid("message_capacity", "must be greater than zero");
        }
        for (what, secs) in [
            ("message_ttl_secs", self.message_ttl_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ] {
            if secs == 0 {
                return invalid(what, "must be greater than zero");
            }
            if whole_seconds(secs).is_none() {
                return invalid(what, "is too large");
            }
        }
        Ok(())
    }

    /// Returns address in form of ip and port like: `0.0.0.0:8000`.
    ///
    pub fn get_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn get_ip(&self) -> String {
        self.ip.to_string()
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn get_database(&self) -> String {
        self.database.clone()
    }

    pub fn get_command_capacity(&self) -> usize {
        self.command_capacity
    }

    pub fn get_buffer_config(&self) -> BufferConfig {
        BufferConfig {
            capacity: self.message_capacity,
            ttl: whole_seconds(self.message_ttl_secs).unwrap_or(Ttl::MAX),
        }
    }

    pub fn get_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn get_log_filter(&self) -> &str {
        &self.log_filter
    }
}
