//! Receive-path configuration.

use std::time::Duration;

use evform_core::ConfigError;

use crate::rx::MIN_SLOTS;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What the consumer does with queued slots once asked to stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ShutdownMode {
    /// Process every slot still queued.
    #[default]
    Drain,
    /// Stop at once and leave queued slots unprocessed.
    Immediate,
}

/// Configuration of the UDP receiver and its slot buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RxConfig {
    /// Address the socket binds to.
    pub bind: String,
    /// Number of receive slots.
    pub slots: usize,
    /// Maximum datagram size in bytes.
    pub slot_size: usize,
    /// Receive timeout, bounding how long a stop request goes unnoticed.
    pub timeout_ms: u64,
    pub shutdown: ShutdownMode,
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:9000".to_string(),
            slots: 2000,
            slot_size: 9000,
            timeout_ms: 100,
            shutdown: ShutdownMode::Drain,
        }
    }
}

impl RxConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bind address.
    #[must_use]
    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    /// Sets the number of slots.
    #[must_use]
    pub fn with_slots(mut self, slots: usize) -> Self {
        self.slots = slots;
        self
    }

    /// Sets the slot size.
    #[must_use]
    pub fn with_slot_size(mut self, slot_size: usize) -> Self {
        self.slot_size = slot_size;
        self
    }

    /// Sets the receive timeout in milliseconds.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the shutdown mode.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: ShutdownMode) -> Self {
        self.shutdown = shutdown;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Checks the slot geometry and timeout.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] for the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slots < MIN_SLOTS {
            return Err(ConfigError::InvalidValue {
                name: "slots",
                reason: format!("at least {MIN_SLOTS} required, got {}", self.slots),
            });
        }
        if self.slot_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "slot_size",
                reason: "must be positive".to_string(),
            });
        }
        // A zero timeout makes the socket block forever.
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: "timeout_ms",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
