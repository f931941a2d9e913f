//! Transaction layer configuration.

use serde::{Deserialize, Serialize};

use crate::timer::TimerSettings;

/// Configuration for a [`TransactionManager`](crate::TransactionManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Timer durations shared by every transaction
    pub timers: TimerSettings,

    /// Capacity of the outbound channel to the transport
    pub wire_channel_capacity: usize,

    /// Capacity of the event channel to the transaction user
    pub tu_channel_capacity: usize,

    /// Drop responses that match no transaction. When false they are passed
    /// through statelessly (wire to TU, TU to wire).
    pub discard_stray_responses: bool,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            timers: TimerSettings::default(),
            wire_channel_capacity: 1000,
            tu_channel_capacity: 1000,
            discard_stray_responses: true,
        }
    }
}

impl TransactionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timers(mut self, timers: TimerSettings) -> Self {
        self.timers = timers;
        self
    }

    pub fn with_wire_channel_capacity(mut self, capacity: usize) -> Self {
        self.wire_channel_capacity = capacity;
        self
    }

    pub fn with_tu_channel_capacity(mut self, capacity: usize) -> Self {
        self.tu_channel_capacity = capacity;
        self
    }

    pub fn with_discard_stray_responses(mut self, discard: bool) -> Self {
        self.discard_stray_responses = discard;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        self.timers.validate()?;

        if self.wire_channel_capacity == 0 {
            return Err("Wire channel capacity must be greater than 0".to_string());
        }

        if self.tu_channel_capacity == 0 {
            return Err("TU channel capacity must be greater than 0".to_string());
        }

        Ok(())
    }
}
