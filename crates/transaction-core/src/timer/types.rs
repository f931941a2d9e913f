//! Timer identifiers and durations for the transaction layer.
//!
//! RFC 3261 §17 timers fall into three groups:
//!
//! - **Retransmission** (A, E, G): resend a message over unreliable transports,
//!   starting at T1 and backing off
//! - **Transaction timeout** (B, F, H): bound the lifetime of a transaction
//! - **Wait** (D, I, J, K): linger in a state to absorb retransmissions
//!
//! Two more are not RFC timers: `Trying` sends the automatic 100 for an
//! INVITE the TU has not answered yet, and `Stale` keeps a transaction id
//! resolvable after a 2xx so duplicate 2xx responses are absorbed.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Specifies the type of a SIP transaction timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerType {
    /// **Timer A (INVITE Client): INVITE retransmission interval.**
    /// Starts at T1 and doubles while in Calling on unreliable transports.
    A,
    /// **Timer B (INVITE Client): INVITE transaction timeout.** 64*T1.
    B,
    /// **Timer D (INVITE Client): wait time for response retransmissions.**
    /// At least 32s for unreliable transports.
    D,
    /// **Timer E (Non-INVITE Client) while Trying.** Starts at T1, doubles up to T2.
    E1,
    /// **Timer E (Non-INVITE Client) while Proceeding.** Fixed at T2.
    E2,
    /// **Timer F (Non-INVITE Client): non-INVITE transaction timeout.** 64*T1.
    F,
    /// **Timer G (INVITE Server): response retransmission interval.**
    /// Starts at T1 and doubles up to T2.
    G,
    /// **Timer H (INVITE Server): wait time for ACK receipt.** 64*T1.
    H,
    /// **Timer I (INVITE Server): wait time for ACK retransmissions.** T4.
    I,
    /// **Timer J (Non-INVITE Server): wait time for request retransmissions.** 64*T1.
    J,
    /// **Timer K (Non-INVITE Client): wait time for response retransmissions.** T4.
    K,
    /// Sends the automatic 100 Trying for an unanswered INVITE.
    Trying,
    /// Post-2xx absorption window.
    Stale,
}

impl fmt::Display for TimerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerType::A => write!(f, "A"),
            TimerType::B => write!(f, "B"),
            TimerType::D => write!(f, "D"),
            TimerType::E1 => write!(f, "E1"),
            TimerType::E2 => write!(f, "E2"),
            TimerType::F => write!(f, "F"),
            TimerType::G => write!(f, "G"),
            TimerType::H => write!(f, "H"),
            TimerType::I => write!(f, "I"),
            TimerType::J => write!(f, "J"),
            TimerType::K => write!(f, "K"),
            TimerType::Trying => write!(f, "Trying"),
            TimerType::Stale => write!(f, "Stale"),
        }
    }
}

/// Timer durations. Defaults follow RFC 3261 Table 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSettings {
    /// RTT estimate (default 500ms)
    pub t1: Duration,
    /// Maximum retransmit interval for non-INVITE requests and INVITE responses (default 4s)
    pub t2: Duration,
    /// Maximum duration a message will remain in the network (default 5s)
    pub t4: Duration,
    /// Delay before the automatic 100 Trying (default 200ms)
    pub t100: Duration,
    /// Timer D (default 32s)
    pub timer_d: Duration,
    /// How long a transaction stays resolvable after a 2xx to INVITE
    /// (default 64*T1)
    pub stale_window: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        let t1 = Duration::from_millis(500);
        Self {
            t1,
            t2: Duration::from_secs(4),
            t4: Duration::from_secs(5),
            t100: Duration::from_millis(200),
            timer_d: Duration::from_secs(32),
            stale_window: t1 * 64,
        }
    }
}

impl TimerSettings {
    /// Timers B, F, H and J
    pub fn transaction_timeout(&self) -> Duration {
        self.t1 * 64
    }

    /// Next interval of a backing-off retransmit timer, capped at T2.
    pub fn backoff(&self, current: Duration) -> Duration {
        (current * 2).min(self.t2)
    }

    pub fn with_t1(mut self, t1: Duration) -> Self {
        self.t1 = t1;
        self
    }

    pub fn with_t2(mut self, t2: Duration) -> Self {
        self.t2 = t2;
        self
    }

    pub fn with_t4(mut self, t4: Duration) -> Self {
        self.t4 = t4;
        self
    }

    pub fn with_t100(mut self, t100: Duration) -> Self {
        self.t100 = t100;
        self
    }

    pub fn with_timer_d(mut self, timer_d: Duration) -> Self {
        self.timer_d = timer_d;
        self
    }

    pub fn with_stale_window(mut self, window: Duration) -> Self {
        self.stale_window = window;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.t1.is_zero() {
            return Err("T1 must be greater than 0".to_string());
        }
        if self.t2 < self.t1 {
            return Err("T2 must not be smaller than T1".to_string());
        }
        if self.t4.is_zero() {
            return Err("T4 must be greater than 0".to_string());
        }
        if self.stale_window.is_zero() {
            return Err("Stale window must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc_defaults() {
        let settings = TimerSettings::default();
        assert_eq!(settings.t1, Duration::from_millis(500));
        assert_eq!(settings.t2, Duration::from_secs(4));
        assert_eq!(settings.t4, Duration::from_secs(5));
        assert_eq!(settings.transaction_timeout(), Duration::from_secs(32));
        assert_eq!(settings.timer_d, Duration::from_secs(32));
        assert_eq!(settings.stale_window, Duration::from_secs(32));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_backoff_caps_at_t2() {
        let settings = TimerSettings::default();
        let mut d = settings.t1;
        let mut seen = Vec::new();
        for _ in 0..5 {
            d = settings.backoff(d);
            seen.push(d.as_millis());
        }
        assert_eq!(seen, vec![1000, 2000, 4000, 4000, 4000]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(TimerSettings::default().with_t1(Duration::ZERO).validate().is_err());
        assert!(TimerSettings::default()
            .with_t2(Duration::from_millis(100))
            .validate()
            .is_err());
        assert!(TimerSettings::default()
            .with_stale_window(Duration::ZERO)
            .validate()
            .is_err());
    }
}
