//! Transaction timers: identifiers, durations and the re-injecting queue.

mod queue;
mod types;

pub use queue::TimerQueue;
pub use types::{TimerSettings, TimerType};
