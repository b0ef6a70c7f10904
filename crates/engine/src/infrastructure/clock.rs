//! System clock adapter.

use chrono::{DateTime, Utc};

use super::ports::ClockPort;

/// Production clock backed by the OS.
#[derive(Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
