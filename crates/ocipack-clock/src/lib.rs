//! A single process-wide source of "now", so every component that stamps
//! tar/RECORD/`.pyc` timestamps agrees on one instant — overridable by
//! `SOURCE_DATE_EPOCH` for bit-for-bit reproducible builds.

use std::env;
use std::sync::OnceLock;

use jiff::Timestamp;

static INSTANT: OnceLock<Timestamp> = OnceLock::new();

/// The reproducibility clock: initialized once, from `SOURCE_DATE_EPOCH` if
/// set (seconds since the Unix epoch), else from the wall clock at first
/// use. Every subsequent call within the process returns the same instant.
#[derive(Clone, Copy, Debug, Default)]
pub struct Clock;

impl Clock {
    pub fn now(self) -> Timestamp {
        *INSTANT.get_or_init(Self::init)
    }

    /// Unix seconds, the unit every tar/RECORD timestamp field uses.
    pub fn now_unix(self) -> i64 {
        self.now().as_second()
    }

    fn init() -> Timestamp {
        match env::var("SOURCE_DATE_EPOCH") {
            Ok(value) => match value.trim().parse::<i64>() {
                Ok(seconds) => Timestamp::from_second(seconds).unwrap_or_else(|_| Timestamp::now()),
                Err(_) => {
                    tracing::warn!(value, "SOURCE_DATE_EPOCH is not a valid integer, ignoring");
                    Timestamp::now()
                }
            },
            Err(_) => Timestamp::now(),
        }
    }
}

/// Rounds a Unix-seconds timestamp up to the next whole second strictly
/// greater than `seconds` — used to compute a `.pyc` clamp time that is
/// guaranteed newer than any `.py` source it was compiled from.
pub fn one_second_after(seconds: i64) -> i64 {
    seconds.saturating_add(1)
}
