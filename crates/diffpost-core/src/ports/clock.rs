//! Clock port - 時刻の抽象化
//!
//! - `SystemClock`: 本番用
//! - `FixedClock`: テスト用（決定的な時刻）

use chrono::{DateTime, Utc};

/// Clock は現在時刻を提供
///
/// Wall-clock time only. Queue pacing uses the monotonic tokio clock instead.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}
