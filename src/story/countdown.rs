use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// 距离目标时刻的剩余时间，拆成天/时/分/秒；到点后为 `Reached`。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Countdown {
    Remaining {
        days: u64,
        hours: u64,
        minutes: u64,
        seconds: u64,
    },
    Reached,
}

impl Countdown {
    pub fn until(target: NaiveDateTime, now: NaiveDateTime) -> Self {
        let remaining_ms = target.signed_duration_since(now).num_milliseconds();
        if remaining_ms <= 0 {
            return Countdown::Reached;
        }

        let total = remaining_ms.unsigned_abs() / 1000;
        Countdown::Remaining {
            days: total / SECONDS_PER_DAY,
            hours: total % SECONDS_PER_DAY / 3600,
            minutes: total % 3600 / 60,
            seconds: total % 60,
        }
    }

    pub fn is_reached(&self) -> bool {
        matches!(self, Countdown::Reached)
    }
}
