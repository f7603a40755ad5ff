use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::Sm2State;

/// Floor for the easiness factor; SM-2 never lets an item get harder than this.
pub const MIN_EASINESS: f64 = 1.3;
pub const MAX_QUALITY: u8 = 5;
/// Lowest quality that still counts as a successful recall.
pub const PASSING_QUALITY: u8 = 3;

const FIRST_INTERVAL_DAYS: u32 = 1;
const SECOND_INTERVAL_DAYS: u32 = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Sm2Error {
    #[error("quality {0} out of range, expected 0..=5")]
    InvalidQuality(u8),
}

/// One SM-2 review step. Pure: the caller persists the returned state into
/// the owning recall record.
pub fn update(current: &Sm2State, quality: u8, now: DateTime<Utc>) -> Result<Sm2State, Sm2Error> {
    if quality > MAX_QUALITY {
        return Err(Sm2Error::InvalidQuality(quality));
    }

    let spread = f64::from(MAX_QUALITY - quality);
    let easiness =
        (current.easiness_factor + (0.1 - spread * (0.08 + spread * 0.02))).max(MIN_EASINESS);

    let (repetition_count, interval_days) = if quality < PASSING_QUALITY {
        // Failed recall: restart the repetition ladder, due immediately.
        (0, 0)
    } else {
        let count = current.repetition_count + 1;
        let interval = match count {
            1 => FIRST_INTERVAL_DAYS,
            2 => SECOND_INTERVAL_DAYS,
            _ => (f64::from(current.interval_days) * easiness).ceil() as u32,
        };
        (count, interval)
    };

    Ok(Sm2State {
        repetition_count,
        easiness_factor: easiness,
        interval_days,
        last_reviewed_at: Some(now),
    })
}
