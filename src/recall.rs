use chrono::{DateTime, Duration, Utc};

use crate::config::EngineConfig;
use crate::models::RecallRecord;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Apply a correct answer. Pure: returns the next record value.
pub fn on_correct(
    record: &RecallRecord,
    technique_ids: &[String],
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> RecallRecord {
    let mut next = record.clone();
    next.correct_attempts += 1;
    next.total_attempts += 1;
    next.recall_strength = clamp01(record.recall_strength + config.delta_up);
    next.last_attempt_at = Some(now);
    next.decayed_at = None;
    shift_technique_scores(&mut next, technique_ids, config.technique_delta_up);
    next
}

/// Apply an incorrect answer. Only the total counter moves; the strength
/// penalty is larger than the correct-answer reward.
pub fn on_incorrect(
    record: &RecallRecord,
    technique_ids: &[String],
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> RecallRecord {
    let mut next = record.clone();
    next.total_attempts += 1;
    next.recall_strength = clamp01(record.recall_strength - config.delta_down);
    next.last_attempt_at = Some(now);
    next.decayed_at = None;
    shift_technique_scores(&mut next, technique_ids, -config.technique_delta_down);
    next
}

/// Elapsed-time decay. Returns `None` when nothing changes: no prior
/// attempt, still inside the decay threshold, or the interval up to `now`
/// already decayed. Only the increment past `decayed_at` is applied, so
/// repeated passes multiply out to the same factor as one pass over the
/// whole overdue window.
pub fn decay(
    record: &RecallRecord,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Option<RecallRecord> {
    let last_attempt = record.last_attempt_at?;
    let threshold_end = last_attempt + Duration::hours(config.decay_threshold_hours);
    let decay_from = match record.decayed_at {
        Some(decayed_at) if decayed_at > threshold_end => decayed_at,
        _ => threshold_end,
    };
    if now <= decay_from {
        return None;
    }

    let overdue_days = (now - decay_from).num_seconds() as f64 / SECONDS_PER_DAY;
    let factor = (-config.decay_rate_per_day * overdue_days).exp();

    let mut next = record.clone();
    next.recall_strength = clamp01(record.recall_strength * factor);
    for score in next.technique_transfer_scores.values_mut() {
        *score = clamp01(*score * factor);
    }
    next.decayed_at = Some(now);
    // Decay is not an attempt; last_attempt_at stays put.
    Some(next)
}

fn shift_technique_scores(record: &mut RecallRecord, technique_ids: &[String], delta: f64) {
    for technique_id in technique_ids {
        let score = record
            .technique_transfer_scores
            .entry(technique_id.clone())
            .or_insert(0.0);
        *score = clamp01(*score + delta);
    }
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
