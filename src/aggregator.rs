use std::collections::HashMap;

use crate::models::{EngagementLevel, PredictionRecord, Summary};
use crate::scorer::round2;

/// Keeps the most recent prediction for each student, newest first.
///
/// Records sharing a timestamp for the same student are ordered by id, so the
/// choice between them is stable across runs.
pub fn latest_per_student(records: &[PredictionRecord]) -> Vec<PredictionRecord> {
    let mut ordered: Vec<&PredictionRecord> = records.iter().collect();
    ordered.sort_by(|a, b| {
        b.predicted_at
            .cmp(&a.predicted_at)
            .then_with(|| b.id.cmp(&a.id))
    });

    let mut latest: HashMap<&str, &PredictionRecord> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();

    for record in ordered {
        if !latest.contains_key(record.student_id.as_str()) {
            latest.insert(record.student_id.as_str(), record);
            order.push(record.student_id.as_str());
        }
    }

    order
        .into_iter()
        .filter_map(|student_id| latest.get(student_id).map(|record| (*record).clone()))
        .collect()
}

pub fn summarize(records: &[PredictionRecord]) -> Summary {
    let latest = latest_per_student(records);
    let mut summary = Summary {
        total: latest.len(),
        ..Summary::default()
    };

    let mut total_score = 0.0;
    for record in latest.iter() {
        match record.prediction.engagement_level {
            EngagementLevel::High => summary.high += 1,
            EngagementLevel::Medium => summary.medium += 1,
            EngagementLevel::Low => summary.low += 1,
        }
        total_score += record.prediction.engagement_score;
    }

    summary.average_score = if latest.is_empty() {
        0.0
    } else {
        round2(total_score / latest.len() as f64)
    };

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Factors, PredictionResult};
    use crate::scorer::classify;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn sample_record(student_id: &str, score: f64, hours_ago: i64) -> PredictionRecord {
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        PredictionRecord {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            prediction: PredictionResult {
                engagement_score: score,
                engagement_level: classify(score),
                confidence: 100.0,
                factors: Factors {
                    attendance_impact: score,
                    assignment_impact: 0.0,
                    participation_impact: 0.0,
                    time_impact: 0.0,
                    activity_impact: 0.0,
                    performance_impact: 0.0,
                },
            },
            predicted_at: base - Duration::hours(hours_ago),
        }
    }

    #[test]
    fn empty_history_summarizes_to_zero() {
        assert_eq!(summarize(&[]), Summary::default());
    }

    #[test]
    fn only_latest_prediction_counts() {
        let records = vec![
            sample_record("avery", 30.0, 48),
            sample_record("avery", 80.0, 1),
            sample_record("jules", 50.0, 5),
        ];

        let summary = summarize(&records);
        assert_eq!(
            summary,
            Summary {
                total: 2,
                high: 1,
                medium: 1,
                low: 0,
                average_score: 65.0,
            }
        );
    }

    #[test]
    fn input_order_does_not_matter() {
        let older_first = vec![
            sample_record("kiara", 20.0, 10),
            sample_record("kiara", 72.5, 2),
        ];
        let mut newer_first = older_first.clone();
        newer_first.reverse();

        assert_eq!(summarize(&older_first), summarize(&newer_first));
        assert_eq!(summarize(&older_first).high, 1);
    }

    #[test]
    fn summary_is_idempotent() {
        let records = vec![
            sample_record("avery", 44.99, 3),
            sample_record("jules", 45.0, 3),
            sample_record("kiara", 70.0, 3),
            sample_record("kiara", 12.0, 9),
        ];

        let first = summarize(&records);
        let second = summarize(&records);
        assert_eq!(first, second);
        assert_eq!(first.high + first.medium + first.low, first.total);
        assert_eq!(first.low, 1);
        assert_eq!(first.medium, 1);
        assert_eq!(first.high, 1);
    }

    #[test]
    fn average_is_rounded() {
        let records = vec![
            sample_record("a", 10.0, 1),
            sample_record("b", 10.0, 1),
            sample_record("c", 20.0, 1),
        ];
        assert_eq!(summarize(&records).average_score, 13.33);
    }

    #[test]
    fn equal_timestamps_pick_the_same_record_every_time() {
        let first = sample_record("avery", 30.0, 4);
        let mut second = sample_record("avery", 90.0, 4);
        second.predicted_at = first.predicted_at;

        let forward = latest_per_student(&[first.clone(), second.clone()]);
        let backward = latest_per_student(&[second, first]);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].id, backward[0].id);
    }

    #[test]
    fn latest_per_student_is_newest_first() {
        let records = vec![
            sample_record("avery", 30.0, 20),
            sample_record("jules", 50.0, 2),
            sample_record("avery", 60.0, 8),
        ];

        let latest = latest_per_student(&records);
        let students: Vec<&str> = latest.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(students, vec!["jules", "avery"]);
        assert_eq!(latest[1].prediction.engagement_score, 60.0);
    }
}
