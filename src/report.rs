use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::aggregator;
use crate::models::{
    EngagementLevel, FactorShare, MetricAverages, MetricsRecord, PredictionRecord, StudentRecord,
};
use crate::scorer::{
    ACTIVITY_WEIGHT, ASSIGNMENT_WEIGHT, ATTENDANCE_WEIGHT, PARTICIPATION_WEIGHT,
    PERFORMANCE_WEIGHT, TIME_WEIGHT,
};

pub fn metric_averages(metrics: &[MetricsRecord]) -> Option<MetricAverages> {
    if metrics.is_empty() {
        return None;
    }

    let count = metrics.len() as f64;
    let mut averages = MetricAverages {
        student_count: metrics.len(),
        ..MetricAverages::default()
    };

    for record in metrics {
        averages.attendance += record.snapshot.attendance_rate;
        averages.assignments += record.snapshot.assignment_completion;
        averages.participation += record.snapshot.participation_score;
        averages.time += record.snapshot.time_on_platform;
    }

    averages.attendance /= count;
    averages.assignments /= count;
    averages.participation /= count;
    averages.time /= count;
    Some(averages)
}

pub fn factor_breakdown(latest: &[PredictionRecord]) -> Vec<FactorShare> {
    let mut totals = [0.0f64; 6];
    for record in latest {
        let factors = &record.prediction.factors;
        totals[0] += factors.attendance_impact;
        totals[1] += factors.assignment_impact;
        totals[2] += factors.participation_impact;
        totals[3] += factors.time_impact;
        totals[4] += factors.activity_impact;
        totals[5] += factors.performance_impact;
    }

    let count = latest.len().max(1) as f64;
    [
        ("Attendance", ATTENDANCE_WEIGHT),
        ("Assignments", ASSIGNMENT_WEIGHT),
        ("Participation", PARTICIPATION_WEIGHT),
        ("Platform Time", TIME_WEIGHT),
        ("Forum Activity", ACTIVITY_WEIGHT),
        ("Quiz Performance", PERFORMANCE_WEIGHT),
    ]
    .into_iter()
    .zip(totals)
    .map(|((label, weight), total)| FactorShare {
        label,
        average_impact: total / count,
        max_impact: weight * 100.0,
    })
    .collect()
}

pub fn build_report(
    generated_on: NaiveDate,
    predictions: &[PredictionRecord],
    students: &[StudentRecord],
    metrics: &[MetricsRecord],
) -> String {
    let summary = aggregator::summarize(predictions);
    let latest = aggregator::latest_per_student(predictions);
    let names: HashMap<String, &StudentRecord> = students
        .iter()
        .map(|student| (student.id.to_string(), student))
        .collect();

    let mut output = String::new();

    let _ = writeln!(output, "# Student Engagement Report");
    let _ = writeln!(output, "Generated on {}", generated_on);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");

    if summary.total == 0 {
        let _ = writeln!(output, "No predictions recorded yet.");
    } else {
        let _ = writeln!(output, "- Students scored: {}", summary.total);
        let _ = writeln!(output, "- Average score: {:.2}", summary.average_score);
        let _ = writeln!(output, "- High engagement: {}", summary.high);
        let _ = writeln!(output, "- Medium engagement: {}", summary.medium);
        let _ = writeln!(output, "- Low engagement: {}", summary.low);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## At-Risk Students");

    let mut at_risk: Vec<&PredictionRecord> = latest
        .iter()
        .filter(|record| record.prediction.engagement_level == EngagementLevel::Low)
        .collect();
    at_risk.sort_by(|a, b| {
        a.prediction
            .engagement_score
            .partial_cmp(&b.prediction.engagement_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if at_risk.is_empty() {
        let _ = writeln!(output, "No students in the low engagement band.");
    } else {
        for record in at_risk {
            let label = match names.get(&record.student_id) {
                Some(student) => format!("{} ({})", student.full_name, student.email),
                None => record.student_id.clone(),
            };
            let _ = writeln!(
                output,
                "- {} score {:.2} (confidence {:.2}%) on {}",
                label,
                record.prediction.engagement_score,
                record.prediction.confidence,
                record.predicted_at.date_naive()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Class Averages");

    match metric_averages(metrics) {
        None => {
            let _ = writeln!(output, "No metrics recorded yet.");
        }
        Some(averages) => {
            let _ = writeln!(
                output,
                "Across the latest metrics of {} students:",
                averages.student_count
            );
            let _ = writeln!(output, "- Attendance: {:.1}%", averages.attendance);
            let _ = writeln!(output, "- Assignment completion: {:.1}%", averages.assignments);
            let _ = writeln!(output, "- Participation: {:.1}%", averages.participation);
            let _ = writeln!(output, "- Platform time: {:.0} min/week", averages.time);
        }
    }

    if !latest.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Factor Breakdown");
        for share in factor_breakdown(&latest) {
            let _ = writeln!(
                output,
                "- {}: {:.2} of {:.0}",
                share.label, share.average_impact, share.max_impact
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricsSnapshot, PredictionResult};
    use crate::scorer;
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn snapshot(student_id: &str, attendance: f64, quiz: Option<f64>) -> MetricsSnapshot {
        MetricsSnapshot {
            student_id: student_id.to_string(),
            attendance_rate: attendance,
            assignment_completion: attendance,
            participation_score: attendance,
            time_on_platform: 150.0,
            forum_posts: 4.0,
            quiz_average: quiz,
        }
    }

    fn record(student_id: &str, prediction: PredictionResult, hours_ago: i64) -> PredictionRecord {
        PredictionRecord {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            prediction,
            predicted_at: Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
                - Duration::hours(hours_ago),
        }
    }

    fn metrics_record(snapshot: MetricsSnapshot) -> MetricsRecord {
        MetricsRecord {
            id: Uuid::new_v4(),
            snapshot,
            recorded_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn averages_cover_latest_snapshots() {
        let metrics = vec![
            metrics_record(snapshot("a", 80.0, None)),
            metrics_record(snapshot("b", 60.0, Some(70.0))),
        ];
        let averages = metric_averages(&metrics).unwrap();
        assert_eq!(averages.student_count, 2);
        assert!((averages.attendance - 70.0).abs() < 1e-9);
        assert!((averages.time - 150.0).abs() < 1e-9);
        assert!(metric_averages(&[]).is_none());
    }

    #[test]
    fn breakdown_compares_against_weight() {
        let prediction = scorer::score(&snapshot("a", 80.0, Some(90.0)));
        let shares = factor_breakdown(&[record("a", prediction, 1)]);
        assert_eq!(shares.len(), 6);
        assert_eq!(shares[0].label, "Attendance");
        assert!((shares[0].average_impact - 20.0).abs() < 1e-9);
        assert!((shares[0].max_impact - 25.0).abs() < 1e-9);
        assert!((shares[5].average_impact - 9.0).abs() < 1e-9);
    }

    #[test]
    fn report_lists_low_students_by_name() {
        let student_id = Uuid::new_v4();
        let students = vec![StudentRecord {
            id: student_id,
            full_name: "Kiara Patel".to_string(),
            email: "kiara.patel@example.edu".to_string(),
            grade_level: None,
        }];
        let predictions = vec![
            record(
                &student_id.to_string(),
                scorer::score(&snapshot("k", 20.0, Some(30.0))),
                1,
            ),
            record(
                &student_id.to_string(),
                scorer::score(&snapshot("k", 95.0, Some(95.0))),
                30,
            ),
            record("walk-in", scorer::score(&snapshot("w", 90.0, Some(90.0))), 2),
        ];
        let metrics = vec![metrics_record(snapshot("k", 20.0, Some(30.0)))];

        let generated_on = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let report = build_report(generated_on, &predictions, &students, &metrics);

        assert!(report.contains("Generated on 2026-03-02"));
        assert!(report.contains("- Students scored: 2"));
        assert!(report.contains("- Low engagement: 1"));
        assert!(report.contains("- Kiara Patel (kiara.patel@example.edu) score"));
        assert!(!report.contains("walk-in score"));
        assert!(report.contains("## Factor Breakdown"));
        assert!(report.contains("- Attendance: 20.0%"));
    }

    #[test]
    fn empty_report_says_so() {
        let generated_on = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let report = build_report(generated_on, &[], &[], &[]);
        assert!(report.contains("No predictions recorded yet."));
        assert!(report.contains("No students in the low engagement band."));
        assert!(report.contains("No metrics recorded yet."));
        assert!(!report.contains("## Factor Breakdown"));
    }
}
