use crate::models::{EngagementLevel, Factors, MetricsSnapshot, PredictionResult};

pub const ATTENDANCE_WEIGHT: f64 = 0.25;
pub const ASSIGNMENT_WEIGHT: f64 = 0.25;
pub const PARTICIPATION_WEIGHT: f64 = 0.20;
pub const TIME_WEIGHT: f64 = 0.10;
pub const ACTIVITY_WEIGHT: f64 = 0.10;
pub const PERFORMANCE_WEIGHT: f64 = 0.10;

/// Weekly minutes on the platform that count as full engagement.
pub const TIME_SATURATION_MINUTES: f64 = 300.0;
/// Forum posts that count as full activity.
pub const ACTIVITY_SATURATION_POSTS: f64 = 10.0;
/// Stand-in for a missing quiz average.
pub const DEFAULT_QUIZ_AVERAGE: f64 = 70.0;

pub const HIGH_THRESHOLD: f64 = 70.0;
pub const MEDIUM_THRESHOLD: f64 = 45.0;

const BASE_DATA_POINTS: u32 = 5;
const EXPECTED_DATA_POINTS: u32 = 6;

pub fn score(metrics: &MetricsSnapshot) -> PredictionResult {
    let attendance = metrics.attendance_rate * ATTENDANCE_WEIGHT;
    let assignment = metrics.assignment_completion * ASSIGNMENT_WEIGHT;
    let participation = metrics.participation_score * PARTICIPATION_WEIGHT;
    let time = normalize_time(metrics.time_on_platform) * TIME_WEIGHT;
    let activity = normalize_activity(metrics.forum_posts) * ACTIVITY_WEIGHT;
    let performance = metrics.quiz_average.unwrap_or(DEFAULT_QUIZ_AVERAGE) * PERFORMANCE_WEIGHT;

    let engagement_score =
        round2(attendance + assignment + participation + time + activity + performance);

    PredictionResult {
        engagement_score,
        engagement_level: classify(engagement_score),
        confidence: round2(confidence(metrics)),
        factors: Factors {
            attendance_impact: round2(attendance),
            assignment_impact: round2(assignment),
            participation_impact: round2(participation),
            time_impact: round2(time),
            activity_impact: round2(activity),
            performance_impact: round2(performance),
        },
    }
}

/// Scores every snapshot independently; output order matches input order.
pub fn score_batch(metrics: &[MetricsSnapshot]) -> Vec<PredictionResult> {
    metrics.iter().map(score).collect()
}

pub fn normalize_time(minutes: f64) -> f64 {
    (minutes / TIME_SATURATION_MINUTES).min(1.0) * 100.0
}

pub fn normalize_activity(posts: f64) -> f64 {
    (posts / ACTIVITY_SATURATION_POSTS).min(1.0) * 100.0
}

pub fn classify(score: f64) -> EngagementLevel {
    if score >= HIGH_THRESHOLD {
        EngagementLevel::High
    } else if score >= MEDIUM_THRESHOLD {
        EngagementLevel::Medium
    } else {
        EngagementLevel::Low
    }
}

/// Share of the expected inputs that were supplied, as a percentage.
pub fn confidence(metrics: &MetricsSnapshot) -> f64 {
    let mut points = BASE_DATA_POINTS;
    if metrics.quiz_average.is_some() {
        points += 1;
    }
    points as f64 / EXPECTED_DATA_POINTS as f64 * 100.0
}

/// Half-up rounding to two decimals. Every rounded output goes through here.
pub fn round2(value: f64) -> f64 {
    (value * 100.0 + 0.5).floor() / 100.0
}
