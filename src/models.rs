use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Behavioral metrics for one student at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub student_id: String,
    pub attendance_rate: f64,
    pub assignment_completion: f64,
    pub participation_score: f64,
    /// Minutes per week.
    pub time_on_platform: f64,
    pub forum_posts: f64,
    #[serde(default)]
    pub quiz_average: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    High,
    Medium,
    Low,
}

impl EngagementLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementLevel::High => "high",
            EngagementLevel::Medium => "medium",
            EngagementLevel::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "high" => Some(EngagementLevel::High),
            "medium" => Some(EngagementLevel::Medium),
            "low" => Some(EngagementLevel::Low),
            _ => None,
        }
    }
}

impl fmt::Display for EngagementLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weighted contribution of each metric to the engagement score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Factors {
    pub attendance_impact: f64,
    pub assignment_impact: f64,
    pub participation_impact: f64,
    pub time_impact: f64,
    pub activity_impact: f64,
    pub performance_impact: f64,
}

impl Factors {
    pub fn total(&self) -> f64 {
        self.attendance_impact
            + self.assignment_impact
            + self.participation_impact
            + self.time_impact
            + self.activity_impact
            + self.performance_impact
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub engagement_score: f64,
    pub engagement_level: EngagementLevel,
    pub confidence: f64,
    pub factors: Factors,
}

/// A stored prediction. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: Uuid,
    pub student_id: String,
    #[serde(flatten)]
    pub prediction: PredictionResult,
    pub predicted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    #[serde(rename = "averageScore")]
    pub average_score: f64,
}

#[derive(Debug, Clone)]
pub struct StudentRecord {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub grade_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MetricsRecord {
    pub id: Uuid,
    pub snapshot: MetricsSnapshot,
    pub recorded_at: DateTime<Utc>,
}

/// Class-wide means over each student's latest metric snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricAverages {
    pub student_count: usize,
    pub attendance: f64,
    pub assignments: f64,
    pub participation: f64,
    pub time: f64,
}

/// Average contribution of one factor against the most it can contribute.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorShare {
    pub label: &'static str,
    pub average_impact: f64,
    pub max_impact: f64,
}
