use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    EngagementLevel, Factors, MetricsRecord, MetricsSnapshot, PredictionRecord,
    PredictionResult, StudentRecord,
};
use crate::scorer;
use crate::store::PredictionStore;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed prediction store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PredictionStore for PgStore {
    async fn insert_prediction(
        &self,
        student_id: &str,
        prediction: &PredictionResult,
    ) -> Result<PredictionRecord, StoreError> {
        let record = new_record(student_id, prediction);
        insert_prediction_row(&self.pool, &record).await?;
        debug!(student_id, id = %record.id, "prediction stored");
        Ok(record)
    }

    async fn insert_predictions(
        &self,
        predictions: &[(String, PredictionResult)],
    ) -> Result<Vec<PredictionRecord>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut records = Vec::with_capacity(predictions.len());

        for (student_id, prediction) in predictions {
            let record = new_record(student_id, prediction);
            insert_prediction_row(&mut *tx, &record).await?;
            records.push(record);
        }

        tx.commit().await?;
        debug!(count = records.len(), "prediction batch stored");
        Ok(records)
    }

    async fn fetch_predictions(&self) -> Result<Vec<PredictionRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, student_id, engagement_score, engagement_level, confidence, factors, predicted_at \
             FROM engagement.predictions \
             ORDER BY predicted_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(prediction_from_row).collect()
    }

    async fn fetch_trends(
        &self,
        student_id: &str,
        limit: u32,
    ) -> Result<Vec<PredictionRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, student_id, engagement_score, engagement_level, confidence, factors, predicted_at \
             FROM engagement.predictions \
             WHERE student_id = $1 \
             ORDER BY predicted_at DESC, id DESC \
             LIMIT $2",
        )
        .bind(student_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(prediction_from_row).collect()
    }
}

fn new_record(student_id: &str, prediction: &PredictionResult) -> PredictionRecord {
    PredictionRecord {
        id: Uuid::new_v4(),
        student_id: student_id.to_string(),
        prediction: prediction.clone(),
        predicted_at: Utc::now(),
    }
}

async fn insert_prediction_row<'e, E>(executor: E, record: &PredictionRecord) -> Result<(), StoreError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO engagement.predictions
        (id, student_id, engagement_score, engagement_level, confidence, factors, predicted_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(record.id)
    .bind(&record.student_id)
    .bind(record.prediction.engagement_score)
    .bind(record.prediction.engagement_level.as_str())
    .bind(record.prediction.confidence)
    .bind(Json(record.prediction.factors))
    .bind(record.predicted_at)
    .execute(executor)
    .await?;
    Ok(())
}

fn prediction_from_row(row: &PgRow) -> Result<PredictionRecord, StoreError> {
    let level: String = row.try_get("engagement_level")?;
    let engagement_level = EngagementLevel::parse(&level)
        .ok_or_else(|| StoreError::InvalidRow(format!("unknown engagement level `{level}`")))?;
    let Json(factors): Json<Factors> = row.try_get("factors")?;

    Ok(PredictionRecord {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        prediction: PredictionResult {
            engagement_score: row.try_get("engagement_score")?,
            engagement_level,
            confidence: row.try_get("confidence")?,
            factors,
        },
        predicted_at: row.try_get("predicted_at")?,
    })
}

fn metrics_from_row(row: &PgRow) -> Result<MetricsRecord, sqlx::Error> {
    Ok(MetricsRecord {
        id: row.try_get("id")?,
        snapshot: MetricsSnapshot {
            student_id: row.try_get("student_id")?,
            attendance_rate: row.try_get("attendance_rate")?,
            assignment_completion: row.try_get("assignment_completion")?,
            participation_score: row.try_get("participation_score")?,
            time_on_platform: row.try_get("time_on_platform")?,
            forum_posts: row.try_get("forum_posts")?,
            quiz_average: row.try_get("quiz_average")?,
        },
        recorded_at: row.try_get("recorded_at")?,
    })
}

pub async fn upsert_student(
    pool: &PgPool,
    full_name: &str,
    email: &str,
    grade_level: Option<&str>,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO engagement.students (id, full_name, email, grade_level)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name, grade_level = EXCLUDED.grade_level
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .bind(email)
    .bind(grade_level)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to upsert student {email}"))?
    .try_get("id")?;

    Ok(id)
}

pub async fn fetch_students(pool: &PgPool) -> anyhow::Result<Vec<StudentRecord>> {
    let rows = sqlx::query(
        "SELECT id, full_name, email, grade_level FROM engagement.students ORDER BY full_name",
    )
    .fetch_all(pool)
    .await?;

    let mut students = Vec::with_capacity(rows.len());
    for row in rows {
        students.push(StudentRecord {
            id: row.try_get("id")?,
            full_name: row.try_get("full_name")?,
            email: row.try_get("email")?,
            grade_level: row.try_get("grade_level")?,
        });
    }

    Ok(students)
}

pub async fn insert_metrics(
    pool: &PgPool,
    snapshot: &MetricsSnapshot,
    recorded_at: DateTime<Utc>,
) -> anyhow::Result<MetricsRecord> {
    let record = MetricsRecord {
        id: Uuid::new_v4(),
        snapshot: snapshot.clone(),
        recorded_at,
    };
    insert_metrics_record(pool, &record).await?;
    Ok(record)
}

/// Returns `false` when a snapshot with the same id is already stored.
async fn insert_metrics_record(pool: &PgPool, record: &MetricsRecord) -> anyhow::Result<bool> {
    let snapshot = &record.snapshot;
    let result = sqlx::query(
        r#"
        INSERT INTO engagement.student_metrics
        (id, student_id, attendance_rate, assignment_completion, participation_score,
         time_on_platform, forum_posts, quiz_average, recorded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(record.id)
    .bind(&snapshot.student_id)
    .bind(snapshot.attendance_rate)
    .bind(snapshot.assignment_completion)
    .bind(snapshot.participation_score)
    .bind(snapshot.time_on_platform)
    .bind(snapshot.forum_posts)
    .bind(snapshot.quiz_average)
    .bind(record.recorded_at)
    .execute(pool)
    .await
    .context("failed to store metrics snapshot")?;

    Ok(result.rows_affected() > 0)
}

pub async fn fetch_latest_metrics(
    pool: &PgPool,
    student_id: &str,
) -> anyhow::Result<Option<MetricsRecord>> {
    let row = sqlx::query(
        "SELECT id, student_id, attendance_rate, assignment_completion, participation_score, \
         time_on_platform, forum_posts, quiz_average, recorded_at \
         FROM engagement.student_metrics \
         WHERE student_id = $1 \
         ORDER BY recorded_at DESC \
         LIMIT 1",
    )
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(metrics_from_row).transpose()?)
}

/// Latest snapshot for every student that has one.
pub async fn fetch_latest_metrics_all(pool: &PgPool) -> anyhow::Result<Vec<MetricsRecord>> {
    let rows = sqlx::query(
        "SELECT DISTINCT ON (student_id) id, student_id, attendance_rate, assignment_completion, \
         participation_score, time_on_platform, forum_posts, quiz_average, recorded_at \
         FROM engagement.student_metrics \
         ORDER BY student_id, recorded_at DESC",
    )
    .fetch_all(pool)
    .await?;

    let records = rows
        .iter()
        .map(metrics_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

struct SeedStudent {
    full_name: &'static str,
    email: &'static str,
    grade_level: Option<&'static str>,
    snapshots: Vec<SeedSnapshot>,
}

struct SeedSnapshot {
    id: Uuid,
    recorded_at: DateTime<Utc>,
    attendance_rate: f64,
    assignment_completion: f64,
    participation_score: f64,
    time_on_platform: f64,
    forum_posts: f64,
    quiz_average: Option<f64>,
}

impl SeedSnapshot {
    fn record(&self, student_id: &str) -> MetricsRecord {
        MetricsRecord {
            id: self.id,
            snapshot: MetricsSnapshot {
                student_id: student_id.to_string(),
                attendance_rate: self.attendance_rate,
                assignment_completion: self.assignment_completion,
                participation_score: self.participation_score,
                time_on_platform: self.time_on_platform,
                forum_posts: self.forum_posts,
                quiz_average: self.quiz_average,
            },
            recorded_at: self.recorded_at,
        }
    }
}

fn seed_students() -> anyhow::Result<Vec<SeedStudent>> {
    let base = Utc
        .with_ymd_and_hms(2026, 2, 2, 9, 0, 0)
        .single()
        .context("invalid seed timestamp")?;
    let snapshot = |id: u128, week: i64, values: [f64; 5], quiz_average: Option<f64>| SeedSnapshot {
        id: Uuid::from_u128(id),
        recorded_at: base + Duration::weeks(week),
        attendance_rate: values[0],
        assignment_completion: values[1],
        participation_score: values[2],
        time_on_platform: values[3],
        forum_posts: values[4],
        quiz_average,
    };

    Ok(vec![
        SeedStudent {
            full_name: "Avery Lee",
            email: "avery.lee@example.edu",
            grade_level: Some("10"),
            snapshots: vec![
                snapshot(
                    0x3d7f5d6f_24f7_4e8e_8b4b_3e7e44b4a7b2,
                    0,
                    [85.0, 75.0, 70.0, 120.0, 5.0],
                    Some(80.0),
                ),
                snapshot(
                    0x3d7f5d6f_24f7_4e8e_8b4b_3e7e44b4a7b3,
                    1,
                    [91.0, 88.0, 76.0, 240.0, 9.0],
                    Some(86.0),
                ),
            ],
        },
        SeedStudent {
            full_name: "Jules Moreno",
            email: "jules.moreno@example.edu",
            grade_level: Some("11"),
            snapshots: vec![snapshot(
                0x0c22f1f1_9184_4fd4_9b21_28c68a6a89dc,
                0,
                [62.0, 55.0, 48.0, 90.0, 2.0],
                None,
            )],
        },
        SeedStudent {
            full_name: "Kiara Patel",
            email: "kiara.patel@example.edu",
            grade_level: None,
            snapshots: vec![snapshot(
                0xd5a0a1a2_2a3c_44c2_8f73_60b7897a9dd2,
                0,
                [40.0, 35.0, 30.0, 45.0, 0.0],
                Some(52.0),
            )],
        },
    ])
}

/// Safe to rerun: seed snapshots have fixed ids, and only newly stored
/// snapshots get a prediction.
pub async fn seed(store: &PgStore) -> anyhow::Result<usize> {
    let pool = store.pool();
    let mut inserted = 0usize;

    for student in seed_students()? {
        let student_id = upsert_student(
            pool,
            student.full_name,
            student.email,
            student.grade_level,
        )
        .await?
        .to_string();

        for seed_snapshot in student.snapshots.iter() {
            let record = seed_snapshot.record(&student_id);
            if !insert_metrics_record(pool, &record).await? {
                continue;
            }

            let prediction = scorer::score(&record.snapshot);
            store
                .insert_prediction(&student_id, &prediction)
                .await
                .context("Failed to store prediction")?;
            inserted += 1;
        }
    }

    info!(inserted, "seed data inserted");
    Ok(inserted)
}

/// One student's metrics as they appear in an import file.
#[derive(Debug, Deserialize)]
pub struct MetricsCsvRow {
    pub full_name: String,
    pub email: String,
    pub grade_level: Option<String>,
    pub attendance_rate: f64,
    pub assignment_completion: f64,
    pub participation_score: f64,
    pub time_on_platform: f64,
    pub forum_posts: f64,
    pub quiz_average: Option<f64>,
}

impl MetricsCsvRow {
    pub fn snapshot(&self, student_id: &str) -> MetricsSnapshot {
        MetricsSnapshot {
            student_id: student_id.to_string(),
            attendance_rate: self.attendance_rate,
            assignment_completion: self.assignment_completion,
            participation_score: self.participation_score,
            time_on_platform: self.time_on_platform,
            forum_posts: self.forum_posts,
            quiz_average: self.quiz_average,
        }
    }
}

pub fn read_metrics_csv(csv_path: &Path) -> anyhow::Result<Vec<MetricsCsvRow>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut rows = Vec::new();

    for (line, result) in reader.deserialize::<MetricsCsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid metrics row {}", line + 1))?;
        rows.push(row);
    }

    Ok(rows)
}

/// Stores each row's student and snapshot, then scores and stores a prediction.
pub async fn import_csv(store: &PgStore, csv_path: &Path) -> anyhow::Result<usize> {
    let rows = read_metrics_csv(csv_path)?;
    let pool = store.pool();
    let mut imported = 0usize;

    for row in rows.iter() {
        let student_id =
            upsert_student(pool, &row.full_name, &row.email, row.grade_level.as_deref()).await?;
        let snapshot = row.snapshot(&student_id.to_string());
        insert_metrics(pool, &snapshot, Utc::now()).await?;

        let prediction = scorer::score(&snapshot);
        store
            .insert_prediction(&snapshot.student_id, &prediction)
            .await
            .context("Failed to store prediction")?;
        imported += 1;
    }

    info!(imported, path = %csv_path.display(), "metrics imported");
    Ok(imported)
}
