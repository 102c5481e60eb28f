use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use engagement_predictor::db::{self, PgStore};
use engagement_predictor::models::{MetricsSnapshot, PredictionResult};
use engagement_predictor::report;
use engagement_predictor::service::{EngagementService, DEFAULT_TRENDS_LIMIT};
use engagement_predictor::store::PredictionStore;

#[derive(Parser)]
#[command(name = "engagement-predictor")]
#[command(about = "Student engagement scoring and summaries", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    /// Maximum pooled connections
    #[arg(long, env = "PG_MAX_CONNECTIONS", default_value_t = 5, global = true)]
    max_connections: u32,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct MetricsArgs {
    #[arg(long)]
    student_id: String,
    #[arg(long)]
    attendance_rate: f64,
    #[arg(long)]
    assignment_completion: f64,
    #[arg(long)]
    participation_score: f64,
    /// Minutes per week
    #[arg(long)]
    time_on_platform: f64,
    #[arg(long)]
    forum_posts: f64,
    #[arg(long)]
    quiz_average: Option<f64>,
}

impl MetricsArgs {
    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            student_id: self.student_id.clone(),
            attendance_rate: self.attendance_rate,
            assignment_completion: self.assignment_completion,
            participation_score: self.participation_score,
            time_on_platform: self.time_on_platform,
            forum_posts: self.forum_posts,
            quiz_average: self.quiz_average,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample students, metrics and predictions
    Seed,
    /// Import student metrics from a CSV file and score each row
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Store a metrics snapshot without scoring it
    RecordMetrics {
        #[command(flatten)]
        metrics: MetricsArgs,
    },
    /// Score a metrics snapshot and store the prediction
    Predict {
        #[command(flatten)]
        metrics: MetricsArgs,
        /// Also store the snapshot in the metrics history
        #[arg(long)]
        record: bool,
    },
    /// Score the latest stored snapshot of a student
    PredictLatest {
        #[arg(long)]
        student_id: String,
    },
    /// Summarize the latest prediction of every student
    Summary,
    /// Show recent predictions for a student
    Trends {
        #[arg(long)]
        student_id: String,
        #[arg(long, default_value_t = DEFAULT_TRENDS_LIMIT)]
        limit: u32,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "engagement-report.md")]
        out: PathBuf,
    },
    /// Answer one JSON action request from a file or stdin
    Handle {
        #[arg(long)]
        request: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn print_prediction(student_id: &str, prediction: &PredictionResult) {
    let factors = &prediction.factors;
    println!(
        "{} score {:.2} ({}), confidence {:.2}%",
        student_id, prediction.engagement_score, prediction.engagement_level, prediction.confidence
    );
    println!("- attendance    {:>6.2}", factors.attendance_impact);
    println!("- assignments   {:>6.2}", factors.assignment_impact);
    println!("- participation {:>6.2}", factors.participation_impact);
    println!("- platform time {:>6.2}", factors.time_impact);
    println!("- forum posts   {:>6.2}", factors.activity_impact);
    println!("- quizzes       {:>6.2}", factors.performance_impact);
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let database_url = cli
        .database_url
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(cli.max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    debug!(max_connections = cli.max_connections, "connected to Postgres");

    let service = EngagementService::new(PgStore::new(pool));
    let store = service.store();

    match cli.command {
        Commands::InitDb => {
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(store).await?;
            println!("Seed data inserted ({inserted} new snapshots).");
        }
        Commands::Import { csv } => {
            let imported = db::import_csv(store, &csv).await?;
            println!("Scored {imported} students from {}.", csv.display());
        }
        Commands::RecordMetrics { metrics } => {
            let record = db::insert_metrics(store.pool(), &metrics.snapshot(), Utc::now()).await?;
            println!(
                "Recorded metrics {} for {}.",
                record.id, record.snapshot.student_id
            );
        }
        Commands::Predict { metrics, record } => {
            let snapshot = metrics.snapshot();
            if record {
                db::insert_metrics(store.pool(), &snapshot, Utc::now()).await?;
            }
            let prediction = service.predict(&snapshot).await?;
            print_prediction(&snapshot.student_id, &prediction);
        }
        Commands::PredictLatest { student_id } => {
            let latest = db::fetch_latest_metrics(store.pool(), &student_id)
                .await?
                .with_context(|| format!("no metrics recorded for {student_id}"))?;
            info!(recorded_at = %latest.recorded_at, "scoring latest metrics");
            let prediction = service.predict(&latest.snapshot).await?;
            print_prediction(&student_id, &prediction);
        }
        Commands::Summary => {
            let summary = service.summary().await?;
            if summary.total == 0 {
                println!("No predictions recorded yet.");
                return Ok(ExitCode::SUCCESS);
            }

            println!("Engagement across {} students:", summary.total);
            println!("- high   {}", summary.high);
            println!("- medium {}", summary.medium);
            println!("- low    {}", summary.low);
            println!("Average score {:.2}", summary.average_score);
        }
        Commands::Trends { student_id, limit } => {
            let trends = service.trends(&student_id, limit).await?;
            if trends.is_empty() {
                println!("No predictions found for {student_id}.");
                return Ok(ExitCode::SUCCESS);
            }

            println!("Recent predictions for {student_id}:");
            for record in trends.iter() {
                println!(
                    "- {} score {:.2} ({}), confidence {:.2}%",
                    record.predicted_at.format("%Y-%m-%d %H:%M"),
                    record.prediction.engagement_score,
                    record.prediction.engagement_level,
                    record.prediction.confidence
                );
            }
        }
        Commands::Report { out } => {
            let predictions = store.fetch_predictions().await?;
            let students = db::fetch_students(store.pool()).await?;
            let metrics = db::fetch_latest_metrics_all(store.pool()).await?;
            let report =
                report::build_report(Utc::now().date_naive(), &predictions, &students, &metrics);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Handle { request } => {
            let raw = match request {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut buffer = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buffer)
                        .context("failed to read request from stdin")?;
                    buffer
                }
            };

            let response = service.handle_json(&raw).await;
            println!("{}", serde_json::to_string_pretty(&response.body)?);
            if !response.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
