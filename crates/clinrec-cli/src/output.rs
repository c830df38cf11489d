//! Table and JSON output formatting for CLI commands.

use serde::Serialize;
use tabled::{Table, Tabled};

use clinrec_entity::job::{JobStats, RecommendationJob};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON output
    Json,
}

/// One table row per job
#[derive(Debug, Serialize, Tabled)]
pub struct JobRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Session")]
    pub session_id: String,
    #[tabled(rename = "Patient")]
    pub patient_id: String,
    #[tabled(rename = "Type")]
    pub job_type: String,
    #[tabled(rename = "Priority")]
    pub priority: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Attempts")]
    pub attempt_count: i32,
    #[tabled(rename = "Created")]
    pub created_at: String,
    #[tabled(rename = "Error")]
    pub error_message: String,
}

impl From<&RecommendationJob> for JobRow {
    fn from(job: &RecommendationJob) -> Self {
        Self {
            id: job.id.to_string(),
            session_id: job.session_id.clone(),
            patient_id: job.patient_id.clone(),
            job_type: job.job_type.to_string(),
            priority: job.priority.to_string(),
            status: job.status.to_string(),
            attempt_count: job.attempt_count,
            created_at: job.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            error_message: job.error_message.clone().unwrap_or_default(),
        }
    }
}

/// Print jobs in the selected format. JSON output carries full records.
pub fn print_jobs(jobs: &[RecommendationJob], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
            print_list(&rows, format);
        }
        OutputFormat::Json => print_json(&jobs, "[]"),
    }
}

/// Print a single job
pub fn print_job(job: &RecommendationJob, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            print_kv("ID", &job.id.to_string());
            print_kv("Session", &job.session_id);
            print_kv("Patient", &job.patient_id);
            print_kv("Type", job.job_type.as_str());
            print_kv("Priority", job.priority.as_str());
            print_kv("Status", job.status.as_str());
            print_kv("Attempts", &job.attempt_count.to_string());
            print_kv("Created", &job.created_at.to_rfc3339());
            print_kv("Updated", &job.updated_at.to_rfc3339());
            print_kv("Started", &optional(job.started_at.map(|t| t.to_rfc3339())));
            print_kv("Completed", &optional(job.completed_at.map(|t| t.to_rfc3339())));
            print_kv("Input", &job.input_data.to_string());
            print_kv("Results", &optional(job.results.as_ref().map(|v| v.to_string())));
            print_kv("Error", &optional(job.error_message.clone()));
        }
        OutputFormat::Json => print_json(job, "{}"),
    }
}

/// Print queue statistics
pub fn print_stats(stats: &JobStats, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            print_kv("Total", &stats.total.to_string());
            for (status, count) in &stats.by_status {
                print_kv(&format!("status {}", status), &count.to_string());
            }
            for (job_type, count) in &stats.by_type {
                print_kv(&format!("type {}", job_type), &count.to_string());
            }
            print_kv(
                "Avg processing (s)",
                &optional(stats.avg_processing_seconds.map(|s| format!("{:.2}", s))),
            );
        }
        OutputFormat::Json => print_json(stats, "{}"),
    }
}

/// Print a list of items in the selected format
pub fn print_list<T: Serialize + Tabled>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No results found.");
            } else {
                let table = Table::new(items).to_string();
                println!("{}", table);
            }
        }
        OutputFormat::Json => print_json(&items, "[]"),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T, fallback: &str) {
    let json = serde_json::to_string_pretty(value).unwrap_or_else(|_| fallback.to_string());
    println!("{}", json);
}

fn optional(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

/// Print a success message
pub fn print_success(msg: &str) {
    println!("✓ {}", msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("⚠ {}", msg);
}

/// Print an error message
pub fn print_error(msg: &str) {
    eprintln!("✗ {}", msg);
}

/// Print a key-value pair
pub fn print_kv(key: &str, value: &str) {
    println!("  {:<24} {}", format!("{}:", key), value);
}
