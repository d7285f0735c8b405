//! Leadharvest CLI - Command-line interface for the Leadharvest daemon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_API_URL: &str = "http://127.0.0.1:8090";

#[derive(Parser)]
#[command(name = "leadharvest")]
#[command(about = "Leadharvest scraping pipeline CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Daemon API URL
    #[arg(long, env = "LEADHARVEST_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new job
    Start {
        /// Job kind (postcode_discovery, business_discovery, email_harvest, workflow)
        #[arg(short, long)]
        kind: String,

        /// Postcode area to seed from (e.g. "M" for Manchester)
        #[arg(short, long)]
        area: Option<String>,

        /// Business category filter
        #[arg(short, long)]
        category: Option<String>,

        /// Maximum number of items to process
        #[arg(short, long)]
        limit: Option<u64>,

        /// Start the next pipeline stage when this one completes
        #[arg(long)]
        chain: bool,
    },

    /// Show the status of a job
    Status {
        /// Job ID
        job_id: String,
    },

    /// Terminate a running job
    Terminate {
        /// Job ID
        job_id: String,
    },

    /// Show queue counters for a pipeline stage
    QueueStats {
        /// Stage name (business_discovery or email_harvest)
        stage: String,
    },

    /// Release stale claims left by crashed workers
    RecoverStale {
        /// Stage name (business_discovery or email_harvest)
        stage: String,
    },

    /// Check the daemon is reachable
    Health,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: String,
    detail: String,
}

#[derive(Deserialize, Tabled)]
struct StartResult {
    job_id: String,
    kind: String,
    status: String,
}

async fn request(builder: reqwest::RequestBuilder) -> Result<serde_json::Value> {
    let response = builder.send().await.context("Failed to connect to daemon")?;
    let status = response.status();
    let body = response.text().await.context("Failed to read response")?;

    if !status.is_success() {
        if let Ok(err) = serde_json::from_str::<ApiErrorBody>(&body) {
            anyhow::bail!("API error ({}): {}", err.error, err.detail);
        }
        anyhow::bail!("API error ({}): {}", status, body);
    }

    serde_json::from_str(&body).context("Failed to parse response")
}

fn print_counter(label: &str, value: &serde_json::Value) {
    println!("  {} {}", format!("{label}:").bold(), value);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Start {
            kind,
            area,
            category,
            limit,
            chain,
        } => {
            let body = json!({
                "kind": kind,
                "area": area,
                "category": category,
                "limit": limit,
                "chain": chain,
            });

            let url = format!("{}/api/jobs", cli.api_url);
            let result = request(client.post(&url).json(&body)).await?;
            let start_result: StartResult = serde_json::from_value(result)?;

            println!("{}", "✓ Job started".green().bold());
            println!();

            let table = Table::new(vec![start_result]).to_string();
            println!("{}", table);
        }

        Commands::Status { job_id } => {
            let url = format!("{}/api/jobs/{}", cli.api_url, job_id);
            let snapshot = request(client.get(&url)).await?;

            println!("{}", format!("Job {job_id}").cyan().bold());
            println!();
            print_counter("Kind", &snapshot["kind"]);
            print_counter("Status", &snapshot["status"]);
            print_counter("Total targets", &snapshot["total_targets"]);
            println!();

            let stats = &snapshot["stats"];
            print_counter("Processed", &stats["processed"]);
            print_counter("Found", &stats["found"]);
            print_counter("No email", &stats["checked_no_email"]);
            print_counter("Failed", &stats["failed"]);
            print_counter("Skipped", &stats["skipped"]);
            print_counter("Collected", &stats["results_collected"]);
            println!();

            let elapsed_s = snapshot["elapsed_ms"].as_i64().unwrap_or(0) as f64 / 1000.0;
            println!("  {} {:.1} s", "Elapsed:".bold(), elapsed_s);
            println!(
                "  {} {:.1} items/min",
                "Rate:".bold(),
                snapshot["rate_per_minute"].as_f64().unwrap_or(0.0)
            );
        }

        Commands::Terminate { job_id } => {
            let url = format!("{}/api/jobs/{}/terminate", cli.api_url, job_id);
            let result = request(client.post(&url)).await?;

            println!(
                "{}",
                format!("✓ Job {} -> {}", job_id, result["status"]).green().bold()
            );
        }

        Commands::QueueStats { stage } => {
            let url = format!("{}/api/queue/{}/stats", cli.api_url, stage);
            let stats = request(client.get(&url)).await?;

            println!("{}", format!("Queue: {stage}").cyan().bold());
            println!();
            print_counter("Pending", &stats["pending"]);
            print_counter("Processing", &stats["processing"]);
            print_counter("Found", &stats["found"]);
            print_counter("No email", &stats["checked_no_email"]);
            print_counter("Failed", &stats["failed"]);
            print_counter("Skipped", &stats["skipped"]);
            print_counter("Total", &stats["total"]);
        }

        Commands::RecoverStale { stage } => {
            let url = format!("{}/api/queue/{}/recover-stale", cli.api_url, stage);
            let result = request(client.post(&url)).await?;

            let recovered = result["recovered"].as_u64().unwrap_or(0);
            if recovered > 0 {
                println!(
                    "{}",
                    format!("✓ Released {recovered} stale claims").green().bold()
                );
            } else {
                println!("{}", "○ No stale claims found".yellow());
            }
        }

        Commands::Health => {
            let url = format!("{}/health", cli.api_url);
            match request(client.get(&url)).await {
                Ok(body) => {
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!("  {} {}", "Version:".bold(), body["version"]);
                    println!("  {} {}", "API URL:".bold(), cli.api_url);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }
    }

    Ok(())
}
