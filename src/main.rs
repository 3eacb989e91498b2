use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use campaign_metrics::aggregate::{
    dataset_stats, Aggregator, Snapshot, BROWSE_PAGE_SIZE, MAX_BROWSE_PAGE,
};
use campaign_metrics::config::Config;
use campaign_metrics::report;
use campaign_metrics::store::PgStore;

#[derive(Parser)]
#[command(name = "campaign-metrics")]
#[command(about = "Channel KPIs, weekly trends and reports for outreach campaigns", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo datasets
    Seed,
    /// Show per-channel metrics
    Metrics,
    /// Show the four-week trend
    Trends,
    /// Generate a performance report
    Report {
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List uploaded datasets
    Datasets,
    /// Page through one dataset's records
    Records {
        #[arg(long)]
        dataset: Uuid,
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..=MAX_BROWSE_PAGE))]
        page: u64,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("campaign_metrics=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

fn print_notices(notices: &[String]) {
    for notice in notices {
        eprintln!("! {notice}");
    }
}

fn print_metrics(snapshot: &Snapshot) {
    for metrics in &snapshot.metrics {
        let config = metrics.channel.config();
        println!(
            "{}: {} {}",
            metrics.channel.display_name(),
            metrics.total,
            config.total_label
        );
        for count in &metrics.counts {
            println!("  {:<10} {}", count.label, count.count);
        }
        for rate in &metrics.rates {
            println!("  {:<10} {:.1}%", format!("{} rate", rate.name), rate.value);
        }
        println!("  {}: {}", config.facet_label, metrics.facets.join(", "));
        for record in &metrics.recent_activity {
            println!("  - {} on {}", record.contact, record.occurred_on);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = PgStore::new(pool);

    match cli.command {
        Commands::InitDb => {
            store.init_db().await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = store.seed(Utc::now().date_naive()).await?;
            println!("Seed data inserted ({inserted} new records).");
        }
        Commands::Metrics => {
            let aggregator = Aggregator::new(store, config.retry);
            let snapshot = aggregator.snapshot().await;
            print_notices(&snapshot.notices);
            print_metrics(&snapshot);
        }
        Commands::Trends => {
            let aggregator = Aggregator::new(store, config.retry);
            let series = aggregator.trends(Utc::now().date_naive()).await;
            print_notices(&series.notices);
            for point in &series.points {
                println!("{} ({} to {})", point.label, point.week_start, point.week_end);
                for value in &point.values {
                    println!(
                        "  {} {:<10} {:.1}%",
                        value.channel.display_name(),
                        value.rate,
                        value.value
                    );
                }
            }
        }
        Commands::Report { format, out } => {
            let aggregator = Aggregator::new(store, config.retry);
            let (report, snapshot) = aggregator.report(Utc::now()).await;
            print_notices(&snapshot.notices);

            let (rendered, default_name) = match format {
                ReportFormat::Json => (
                    report::render_json(&report)?,
                    format!("performance-report-{}.json", report.generated_at.date_naive()),
                ),
                ReportFormat::Markdown => {
                    let series = aggregator.trends(report.generated_at.date_naive()).await;
                    print_notices(&series.notices);
                    (
                        report::render_markdown(&report, &snapshot, &series.points),
                        format!("performance-report-{}.md", report.generated_at.date_naive()),
                    )
                }
            };

            let out = out.unwrap_or_else(|| PathBuf::from(default_name));
            std::fs::write(&out, rendered)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Datasets => {
            let aggregator = Aggregator::new(store, config.retry);
            let (datasets, notice) = aggregator.datasets().await;
            print_notices(notice.as_slice());
            let stats = dataset_stats(&datasets);

            if datasets.is_empty() {
                println!("No datasets uploaded yet.");
                return Ok(());
            }

            println!(
                "{} datasets, {} rows total",
                datasets.len(),
                stats.total_rows
            );
            for (channel, count) in &stats.by_type {
                println!("  {}: {count}", channel.display_name());
            }
            for dataset in &datasets {
                println!(
                    "- {} {} [{}] {} rows, uploaded {}{}",
                    dataset.id,
                    dataset.name,
                    dataset.channel,
                    dataset.row_count,
                    dataset.upload_date.date_naive(),
                    if dataset.tags.is_empty() {
                        String::new()
                    } else {
                        format!(" ({})", dataset.tags.join(", "))
                    }
                );
            }
        }
        Commands::Records { dataset, page } => {
            let aggregator = Aggregator::new(store, config.retry);
            let found = aggregator
                .find_dataset(dataset)
                .await?
                .with_context(|| format!("dataset {dataset} not found"))?;
            let index = usize::try_from(page - 1).context("page number too large")?;
            let records = aggregator.browse(&found, index).await?;
            let pages = found.page_count(BROWSE_PAGE_SIZE);

            if records.is_empty() {
                println!("No records on page {page} of {pages} in {}.", found.name);
                return Ok(());
            }

            println!("{} [{}], page {page} of {pages}", found.name, found.channel);
            for record in &records {
                let outcomes: Vec<String> = record
                    .outcomes
                    .iter()
                    .map(|(field, value)| format!("{field}={value}"))
                    .collect();
                println!(
                    "- {} | {} | {} | {}",
                    record.contact,
                    record.facet.as_deref().unwrap_or("-"),
                    record.occurred_on,
                    outcomes.join(" ")
                );
            }
        }
    }

    Ok(())
}
