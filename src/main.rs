use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use mail_organizer::api::{ApiState, api_routes};
use mail_organizer::config::AppConfig;
use mail_organizer::connector::{ImapConnector, MailConnector};
use mail_organizer::inference::Inference;
use mail_organizer::pipeline::{
    Category, FetchFilter, FetchWindow, InboxStats, Orchestrator, ProgressStatus,
    filter_records,
};
use mail_organizer::rules::RuleSet;
use mail_organizer::store::LibSqlRecordStore;

#[derive(Parser)]
#[command(name = "mail-organizer")]
#[command(about = "Classify, summarize and label your inbox", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a batch from the mailbox, enrich it and store new records
    Run {
        /// today, 1d, 2d, 7d or all
        #[arg(long, default_value = "today", value_parser = parse_window)]
        window: FetchWindow,

        #[arg(long, default_value_t = 50)]
        max: usize,

        #[arg(long)]
        unread_only: bool,
    },

    /// List stored records, newest first
    List {
        /// Category label, e.g. "Finance & Fees"
        #[arg(long, value_parser = parse_category)]
        category: Option<Category>,

        #[arg(long, value_parser = parse_window)]
        window: Option<FetchWindow>,
    },

    /// Print inbox statistics
    Stats,

    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

fn parse_window(s: &str) -> Result<FetchWindow, String> {
    FetchWindow::parse(s).ok_or_else(|| format!("unknown window '{s}' (today, 1d, 2d, 7d, all)"))
}

fn parse_category(s: &str) -> Result<Category, String> {
    Category::from_label(s).ok_or_else(|| format!("unknown category '{s}'"))
}

/// Console logging plus an optional daily-rolling file. The returned guard
/// must live until exit so buffered file output is flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mail-organizer.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .init();

    guard
}

fn status_label(status: ProgressStatus) -> String {
    match status {
        ProgressStatus::Saved => "saved".to_string(),
        ProgressStatus::AlreadyStored => "already stored".to_string(),
        ProgressStatus::SkippedUnreadable => "skipped (no readable text)".to_string(),
        ProgressStatus::Failed(stage) => format!("failed at {stage}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("Configuration error")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    let rules = match &config.rules_path {
        Some(path) => RuleSet::load(path)
            .with_context(|| format!("Failed to load rule set from {}", path.display()))?,
        None => RuleSet::default(),
    };

    let store = Arc::new(
        LibSqlRecordStore::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    let inference = Inference::hosted(&config.inference, &config.pipeline);
    let orchestrator = Arc::new(Orchestrator::new(
        store,
        inference,
        &rules,
        &config.pipeline,
    )?);

    let connector: Option<Arc<dyn MailConnector>> = config
        .email
        .clone()
        .map(|c| Arc::new(ImapConnector::new(c)) as Arc<dyn MailConnector>);

    match cli.cmd {
        Command::Run {
            window,
            max,
            unread_only,
        } => {
            let Some(connector) = connector else {
                bail!("EMAIL_IMAP_HOST is not set; no mailbox to fetch from");
            };
            let filter = FetchFilter {
                max_results: max,
                unread_only,
                ..FetchFilter::for_window(window, Utc::now().date_naive())
            };

            let report = orchestrator
                .run_batch(connector.as_ref(), &filter, |p| {
                    eprintln!(
                        "[{}/{}] {}: {}",
                        p.index,
                        p.total,
                        status_label(p.status),
                        p.subject
                    );
                })
                .await?;

            println!(
                "Processed {} emails, {} new ({} already stored, {} unreadable, {} failed, {} label failures)",
                report.attempted,
                report.newly_saved,
                report.skipped_existing,
                report.skipped_unreadable,
                report.failed,
                report.label_failures
            );
        }

        Command::List { category, window } => {
            let records = orchestrator.store().list_all().await?;
            let since = window.and_then(|w| w.since(Utc::now().date_naive()));
            let shown = filter_records(&records, category, since);

            for r in &shown {
                let flags = format!(
                    "{}{}",
                    if r.is_phishing { "!" } else { " " },
                    if r.is_newsletter { "N" } else { " " }
                );
                println!(
                    "{}  {:<26} {} {}",
                    r.timestamp.format("%Y-%m-%d %H:%M"),
                    r.category.as_str(),
                    flags,
                    r.subject
                );
            }
            println!("{} of {} records", shown.len(), records.len());
        }

        Command::Stats => {
            let records = orchestrator.store().list_all().await?;
            let stats = InboxStats::from_records(&records);

            println!("Total emails:     {}", stats.total);
            println!("Categories used:  {}", stats.categories_used);
            println!(
                "Top category:     {}",
                stats.top_category.map_or("-", |c| c.as_str())
            );
            println!("Phishing alerts:  {}", stats.phishing);
            println!("Newsletters:      {}", stats.newsletters);
            println!();
            for c in stats.per_category.iter().filter(|c| c.count > 0) {
                println!("  {:<26} {}", c.category.as_str(), c.count);
            }
        }

        Command::Serve { port } => {
            let app = api_routes(ApiState::new(orchestrator, connector));
            let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
                .await
                .with_context(|| format!("Failed to bind port {port}"))?;
            tracing::info!(port, "API server started");
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
