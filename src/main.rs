use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use covtree::cli::{self, Style};
use covtree::config::DisplayConfig;
use covtree::detect::Format;
use covtree::metric::MetricMode;
use covtree::provider::ReportFileProvider;
use covtree::session::CoverageSession;

/// covtree: browse a coverage report as an aggregated directory tree.
#[derive(Parser)]
#[command(name = "covtree", version, about)]
struct Cli {
    /// JSON display configuration (metric, thresholds).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Which percentage to show for each node. Overrides the config file.
    #[arg(long, global = true, env = "COVTREE_METRIC", value_enum)]
    metric: Option<MetricMode>,

    /// Override format detection.
    #[arg(long, global = true, value_enum)]
    format: Option<Format>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the aggregated coverage tree of a report.
    Tree {
        /// Path to the coverage report (lcov or cobertura).
        report: PathBuf,

        /// Output style.
        #[arg(long, value_enum, default_value = "text")]
        style: Style,

        /// Hide positions deeper than this many path segments.
        #[arg(long)]
        depth: Option<usize>,
    },

    /// Show overall totals of a report.
    Summary {
        /// Path to the coverage report.
        report: PathBuf,
    },

    /// Show coverage for one file or directory, with line detail for files.
    File {
        /// Path to the coverage report.
        report: PathBuf,

        /// Source path or URI as stored in the report.
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    let mut config = match &args.config {
        Some(path) => DisplayConfig::load(path).context("Failed to load configuration")?,
        None => DisplayConfig::default(),
    };
    if let Some(metric) = args.metric {
        config.metric = metric;
    }

    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling");
                token.cancel();
            }
        });
    }

    let session = |report: &PathBuf| {
        CoverageSession::new(Arc::new(ReportFileProvider::new(report.clone(), args.format)))
    };

    let output = match &args.command {
        Commands::Tree {
            report,
            style,
            depth,
        } => {
            let options = config.render_options(*depth);
            cli::cmd_tree(&session(report), &options, *style, &token).await?
        }
        Commands::Summary { report } => {
            cli::cmd_summary(&session(report), &config, &token).await?
        }
        Commands::File { report, path } => {
            cli::cmd_file(&session(report), path, &config, &token).await?
        }
    };
    print!("{output}");
    Ok(())
}
