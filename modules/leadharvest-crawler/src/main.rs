use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use leadharvest_common::{BlacklistMode, Config, Query};
use leadharvest_crawler::harvest::{self, HarvestConfig};
use leadharvest_crawler::planner;
use leadharvest_crawler::renderer::{RendererFactory, WebDriverFactory};

#[derive(Parser)]
#[command(name = "leadharvest")]
#[command(about = "Harvest brand-owner leads from map listings")]
#[command(version)]
struct Cli {
    /// Comma-separated search keywords
    #[arg(long, value_delimiter = ',')]
    keywords: Vec<String>,

    /// Comma-separated localities, crossed with every keyword
    #[arg(long, value_delimiter = ',')]
    localities: Vec<String>,

    /// File with one full query per line; overrides --keywords/--localities
    #[arg(long)]
    queries_file: Option<PathBuf>,

    /// Override the worker count from the environment
    #[arg(long)]
    workers: Option<usize>,

    /// Score reseller keywords as a penalty instead of rejecting outright
    #[arg(long)]
    penalty_blacklist: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("leadharvest=info".parse()?))
        .init();

    let cli = Cli::parse();
    info!("Lead harvest starting...");

    let config = Config::from_env();
    config.log_summary();

    let queries = build_queries(&cli)?;
    if queries.is_empty() {
        anyhow::bail!("no queries given; pass --keywords or --queries-file");
    }

    let mut harvest_config = HarvestConfig::from_app_config(&config);
    if let Some(workers) = cli.workers {
        harvest_config.workers = workers;
    }
    if cli.penalty_blacklist {
        harvest_config.scoring.blacklist_mode = BlacklistMode::Penalty;
    }

    let factory: Arc<dyn RendererFactory> =
        Arc::new(WebDriverFactory::new(&config.webdriver_url, config.headless));
    let stats = harvest::run(queries, factory, harvest_config).await?;

    info!(
        total_unique = stats.total_unique,
        approved = stats.approved,
        aborted_workers = stats.workers_aborted(),
        "Run finished"
    );
    Ok(())
}

fn build_queries(cli: &Cli) -> Result<Vec<Query>> {
    if let Some(path) = &cli.queries_file {
        let text = std::fs::read_to_string(path)?;
        return Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(Query::new)
            .collect());
    }
    Ok(planner::expand(&cli.keywords, &cli.localities))
}
