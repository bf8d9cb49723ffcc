use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use tributary::{catalog, AggregationResult, Aggregator, Config};

#[derive(Parser, Debug)]
#[command(name = "tributary", about = "Merge RSS/Atom feeds into one chronological stream")]
struct Args {
    /// Path to the source catalog (TOML)
    #[arg(long, default_value = "sources.toml")]
    sources: PathBuf,

    /// Config file path (defaults to ~/.config/tributary/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated source ids to refresh (default: every source)
    #[arg(long, value_name = "IDS")]
    only: Option<String>,

    /// Keep running, refreshing on the configured interval
    #[arg(long)]
    watch: bool,

    /// Print merged items as JSON instead of text
    #[arg(long)]
    json: bool,
}

/// Default config location: ~/.config/tributary/config.toml
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("tributary")
        .join("config.toml"))
}

fn print_result(result: &AggregationResult, json: bool) -> Result<()> {
    if json {
        let rendered = serde_json::to_string_pretty(&result.items)
            .context("Failed to serialize items as JSON")?;
        println!("{}", rendered);
        return Ok(());
    }

    for item in &result.items {
        println!(
            "{}  [{}] {}",
            item.published_at.format("%Y-%m-%d %H:%M"),
            item.category,
            item.title
        );
        if !item.link.is_empty() {
            println!("    {}", item.link);
        }
    }
    eprintln!(
        "{} items from refresh started at {}",
        result.items.len(),
        result.refresh_started_at.format("%Y-%m-%d %H:%M:%S")
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let sources = catalog::load_sources(&args.sources)
        .with_context(|| format!("Failed to load sources from {}", args.sources.display()))?;
    if sources.is_empty() {
        eprintln!(
            "Warning: no usable sources in {}, nothing to aggregate",
            args.sources.display()
        );
    }

    // Which sources participate in this run; validity is checked by refresh
    let active: Vec<String> = match &args.only {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => sources.iter().map(|s| s.id.clone()).collect(),
    };

    let aggregator = Aggregator::from_config(&config).context("Failed to create aggregator")?;

    if args.watch {
        // tokio::time::interval panics on a zero period; a zero in the
        // config means "as fast as allowed", clamped to one minute
        let period = Duration::from_secs(config.refresh_interval_minutes.max(1) * 60);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let result = aggregator.refresh(&sources, &active).await?;
            print_result(&result, args.json)?;
        }
    }

    let result = aggregator.refresh(&sources, &active).await?;
    print_result(&result, args.json)?;
    Ok(())
}
