use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::num::NonZeroU32;
use std::process::ExitCode;
use std::sync::Arc;
use tourcat::catalog::CatalogApi;
use tourcat::cli::{Args, Command};
use tourcat::config::Config;
use tourcat::listing::{ListingConfig, TourListing};
use tourcat::logging::setup_logging;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config and setup logging before anything else so startup logs are never dropped
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err:#}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        catalog = %config.catalog_base_url,
        "starting tourcat"
    );

    match run(&config, args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("command failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &Config, command: Command) -> anyhow::Result<()> {
    let api = CatalogApi::new(
        config.catalog_url()?,
        config.request_timeout,
        NonZeroU32::new(config.rate_limit_per_second),
    )?;
    let listing = TourListing::new(Arc::new(api), ListingConfig::from(config));

    match command {
        Command::List(list) => {
            let view = listing.load(&list.criteria(), list.page).await;
            print_json(&view)?;
            if view.is_error {
                anyhow::bail!(view.error.unwrap_or_else(|| "listing failed".to_string()));
            }
        }
        Command::Tour { slug } => {
            let tour = listing
                .tour(&slug)
                .await
                .with_context(|| format!("Failed to load tour '{slug}'"))?;
            print_json(&tour)?;
        }
        Command::Agency { id } => {
            let agency = listing
                .agency(id)
                .await
                .with_context(|| format!("Failed to load agency {id}"))?;
            print_json(&agency)?;
        }
    }

    let stats = listing.stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        requests = stats.request_count,
        hit_rate = stats.hit_rate(),
        average_latency_ms = stats.average_latency_ms(),
        "cache statistics"
    );
    Ok(())
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}
