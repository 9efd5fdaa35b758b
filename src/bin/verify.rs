use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use worldstar::{
    schema::{catalog::COUNTRY_INFO_ARTIFACT, expected_artifacts},
    store,
    verify::{verify, ArtifactDescriptor},
};

/// Re-check the artifacts of a previous run without rebuilding them.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[command(flatten)]
    config: worldstar::config::ConfigArgs,

    /// Leave dim_country_info out of the check
    #[arg(long)]
    skip_enrichment: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(log_level.parse().unwrap_or(Level::INFO.into())),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = args.config.resolve().context("loading configuration")?;
    let store = store::open(&config.storage)
        .await
        .context("opening object store")?;

    let descriptors: Vec<ArtifactDescriptor> = expected_artifacts()
        .into_iter()
        .filter(|name| !(args.skip_enrichment && *name == COUNTRY_INFO_ARTIFACT))
        .map(|name| ArtifactDescriptor::in_dir(&config.output_dir, name))
        .collect();

    let report = verify(&descriptors, store.as_ref(), &[]).await;
    println!("{}", report);
    for defect in report.defects() {
        println!("defect: {}", defect);
    }
    info!(clean = report.is_clean(), "verification done");
    Ok(())
}
