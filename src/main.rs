use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

use worldstar::{
    bundle::extract_bundle,
    config::ConfigArgs,
    pipeline::{BranchStatus, Pipeline},
    store,
};

/// Build the star schema from the raw sources and publish every table.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,

    /// Zip archive of the raw sources, unpacked into the input directory first
    #[arg(long)]
    bundle: Option<std::path::PathBuf>,

    /// Do not call the country service; dim_country_info is not produced
    #[arg(long)]
    skip_enrichment: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(log_level.parse().unwrap_or(Level::INFO.into())),
        )
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) resolve config ───────────────────────────────────────────
    let args = Args::parse();
    let mut config = args.config.resolve().context("loading configuration")?;
    if args.skip_enrichment {
        config.enrichment.enabled = false;
    }

    // ─── 3) unpack raw sources ───────────────────────────────────────
    if let Some(bundle) = &args.bundle {
        let files = extract_bundle(bundle, &config.input_dir)
            .with_context(|| format!("extracting {}", bundle.display()))?;
        info!(files = files.len(), "sources unpacked");
    }

    // ─── 4) open store & run ─────────────────────────────────────────
    let store = store::open(&config.storage)
        .await
        .context("opening object store")?;
    let pipeline = Pipeline::from_config(&config, store).context("building pipeline")?;
    let summary = pipeline.run().await;

    // ─── 5) report ───────────────────────────────────────────────────
    for outcome in &summary.outcomes {
        match &outcome.status {
            BranchStatus::Published(_) => info!("{}", outcome),
            BranchStatus::Skipped(_) => warn!("{}", outcome),
            BranchStatus::Failed(_) => error!("{}", outcome),
        }
    }
    println!("{}", summary.report);
    for defect in summary.report.defects() {
        println!("defect: {}", defect);
    }

    // data defects are reported, they do not change the exit status
    info!(failed = summary.failed(), "all done");
    Ok(())
}
