// src/pipeline.rs
//
// One full run: dimensions, fact, enrichment, then verification. Each table
// is its own branch; a failing branch is recorded and the run moves on.

use chrono::{DateTime, Local};
use std::{collections::BTreeSet, fmt, path::PathBuf, sync::Arc};
use tracing::{error, info, info_span, instrument, warn, Instrument};

use crate::artifact::{Artifact, ArtifactWriter};
use crate::config::PipelineConfig;
use crate::error::{ConfigError, PipelineError};
use crate::fetch::{CountryClient, EnrichedEntityRecord};
use crate::process::{
    codes::{AreaRefs, EntityCode},
    dimension::transform_dimension,
    fact::{transform_fact, write_countries_list, FactOptions},
};
use crate::schema::{
    catalog::{COUNTRY_INFO_ARTIFACT, DIMENSIONS, WORLD_DATA},
    TableSpec,
};
use crate::store::ObjectStore;
use crate::verify::{verify, ArtifactDescriptor, RowExpectation, VerificationReport};

#[derive(Debug)]
pub enum BranchStatus {
    Published(Artifact),
    Failed(PipelineError),
    Skipped(String),
}

/// What happened to one output table.
#[derive(Debug)]
pub struct BranchOutcome {
    pub artifact: String,
    pub status: BranchStatus,
}

impl BranchOutcome {
    fn from_result(artifact: &str, result: Result<Artifact, PipelineError>) -> Self {
        let status = match result {
            Ok(a) => BranchStatus::Published(a),
            Err(e) => BranchStatus::Failed(e),
        };
        Self {
            artifact: artifact.to_string(),
            status,
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self.status, BranchStatus::Published(_))
    }
}

impl fmt::Display for BranchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            BranchStatus::Published(a) => {
                write!(f, "{}: published ({} bytes)", self.artifact, a.bytes)
            }
            BranchStatus::Failed(e) => write!(f, "{}: failed: {}", self.artifact, e),
            BranchStatus::Skipped(why) => write!(f, "{}: skipped: {}", self.artifact, why),
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub outcomes: Vec<BranchOutcome>,
    pub report: VerificationReport,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, BranchStatus::Failed(_)))
            .count()
    }

    pub fn outcome(&self, artifact: &str) -> Option<&BranchOutcome> {
        self.outcomes.iter().find(|o| o.artifact == artifact)
    }
}

pub struct Pipeline {
    input_dir: PathBuf,
    writer: ArtifactWriter,
    fact: FactOptions,
    countries: Option<CountryClient>,
    min_resolved_ratio: f64,
}

impl Pipeline {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        writer: ArtifactWriter,
        fact: FactOptions,
        countries: Option<CountryClient>,
        min_resolved_ratio: f64,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            writer,
            fact,
            countries,
            min_resolved_ratio,
        }
    }

    /// Wire the components from a validated config and an opened store.
    pub fn from_config(
        config: &PipelineConfig,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, ConfigError> {
        let countries = if config.enrichment.enabled {
            Some(CountryClient::new(config.enrichment.options()?)?)
        } else {
            None
        };
        Ok(Self::new(
            &config.input_dir,
            ArtifactWriter::new(&config.output_dir, store),
            config.fact.options()?,
            countries,
            config.enrichment.min_resolved_ratio,
        ))
    }

    #[instrument(level = "info", skip_all, fields(input = %self.input_dir.display(), output = %self.writer.output_dir().display()))]
    pub async fn run(&self) -> RunSummary {
        let started = Local::now();
        let mut outcomes = Vec::new();

        for spec in DIMENSIONS {
            let span = info_span!("dimension", table = spec.source_file);
            let result = self.dimension(spec).instrument(span).await;
            if let Err(e) = &result {
                error!(artifact = spec.artifact, error = %e, "dimension branch failed");
            }
            outcomes.push(BranchOutcome::from_result(spec.artifact, result));
        }

        let area_refs = match self.fact(started).await {
            Ok((artifact, refs)) => {
                outcomes.push(BranchOutcome::from_result(WORLD_DATA.artifact, Ok(artifact)));
                Some(refs)
            }
            Err(e) => {
                error!(artifact = WORLD_DATA.artifact, error = %e, "fact branch failed");
                outcomes.push(BranchOutcome::from_result(WORLD_DATA.artifact, Err(e)));
                None
            }
        };

        let mut expectations = Vec::new();
        let enrichment = match (&self.countries, area_refs) {
            (None, _) => None,
            (Some(_), None) => {
                if let Err(e) = self.writer.discard(COUNTRY_INFO_ARTIFACT).await {
                    warn!(error = %e, "could not remove previous country table");
                }
                Some(BranchStatus::Skipped(
                    "no area codes: fact branch failed".to_string(),
                ))
            }
            (Some(client), Some(refs)) => {
                let codes = refs.entity_codes();
                expectations.push(RowExpectation::at_least_share(
                    COUNTRY_INFO_ARTIFACT,
                    codes.len(),
                    self.min_resolved_ratio,
                ));
                match self.enrich(client, &codes).await {
                    Ok(artifact) => Some(BranchStatus::Published(artifact)),
                    Err(e) => {
                        error!(artifact = COUNTRY_INFO_ARTIFACT, error = %e, "enrichment branch failed");
                        Some(BranchStatus::Failed(e))
                    }
                }
            }
        };

        match enrichment {
            Some(status) => outcomes.push(BranchOutcome {
                artifact: COUNTRY_INFO_ARTIFACT.to_string(),
                status,
            }),
            None => info!("enrichment disabled"),
        }

        // only what this run published counts as produced
        let descriptors: Vec<ArtifactDescriptor> = outcomes
            .iter()
            .map(|o| match &o.status {
                BranchStatus::Published(artifact) => ArtifactDescriptor::from(artifact),
                _ => ArtifactDescriptor::not_produced(self.writer.output_dir(), &o.artifact),
            })
            .collect();

        let report = verify(&descriptors, self.writer.store().as_ref(), &expectations).await;
        let summary = RunSummary { outcomes, report };
        info!(
            branches = summary.outcomes.len(),
            failed = summary.failed(),
            defects = summary.report.defects().len(),
            "run finished"
        );
        summary
    }

    async fn dimension(&self, spec: TableSpec) -> Result<Artifact, PipelineError> {
        self.writer.discard(spec.artifact).await?;
        let input_dir = self.input_dir.clone();
        let batch =
            tokio::task::spawn_blocking(move || transform_dimension(&input_dir, &spec)).await??;
        Ok(self.writer.write_batch(spec.artifact, &batch).await?)
    }

    #[instrument(level = "info", skip_all)]
    async fn fact(&self, started: DateTime<Local>) -> Result<(Artifact, AreaRefs), PipelineError> {
        self.writer.discard(WORLD_DATA.artifact).await?;
        let source = self.input_dir.join(WORLD_DATA.source_file);
        let writer = self.writer.clone();
        let options = self.fact.clone();
        let output = tokio::task::spawn_blocking(move || {
            let staged = writer.stage(WORLD_DATA.artifact)?;
            let output = transform_fact(&source, staged, &options)?;
            if let Err(e) = write_countries_list(writer.output_dir(), &output.area_refs, started) {
                warn!(error = %e, "could not write area hand-off list");
            }
            Ok::<_, PipelineError>(output)
        })
        .await??;
        info!(rows = output.rows, chunks = output.chunks, "fact table staged");

        let artifact = self.writer.publish(output.staged).await?;
        Ok((artifact, output.area_refs))
    }

    #[instrument(level = "info", skip_all, fields(codes = codes.len()))]
    async fn enrich(
        &self,
        client: &CountryClient,
        codes: &BTreeSet<EntityCode>,
    ) -> Result<Artifact, PipelineError> {
        self.writer.discard(COUNTRY_INFO_ARTIFACT).await?;
        let records = client.enrich(codes).await?;
        let artifact = self
            .writer
            .write_rows(
                COUNTRY_INFO_ARTIFACT,
                &EnrichedEntityRecord::HEADER,
                records.iter().map(EnrichedEntityRecord::fields),
            )
            .await?;
        Ok(artifact)
    }
}
