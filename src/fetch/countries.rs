// src/fetch/countries.rs
use futures::{stream, StreamExt};
use reqwest::{Client, StatusCode};
use std::{collections::BTreeSet, time::Duration};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::shape::{CountryResponse, EnrichedEntityRecord};
use crate::error::{EnrichmentError, PipelineError};
use crate::process::codes::EntityCode;

pub const DEFAULT_BASE_URL: &str = "https://restcountries.com/v3.1/alpha";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Field projection requested from the service for every code.
const FIELDS: &str = "ccn3,flags,name,capital,languages,area,population";

#[derive(Debug, Clone)]
pub struct EnrichmentOptions {
    pub base_url: Url,
    pub timeout: Duration,
    /// Lookups in flight at once; 1 means strictly sequential.
    pub concurrency: usize,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("static base url parses"),
            timeout: DEFAULT_TIMEOUT,
            concurrency: 1,
        }
    }
}

/// Looks up country details one code at a time, skipping codes the service
/// cannot answer for.
#[derive(Debug, Clone)]
pub struct CountryClient {
    client: Client,
    base_url: Url,
    concurrency: usize,
}

impl CountryClient {
    pub fn new(options: EnrichmentOptions) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(options.timeout).build()?;
        Ok(Self {
            client,
            base_url: options.base_url,
            concurrency: options.concurrency.max(1),
        })
    }

    /// `{base_url}/{code}?fields=...`
    pub fn lookup_url(&self, code: &EntityCode) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(code.as_str());
        }
        url.set_query(Some(&format!("fields={}", FIELDS)));
        url
    }

    /// One GET. Anything but 200 with a decodable body is an error for this
    /// code only.
    pub async fn lookup(&self, code: &EntityCode) -> Result<EnrichedEntityRecord, EnrichmentError> {
        let url = self.lookup_url(code);
        debug!(%url, "lookup");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| EnrichmentError::Transport {
                code: code.clone(),
                source,
            })?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(EnrichmentError::Status {
                code: code.clone(),
                status,
            });
        }

        let body: CountryResponse = resp.json().await.map_err(|source| {
            if source.is_timeout() {
                EnrichmentError::Transport {
                    code: code.clone(),
                    source,
                }
            } else {
                EnrichmentError::Body {
                    code: code.clone(),
                    source,
                }
            }
        })?;
        Ok(EnrichedEntityRecord::from_response(code.clone(), &body))
    }

    /// Enrich every code, in the iteration order of `codes`.
    ///
    /// Codes the service rejects are logged and skipped. If codes were
    /// requested but not a single lookup got an HTTP response, the service is
    /// considered unreachable and the whole stage fails.
    #[instrument(level = "info", skip(self, codes), fields(requested = codes.len()))]
    pub async fn enrich(
        &self,
        codes: &BTreeSet<EntityCode>,
    ) -> Result<Vec<EnrichedEntityRecord>, PipelineError> {
        let outcomes: Vec<Result<EnrichedEntityRecord, EnrichmentError>> =
            stream::iter(codes.iter())
                .map(|code| self.lookup(code))
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut records = Vec::with_capacity(outcomes.len());
        let mut answered = false;
        for outcome in outcomes {
            match outcome {
                Ok(record) => {
                    answered = true;
                    records.push(record);
                }
                Err(err) => {
                    answered |= !err.is_transport();
                    warn!(error = %err, "country details unavailable, skipping");
                }
            }
        }

        if !codes.is_empty() && !answered {
            return Err(PipelineError::EnrichmentUnreachable {
                attempted: codes.len(),
            });
        }

        info!(
            resolved = records.len(),
            skipped = codes.len() - records.len(),
            "enrichment finished"
        );
        Ok(records)
    }
}
