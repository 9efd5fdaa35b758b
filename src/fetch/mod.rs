// src/fetch/mod.rs
//! Country enrichment over HTTP.

pub mod countries;
pub mod shape;

pub use countries::{CountryClient, EnrichmentOptions, DEFAULT_BASE_URL};
pub use shape::{CountryResponse, EnrichedEntityRecord, FieldShape};
