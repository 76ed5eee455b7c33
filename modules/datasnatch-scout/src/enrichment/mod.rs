//! Enrichment Stage: a closed set of enrichers fanned out per record and
//! joined before scoring.

mod completeness;
mod image;
mod location;
mod name;
mod phone;
pub mod quality;

use std::sync::Arc;

use async_trait::async_trait;
use datasnatch_archive::{Fetcher, Store};
use datasnatch_common::file_config::{AnalysisConfig, EnricherFlags};
use datasnatch_common::{EnrichmentError, ProfileRecord, Signal, SignalKind};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::traits::{LocationResolutionCapability, PhoneVerificationCapability, RecognitionCapability};

pub use completeness::CompletenessEnricher;
pub use image::ImageEnricher;
pub use location::LocationEnricher;
pub use name::NameEnricher;
pub use phone::PhoneEnricher;

/// One producer of one signal kind.
#[async_trait]
pub trait Enricher: Send + Sync {
    fn kind(&self) -> SignalKind;

    /// Identity recorded on every signal this enricher emits.
    fn producer(&self) -> &'static str;

    async fn enrich(&self, record: &ProfileRecord) -> Result<Signal, EnrichmentError>;
}

/// External collaborators the standard enrichers call out to. Any may be absent.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub recognition: Option<Arc<dyn RecognitionCapability>>,
    pub phone_verifier: Option<Arc<dyn PhoneVerificationCapability>>,
    pub location_resolver: Option<Arc<dyn LocationResolutionCapability>>,
}

/// What happened to one record in the stage.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EnrichmentReport {
    pub produced: Vec<SignalKind>,
    /// Enrichers that failed, with the error recorded on their zero signal.
    pub degraded: Vec<(SignalKind, String)>,
}

pub struct EnrichmentStage {
    enrichers: Vec<Arc<dyn Enricher>>,
}

impl EnrichmentStage {
    /// Enrichers are ordered by kind. A second enricher for a kind already
    /// present is dropped.
    pub fn new(enrichers: Vec<Arc<dyn Enricher>>) -> Self {
        let mut enrichers = enrichers;
        enrichers.sort_by_key(|e| e.kind());
        enrichers.dedup_by_key(|e| e.kind());
        Self { enrichers }
    }

    /// The standard five enrichers, filtered by the enable flags.
    ///
    /// Image downloads share the page fetcher's permits but not its cancel
    /// flag: once a record is underway its images are fetched to completion.
    pub fn standard(
        flags: &EnricherFlags,
        analysis: &AnalysisConfig,
        fetcher: Arc<Fetcher>,
        store: Arc<Store>,
        capabilities: Capabilities,
    ) -> Self {
        let mut enrichers: Vec<Arc<dyn Enricher>> = Vec::new();
        if flags.is_enabled(SignalKind::Image) {
            enrichers.push(Arc::new(ImageEnricher::new(
                Arc::new(fetcher.uncancellable()),
                store,
                capabilities.recognition,
                analysis,
            )));
        }
        if flags.is_enabled(SignalKind::Phone) {
            enrichers.push(Arc::new(PhoneEnricher::new(capabilities.phone_verifier, analysis)));
        }
        if flags.is_enabled(SignalKind::Name) {
            enrichers.push(Arc::new(NameEnricher));
        }
        if flags.is_enabled(SignalKind::Location) {
            enrichers.push(Arc::new(LocationEnricher::new(capabilities.location_resolver)));
        }
        if flags.is_enabled(SignalKind::Completeness) {
            enrichers.push(Arc::new(CompletenessEnricher));
        }
        Self::new(enrichers)
    }

    pub fn kinds(&self) -> Vec<SignalKind> {
        self.enrichers.iter().map(|e| e.kind()).collect()
    }

    /// Run every enricher against the record concurrently, then attach the
    /// signals. A failing enricher contributes a zero-confidence signal
    /// carrying its error; it never prevents the others from landing.
    pub async fn enrich(&self, record: &mut ProfileRecord) -> EnrichmentReport {
        let snapshot: &ProfileRecord = record;
        let results = join_all(self.enrichers.iter().map(|enricher| async move {
            (enricher, enricher.enrich(snapshot).await)
        }))
        .await;

        let mut report = EnrichmentReport::default();
        for (enricher, result) in results {
            let kind = enricher.kind();
            let signal = match result {
                Ok(signal) if signal.kind == kind => signal,
                Ok(signal) => {
                    let error = format!("produced a {} signal instead of {kind}", signal.kind);
                    Signal::degraded(kind, enricher.producer(), error)
                }
                Err(e) => Signal::degraded(kind, enricher.producer(), e.to_string()),
            };

            if let Some(error) = signal.error.as_deref() {
                warn!(
                    profile = record.id.as_str(),
                    enricher = enricher.producer(),
                    error,
                    "Enricher degraded"
                );
                report.degraded.push((kind, error.to_string()));
            } else {
                debug!(
                    profile = record.id.as_str(),
                    enricher = enricher.producer(),
                    confidence = signal.confidence,
                    "Signal attached"
                );
            }

            if record.push_signal(signal) {
                report.produced.push(kind);
            } else {
                warn!(profile = record.id.as_str(), %kind, "Signal kind already present, kept existing");
            }
        }
        report
    }
}
