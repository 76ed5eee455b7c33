use std::sync::Arc;

use async_trait::async_trait;
use datasnatch_common::{
    EnrichmentError, LocationAnalysis, ProfileRecord, Signal, SignalKind, SignalValue,
};

use super::Enricher;
use crate::traits::LocationResolutionCapability;

/// A location that could not be resolved still says something about the listing.
const UNRESOLVED_CONFIDENCE: f64 = 0.3;

pub struct LocationEnricher {
    resolver: Option<Arc<dyn LocationResolutionCapability>>,
}

impl LocationEnricher {
    pub fn new(resolver: Option<Arc<dyn LocationResolutionCapability>>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Enricher for LocationEnricher {
    fn kind(&self) -> SignalKind {
        SignalKind::Location
    }

    fn producer(&self) -> &'static str {
        "location_resolution"
    }

    async fn enrich(&self, record: &ProfileRecord) -> Result<Signal, EnrichmentError> {
        let input = record
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| EnrichmentError::InvalidInput("no location".to_string()))?;
        let resolver = self.resolver.as_ref().ok_or_else(|| {
            EnrichmentError::CapabilityUnavailable("no location resolver configured".to_string())
        })?;

        let (place, confidence) = match resolver.resolve(input).await? {
            Some(resolved) => (Some(resolved.place), resolved.confidence),
            None => (None, UNRESOLVED_CONFIDENCE),
        };

        Ok(Signal::new(
            SignalKind::Location,
            SignalValue::Location(LocationAnalysis {
                input: input.to_string(),
                place,
            }),
            confidence,
            self.producer(),
        ))
    }
}
