use async_trait::async_trait;
use datasnatch_common::{
    CompletenessAnalysis, EnrichmentError, ProfileRecord, Signal, SignalKind, SignalValue,
};

use super::Enricher;

fn names(fields: Vec<&(&str, bool)>) -> Vec<String> {
    fields.into_iter().map(|(name, _)| name.to_string()).collect()
}

/// Fraction of the core listing fields that are filled in.
pub struct CompletenessEnricher;

#[async_trait]
impl Enricher for CompletenessEnricher {
    fn kind(&self) -> SignalKind {
        SignalKind::Completeness
    }

    fn producer(&self) -> &'static str {
        "profile_completeness"
    }

    async fn enrich(&self, record: &ProfileRecord) -> Result<Signal, EnrichmentError> {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        let fields = [
            ("name", filled(&record.name)),
            ("phone", filled(&record.phone)),
            ("location", filled(&record.location)),
            ("images", !record.images.is_empty()),
        ];

        let (present, missing): (Vec<_>, Vec<_>) = fields.iter().partition(|(_, ok)| *ok);
        let confidence = present.len() as f64 / fields.len() as f64;

        Ok(Signal::new(
            SignalKind::Completeness,
            SignalValue::Completeness(CompletenessAnalysis {
                present: names(present),
                missing: names(missing),
            }),
            confidence,
            self.producer(),
        ))
    }
}
