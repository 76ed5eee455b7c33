use std::sync::Arc;

use async_trait::async_trait;
use datasnatch_common::file_config::AnalysisConfig;
use datasnatch_common::phone::country_code;
use datasnatch_common::{
    normalize_phone, EnrichmentError, PhoneAnalysis, ProfileRecord, Signal, SignalKind, SignalValue,
};

use super::Enricher;
use crate::traits::PhoneVerificationCapability;

/// Format valid and the calling code is one this source is expected to use.
const KNOWN_REGION_CONFIDENCE: f64 = 0.7;
/// Format valid, calling code unexpected.
const UNKNOWN_REGION_CONFIDENCE: f64 = 0.4;

pub struct PhoneEnricher {
    verifier: Option<Arc<dyn PhoneVerificationCapability>>,
    default_country_code: String,
    country_codes: Vec<String>,
}

impl PhoneEnricher {
    pub fn new(
        verifier: Option<Arc<dyn PhoneVerificationCapability>>,
        analysis: &AnalysisConfig,
    ) -> Self {
        Self {
            verifier,
            default_country_code: analysis.default_country_code.clone(),
            country_codes: analysis.country_codes.clone(),
        }
    }

    fn inspect(&self, raw: &str) -> PhoneAnalysis {
        let e164 = normalize_phone(raw, &self.default_country_code);
        let region = e164
            .as_deref()
            .and_then(|n| country_code(n, &self.country_codes))
            .map(str::to_string);
        // NANP numbers are exactly a 1 followed by ten digits.
        let format_valid = match (&e164, region.as_deref()) {
            (Some(n), Some("1")) => n.len() == 12,
            (Some(_), _) => true,
            (None, _) => false,
        };
        PhoneAnalysis {
            e164,
            format_valid,
            region,
            verified: None,
        }
    }
}

#[async_trait]
impl Enricher for PhoneEnricher {
    fn kind(&self) -> SignalKind {
        SignalKind::Phone
    }

    fn producer(&self) -> &'static str {
        "phone_verification"
    }

    async fn enrich(&self, record: &ProfileRecord) -> Result<Signal, EnrichmentError> {
        let raw = record
            .phone
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| EnrichmentError::InvalidInput("no phone".to_string()))?;

        let mut analysis = self.inspect(raw);
        let base = match (analysis.format_valid, &analysis.region) {
            (false, _) => 0.0,
            (true, Some(_)) => KNOWN_REGION_CONFIDENCE,
            (true, None) => UNKNOWN_REGION_CONFIDENCE,
        };

        let confidence = match (&self.verifier, analysis.e164.as_deref()) {
            (Some(verifier), Some(e164)) if analysis.format_valid => {
                let verdict = verifier.verify(e164).await?;
                analysis.verified = Some(verdict.valid);
                if verdict.valid {
                    base.max(verdict.confidence)
                } else {
                    base * (1.0 - verdict.confidence.clamp(0.0, 1.0))
                }
            }
            _ => base,
        };

        Ok(Signal::new(
            SignalKind::Phone,
            SignalValue::Phone(analysis),
            confidence,
            self.producer(),
        ))
    }
}
