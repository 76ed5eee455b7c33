//! Authenticity Scorer: weighted fusion of signal confidences.

use datasnatch_common::file_config::ScoringConfig;
use datasnatch_common::{ProfileRecord, ScoreBreakdown, ScoreContribution, ScoringError, SignalKind};
use tracing::debug;

/// Weights are renormalized over the signals actually present. A kind listed
/// in `penalize_missing` participates as a zero when absent; any other absent
/// kind simply does not count. Scoring reads only the record's signals, so the
/// same signal set always produces the same score and breakdown.
pub struct AuthenticityScorer {
    config: ScoringConfig,
}

impl AuthenticityScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn weight(&self, kind: SignalKind) -> f64 {
        self.config
            .weights
            .get(&kind)
            .copied()
            .filter(|w| w.is_finite() && *w > 0.0)
            .unwrap_or(0.0)
    }

    pub fn score(&self, record: &ProfileRecord) -> Result<(f64, ScoreBreakdown), ScoringError> {
        if record.signals().is_empty() {
            return Err(ScoringError::NoSignalsPresent);
        }

        let mut entries = Vec::new();
        for kind in SignalKind::ALL {
            let (confidence, missing, note) = match record.signal(kind) {
                Some(signal) => (signal.confidence, false, signal.error.clone()),
                None if self.config.penalize_missing.contains(&kind) => {
                    (0.0, true, Some("missing".to_string()))
                }
                None => continue,
            };
            entries.push(ScoreContribution {
                kind,
                confidence,
                weight: self.weight(kind),
                normalized_weight: 0.0,
                contribution: 0.0,
                missing,
                note,
            });
        }

        let total_weight: f64 = entries.iter().map(|e| e.weight).sum();
        if total_weight <= 0.0 {
            return Err(ScoringError::NoSignalsPresent);
        }

        let mut score = 0.0;
        for entry in &mut entries {
            entry.normalized_weight = entry.weight / total_weight;
            entry.contribution = entry.normalized_weight * entry.confidence;
            score += entry.contribution;
        }
        let score = score.clamp(0.0, 1.0);

        Ok((
            score,
            ScoreBreakdown {
                entries,
                total_weight,
            },
        ))
    }

    /// Score and attach the result. An unscorable record keeps an undefined
    /// score rather than a zero.
    pub fn score_record(&self, record: &mut ProfileRecord) -> Result<f64, ScoringError> {
        match self.score(record) {
            Ok((score, breakdown)) => {
                debug!(profile = record.id.as_str(), score, "Profile scored");
                record.set_score(Some(score), Some(breakdown));
                Ok(score)
            }
            Err(e) => {
                record.set_score(None, None);
                Err(e)
            }
        }
    }
}
