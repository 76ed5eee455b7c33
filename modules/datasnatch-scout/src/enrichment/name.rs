use std::sync::LazyLock;

use async_trait::async_trait;
use datasnatch_common::{EnrichmentError, NameAnalysis, ProfileRecord, Signal, SignalKind, SignalValue};
use regex::Regex;

use super::Enricher;

static RE_CONTACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)@|https?://|www\.|\.com\b|whats\s*app|telegram").unwrap());

const PLACEHOLDERS: &[&str] = &[
    "test", "name", "unknown", "n/a", "na", "none", "null", "anonymous", "user", "admin",
    "asdf", "qwerty", "your name", "first last",
];

/// (check, penalty). Confidence is one minus the penalties of failed checks.
const CHECKS: &[(&str, f64)] = &[
    ("length", 0.4),
    ("charset", 0.3),
    ("digits", 0.3),
    ("repetition", 0.2),
    ("placeholder", 0.6),
    ("contact_info", 0.5),
    ("casing", 0.1),
    ("single_token", 0.1),
];

/// Heuristic plausibility of a display name. Purely local, never fails on a
/// present name.
pub struct NameEnricher;

fn failed_checks(name: &str) -> Vec<&'static str> {
    let lower = name.to_lowercase();
    let letters: Vec<char> = name.chars().filter(|c| c.is_alphabetic()).collect();
    let len = name.chars().count();

    let mut failed = Vec::new();
    if !(2..=60).contains(&len) {
        failed.push("length");
    }
    if name
        .chars()
        .any(|c| !(c.is_alphabetic() || c.is_ascii_digit() || matches!(c, ' ' | '-' | '\'' | '.')))
    {
        failed.push("charset");
    }
    if name.chars().any(|c| c.is_ascii_digit()) {
        failed.push("digits");
    }
    if has_run(&lower, 4) {
        failed.push("repetition");
    }
    if PLACEHOLDERS.contains(&lower.as_str()) {
        failed.push("placeholder");
    }
    if RE_CONTACT.is_match(name) {
        failed.push("contact_info");
    }
    let all_upper = letters.iter().all(|c| c.is_uppercase());
    let all_lower = letters.iter().all(|c| c.is_lowercase());
    if !letters.is_empty() && ((all_upper && letters.len() > 3) || all_lower) {
        failed.push("casing");
    }
    if name.split_whitespace().count() < 2 {
        failed.push("single_token");
    }
    failed
}

fn has_run(s: &str, n: usize) -> bool {
    let mut run = 0;
    let mut prev = None;
    for c in s.chars() {
        run = if Some(c) == prev { run + 1 } else { 1 };
        if run >= n {
            return true;
        }
        prev = Some(c);
    }
    false
}

#[async_trait]
impl Enricher for NameEnricher {
    fn kind(&self) -> SignalKind {
        SignalKind::Name
    }

    fn producer(&self) -> &'static str {
        "name_plausibility"
    }

    async fn enrich(&self, record: &ProfileRecord) -> Result<Signal, EnrichmentError> {
        let normalized = record
            .name
            .as_deref()
            .map(|n| n.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|n| !n.is_empty())
            .ok_or_else(|| EnrichmentError::InvalidInput("no name".to_string()))?;

        let failed = failed_checks(&normalized);
        let penalty: f64 = CHECKS
            .iter()
            .filter(|(check, _)| failed.contains(check))
            .map(|(_, p)| p)
            .sum();

        Ok(Signal::new(
            SignalKind::Name,
            SignalValue::Name(NameAnalysis {
                normalized,
                failed_checks: failed.into_iter().map(str::to_string).collect(),
            }),
            1.0 - penalty,
            self.producer(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture_record;

    async fn score(name: &str) -> (f64, Vec<String>) {
        let signal = NameEnricher.enrich(&fixture_record(name, "")).await.unwrap();
        let SignalValue::Name(a) = signal.value else {
            panic!("expected name analysis");
        };
        (signal.confidence, a.failed_checks)
    }

    #[tokio::test]
    async fn ordinary_names_pass() {
        assert_eq!(score("Jane Doe").await, (1.0, vec![]));
        assert_eq!(score("Mary-Ann O'Neil").await.0, 1.0);
        assert_eq!(score("José  Álvarez").await.0, 1.0);
    }

    #[tokio::test]
    async fn suspicious_names_lose_confidence() {
        let (conf, failed) = score("test").await;
        assert!(failed.contains(&"placeholder".to_string()));
        assert!(conf < 0.5);

        let (conf, failed) = score("Hot4u@mail.com").await;
        assert!(failed.contains(&"contact_info".to_string()));
        assert!(failed.contains(&"digits".to_string()));
        assert_eq!(conf, 0.0);

        let (_, failed) = score("Aaaaaa Bee").await;
        assert_eq!(failed, vec!["repetition"]);
    }

    #[tokio::test]
    async fn missing_name_is_invalid_input() {
        let mut record = fixture_record("x", "+15551234567");
        record.name = None;
        assert!(matches!(
            NameEnricher.enrich(&record).await,
            Err(EnrichmentError::InvalidInput(_))
        ));
    }
}
