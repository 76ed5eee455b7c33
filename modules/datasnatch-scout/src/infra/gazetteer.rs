use async_trait::async_trait;
use datasnatch_common::file_config::PlaceEntry;
use datasnatch_common::{EnrichmentError, Place};
use strsim::jaro_winkler;

use crate::traits::{LocationResolutionCapability, ResolvedPlace};

const GEOHASH_PRECISION: usize = 7;
const CITY_AND_REGION_CONFIDENCE: f64 = 0.95;
const CITY_CONFIDENCE: f64 = 0.9;
const FUZZY_CONFIDENCE: f64 = 0.7;
const FUZZY_MIN_SIMILARITY: f64 = 0.9;

/// Offline resolver over a configured list of known places.
///
/// Matches "City", "City, ST" and aliases exactly, then falls back to a
/// Jaro-Winkler match on the city name. A region that contradicts the entry
/// disqualifies it.
pub struct GazetteerResolver {
    entries: Vec<IndexedEntry>,
}

struct IndexedEntry {
    entry: PlaceEntry,
    keys: Vec<String>,
    region: Option<String>,
}

fn norm(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl GazetteerResolver {
    pub fn new(places: Vec<PlaceEntry>) -> Self {
        let entries = places
            .into_iter()
            .map(|entry| {
                let keys = std::iter::once(&entry.name)
                    .chain(entry.aliases.iter())
                    .map(|k| norm(k))
                    .filter(|k| !k.is_empty())
                    .collect();
                let region = entry.region.as_deref().map(norm);
                IndexedEntry {
                    entry,
                    keys,
                    region,
                }
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, text: &str) -> Option<(&PlaceEntry, f64)> {
        let mut parts = text.splitn(2, ',');
        let city = norm(parts.next().unwrap_or_default());
        let region = parts.next().map(norm).filter(|r| !r.is_empty());
        if city.is_empty() {
            return None;
        }

        let compatible = |e: &&IndexedEntry| match (&region, &e.region) {
            (Some(given), Some(known)) => given == known,
            _ => true,
        };

        if let Some(e) = self
            .entries
            .iter()
            .filter(compatible)
            .find(|e| e.keys.contains(&city))
        {
            let confidence = if region.is_some() && e.region.is_some() {
                CITY_AND_REGION_CONFIDENCE
            } else {
                CITY_CONFIDENCE
            };
            return Some((&e.entry, confidence));
        }

        let needle = city.as_str();
        self.entries
            .iter()
            .filter(compatible)
            .flat_map(|e| e.keys.iter().map(move |k| (e, jaro_winkler(needle, k))))
            .filter(|(_, sim)| *sim >= FUZZY_MIN_SIMILARITY)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(e, _)| (&e.entry, FUZZY_CONFIDENCE))
    }
}

#[async_trait]
impl LocationResolutionCapability for GazetteerResolver {
    async fn resolve(&self, text: &str) -> Result<Option<ResolvedPlace>, EnrichmentError> {
        let Some((entry, confidence)) = self.lookup(text) else {
            return Ok(None);
        };
        let geohash = geohash::encode(
            geohash::Coord {
                x: entry.lng,
                y: entry.lat,
            },
            GEOHASH_PRECISION,
        )
        .map_err(|e| EnrichmentError::InvalidInput(format!("bad coordinates for {}: {e}", entry.name)))?;

        Ok(Some(ResolvedPlace {
            place: Place {
                name: entry.name.clone(),
                region: entry.region.clone(),
                country: entry.country.clone(),
                lat: entry.lat,
                lng: entry.lng,
                geohash,
            },
            confidence,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datasnatch_common::file_config::AnalysisConfig;

    fn resolver() -> GazetteerResolver {
        GazetteerResolver::new(AnalysisConfig::default().places)
    }

    async fn resolve(text: &str) -> Option<ResolvedPlace> {
        resolver().resolve(text).await.unwrap()
    }

    #[tokio::test]
    async fn city_and_region() {
        let r = resolve("Chicago, IL").await.unwrap();
        assert_eq!(r.place.name, "Chicago");
        assert_eq!(r.confidence, CITY_AND_REGION_CONFIDENCE);
        assert_eq!(r.place.geohash.len(), GEOHASH_PRECISION);
        assert!(r.place.geohash.starts_with("dp3"));
    }

    #[tokio::test]
    async fn alias_and_case() {
        let r = resolve("  NYC ").await.unwrap();
        assert_eq!(r.place.name, "New York");
        assert_eq!(r.confidence, CITY_CONFIDENCE);
    }

    #[tokio::test]
    async fn misspelling_is_fuzzy() {
        let r = resolve("Minneapolls").await.unwrap();
        assert_eq!(r.place.name, "Minneapolis");
        assert_eq!(r.confidence, FUZZY_CONFIDENCE);
    }

    #[tokio::test]
    async fn contradicting_region_and_unknown_text() {
        assert!(resolve("Chicago, TX").await.is_none());
        assert!(resolve("Springfield").await.is_none());
        assert!(resolve(" , ").await.is_none());
    }
}
