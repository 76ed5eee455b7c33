use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::SignalKind;

/// TOML-backed configuration loaded from disk. Every section is optional, so an
/// empty file yields the defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub fetch: FetchConfig,
    pub parser: ParserConfig,
    pub graph: GraphConfig,
    pub scoring: ScoringConfig,
    pub enrichers: EnricherFlags,
    pub analysis: AnalysisConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Global ceiling on in-flight requests, shared by pages and images.
    pub concurrency: usize,
    pub request_timeout_secs: u64,
    /// Attempts for generic transient failures (timeouts, 5xx, resets).
    pub max_attempts: u32,
    /// Separate budget for 429 responses.
    pub max_rate_limited_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Upper bound on a server-provided Retry-After.
    pub retry_after_max_secs: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            request_timeout_secs: 30,
            max_attempts: 3,
            max_rate_limited_attempts: 5,
            backoff_base_ms: 5_000,
            backoff_max_ms: 60_000,
            retry_after_max_secs: 120,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
        }
    }
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Extraction strategies, tried in the configured order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    JsonLd,
    Microdata,
    CssClass,
    TextHeuristic,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JsonLd => "json_ld",
            Self::Microdata => "microdata",
            Self::CssClass => "css_class",
            Self::TextHeuristic => "text_heuristic",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParserConfig {
    pub strategies: Vec<StrategyKind>,
    pub selectors: SelectorConfig,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            strategies: vec![
                StrategyKind::JsonLd,
                StrategyKind::Microdata,
                StrategyKind::CssClass,
                StrategyKind::TextHeuristic,
            ],
            selectors: SelectorConfig::default(),
        }
    }
}

/// CSS selectors for the class-based strategy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectorConfig {
    pub name: String,
    pub phone: String,
    pub location: String,
    pub age: String,
    pub posted_at: String,
    pub message: String,
    pub images: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            name: "h1.profile-name".to_string(),
            phone: "div.phone-number".to_string(),
            location: "div.location".to_string(),
            age: "div.age".to_string(),
            posted_at: "div.date-posted".to_string(),
            message: "div.message".to_string(),
            images: "img.profile-image".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphConfig {
    /// Jaro-Winkler similarity at or above which two names link.
    pub name_min_similarity: f64,
    /// dHash Hamming distance at or below which two images are near-identical.
    pub image_max_hamming: u32,
    /// Name blocks larger than this are skipped rather than compared pairwise.
    pub max_name_block: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            name_min_similarity: 0.92,
            image_max_hamming: 6,
            max_name_block: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringConfig {
    pub weights: BTreeMap<SignalKind, f64>,
    /// Kinds whose absence counts as a zero-confidence participant.
    pub penalize_missing: Vec<SignalKind>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: BTreeMap::from([
                (SignalKind::Image, 0.30),
                (SignalKind::Phone, 0.25),
                (SignalKind::Location, 0.20),
                (SignalKind::Name, 0.10),
                (SignalKind::Completeness, 0.15),
            ]),
            penalize_missing: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnricherFlags {
    pub image: bool,
    pub phone: bool,
    pub name: bool,
    pub location: bool,
    pub completeness: bool,
}

impl Default for EnricherFlags {
    fn default() -> Self {
        Self {
            image: true,
            phone: true,
            name: true,
            location: true,
            completeness: true,
        }
    }
}

impl EnricherFlags {
    pub fn is_enabled(&self, kind: SignalKind) -> bool {
        match kind {
            SignalKind::Image => self.image,
            SignalKind::Phone => self.phone,
            SignalKind::Name => self.name,
            SignalKind::Location => self.location,
            SignalKind::Completeness => self.completeness,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub min_image_quality: f64,
    /// Added to image confidence when any image yields a face cluster.
    pub face_bonus: f64,
    pub max_images_per_profile: usize,
    pub default_country_code: String,
    /// Country calling codes considered plausible for this source.
    pub country_codes: Vec<String>,
    pub places: Vec<PlaceEntry>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_image_quality: 0.3,
            face_bonus: 0.1,
            max_images_per_profile: 8,
            default_country_code: "1".to_string(),
            country_codes: vec!["1".to_string()],
            places: default_places(),
        }
    }
}

/// A gazetteer row for the offline location resolver.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlaceEntry {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub region: Option<String>,
    pub country: String,
    pub lat: f64,
    pub lng: f64,
}

fn default_places() -> Vec<PlaceEntry> {
    let row = |name: &str, aliases: &[&str], region: &str, lat: f64, lng: f64| PlaceEntry {
        name: name.to_string(),
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
        region: Some(region.to_string()),
        country: "US".to_string(),
        lat,
        lng,
    };
    vec![
        row("New York", &["nyc", "new york city", "manhattan"], "NY", 40.7128, -74.0060),
        row("Los Angeles", &["la"], "CA", 34.0522, -118.2437),
        row("Chicago", &[], "IL", 41.8781, -87.6298),
        row("Houston", &[], "TX", 29.7604, -95.3698),
        row("Phoenix", &[], "AZ", 33.4484, -112.0740),
        row("Miami", &[], "FL", 25.7617, -80.1918),
        row("Las Vegas", &["vegas"], "NV", 36.1699, -115.1398),
        row("Minneapolis", &["mpls"], "MN", 44.9778, -93.2650),
        row("Seattle", &[], "WA", 47.6062, -122.3321),
        row("Atlanta", &["atl"], "GA", 33.7490, -84.3880),
    ]
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Overrides `DATA_DIR` when set.
    pub data_dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.fetch.concurrency == 0 {
            return Err(ConfigError::invalid("fetch.concurrency", "must be at least 1"));
        }
        if self.fetch.max_attempts == 0 {
            return Err(ConfigError::invalid("fetch.max_attempts", "must be at least 1"));
        }
        if self.fetch.request_timeout_secs == 0 {
            return Err(ConfigError::invalid("fetch.request_timeout_secs", "must be positive"));
        }
        if self.parser.strategies.is_empty() {
            return Err(ConfigError::invalid("parser.strategies", "at least one strategy is required"));
        }
        if !(0.0..=1.0).contains(&self.graph.name_min_similarity) {
            return Err(ConfigError::invalid("graph.name_min_similarity", "must be within [0, 1]"));
        }
        if self.graph.image_max_hamming > 64 {
            return Err(ConfigError::invalid("graph.image_max_hamming", "must be at most 64"));
        }
        for (kind, weight) in &self.scoring.weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::invalid(
                    format!("scoring.weights.{kind}"),
                    "must be a non-negative number",
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.analysis.min_image_quality) {
            return Err(ConfigError::invalid("analysis.min_image_quality", "must be within [0, 1]"));
        }
        Ok(())
    }
}

/// Load, parse and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    Ok(config)
}
