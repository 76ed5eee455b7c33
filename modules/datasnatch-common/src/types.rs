use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hashing::profile_id;

// --- Fetch types ---

/// One unit of fetch work. Created by the scan driver, consumed by the Fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub url: String,
    pub attempt: u32,
    pub scheduled_at: DateTime<Utc>,
}

impl FetchTask {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            attempt: 0,
            scheduled_at: Utc::now(),
        }
    }

    /// The same task rescheduled `delay` from now with the attempt counter bumped.
    pub fn retry_after(&self, delay: std::time::Duration) -> Self {
        let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            url: self.url.clone(),
            attempt: self.attempt + 1,
            scheduled_at: Utc::now() + delay,
        }
    }
}

/// A fetched page. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub url: String,
    pub status: u16,
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

impl RawPage {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status,
            body: body.into(),
            fetched_at: Utc::now(),
        }
    }

    pub fn with_fetched_at(mut self, at: DateTime<Utc>) -> Self {
        self.fetched_at = at;
        self
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn has_content(&self) -> bool {
        self.body.iter().any(|b| !b.is_ascii_whitespace())
    }
}

// --- Profile types ---

/// Content-hash identity of a profile. Hex SHA-256 of its canonical fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub String);

impl ProfileId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fields an extraction strategy pulls out of a page, before identity is assigned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileFields {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub images: Vec<String>,
    pub age: Option<u32>,
    pub posted_at: Option<String>,
    pub message: Option<String>,
}

impl ProfileFields {
    /// Minimal required set: a name or a phone.
    pub fn meets_minimum(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.name) || present(&self.phone)
    }
}

/// One scraped listing, carried through enrichment and scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: ProfileId,
    pub name: Option<String>,
    pub location: Option<String>,
    pub phone: Option<String>,
    pub images: Vec<String>,
    pub age: Option<u32>,
    pub posted_at: Option<String>,
    pub message: Option<String>,
    pub source_url: String,
    /// Name of the extraction strategy that produced this record.
    pub strategy: String,
    pub fetched_at: DateTime<Utc>,
    signals: Vec<Signal>,
    pub authenticity_score: Option<f64>,
    pub score_breakdown: Option<ScoreBreakdown>,
}

impl ProfileRecord {
    pub fn new(
        fields: ProfileFields,
        source_url: impl Into<String>,
        strategy: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let source_url = source_url.into();
        let id = profile_id(fields.name.as_deref(), fields.phone.as_deref(), &source_url);
        Self {
            id,
            name: fields.name,
            location: fields.location,
            phone: fields.phone,
            images: fields.images,
            age: fields.age,
            posted_at: fields.posted_at,
            message: fields.message,
            source_url,
            strategy: strategy.into(),
            fetched_at,
            signals: Vec::new(),
            authenticity_score: None,
            score_breakdown: None,
        }
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn signal(&self, kind: SignalKind) -> Option<&Signal> {
        self.signals.iter().find(|s| s.kind == kind)
    }

    /// Append a signal. Signals are append-only: a second signal of a kind that
    /// is already present is rejected and `false` is returned.
    #[must_use]
    pub fn push_signal(&mut self, signal: Signal) -> bool {
        if self.signals.iter().any(|s| s.kind == signal.kind) {
            return false;
        }
        self.signals.push(signal);
        true
    }

    pub fn set_score(&mut self, score: Option<f64>, breakdown: Option<ScoreBreakdown>) {
        self.authenticity_score = score;
        self.score_breakdown = breakdown;
    }

    /// True when both records carry the same extracted listing content,
    /// regardless of when they were fetched or how far they were enriched.
    pub fn same_listing(&self, other: &ProfileRecord) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.location == other.location
            && self.phone == other.phone
            && self.images == other.images
            && self.age == other.age
            && self.posted_at == other.posted_at
            && self.message == other.message
            && self.source_url == other.source_url
    }

    /// Recompute the id from the current canonical fields.
    pub fn recompute_id(&self) -> ProfileId {
        profile_id(self.name.as_deref(), self.phone.as_deref(), &self.source_url)
    }
}

// --- Signals ---

/// The closed set of enrichment producers. Adding one means extending this
/// enum and the scorer's weight table together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Image,
    Phone,
    Name,
    Location,
    Completeness,
}

impl SignalKind {
    pub const ALL: [SignalKind; 5] = [
        SignalKind::Image,
        SignalKind::Phone,
        SignalKind::Name,
        SignalKind::Location,
        SignalKind::Completeness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Phone => "phone",
            Self::Name => "name",
            Self::Location => "location",
            Self::Completeness => "completeness",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SignalKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "phone" => Ok(Self::Phone),
            "name" => Ok(Self::Name),
            "location" => Ok(Self::Location),
            "completeness" => Ok(Self::Completeness),
            other => Err(format!("unknown signal kind: {other}")),
        }
    }
}

/// One enricher's contribution to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub value: SignalValue,
    /// Always within [0, 1].
    pub confidence: f64,
    pub producer: String,
    pub error: Option<String>,
}

impl Signal {
    pub fn new(
        kind: SignalKind,
        value: SignalValue,
        confidence: f64,
        producer: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            value,
            confidence: clamp_unit(confidence),
            producer: producer.into(),
            error: None,
        }
    }

    /// A zero-confidence signal recording why the enricher could not contribute.
    pub fn degraded(kind: SignalKind, producer: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            kind,
            value: SignalValue::Unavailable,
            confidence: 0.0,
            producer: producer.into(),
            error: Some(error.into()),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalValue {
    Image(ImageAnalysis),
    Phone(PhoneAnalysis),
    Name(NameAnalysis),
    Location(LocationAnalysis),
    Completeness(CompletenessAnalysis),
    Unavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub images: Vec<ImageObservation>,
    pub face_detected: bool,
    pub mean_quality: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageObservation {
    pub url: String,
    pub content_hash: Option<String>,
    pub perceptual_hash: Option<u64>,
    pub quality: Option<f64>,
    pub face_cluster: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhoneAnalysis {
    pub e164: Option<String>,
    pub format_valid: bool,
    pub region: Option<String>,
    /// `None` when no verification capability was consulted.
    pub verified: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NameAnalysis {
    pub normalized: String,
    pub failed_checks: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationAnalysis {
    pub input: String,
    pub place: Option<Place>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletenessAnalysis {
    pub present: Vec<String>,
    pub missing: Vec<String>,
}

/// A canonical place reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub region: Option<String>,
    pub country: String,
    pub lat: f64,
    pub lng: f64,
    pub geohash: String,
}

impl Place {
    /// "Name, Region, Country" with the region omitted when unknown.
    pub fn canonical_ref(&self) -> String {
        match &self.region {
            Some(region) => format!("{}, {}, {}", self.name, region, self.country),
            None => format!("{}, {}", self.name, self.country),
        }
    }
}

// --- Images ---

/// Downloaded image content. Stored once per distinct content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub content_hash: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub perceptual_hash: Option<u64>,
    pub quality: Option<f64>,
}

// --- Scoring ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub entries: Vec<ScoreContribution>,
    /// Sum of the raw weights that participated in renormalization.
    pub total_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreContribution {
    pub kind: SignalKind,
    pub confidence: f64,
    pub weight: f64,
    pub normalized_weight: f64,
    pub contribution: f64,
    /// True when the signal was absent and counted as a zero by penalty.
    pub missing: bool,
    pub note: Option<String>,
}

// --- Relationship graph ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    FaceCluster,
    PhoneMatch,
    ImageMatch,
    NameMatch,
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FaceCluster => write!(f, "face-cluster"),
            Self::PhoneMatch => write!(f, "phone-match"),
            Self::ImageMatch => write!(f, "image-match"),
            Self::NameMatch => write!(f, "name-match"),
        }
    }
}

/// A derived link between two profiles. `a` always sorts before `b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub a: ProfileId,
    pub b: ProfileId,
    pub kind: RelationKind,
    pub strength: f64,
}

impl RelationshipEdge {
    pub fn new(x: ProfileId, y: ProfileId, kind: RelationKind, strength: f64) -> Self {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        Self {
            a,
            b,
            kind,
            strength: clamp_unit(strength),
        }
    }
}
