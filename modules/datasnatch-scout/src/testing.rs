// Test mocks for the scan pipeline.
//
// Mocks matching the capability boundaries:
// - ScriptedTransport (FetchTransport), re-exported from the archive crate
// - MockRecognition (RecognitionCapability): content-hash → face cluster
// - MockPhoneVerifier (PhoneVerificationCapability): E.164 → verdict
// - MockLocationResolver (LocationResolutionCapability): text → place
// - StaticEnricher (Enricher): fixed confidence or fixed error
//
// Plus helpers for constructing records, signals, profile pages and images.

use std::collections::HashMap;
use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};

use datasnatch_common::{
    content_hash, CompletenessAnalysis, EnrichmentError, ImageAnalysis, LocationAnalysis,
    NameAnalysis, PhoneAnalysis, Place, ProfileFields, ProfileRecord, Signal, SignalKind,
    SignalValue,
};

use crate::enrichment::Enricher;
use crate::traits::{
    LocationResolutionCapability, PhoneVerdict, PhoneVerificationCapability,
    RecognitionCapability, ResolvedPlace,
};

pub use datasnatch_archive::testing::{ScriptedTransport, Step};

// ---------------------------------------------------------------------------
// MockRecognition
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockRecognition {
    faces: HashMap<String, String>,
    unavailable: bool,
}

impl MockRecognition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Images with exactly these bytes belong to `cluster`.
    pub fn face(mut self, image: &[u8], cluster: &str) -> Self {
        self.faces.insert(content_hash(image), cluster.to_string());
        self
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl RecognitionCapability for MockRecognition {
    async fn recognize(&self, image: &[u8]) -> Result<Option<String>, EnrichmentError> {
        if self.unavailable {
            return Err(EnrichmentError::CapabilityUnavailable("recognition offline".into()));
        }
        Ok(self.faces.get(&content_hash(image)).cloned())
    }
}

// ---------------------------------------------------------------------------
// MockPhoneVerifier
// ---------------------------------------------------------------------------

/// Unknown numbers come back invalid with zero confidence, which leaves the
/// format-based confidence untouched.
#[derive(Default)]
pub struct MockPhoneVerifier {
    verdicts: HashMap<String, PhoneVerdict>,
    unavailable: bool,
}

impl MockPhoneVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verdict(mut self, e164: &str, valid: bool, confidence: f64) -> Self {
        self.verdicts
            .insert(e164.to_string(), PhoneVerdict { valid, confidence });
        self
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl PhoneVerificationCapability for MockPhoneVerifier {
    async fn verify(&self, e164: &str) -> Result<PhoneVerdict, EnrichmentError> {
        if self.unavailable {
            return Err(EnrichmentError::CapabilityUnavailable("verifier offline".into()));
        }
        Ok(self.verdicts.get(e164).copied().unwrap_or(PhoneVerdict {
            valid: false,
            confidence: 0.0,
        }))
    }
}

// ---------------------------------------------------------------------------
// MockLocationResolver
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockLocationResolver {
    places: HashMap<String, ResolvedPlace>,
    unavailable: bool,
}

impl MockLocationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place(mut self, text: &str, name: &str, confidence: f64) -> Self {
        self.places.insert(
            text.to_string(),
            ResolvedPlace {
                place: Place {
                    name: name.to_string(),
                    region: None,
                    country: "US".to_string(),
                    lat: 0.0,
                    lng: 0.0,
                    geohash: "s000000".to_string(),
                },
                confidence,
            },
        );
        self
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl LocationResolutionCapability for MockLocationResolver {
    async fn resolve(&self, text: &str) -> Result<Option<ResolvedPlace>, EnrichmentError> {
        if self.unavailable {
            return Err(EnrichmentError::CapabilityUnavailable("geocoder offline".into()));
        }
        Ok(self.places.get(text).cloned())
    }
}

// ---------------------------------------------------------------------------
// StaticEnricher
// ---------------------------------------------------------------------------

pub struct StaticEnricher {
    kind: SignalKind,
    outcome: Result<f64, EnrichmentError>,
    delay: Option<Duration>,
}

impl StaticEnricher {
    pub fn ok(kind: SignalKind, confidence: f64) -> Self {
        Self {
            kind,
            outcome: Ok(confidence),
            delay: None,
        }
    }

    pub fn failing(kind: SignalKind, error: EnrichmentError) -> Self {
        Self {
            kind,
            outcome: Err(error),
            delay: None,
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Enricher for StaticEnricher {
    fn kind(&self) -> SignalKind {
        self.kind
    }

    fn producer(&self) -> &'static str {
        "static"
    }

    async fn enrich(&self, _record: &ProfileRecord) -> Result<Signal, EnrichmentError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone().map(|confidence| signal(self.kind, confidence))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A parsed record with no signals. Blank arguments leave the field unset.
pub fn fixture_record(name: &str, phone: &str) -> ProfileRecord {
    let present = |s: &str| (!s.trim().is_empty()).then(|| s.to_string());
    ProfileRecord::new(
        ProfileFields {
            name: present(name),
            phone: present(phone),
            ..ProfileFields::default()
        },
        "https://listings.test/profile",
        "css_class",
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    )
}

/// A well-formed signal of `kind` with an empty analysis payload.
pub fn signal(kind: SignalKind, confidence: f64) -> Signal {
    let value = match kind {
        SignalKind::Image => SignalValue::Image(ImageAnalysis::default()),
        SignalKind::Phone => SignalValue::Phone(PhoneAnalysis::default()),
        SignalKind::Name => SignalValue::Name(NameAnalysis::default()),
        SignalKind::Location => SignalValue::Location(LocationAnalysis::default()),
        SignalKind::Completeness => SignalValue::Completeness(CompletenessAnalysis::default()),
    };
    Signal::new(kind, value, confidence, "fixture")
}

/// A flat grayscale PNG. Different levels give different bytes.
pub fn png_bytes(level: u8) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(GrayImage::from_pixel(16, 16, Luma([level])))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode png fixture");
    buf
}

/// A listing page in the class-based markup most sources use.
pub fn profile_page(name: &str, phone: &str, location: &str, images: &[&str]) -> String {
    let imgs: String = images
        .iter()
        .map(|src| format!(r#"<img class="profile-image" src="{src}">"#))
        .collect();
    format!(
        r#"<html><body>
  <h1 class="profile-name">{name}</h1>
  <div class="phone-number">{phone}</div>
  <div class="location">{location}</div>
  <div class="message">Available weekdays.</div>
  {imgs}
</body></html>"#
    )
}
