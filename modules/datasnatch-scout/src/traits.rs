// Capability boundaries consumed by the enrichers.
//
// Each external collaborator (face recognition, phone verification, location
// resolution) sits behind one trait so the pipeline runs against mocks in
// tests and against whichever provider is configured in production.

use async_trait::async_trait;
use datasnatch_common::{EnrichmentError, Place};

// ---------------------------------------------------------------------------
// RecognitionCapability
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RecognitionCapability: Send + Sync {
    /// Face-cluster id for the face in `image`, or `None` when no face is found.
    async fn recognize(&self, image: &[u8]) -> Result<Option<String>, EnrichmentError>;
}

// ---------------------------------------------------------------------------
// PhoneVerificationCapability
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhoneVerdict {
    pub valid: bool,
    pub confidence: f64,
}

#[async_trait]
pub trait PhoneVerificationCapability: Send + Sync {
    /// Verify an E.164 number.
    async fn verify(&self, e164: &str) -> Result<PhoneVerdict, EnrichmentError>;
}

// ---------------------------------------------------------------------------
// LocationResolutionCapability
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlace {
    pub place: Place,
    pub confidence: f64,
}

#[async_trait]
pub trait LocationResolutionCapability: Send + Sync {
    /// Canonical place for free text, or `None` when it cannot be resolved.
    async fn resolve(&self, text: &str) -> Result<Option<ResolvedPlace>, EnrichmentError>;
}
