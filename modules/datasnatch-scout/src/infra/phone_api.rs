use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use datasnatch_common::EnrichmentError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::traits::{PhoneVerdict, PhoneVerificationCapability};

/// Generic JSON phone-verification endpoint.
///
/// `POST {url}` with `{"phone": "+1..."}`, bearer key if configured, expecting
/// `{"valid": bool, "confidence": f64}` back. Any transport or protocol
/// failure surfaces as `CapabilityUnavailable`.
pub struct HttpPhoneVerifier {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    phone: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    valid: bool,
    confidence: f64,
}

impl HttpPhoneVerifier {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl PhoneVerificationCapability for HttpPhoneVerifier {
    async fn verify(&self, e164: &str) -> Result<PhoneVerdict, EnrichmentError> {
        let unavailable = |e: reqwest::Error| EnrichmentError::CapabilityUnavailable(e.to_string());

        let mut req = self.client.post(&self.url).json(&VerifyRequest { phone: e164 });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.map_err(unavailable)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EnrichmentError::CapabilityUnavailable(format!(
                "phone api returned {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: VerifyResponse = resp.json().await.map_err(unavailable)?;
        debug!(phone = e164, valid = parsed.valid, confidence = parsed.confidence, "Phone verified");
        Ok(PhoneVerdict {
            valid: parsed.valid,
            confidence: if parsed.confidence.is_nan() {
                0.0
            } else {
                parsed.confidence.clamp(0.0, 1.0)
            },
        })
    }
}
