use std::sync::Arc;

use async_trait::async_trait;
use datasnatch_archive::{Fetcher, Store};
use datasnatch_common::file_config::AnalysisConfig;
use datasnatch_common::{
    content_hash, EnrichmentError, FetchTask, ImageAnalysis, ImageAsset, ImageObservation,
    ProfileRecord, Signal, SignalKind, SignalValue,
};
use futures::future::join_all;
use tracing::{debug, warn};

use super::quality::{self, ImageMetrics};
use super::Enricher;
use crate::traits::RecognitionCapability;

/// Downloads each referenced image through the shared Fetcher, measures it,
/// stores it by content hash and asks the recognition capability for a face
/// cluster.
pub struct ImageEnricher {
    fetcher: Arc<Fetcher>,
    store: Arc<Store>,
    recognition: Option<Arc<dyn RecognitionCapability>>,
    min_quality: f64,
    face_bonus: f64,
    max_images: usize,
}

impl ImageEnricher {
    pub fn new(
        fetcher: Arc<Fetcher>,
        store: Arc<Store>,
        recognition: Option<Arc<dyn RecognitionCapability>>,
        analysis: &AnalysisConfig,
    ) -> Self {
        Self {
            fetcher,
            store,
            recognition,
            min_quality: analysis.min_image_quality,
            face_bonus: analysis.face_bonus,
            max_images: analysis.max_images_per_profile.max(1),
        }
    }

    async fn observe(&self, url: &str) -> ImageObservation {
        let mut obs = ImageObservation {
            url: url.to_string(),
            content_hash: None,
            perceptual_hash: None,
            quality: None,
            face_cluster: None,
            note: None,
        };

        let page = match self.fetcher.fetch(FetchTask::new(url)).await {
            Ok(page) => page,
            Err(e) => {
                obs.note = Some(format!("missing: {e}"));
                return obs;
            }
        };
        let hash = content_hash(&page.body);
        obs.content_hash = Some(hash.clone());

        let (bytes, measured) = match decode(page.body).await {
            Ok(result) => result,
            Err(note) => {
                obs.note = Some(note);
                return obs;
            }
        };
        let metrics = match measured {
            Ok(m) => m,
            Err(e) => {
                obs.note = Some(format!("corrupt: {e}"));
                return obs;
            }
        };
        obs.perceptual_hash = Some(metrics.dhash);
        obs.quality = Some(metrics.quality);
        if metrics.quality < self.min_quality {
            obs.note = Some(format!("below minimum quality {:.2}", self.min_quality));
        }

        if let Some(recognition) = &self.recognition {
            match recognition.recognize(&bytes).await {
                Ok(cluster) => obs.face_cluster = cluster,
                Err(e) => {
                    debug!(url, error = %e, "Recognition unavailable");
                    obs.note = Some(format!("recognition: {e}"));
                }
            }
        }

        let asset = ImageAsset {
            content_hash: hash,
            bytes,
            perceptual_hash: Some(metrics.dhash),
            quality: Some(metrics.quality),
        };
        if let Err(e) = self.store.put_image(&asset).await {
            warn!(url, error = %e, "Failed to store image");
        }

        obs
    }
}

/// Decode on the blocking pool, handing the bytes back for storage.
async fn decode(
    bytes: Vec<u8>,
) -> Result<(Vec<u8>, Result<ImageMetrics, image::ImageError>), String> {
    tokio::task::spawn_blocking(move || {
        let measured = quality::analyze(&bytes);
        (bytes, measured)
    })
    .await
    .map_err(|e| format!("decode task failed: {e}"))
}

#[async_trait]
impl Enricher for ImageEnricher {
    fn kind(&self) -> SignalKind {
        SignalKind::Image
    }

    fn producer(&self) -> &'static str {
        "image_analysis"
    }

    async fn enrich(&self, record: &ProfileRecord) -> Result<Signal, EnrichmentError> {
        if record.images.is_empty() {
            return Err(EnrichmentError::InvalidInput("no image references".to_string()));
        }

        let images = join_all(
            record
                .images
                .iter()
                .take(self.max_images)
                .map(|url| self.observe(url)),
        )
        .await;

        // Missing or corrupt images count as zero quality.
        let mean_quality =
            images.iter().map(|o| o.quality.unwrap_or(0.0)).sum::<f64>() / images.len() as f64;
        let face_detected = images.iter().any(|o| o.face_cluster.is_some());
        let confidence = mean_quality + if face_detected { self.face_bonus } else { 0.0 };

        debug!(
            profile = record.id.as_str(),
            images = images.len(),
            mean_quality,
            face_detected,
            "Images analyzed"
        );

        Ok(Signal::new(
            SignalKind::Image,
            SignalValue::Image(ImageAnalysis {
                images,
                face_detected,
                mean_quality,
            }),
            confidence,
            self.producer(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture_record, png_bytes, MockRecognition};
    use datasnatch_archive::testing::ScriptedTransport;
    use datasnatch_archive::FetcherConfig;

    struct Harness {
        transport: Arc<ScriptedTransport>,
        store: Arc<Store>,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        Harness {
            transport: Arc::new(ScriptedTransport::new()),
            store: Arc::new(Store::open(dir.path()).await.unwrap()),
            _dir: dir,
        }
    }

    fn enricher(h: &Harness, recognition: Option<Arc<dyn RecognitionCapability>>) -> ImageEnricher {
        let fetcher = Arc::new(Fetcher::new(h.transport.clone(), FetcherConfig::default()));
        ImageEnricher::new(fetcher, h.store.clone(), recognition, &AnalysisConfig::default())
    }

    #[tokio::test]
    async fn measures_stores_and_clusters() {
        let h = harness().await;
        let png = png_bytes(200);
        h.transport.page("https://img.test/a.png", png.clone());
        let recognition = MockRecognition::new().face(&png, "cluster-7");
        let e = enricher(&h, Some(Arc::new(recognition)));

        let mut record = fixture_record("Jane Doe", "+15551234567");
        record.images = vec!["https://img.test/a.png".into()];
        let signal = e.enrich(&record).await.unwrap();

        let SignalValue::Image(analysis) = &signal.value else {
            panic!("expected image analysis");
        };
        assert!(analysis.face_detected);
        assert_eq!(analysis.images[0].face_cluster.as_deref(), Some("cluster-7"));
        assert_eq!(analysis.images[0].content_hash.as_deref(), Some(content_hash(&png).as_str()));
        assert!(signal.confidence > analysis.mean_quality);
        assert_eq!(h.store.image_count(), 1);
    }

    #[tokio::test]
    async fn missing_and_corrupt_images_are_noted_not_fatal() {
        let h = harness().await;
        h.transport.page("https://img.test/good.png", png_bytes(200));
        h.transport.page("https://img.test/bad.jpg", b"\xff\xd8 truncated".to_vec());
        let e = enricher(&h, None);

        let mut record = fixture_record("Jane Doe", "+15551234567");
        record.images = vec![
            "https://img.test/good.png".into(),
            "https://img.test/bad.jpg".into(),
            "https://img.test/gone.png".into(),
        ];
        let signal = e.enrich(&record).await.unwrap();

        let SignalValue::Image(analysis) = &signal.value else {
            panic!("expected image analysis");
        };
        assert!(analysis.images[0].quality.is_some());
        assert!(analysis.images[1].note.as_deref().unwrap().starts_with("corrupt"));
        assert!(analysis.images[2].note.as_deref().unwrap().starts_with("missing"));
        let good = analysis.images[0].quality.unwrap();
        assert!((analysis.mean_quality - good / 3.0).abs() < 1e-9);
        assert_eq!(h.store.image_count(), 1);
    }

    #[tokio::test]
    async fn identical_bytes_stored_once_across_profiles() {
        let h = harness().await;
        let png = png_bytes(120);
        h.transport.page("https://a.test/1.png", png.clone());
        h.transport.page("https://b.test/copy.png", png);
        let e = enricher(&h, None);

        let mut first = fixture_record("Jane Doe", "+15551234567");
        first.images = vec!["https://a.test/1.png".into()];
        let mut second = fixture_record("Janet Doe", "+15559876543");
        second.images = vec!["https://b.test/copy.png".into()];

        let (a, b) = tokio::join!(e.enrich(&first), e.enrich(&second));
        let hash = |s: &Signal| match &s.value {
            SignalValue::Image(a) => a.images[0].content_hash.clone(),
            _ => None,
        };
        assert_eq!(hash(&a.unwrap()), hash(&b.unwrap()));
        assert_eq!(h.store.image_count(), 1);
    }

    #[tokio::test]
    async fn no_images_is_invalid_input() {
        let h = harness().await;
        let record = fixture_record("Jane Doe", "+15551234567");
        let err = enricher(&h, None).enrich(&record).await.unwrap_err();
        assert!(matches!(err, EnrichmentError::InvalidInput(_)));
    }
}
