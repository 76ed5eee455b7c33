// Content-addressed filesystem store.
//
// Layout under the data dir:
//   profiles/raw/{id}.json      first writer wins
//   profiles/scored/{id}.json   replaced on every write
//   images/{sha256}.bin         first writer wins, verified on read
//   images/{sha256}.json        perceptual hash + quality
//   graph/edges.json            replaced on every write

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dashmap::DashSet;
use datasnatch_common::{content_hash, ImageAsset, ProfileId, ProfileRecord, RelationshipEdge, StoreError};
use serde::Serialize;
use tracing::{debug, error, info, warn};

pub type Result<T> = std::result::Result<T, StoreError>;

/// Whether a put created the entry or found it already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Created,
    Existing,
}

/// Scored profiles read back from disk, with any entries that failed to load.
#[derive(Debug, Default)]
pub struct LoadedProfiles {
    pub records: Vec<ProfileRecord>,
    pub corrupt: Vec<StoreError>,
}

pub struct Store {
    root: PathBuf,
    images: DashSet<String>,
    raw_profiles: DashSet<ProfileId>,
}

impl Store {
    /// Open (creating if needed) a store rooted at `root` and index what is
    /// already on disk.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in ["profiles/raw", "profiles/scored", "images", "graph"] {
            tokio::fs::create_dir_all(root.join(dir)).await?;
        }

        let images = DashSet::new();
        for stem in list_stems(&root.join("images"), "bin").await? {
            images.insert(stem);
        }
        let raw_profiles = DashSet::new();
        for stem in list_stems(&root.join("profiles/raw"), "json").await? {
            raw_profiles.insert(ProfileId(stem));
        }

        info!(
            root = %root.display(),
            images = images.len(),
            raw_profiles = raw_profiles.len(),
            "Store opened"
        );
        Ok(Self {
            root,
            images,
            raw_profiles,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn image_path(&self, hash: &str) -> PathBuf {
        self.root.join("images").join(format!("{hash}.bin"))
    }

    fn image_meta_path(&self, hash: &str) -> PathBuf {
        self.root.join("images").join(format!("{hash}.json"))
    }

    fn raw_path(&self, id: &ProfileId) -> PathBuf {
        self.root.join("profiles/raw").join(format!("{id}.json"))
    }

    fn scored_path(&self, id: &ProfileId) -> PathBuf {
        self.root.join("profiles/scored").join(format!("{id}.json"))
    }

    fn edges_path(&self) -> PathBuf {
        self.root.join("graph/edges.json")
    }

    // --- Images ---

    /// Store image bytes under their content hash. Concurrent writers of the
    /// same hash race on an atomic link; the loser gets `Existing`.
    pub async fn put_image(&self, asset: &ImageAsset) -> Result<StoreOutcome> {
        let actual = content_hash(&asset.bytes);
        if actual != asset.content_hash {
            return Err(StoreError::Corrupt {
                key: format!("images/{}", asset.content_hash),
                reason: format!("bytes hash to {actual}"),
            });
        }
        let hash = asset.content_hash.clone();
        if self.images.contains(&hash) {
            debug!(hash = hash.as_str(), "Image already stored");
            return Ok(StoreOutcome::Existing);
        }

        let outcome = write_once(&self.image_path(&hash), &asset.bytes).await?;
        if outcome == StoreOutcome::Created {
            let meta = serde_json::to_vec_pretty(asset)?;
            write_once(&self.image_meta_path(&hash), &meta).await?;
        }
        self.images.insert(hash);
        Ok(outcome)
    }

    /// Read an image back, verifying the bytes still match the address.
    pub async fn get_image(&self, hash: &str) -> Result<Option<ImageAsset>> {
        let bytes = match tokio::fs::read(self.image_path(hash)).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let actual = content_hash(&bytes);
        if actual != hash {
            error!(hash, actual = actual.as_str(), "Stored image does not match its address");
            return Err(StoreError::Corrupt {
                key: format!("images/{hash}"),
                reason: format!("bytes hash to {actual}"),
            });
        }

        let mut asset = match tokio::fs::read(self.image_meta_path(hash)).await {
            Ok(meta) => serde_json::from_slice::<ImageAsset>(&meta).map_err(|e| StoreError::Corrupt {
                key: format!("images/{hash}.json"),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => ImageAsset {
                content_hash: hash.to_string(),
                bytes: Vec::new(),
                perceptual_hash: None,
                quality: None,
            },
            Err(e) => return Err(e.into()),
        };
        asset.bytes = bytes;
        Ok(Some(asset))
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    // --- Profiles ---

    /// Store a parsed profile under its id. The same listing already on disk is
    /// `Existing`; different content under the same id is a `WriteConflict`
    /// and the stored copy is kept.
    pub async fn put_raw_profile(&self, record: &ProfileRecord) -> Result<StoreOutcome> {
        let path = self.raw_path(&record.id);
        let body = serde_json::to_vec_pretty(record)?;

        let outcome = if self.raw_profiles.contains(&record.id) {
            StoreOutcome::Existing
        } else {
            write_once(&path, &body).await?
        };
        self.raw_profiles.insert(record.id.clone());

        if outcome == StoreOutcome::Existing {
            let key = format!("profiles/raw/{}", record.id);
            let existing = read_profile(&path, &key, &record.id).await?;
            if existing.is_some_and(|e| !e.same_listing(record)) {
                warn!(id = %record.id, "Raw profile differs from stored copy, keeping existing");
                return Err(StoreError::WriteConflict { key });
            }
        }
        Ok(outcome)
    }

    pub async fn get_raw_profile(&self, id: &ProfileId) -> Result<Option<ProfileRecord>> {
        read_profile(&self.raw_path(id), &format!("profiles/raw/{id}"), id).await
    }

    /// Scored outputs are recomputable from signals, so the latest write wins.
    pub async fn put_scored_profile(&self, record: &ProfileRecord) -> Result<()> {
        write_replace(&self.scored_path(&record.id), record).await
    }

    pub async fn get_scored_profile(&self, id: &ProfileId) -> Result<Option<ProfileRecord>> {
        read_profile(&self.scored_path(id), &format!("profiles/scored/{id}"), id).await
    }

    /// Load every scored profile, sorted by id. Entries that fail to parse or
    /// whose id does not match their file name are reported as corrupt.
    pub async fn load_scored_profiles(&self) -> Result<LoadedProfiles> {
        let mut loaded = LoadedProfiles::default();
        let mut stems = list_stems(&self.root.join("profiles/scored"), "json").await?;
        stems.sort();
        for stem in stems {
            let id = ProfileId(stem);
            match self.get_scored_profile(&id).await {
                Ok(Some(record)) => loaded.records.push(record),
                Ok(None) => {}
                Err(e @ StoreError::Corrupt { .. }) => {
                    error!(error = %e, "Corrupt scored profile");
                    loaded.corrupt.push(e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(loaded)
    }

    // --- Graph ---

    pub async fn put_edges(&self, edges: &[RelationshipEdge]) -> Result<()> {
        write_replace(&self.edges_path(), &edges).await?;
        info!(edges = edges.len(), "Relationship graph written");
        Ok(())
    }

    pub async fn load_edges(&self) -> Result<Vec<RelationshipEdge>> {
        match tokio::fs::read(self.edges_path()).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                key: "graph/edges.json".to_string(),
                reason: e.to_string(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `bytes` to `path` only if nothing is there yet. The data goes to a
/// temp file first and is hard-linked into place, so readers never observe a
/// partial file and exactly one concurrent writer wins.
async fn write_once(path: &Path, bytes: &[u8]) -> Result<StoreOutcome> {
    let tmp = temp_sibling(path);
    tokio::fs::write(&tmp, bytes).await?;
    let linked = tokio::fs::hard_link(&tmp, path).await;
    let _ = tokio::fs::remove_file(&tmp).await;
    match linked {
        Ok(()) => Ok(StoreOutcome::Created),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(StoreOutcome::Existing),
        Err(e) => Err(e.into()),
    }
}

async fn write_replace<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let tmp = temp_sibling(path);
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()))
}

async fn read_profile(path: &Path, key: &str, id: &ProfileId) -> Result<Option<ProfileRecord>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let record: ProfileRecord = serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    if &record.id != id {
        return Err(StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("document id {} does not match its key", record.id),
        });
    }
    Ok(Some(record))
}

/// File stems in `dir` with the given extension, skipping temp files.
async fn list_stems(dir: &Path, ext: &str) -> Result<Vec<String>> {
    let mut stems = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if !stem.starts_with('.') {
                stems.push(stem.to_string());
            }
        }
    }
    Ok(stems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use datasnatch_common::{ProfileFields, RelationKind};
    use std::sync::Arc;

    fn asset(bytes: &[u8]) -> ImageAsset {
        ImageAsset {
            content_hash: content_hash(bytes),
            bytes: bytes.to_vec(),
            perceptual_hash: Some(0xdead_beef),
            quality: Some(0.5),
        }
    }

    fn record(name: &str) -> ProfileRecord {
        ProfileRecord::new(
            ProfileFields {
                name: Some(name.to_string()),
                phone: Some("+15551234567".to_string()),
                ..Default::default()
            },
            "https://x.test/p/1",
            "css_class",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn identical_images_are_stored_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();

        assert_eq!(store.put_image(&asset(b"pixels")).await.unwrap(), StoreOutcome::Created);
        assert_eq!(store.put_image(&asset(b"pixels")).await.unwrap(), StoreOutcome::Existing);
        assert_eq!(store.image_count(), 1);

        let bins = list_stems(&dir.path().join("images"), "bin").await.unwrap();
        assert_eq!(bins.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_image_writers_have_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path()).await.unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.put_image(&asset(b"same bytes")).await.unwrap() })
            })
            .collect();
        let mut created = 0;
        for h in handles {
            if h.await.unwrap() == StoreOutcome::Created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        let bins = list_stems(&dir.path().join("images"), "bin").await.unwrap();
        assert_eq!(bins.len(), 1);
    }

    #[tokio::test]
    async fn image_round_trips_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        let a = asset(b"pixels");
        store.put_image(&a).await.unwrap();

        let back = store.get_image(&a.content_hash).await.unwrap().unwrap();
        assert_eq!(back.bytes, b"pixels");
        assert_eq!(back.perceptual_hash, Some(0xdead_beef));
        assert!(store.get_image("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tampered_image_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        let a = asset(b"pixels");
        store.put_image(&a).await.unwrap();
        std::fs::write(store.image_path(&a.content_hash), b"tampered").unwrap();

        let err = store.get_image(&a.content_hash).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn mismatched_asset_hash_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        let mut a = asset(b"pixels");
        a.content_hash = content_hash(b"other");
        assert!(matches!(store.put_image(&a).await, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn raw_profile_first_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        let first = record("Jane Doe");
        assert_eq!(store.put_raw_profile(&first).await.unwrap(), StoreOutcome::Created);
        assert_eq!(store.put_raw_profile(&first).await.unwrap(), StoreOutcome::Existing);

        let mut changed = first.clone();
        changed.message = Some("different".into());
        let err = store.put_raw_profile(&changed).await.unwrap_err();
        assert!(matches!(err, StoreError::WriteConflict { .. }));

        let kept = store.get_raw_profile(&first.id).await.unwrap().unwrap();
        assert_eq!(kept.message, None);
    }

    #[tokio::test]
    async fn index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path()).await.unwrap();
            store.put_image(&asset(b"pixels")).await.unwrap();
        }
        let store = Store::open(dir.path()).await.unwrap();
        assert_eq!(store.image_count(), 1);
        assert_eq!(store.put_image(&asset(b"pixels")).await.unwrap(), StoreOutcome::Existing);
    }

    #[tokio::test]
    async fn scored_profiles_are_replaced_and_corruption_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        let mut r = record("Jane Doe");
        store.put_scored_profile(&r).await.unwrap();
        r.set_score(Some(0.5), None);
        store.put_scored_profile(&r).await.unwrap();

        std::fs::write(dir.path().join("profiles/scored/bogus.json"), b"{not json").unwrap();

        let loaded = store.load_scored_profiles().await.unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].authenticity_score, Some(0.5));
        assert_eq!(loaded.corrupt.len(), 1);
    }

    #[tokio::test]
    async fn edges_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        assert!(store.load_edges().await.unwrap().is_empty());

        let edges = vec![RelationshipEdge::new(
            ProfileId("a".into()),
            ProfileId("b".into()),
            RelationKind::PhoneMatch,
            1.0,
        )];
        store.put_edges(&edges).await.unwrap();
        assert_eq!(store.load_edges().await.unwrap(), edges);
    }
}
