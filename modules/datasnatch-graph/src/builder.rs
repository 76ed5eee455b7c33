use std::collections::{BTreeMap, HashMap};

use datasnatch_common::file_config::GraphConfig;
use datasnatch_common::{
    phone_match_key, ProfileId, ProfileRecord, RelationKind, RelationshipEdge, SignalKind,
    SignalValue,
};
use serde::Serialize;
use tracing::{info, warn};

/// Below this many characters a name carries too little to fuzzy-match.
const MIN_NAME_LEN: usize = 3;

/// With 8 byte-chunks, any two hashes within 7 bits agree on at least one
/// whole chunk, so chunk buckets find every candidate.
const MAX_INDEXED_HAMMING: u32 = 7;

/// Builds relationship edges across one batch of scored profiles.
///
/// Exact kinds (phone, image content hash, face cluster) are bucketed by key.
/// Perceptual-hash neighbours come from a chunked multi-index. Only fuzzy name
/// matching compares pairwise, and only within first-letter blocks.
pub struct GraphBuilder {
    config: GraphConfig,
    default_country_code: String,
}

/// Per-record keys pulled out once before bucketing.
struct Keys<'a> {
    id: &'a ProfileId,
    phone: Option<String>,
    content_hashes: Vec<&'a str>,
    perceptual_hashes: Vec<u64>,
    face_clusters: Vec<&'a str>,
    name: Option<String>,
}

impl GraphBuilder {
    pub fn new(config: GraphConfig, default_country_code: impl Into<String>) -> Self {
        Self {
            config,
            default_country_code: default_country_code.into(),
        }
    }

    /// Derive the edge set for `records`. Output is sorted and has at most one
    /// edge per (a, b, kind), keeping the strongest.
    pub fn build(&self, records: &[ProfileRecord]) -> Vec<RelationshipEdge> {
        let keys: Vec<Keys<'_>> = records.iter().map(|r| self.keys(r)).collect();
        let mut edges = EdgeSet::default();

        self.link_exact(&keys, &mut edges, RelationKind::PhoneMatch, |k| {
            k.phone.iter().map(String::as_str).collect()
        });
        self.link_exact(&keys, &mut edges, RelationKind::ImageMatch, |k| k.content_hashes.clone());
        self.link_exact(&keys, &mut edges, RelationKind::FaceCluster, |k| k.face_clusters.clone());
        self.link_near_images(&keys, &mut edges);
        self.link_names(&keys, &mut edges);

        let edges = edges.into_sorted();
        let stats = GraphStats::from_edges(records.len(), &edges);
        info!(%stats, "Relationship graph built");
        edges
    }

    fn keys<'a>(&self, record: &'a ProfileRecord) -> Keys<'a> {
        let mut content_hashes = Vec::new();
        let mut perceptual_hashes = Vec::new();
        let mut face_clusters = Vec::new();
        if let Some(SignalValue::Image(analysis)) = record.signal(SignalKind::Image).map(|s| &s.value) {
            for obs in &analysis.images {
                if let Some(h) = obs.content_hash.as_deref() {
                    content_hashes.push(h);
                }
                if let Some(p) = obs.perceptual_hash.filter(|&p| !is_degenerate_dhash(p)) {
                    perceptual_hashes.push(p);
                }
                if let Some(c) = obs.face_cluster.as_deref() {
                    face_clusters.push(c);
                }
            }
        }
        content_hashes.sort_unstable();
        content_hashes.dedup();
        perceptual_hashes.sort_unstable();
        perceptual_hashes.dedup();
        face_clusters.sort_unstable();
        face_clusters.dedup();

        Keys {
            id: &record.id,
            phone: record
                .phone
                .as_deref()
                .and_then(|p| phone_match_key(p, &self.default_country_code)),
            content_hashes,
            perceptual_hashes,
            face_clusters,
            name: record.name.as_deref().map(normalize_name).filter(|n| n.chars().count() >= MIN_NAME_LEN),
        }
    }

    fn link_exact<'k>(
        &self,
        keys: &'k [Keys<'k>],
        edges: &mut EdgeSet,
        kind: RelationKind,
        extract: impl Fn(&'k Keys<'k>) -> Vec<&'k str>,
    ) {
        let mut buckets: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, k) in keys.iter().enumerate() {
            for key in extract(k) {
                buckets.entry(key).or_default().push(i);
            }
        }
        for members in buckets.values().filter(|m| m.len() > 1) {
            for (x, &i) in members.iter().enumerate() {
                for &j in &members[x + 1..] {
                    edges.insert(keys[i].id, keys[j].id, kind, 1.0);
                }
            }
        }
    }

    fn link_near_images(&self, keys: &[Keys<'_>], edges: &mut EdgeSet) {
        let threshold = self.config.image_max_hamming;
        let hashes: Vec<(usize, u64)> = keys
            .iter()
            .enumerate()
            .flat_map(|(i, k)| k.perceptual_hashes.iter().map(move |&h| (i, h)))
            .collect();

        let mut check = |a: (usize, u64), b: (usize, u64)| {
            if a.0 == b.0 {
                return;
            }
            let distance = (a.1 ^ b.1).count_ones();
            if distance <= threshold {
                let strength = 1.0 - distance as f64 / 64.0;
                edges.insert(keys[a.0].id, keys[b.0].id, RelationKind::ImageMatch, strength);
            }
        };

        if threshold > MAX_INDEXED_HAMMING {
            for (x, &a) in hashes.iter().enumerate() {
                for &b in &hashes[x + 1..] {
                    check(a, b);
                }
            }
            return;
        }

        let mut buckets: HashMap<(u8, u8), Vec<usize>> = HashMap::new();
        for (pos, &(_, h)) in hashes.iter().enumerate() {
            for chunk in 0..8u8 {
                let byte = (h >> (chunk * 8)) as u8;
                buckets.entry((chunk, byte)).or_default().push(pos);
            }
        }
        let mut seen = std::collections::HashSet::new();
        for members in buckets.values().filter(|m| m.len() > 1) {
            for (x, &p) in members.iter().enumerate() {
                for &q in &members[x + 1..] {
                    if seen.insert((p.min(q), p.max(q))) {
                        check(hashes[p], hashes[q]);
                    }
                }
            }
        }
    }

    fn link_names(&self, keys: &[Keys<'_>], edges: &mut EdgeSet) {
        let mut blocks: BTreeMap<char, Vec<usize>> = BTreeMap::new();
        for (i, k) in keys.iter().enumerate() {
            if let Some(first) = k.name.as_deref().and_then(|n| n.chars().next()) {
                blocks.entry(first).or_default().push(i);
            }
        }

        for (block, members) in &blocks {
            if members.len() > self.config.max_name_block {
                warn!(
                    block = %block,
                    size = members.len(),
                    max = self.config.max_name_block,
                    "Name block too large, skipping fuzzy comparison"
                );
                continue;
            }
            for (x, &i) in members.iter().enumerate() {
                for &j in &members[x + 1..] {
                    let (Some(a), Some(b)) = (keys[i].name.as_deref(), keys[j].name.as_deref()) else {
                        continue;
                    };
                    let similarity = strsim::jaro_winkler(a, b);
                    if similarity >= self.config.name_min_similarity {
                        edges.insert(keys[i].id, keys[j].id, RelationKind::NameMatch, similarity);
                    }
                }
            }
        }
    }
}

/// Flat and uniform images hash to all zeros (or all ones for a perfectly
/// monotone gradient), so these carry no near-duplicate evidence.
fn is_degenerate_dhash(hash: u64) -> bool {
    hash == 0 || hash == u64::MAX
}

/// Lowercased, letters and digits only, single-spaced.
fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Default)]
struct EdgeSet {
    edges: BTreeMap<(ProfileId, ProfileId, RelationKind), f64>,
}

impl EdgeSet {
    fn insert(&mut self, x: &ProfileId, y: &ProfileId, kind: RelationKind, strength: f64) {
        if x == y {
            return;
        }
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        let slot = self
            .edges
            .entry((a.clone(), b.clone(), kind))
            .or_insert(strength);
        if strength > *slot {
            *slot = strength;
        }
    }

    fn into_sorted(self) -> Vec<RelationshipEdge> {
        self.edges
            .into_iter()
            .map(|((a, b, kind), strength)| RelationshipEdge::new(a, b, kind, strength))
            .collect()
    }
}

/// Edge counts by kind for one build.
#[derive(Debug, Default, Clone, Serialize)]
pub struct GraphStats {
    pub profiles: usize,
    pub phone_matches: usize,
    pub image_matches: usize,
    pub face_clusters: usize,
    pub name_matches: usize,
}

impl GraphStats {
    pub fn from_edges(profiles: usize, edges: &[RelationshipEdge]) -> Self {
        let mut stats = Self {
            profiles,
            ..Default::default()
        };
        for edge in edges {
            match edge.kind {
                RelationKind::PhoneMatch => stats.phone_matches += 1,
                RelationKind::ImageMatch => stats.image_matches += 1,
                RelationKind::FaceCluster => stats.face_clusters += 1,
                RelationKind::NameMatch => stats.name_matches += 1,
            }
        }
        stats
    }

    pub fn total(&self) -> usize {
        self.phone_matches + self.image_matches + self.face_clusters + self.name_matches
    }
}

impl std::fmt::Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} profiles, {} edges (phone={}, image={}, face={}, name={})",
            self.profiles,
            self.total(),
            self.phone_matches,
            self.image_matches,
            self.face_clusters,
            self.name_matches
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use datasnatch_common::{ImageAnalysis, ImageObservation, ProfileFields, Signal};

    fn builder() -> GraphBuilder {
        GraphBuilder::new(GraphConfig::default(), "1")
    }

    fn profile(name: &str, phone: Option<&str>, url: &str) -> ProfileRecord {
        ProfileRecord::new(
            ProfileFields {
                name: Some(name.to_string()),
                phone: phone.map(str::to_string),
                ..Default::default()
            },
            url,
            "css_class",
            Utc::now(),
        )
    }

    fn with_images(mut record: ProfileRecord, images: Vec<ImageObservation>) -> ProfileRecord {
        let value = SignalValue::Image(ImageAnalysis {
            images,
            face_detected: false,
            mean_quality: 0.5,
        });
        assert!(record.push_signal(Signal::new(SignalKind::Image, value, 0.5, "image")));
        record
    }

    fn observation(hash: &str, phash: u64, cluster: Option<&str>) -> ImageObservation {
        ImageObservation {
            url: format!("https://img.test/{hash}.jpg"),
            content_hash: Some(hash.to_string()),
            perceptual_hash: Some(phash),
            quality: Some(0.5),
            face_cluster: cluster.map(str::to_string),
            note: None,
        }
    }

    fn kinds(edges: &[RelationshipEdge]) -> Vec<RelationKind> {
        edges.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn identical_phones_always_link() {
        let records = vec![
            profile("Alice Smith", Some("(555) 123-4567"), "https://x.test/1"),
            profile("Zed Quinn", Some("+1 555 123 4567"), "https://x.test/2"),
        ];
        let edges = builder().build(&records);
        assert_eq!(kinds(&edges), vec![RelationKind::PhoneMatch]);
        assert_eq!(edges[0].strength, 1.0);
    }

    #[test]
    fn identical_short_phones_link() {
        let records = vec![
            profile("Alice Smith", Some("555-1234"), "https://x.test/1"),
            profile("Zed Quinn", Some("555 1234"), "https://x.test/2"),
            profile("Mona Lee", Some("555-9999"), "https://x.test/3"),
        ];
        let edges = builder().build(&records);
        assert_eq!(kinds(&edges), vec![RelationKind::PhoneMatch]);
        assert!(edges.iter().all(|e| e.a != records[2].id && e.b != records[2].id));
    }

    #[test]
    fn unrelated_profiles_produce_no_edges() {
        let records = vec![
            profile("Alice Smith", Some("5551234567"), "https://x.test/1"),
            profile("Zed Quinn", Some("5559876543"), "https://x.test/2"),
        ];
        assert!(builder().build(&records).is_empty());
    }

    #[test]
    fn shared_image_hash_links() {
        let a = with_images(
            profile("Alice Smith", None, "https://x.test/1"),
            vec![observation("abc", 0x0f0f_0f0f_0f0f_0f0f, None)],
        );
        let b = with_images(
            profile("Zed Quinn", None, "https://x.test/2"),
            vec![observation("abc", 0x0f0f_0f0f_0f0f_0f0f, None)],
        );
        let edges = builder().build(&[a, b]);
        assert_eq!(kinds(&edges), vec![RelationKind::ImageMatch]);
        assert_eq!(edges[0].strength, 1.0);
    }

    #[test]
    fn near_duplicate_images_link_with_distance_strength() {
        let a = with_images(
            profile("Alice Smith", None, "https://x.test/1"),
            vec![observation("aaa", 0xffff_0000_ffff_0000, None)],
        );
        let b = with_images(
            profile("Zed Quinn", None, "https://x.test/2"),
            vec![observation("bbb", 0xffff_0000_ffff_0007, None)],
        );
        let c = with_images(
            profile("Mona Lee", None, "https://x.test/3"),
            vec![observation("ccc", 0x0000_ffff_0000_ffff, None)],
        );
        let edges = builder().build(&[a, b, c]);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, RelationKind::ImageMatch);
        assert!((edges[0].strength - (1.0 - 3.0 / 64.0)).abs() < 1e-9);
    }

    #[test]
    fn wide_hamming_threshold_falls_back_to_pairwise() {
        let config = GraphConfig {
            image_max_hamming: 16,
            ..GraphConfig::default()
        };
        let a = with_images(
            profile("Alice Smith", None, "https://x.test/1"),
            vec![observation("aaa", 0x0101_0101_0101_0101, None)],
        );
        // eight bits off, spread so no byte chunk is shared
        let b = with_images(
            profile("Zed Quinn", None, "https://x.test/2"),
            vec![observation("bbb", 0x0303_0303_0303_0303 ^ 0x0000_0000_0000_0006, None)],
        );
        let edges = GraphBuilder::new(config, "1").build(&[a, b]);
        assert_eq!(kinds(&edges), vec![RelationKind::ImageMatch]);
    }

    #[test]
    fn blank_images_are_not_near_duplicates() {
        let a = with_images(
            profile("Alice Smith", None, "https://x.test/1"),
            vec![observation("white", 0, None)],
        );
        let b = with_images(
            profile("Zed Quinn", None, "https://x.test/2"),
            vec![observation("grey", 0, None)],
        );
        let c = with_images(
            profile("Mona Lee", None, "https://x.test/3"),
            vec![observation("ramp", u64::MAX, None)],
        );
        let d = with_images(
            profile("Omar Khan", None, "https://x.test/4"),
            vec![observation("ramp2", u64::MAX, None)],
        );
        assert!(builder().build(&[a, b, c, d]).is_empty());
    }

    #[test]
    fn face_cluster_comembers_link() {
        let a = with_images(
            profile("Alice Smith", None, "https://x.test/1"),
            vec![observation("aaa", 0, Some("cluster-7"))],
        );
        let b = with_images(
            profile("Zed Quinn", None, "https://x.test/2"),
            vec![observation("bbb", u64::MAX, Some("cluster-7"))],
        );
        let edges = builder().build(&[a, b]);
        assert_eq!(kinds(&edges), vec![RelationKind::FaceCluster]);
    }

    #[test]
    fn similar_names_link_above_threshold() {
        let records = vec![
            profile("Jane Doe", None, "https://x.test/1"),
            profile("jane  doe.", None, "https://x.test/2"),
            profile("Janet Dawson", None, "https://x.test/3"),
        ];
        let edges = builder().build(&records);
        assert_eq!(kinds(&edges), vec![RelationKind::NameMatch]);
        assert_eq!(edges[0].strength, 1.0);
    }

    #[test]
    fn oversized_name_blocks_are_skipped() {
        let config = GraphConfig {
            max_name_block: 1,
            ..GraphConfig::default()
        };
        let records = vec![
            profile("Jane Doe", None, "https://x.test/1"),
            profile("Jane Doe", None, "https://x.test/2"),
        ];
        assert!(GraphBuilder::new(config, "1").build(&records).is_empty());
    }

    #[test]
    fn multiple_kinds_between_one_pair() {
        let a = with_images(
            profile("Jane Doe", Some("5551234567"), "https://x.test/1"),
            vec![observation("abc", 42, None)],
        );
        let b = with_images(
            profile("Jane Doe", Some("555-123-4567"), "https://x.test/2"),
            vec![observation("abc", 42, None)],
        );
        let edges = builder().build(&[a, b]);
        assert_eq!(
            kinds(&edges),
            vec![RelationKind::PhoneMatch, RelationKind::ImageMatch, RelationKind::NameMatch]
        );
        assert!(edges.iter().all(|e| e.a < e.b));
    }

    #[test]
    fn build_is_order_independent() {
        let records = vec![
            profile("Jane Doe", Some("5551234567"), "https://x.test/1"),
            profile("Jane Doe", Some("5551234567"), "https://x.test/2"),
            profile("Jayne Doe", None, "https://x.test/3"),
        ];
        let mut reversed = records.clone();
        reversed.reverse();
        assert_eq!(builder().build(&records), builder().build(&reversed));
    }

    #[test]
    fn stats_display() {
        let records = vec![
            profile("Alice Smith", Some("5551234567"), "https://x.test/1"),
            profile("Zed Quinn", Some("5551234567"), "https://x.test/2"),
        ];
        let edges = builder().build(&records);
        let stats = GraphStats::from_edges(records.len(), &edges);
        assert_eq!(stats.to_string(), "2 profiles, 1 edges (phone=1, image=0, face=0, name=0)");
    }
}
