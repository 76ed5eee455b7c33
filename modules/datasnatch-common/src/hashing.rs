use sha2::{Digest, Sha256};

use crate::types::ProfileId;

/// Hex SHA-256 of arbitrary bytes. Used as the content address for images
/// and as the basis of profile ids.
pub fn content_hash(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    hex::encode(hasher.finalize())
}

/// Stable id for a profile from its canonical fields.
///
/// Name whitespace is collapsed, the phone is reduced to `+` and digits, and the
/// source url is stripped of tracking parameters, so cosmetic differences in
/// the same listing hash identically. Fields are joined with a unit separator
/// so `("ab", "c")` and `("a", "bc")` cannot collide.
pub fn profile_id(name: Option<&str>, phone: Option<&str>, source_url: &str) -> ProfileId {
    let name = name.map(canonical_name).unwrap_or_default();
    let phone = phone.map(canonical_phone).unwrap_or_default();
    let url = sanitize_url(source_url.trim());

    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0x1f]);
    hasher.update(phone.as_bytes());
    hasher.update([0x1f]);
    hasher.update(url.as_bytes());
    ProfileId(hex::encode(hasher.finalize()))
}

fn canonical_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn canonical_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

/// Strip tracking parameters so campaign links to the same listing dedup.
pub fn sanitize_url(url: &str) -> String {
    const TRACKING_PARAMS: &[&str] = &[
        "fbclid", "gclid", "msclkid", "mc_cid", "mc_eid", "ref", "_ga",
    ];

    let Ok(mut parsed) = url::Url::parse(url) else {
        return url.to_string();
    };

    parsed.set_fragment(None);

    if parsed.query().is_none() {
        return parsed.to_string();
    }

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !key.starts_with("utm_") && !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }

    parsed.to_string()
}
