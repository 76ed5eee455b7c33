use std::collections::HashSet;
use std::sync::LazyLock;

use datasnatch_common::{extract_phone, ProfileFields};
use regex::Regex;
use url::Url;

static RE_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{1,3}").unwrap());

/// Normalize whatever a strategy pulled out so every strategy yields the
/// same shape: collapsed text, a bare phone run, a plausible age, absolute
/// deduplicated image urls.
pub(super) fn clean(raw: ProfileFields, base: &Url) -> ProfileFields {
    ProfileFields {
        name: raw.name.as_deref().and_then(collapse),
        phone: raw.phone.as_deref().and_then(extract_phone),
        location: raw.location.as_deref().and_then(collapse),
        images: resolve_images(&raw.images, base),
        age: raw.age.filter(|a| (1..=120).contains(a)),
        posted_at: raw.posted_at.as_deref().and_then(collapse),
        message: raw.message.as_deref().and_then(collapse),
    }
}

/// Trim and collapse interior whitespace. Blank becomes `None`.
pub(super) fn collapse(s: &str) -> Option<String> {
    let out = s.split_whitespace().collect::<Vec<_>>().join(" ");
    (!out.is_empty()).then_some(out)
}

/// First short number in free text ("Age: 29", "29 yrs").
pub(super) fn parse_age(s: &str) -> Option<u32> {
    RE_DIGITS.find(s).and_then(|m| m.as_str().parse().ok())
}

fn resolve_images(images: &[String], base: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    images
        .iter()
        .filter_map(|src| base.join(src.trim()).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map(String::from)
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://x.test/profiles/7").unwrap()
    }

    #[test]
    fn blank_fields_become_none() {
        let fields = clean(
            ProfileFields {
                name: Some("   ".into()),
                location: Some("\n".into()),
                ..Default::default()
            },
            &base(),
        );
        assert_eq!(fields.name, None);
        assert_eq!(fields.location, None);
    }

    #[test]
    fn implausible_age_is_dropped() {
        let raw = |age| ProfileFields {
            age: Some(age),
            ..Default::default()
        };
        assert_eq!(clean(raw(0), &base()).age, None);
        assert_eq!(clean(raw(300), &base()).age, None);
        assert_eq!(clean(raw(31), &base()).age, Some(31));
    }

    #[test]
    fn images_are_absolute_and_unique() {
        let raw = ProfileFields {
            images: vec![
                "a.jpg".into(),
                "/profiles/a.jpg".into(),
                "data:image/png;base64,AAAA".into(),
                "https://cdn.test/b.png".into(),
            ],
            ..Default::default()
        };
        assert_eq!(
            clean(raw, &base()).images,
            vec!["https://x.test/profiles/a.jpg", "https://cdn.test/b.png"]
        );
    }

    #[test]
    fn phone_is_cut_out_of_surrounding_text() {
        let raw = ProfileFields {
            phone: Some("Text me at 555-123-4567 anytime".into()),
            ..Default::default()
        };
        assert_eq!(clean(raw, &base()).phone.as_deref(), Some("555-123-4567"));
    }

    #[test]
    fn age_from_label() {
        assert_eq!(parse_age("Age: 29"), Some(29));
        assert_eq!(parse_age("unknown"), None);
    }
}
