use std::sync::LazyLock;

use datasnatch_common::ProfileFields;
use scraper::{ElementRef, Selector};

use super::fields::parse_age;
use super::{ExtractionStrategy, PageView};

static PERSON_SCOPE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[itemscope][itemtype*="schema.org/Person"]"#).unwrap());

static PROP: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[itemprop]").unwrap());

/// schema.org `Person` expressed as HTML microdata (`itemscope` / `itemprop`).
pub struct MicrodataStrategy;

impl ExtractionStrategy for MicrodataStrategy {
    fn name(&self) -> &'static str {
        "microdata"
    }

    fn attempt(&self, page: &PageView<'_>) -> Option<ProfileFields> {
        let scope = page.document.select(&PERSON_SCOPE).next()?;
        let mut fields = ProfileFields::default();

        for prop in scope.select(&PROP) {
            let Some(names) = prop.value().attr("itemprop") else {
                continue;
            };
            for name in names.split_whitespace() {
                match name {
                    "name" if fields.name.is_none() => fields.name = prop_value(prop),
                    "telephone" if fields.phone.is_none() => fields.phone = prop_value(prop),
                    "address" if fields.location.is_none() => fields.location = address(prop),
                    "image" => fields.images.extend(prop_value(prop)),
                    "age" if fields.age.is_none() => {
                        fields.age = prop_value(prop).as_deref().and_then(parse_age)
                    }
                    "datePosted" | "datePublished" if fields.posted_at.is_none() => {
                        fields.posted_at = prop_value(prop)
                    }
                    "description" if fields.message.is_none() => fields.message = prop_value(prop),
                    _ => {}
                }
            }
        }

        Some(fields)
    }
}

/// Microdata value rules: `content` wins, then url-bearing attributes, then text.
fn prop_value(el: ElementRef<'_>) -> Option<String> {
    let attrs = el.value();
    if let Some(content) = attrs.attr("content") {
        return Some(content.to_string());
    }
    let url_attr = match attrs.name() {
        "img" | "source" => attrs.attr("src"),
        "a" | "link" => attrs.attr("href").map(|h| h.trim_start_matches("tel:")),
        "time" => attrs.attr("datetime"),
        _ => None,
    };
    if let Some(v) = url_attr {
        return Some(v.to_string());
    }
    Some(el.text().collect::<Vec<_>>().join(" "))
}

/// A nested `PostalAddress` scope collapses to "Locality, Region".
fn address(el: ElementRef<'_>) -> Option<String> {
    if el.value().attr("itemscope").is_none() {
        return prop_value(el);
    }
    let part = |key: &str| {
        el.select(&PROP)
            .find(|p| p.value().attr("itemprop") == Some(key))
            .and_then(prop_value)
    };
    let parts: Vec<String> = [part("addressLocality"), part("addressRegion")]
        .into_iter()
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .collect();
    if parts.is_empty() {
        prop_value(el)
    } else {
        Some(parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn run(html: &str) -> Option<ProfileFields> {
        let document = Html::parse_document(html);
        MicrodataStrategy.attempt(&PageView {
            document: &document,
        })
    }

    #[test]
    fn person_scope_properties() {
        let fields = run(r#"
            <div itemscope itemtype="https://schema.org/Person">
              <span itemprop="name">Kim Park</span>
              <a itemprop="telephone" href="tel:+15550001234">call</a>
              <div itemprop="address" itemscope itemtype="https://schema.org/PostalAddress">
                <span itemprop="addressLocality">Seattle</span>
                <span itemprop="addressRegion">WA</span>
              </div>
              <img itemprop="image" src="/k1.jpg">
              <meta itemprop="age" content="33">
              <time itemprop="datePosted" datetime="2024-02-03">Feb 3</time>
            </div>"#)
        .unwrap();
        assert_eq!(fields.name.as_deref(), Some("Kim Park"));
        assert_eq!(fields.phone.as_deref(), Some("+15550001234"));
        assert_eq!(fields.location.as_deref(), Some("Seattle, WA"));
        assert_eq!(fields.images, vec!["/k1.jpg"]);
        assert_eq!(fields.age, Some(33));
        assert_eq!(fields.posted_at.as_deref(), Some("2024-02-03"));
    }

    #[test]
    fn no_person_scope() {
        assert!(run(r#"<div itemscope itemtype="https://schema.org/Product"><span itemprop="name">Hat</span></div>"#).is_none());
    }
}
