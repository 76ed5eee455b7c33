use std::sync::LazyLock;

use datasnatch_common::ProfileFields;
use scraper::Selector;
use serde_json::Value;

use super::{ExtractionStrategy, PageView};

static LD_SCRIPT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

/// schema.org `Person` nodes embedded as JSON-LD.
pub struct JsonLdStrategy;

impl ExtractionStrategy for JsonLdStrategy {
    fn name(&self) -> &'static str {
        "json_ld"
    }

    fn attempt(&self, page: &PageView<'_>) -> Option<ProfileFields> {
        page.document
            .select(&LD_SCRIPT)
            .filter_map(|script| {
                let raw = script.text().collect::<String>();
                serde_json::from_str::<Value>(raw.trim()).ok()
            })
            .find_map(|doc| find_person(&doc).map(person_fields))
    }
}

/// Depth-first search through top-level arrays, `@graph` and `mainEntity`.
fn find_person(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(find_person),
        Value::Object(map) => {
            if is_person(value) {
                return Some(value);
            }
            ["@graph", "mainEntity", "author"]
                .iter()
                .filter_map(|key| map.get(*key))
                .find_map(find_person)
        }
        _ => None,
    }
}

fn is_person(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t == "Person",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("Person")),
        _ => false,
    }
}

fn person_fields(person: &Value) -> ProfileFields {
    ProfileFields {
        name: text(person.get("name")),
        phone: text(person.get("telephone")),
        location: person.get("address").and_then(address),
        images: person.get("image").map(images).unwrap_or_default(),
        age: person.get("age").and_then(age),
        posted_at: ["datePosted", "datePublished", "dateCreated"]
            .iter()
            .find_map(|key| text(person.get(*key))),
        message: text(person.get("description")),
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn address(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => {
            let parts: Vec<String> = ["addressLocality", "addressRegion"]
                .iter()
                .filter_map(|key| text(value.get(*key)))
                .filter(|s| !s.trim().is_empty())
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Array(items) => items.iter().find_map(address),
        _ => None,
    }
}

fn images(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Object(_) => text(value.get("contentUrl"))
            .or_else(|| text(value.get("url")))
            .into_iter()
            .collect(),
        Value::Array(items) => items.iter().flat_map(images).collect(),
        _ => Vec::new(),
    }
}

fn age(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => super::fields::parse_age(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn run(html: &str) -> Option<ProfileFields> {
        let document = Html::parse_document(html);
        JsonLdStrategy.attempt(&PageView {
            document: &document,
        })
    }

    #[test]
    fn person_inside_graph() {
        let fields = run(r#"<script type="application/ld+json">
            {"@context": "https://schema.org", "@graph": [
              {"@type": "WebPage", "name": "Listing"},
              {"@type": ["Person"], "name": "Ana Lima", "telephone": "+1 555 000 1111",
               "address": {"@type": "PostalAddress", "addressLocality": "Miami", "addressRegion": "FL"},
               "image": [{"@type": "ImageObject", "contentUrl": "/a.jpg"}, "b.jpg"],
               "age": "27", "datePosted": "2024-01-02", "description": "hello"}
            ]}</script>"#)
        .unwrap();
        assert_eq!(fields.name.as_deref(), Some("Ana Lima"));
        assert_eq!(fields.phone.as_deref(), Some("+1 555 000 1111"));
        assert_eq!(fields.location.as_deref(), Some("Miami, FL"));
        assert_eq!(fields.images, vec!["/a.jpg", "b.jpg"]);
        assert_eq!(fields.age, Some(27));
        assert_eq!(fields.posted_at.as_deref(), Some("2024-01-02"));
        assert_eq!(fields.message.as_deref(), Some("hello"));
    }

    #[test]
    fn non_person_and_broken_json_are_ignored() {
        assert!(run(r#"<script type="application/ld+json">{"@type": "Product", "name": "Shoe"}</script>"#).is_none());
        assert!(run(r#"<script type="application/ld+json">{"@type": "Person", </script>"#).is_none());
    }

    #[test]
    fn later_script_can_hold_the_person() {
        let fields = run(r#"
            <script type="application/ld+json">{"@type": "Organization"}</script>
            <script type="application/ld+json">{"@type": "Person", "name": "Bo"}</script>"#)
        .unwrap();
        assert_eq!(fields.name.as_deref(), Some("Bo"));
    }
}
