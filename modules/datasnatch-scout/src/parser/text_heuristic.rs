use std::sync::LazyLock;

use datasnatch_common::phone::is_nanp_format;
use datasnatch_common::{extract_phone, ProfileFields};
use regex::Regex;
use scraper::Selector;

use super::fields::{collapse, parse_age};
use super::{ExtractionStrategy, PageView};

static RE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(name|phone|tel|call|location|city|age)\s*[:\-]\s*(.+?)\s*$").unwrap()
});

static RE_IMAGE_EXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpe?g|png|webp|gif)(\?.*)?$").unwrap());

static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img[src]").unwrap());

/// Last resort for unstructured pages: "Label: value" lines and a phone-shaped
/// run anywhere in the text.
pub struct TextHeuristicStrategy;

impl ExtractionStrategy for TextHeuristicStrategy {
    fn name(&self) -> &'static str {
        "text_heuristic"
    }

    fn attempt(&self, page: &PageView<'_>) -> Option<ProfileFields> {
        let body = page.document.select(&BODY).next()?;
        let lines: Vec<String> = body
            .text()
            .flat_map(str::lines)
            .filter_map(collapse)
            .collect();

        let mut fields = ProfileFields::default();
        for line in &lines {
            let Some(caps) = RE_LABEL.captures(line) else {
                continue;
            };
            let value = caps[2].to_string();
            match caps[1].to_ascii_lowercase().as_str() {
                "name" => fields.name = fields.name.take().or(Some(value)),
                "phone" | "tel" | "call" => fields.phone = fields.phone.take().or(Some(value)),
                "location" | "city" => fields.location = fields.location.take().or(Some(value)),
                "age" => fields.age = fields.age.or_else(|| parse_age(&value)),
                _ => {}
            }
        }

        // Unlabelled phone: only accept something that looks like a real number,
        // so dates and prices do not pass as phones.
        if fields.phone.is_none() {
            fields.phone = lines
                .iter()
                .filter_map(|l| extract_phone(l))
                .find(|candidate| is_nanp_format(candidate));
        }

        // A bare heading is only trusted as a name once a phone anchors the page.
        if fields.name.is_none() && fields.phone.is_some() {
            fields.name = page
                .document
                .select(&H1)
                .next()
                .and_then(|h| collapse(&h.text().collect::<Vec<_>>().join(" ")));
        }

        if fields.name.is_none() && fields.phone.is_none() {
            return None;
        }

        fields.images = page
            .document
            .select(&IMG)
            .filter_map(|img| img.value().attr("src"))
            .filter(|src| RE_IMAGE_EXT.is_match(src))
            .map(str::to_string)
            .collect();

        Some(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn run(html: &str) -> Option<ProfileFields> {
        let document = Html::parse_document(html);
        TextHeuristicStrategy.attempt(&PageView {
            document: &document,
        })
    }

    #[test]
    fn labelled_lines() {
        let fields = run(
            "<body><p>Name: Lou Reed</p><p>City: Chicago</p><p>Age: 41</p>\
             <img src=\"/x.png\"><img src=\"/tracker.gif?x=1\"><img src=\"/icon.svg\"></body>",
        )
        .unwrap();
        assert_eq!(fields.name.as_deref(), Some("Lou Reed"));
        assert_eq!(fields.location.as_deref(), Some("Chicago"));
        assert_eq!(fields.age, Some(41));
        assert_eq!(fields.images, vec!["/x.png", "/tracker.gif?x=1"]);
    }

    #[test]
    fn heading_becomes_name_when_phone_present() {
        let fields = run("<body><h1>Sam Stone</h1><p>reach me 555-321-9876</p></body>").unwrap();
        assert_eq!(fields.name.as_deref(), Some("Sam Stone"));
        assert_eq!(fields.phone.as_deref(), Some("555-321-9876"));
    }

    #[test]
    fn dates_are_not_phones() {
        assert!(run("<body><h1>News</h1><p>Posted 2024-04-30 12</p></body>").is_none());
    }
}
