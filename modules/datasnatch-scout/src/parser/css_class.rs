use datasnatch_common::file_config::SelectorConfig;
use datasnatch_common::{ConfigError, ProfileFields};
use scraper::{Html, Selector};

use super::fields::parse_age;
use super::{ExtractionStrategy, PageView};

/// Site-specific class selectors, configurable per source.
pub struct CssClassStrategy {
    name: Selector,
    phone: Selector,
    location: Selector,
    age: Selector,
    posted_at: Selector,
    message: Selector,
    images: Selector,
}

impl CssClassStrategy {
    pub fn new(config: &SelectorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            name: compile("name", &config.name)?,
            phone: compile("phone", &config.phone)?,
            location: compile("location", &config.location)?,
            age: compile("age", &config.age)?,
            posted_at: compile("posted_at", &config.posted_at)?,
            message: compile("message", &config.message)?,
            images: compile("images", &config.images)?,
        })
    }
}

fn compile(field: &str, selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector)
        .map_err(|e| ConfigError::invalid(format!("parser.selectors.{field}"), e.to_string()))
}

fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
}

impl ExtractionStrategy for CssClassStrategy {
    fn name(&self) -> &'static str {
        "css_class"
    }

    fn attempt(&self, page: &PageView<'_>) -> Option<ProfileFields> {
        let doc = page.document;
        let fields = ProfileFields {
            name: first_text(doc, &self.name),
            phone: first_text(doc, &self.phone),
            location: first_text(doc, &self.location),
            age: first_text(doc, &self.age).as_deref().and_then(parse_age),
            posted_at: first_text(doc, &self.posted_at),
            message: first_text(doc, &self.message),
            images: doc
                .select(&self.images)
                .filter_map(|img| img.value().attr("src"))
                .map(str::to_string)
                .collect(),
        };

        let matched_anything = fields.name.is_some()
            || fields.phone.is_some()
            || fields.location.is_some()
            || !fields.images.is_empty();
        matched_anything.then_some(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_selectors() {
        let config = SelectorConfig {
            name: "span.nm".into(),
            phone: "#tel".into(),
            ..SelectorConfig::default()
        };
        let strategy = CssClassStrategy::new(&config).unwrap();
        let html = r#"<span class="nm">Rae</span><p id="tel">555 444 3333</p>"#;
        let document = Html::parse_document(html);
        let fields = strategy
            .attempt(&PageView {
                document: &document,
            })
            .unwrap();
        assert_eq!(fields.name.as_deref(), Some("Rae"));
        assert_eq!(fields.phone.as_deref(), Some("555 444 3333"));
    }

    #[test]
    fn bad_selector_names_the_field() {
        let config = SelectorConfig {
            phone: "div[".into(),
            ..SelectorConfig::default()
        };
        let Err(ConfigError::InvalidValue { field, .. }) = CssClassStrategy::new(&config) else {
            panic!("expected invalid selector error");
        };
        assert_eq!(field, "parser.selectors.phone");
    }
}
