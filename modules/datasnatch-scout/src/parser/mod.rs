//! Adaptive Parser: an ordered list of extraction strategies, first match wins.

mod css_class;
mod fields;
mod json_ld;
mod microdata;
mod text_heuristic;

use datasnatch_common::file_config::ParserConfig;
use datasnatch_common::{sanitize_url, ConfigError, ParseError, ProfileFields, ProfileRecord, RawPage, StrategyKind};
use scraper::Html;
use tracing::{debug, info};
use url::Url;

pub use css_class::CssClassStrategy;
pub use json_ld::JsonLdStrategy;
pub use microdata::MicrodataStrategy;
pub use text_heuristic::TextHeuristicStrategy;

/// What a strategy gets to look at. The document is parsed once per page;
/// relative references are resolved afterwards against the page url.
pub struct PageView<'a> {
    pub document: &'a Html,
}

/// One way of pulling profile fields out of a page. Strategies are pure: no
/// I/O, no shared state, same page in, same fields out.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Raw fields if this strategy recognises the page. The parser cleans them
    /// and checks the minimal set, so partial results are fine.
    fn attempt(&self, page: &PageView<'_>) -> Option<ProfileFields>;
}

pub struct AdaptiveParser {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl AdaptiveParser {
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Build the strategy list in configured priority order.
    pub fn from_config(config: &ParserConfig) -> Result<Self, ConfigError> {
        let mut strategies: Vec<Box<dyn ExtractionStrategy>> = Vec::new();
        for kind in &config.strategies {
            let strategy: Box<dyn ExtractionStrategy> = match kind {
                StrategyKind::JsonLd => Box::new(JsonLdStrategy),
                StrategyKind::Microdata => Box::new(MicrodataStrategy),
                StrategyKind::CssClass => Box::new(CssClassStrategy::new(&config.selectors)?),
                StrategyKind::TextHeuristic => Box::new(TextHeuristicStrategy),
            };
            strategies.push(strategy);
        }
        info!(
            strategies = ?strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Adaptive parser configured"
        );
        Ok(Self { strategies })
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn parse(&self, page: &RawPage) -> Result<ProfileRecord, ParseError> {
        if !page.has_content() {
            return Err(ParseError::MalformedMinimumFields("empty body".to_string()));
        }
        let url = Url::parse(&page.url)
            .map_err(|e| ParseError::MalformedMinimumFields(format!("invalid source url: {e}")))?;

        let text = page.text();
        let document = Html::parse_document(&text);
        let view = PageView {
            document: &document,
        };

        for strategy in &self.strategies {
            let Some(raw) = strategy.attempt(&view) else {
                debug!(url = page.url.as_str(), strategy = strategy.name(), "Strategy did not match");
                continue;
            };
            let fields = fields::clean(raw, &url);
            if fields.meets_minimum() {
                debug!(url = page.url.as_str(), strategy = strategy.name(), "Strategy matched");
                return Ok(ProfileRecord::new(
                    fields,
                    sanitize_url(url.as_str()),
                    strategy.name(),
                    page.fetched_at,
                ));
            }
            debug!(
                url = page.url.as_str(),
                strategy = strategy.name(),
                "Strategy matched but lacked name and phone"
            );
        }

        Err(ParseError::NoStrategyMatched)
    }
}
