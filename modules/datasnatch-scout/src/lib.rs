pub mod enrichment;
pub mod infra;
pub mod parser;
pub mod pipeline;
pub mod scoring;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use enrichment::EnrichmentStage;
pub use parser::AdaptiveParser;
pub use pipeline::{ScanPipeline, ScanStats};
pub use scoring::AuthenticityScorer;
