pub mod config;
pub mod error;
pub mod file_config;
pub mod hashing;
pub mod phone;
pub mod types;

pub use config::AppConfig;
pub use error::{
    ConfigError, EnrichmentError, FetchError, ParseError, ScoringError, StoreError,
};
pub use file_config::{load_config, FileConfig, StrategyKind};
pub use hashing::{content_hash, profile_id, sanitize_url};
pub use phone::{extract_phone, normalize_phone, phone_match_key};
pub use types::*;
