use std::path::PathBuf;

use anyhow::{Context, Result};

/// Environment-specific values and secrets. Everything tunable lives in the
/// TOML [`FileConfig`](crate::FileConfig).
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path to the TOML file config, if any.
    pub config_path: Option<PathBuf>,
    pub data_dir: PathBuf,

    // Phone verification endpoint
    pub phone_api_url: Option<String>,
    pub phone_api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let phone_api_url = std::env::var("PHONE_API_URL").ok().filter(|s| !s.is_empty());
        if let Some(raw) = &phone_api_url {
            url::Url::parse(raw).with_context(|| format!("PHONE_API_URL is not a valid URL: {raw}"))?;
        }

        let config = Self {
            config_path: std::env::var("DATASNATCH_CONFIG").ok().map(PathBuf::from),
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            phone_api_url,
            phone_api_key: std::env::var("PHONE_API_KEY").ok().filter(|s| !s.is_empty()),
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => {
                    let n = v.chars().take(4).map(char::len_utf8).sum::<usize>();
                    format!("{}...({} chars)", &v[..n], v.len())
                }
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  DATA_DIR: {}", self.data_dir.display());
        tracing::info!(
            "  DATASNATCH_CONFIG: {}",
            self.config_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<not set>".to_string())
        );
        tracing::info!("  PHONE_API_URL: {}", self.phone_api_url.as_deref().unwrap_or("<not set>"));
        tracing::info!("  PHONE_API_KEY: {}", preview_opt(&self.phone_api_key));
    }
}
