//! Configuration loading for cardmatch.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at `<config dir>/cardmatch/config.toml`.

use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::CardError;

/// Reference image download settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Per-request timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Extra attempts after the first failure (0 = single attempt)
    #[serde(default)]
    pub max_retries: u32,

    /// User-Agent header sent with downloads
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("cardmatch/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_retries: 0,
            user_agent: default_user_agent(),
        }
    }
}

/// Embedding model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// HuggingFace repository holding the CLIP weights
    #[serde(default = "default_model_repo")]
    pub repo_id: String,

    /// Repository revision to download from
    #[serde(default = "default_model_revision")]
    pub revision: String,

    /// Local model cache directory (None = platform cache dir)
    #[serde(default)]
    pub cache_dir: Option<String>,
}

fn default_model_repo() -> String {
    "openai/clip-vit-base-patch32".to_string()
}

fn default_model_revision() -> String {
    // The main branch only ships pickle weights; this PR adds safetensors.
    "refs/pr/15".to_string()
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            repo_id: default_model_repo(),
            revision: default_model_revision(),
            cache_dir: None,
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Card catalog used by `build-index`
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    /// Directory of reference card images
    #[serde(default = "default_ref_dir")]
    pub ref_dir: String,

    /// Index artifact path
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Default directory of query images for batch runs
    #[serde(default = "default_query_dir")]
    pub query_dir: String,

    /// Root directory for batch run outputs
    #[serde(default = "default_results_root")]
    pub results_root: String,

    /// Number of matches returned per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Per-image concurrency bound for building and batch runs
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum concurrent embedder invocations
    #[serde(default = "default_embed_parallelism")]
    pub embed_parallelism: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Download settings
    #[serde(default)]
    pub fetch: FetchSettings,

    /// Model settings
    #[serde(default)]
    pub model: ModelSettings,
}

fn default_catalog_path() -> String {
    "cards.csv".to_string()
}

fn default_ref_dir() -> String {
    "data/refs".to_string()
}

fn default_index_path() -> String {
    "data/index/index.cmx".to_string()
}

fn default_query_dir() -> String {
    "data/test_images".to_string()
}

fn default_results_root() -> String {
    "data/results".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_workers() -> usize {
    1
}

fn default_embed_parallelism() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            ref_dir: default_ref_dir(),
            index_path: default_index_path(),
            query_dir: default_query_dir(),
            results_root: default_results_root(),
            top_k: default_top_k(),
            workers: default_workers(),
            embed_parallelism: default_embed_parallelism(),
            log_level: default_log_level(),
            fetch: FetchSettings::default(),
            model: ModelSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (`<config dir>/cardmatch/config.toml`)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (CARDMATCH_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, CardError> {
        let config_dir = ProjectDirs::from("", "", "cardmatch")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("catalog_path", default_catalog_path())
            .map_err(config_error)?
            .set_default("ref_dir", default_ref_dir())
            .map_err(config_error)?
            .set_default("index_path", default_index_path())
            .map_err(config_error)?
            .set_default("query_dir", default_query_dir())
            .map_err(config_error)?
            .set_default("results_root", default_results_root())
            .map_err(config_error)?
            .set_default("top_k", default_top_k() as i64)
            .map_err(config_error)?
            .set_default("workers", default_workers() as i64)
            .map_err(config_error)?
            .set_default("embed_parallelism", default_embed_parallelism() as i64)
            .map_err(config_error)?
            .set_default("log_level", default_log_level())
            .map_err(config_error)?
            .set_default("fetch.timeout_secs", default_fetch_timeout() as i64)
            .map_err(config_error)?
            .set_default("fetch.max_retries", 0i64)
            .map_err(config_error)?
            .set_default("fetch.user_agent", default_user_agent())
            .map_err(config_error)?
            .set_default("model.repo_id", default_model_repo())
            .map_err(config_error)?
            .set_default("model.revision", default_model_revision())
            .map_err(config_error)?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: CARDMATCH_REF_DIR, CARDMATCH_TOP_K, CARDMATCH_FETCH__TIMEOUT_SECS, ...
        builder = builder.add_source(
            Environment::with_prefix("CARDMATCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .map_err(config_error)?
            .try_deserialize()
            .map_err(config_error)?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would stall or break a run.
    pub fn validate(&self) -> Result<(), CardError> {
        if self.workers == 0 {
            return Err(CardError::Config("workers must be > 0".to_string()));
        }
        if self.embed_parallelism == 0 {
            return Err(CardError::Config("embed_parallelism must be > 0".to_string()));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(CardError::Config("fetch.timeout_secs must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn catalog_path(&self) -> PathBuf {
        expand_path(&self.catalog_path)
    }

    pub fn ref_dir(&self) -> PathBuf {
        expand_path(&self.ref_dir)
    }

    pub fn index_path(&self) -> PathBuf {
        expand_path(&self.index_path)
    }

    pub fn query_dir(&self) -> PathBuf {
        expand_path(&self.query_dir)
    }

    pub fn results_root(&self) -> PathBuf {
        expand_path(&self.results_root)
    }

    /// Model cache directory, or None for the platform default.
    pub fn model_cache_dir(&self) -> Option<PathBuf> {
        self.model.cache_dir.as_deref().map(expand_path)
    }
}

fn config_error(e: config::ConfigError) -> CardError {
    CardError::Config(e.to_string())
}

/// Expand a leading `~` to the user's home directory.
fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.top_k, 5);
        assert_eq!(settings.workers, 1);
        assert_eq!(settings.fetch.timeout_secs, 10);
        assert_eq!(settings.fetch.max_retries, 0);
        assert_eq!(settings.model.repo_id, "openai/clip-vit-base-patch32");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_with_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.results_root, "data/results");
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cardmatch.toml");
        std::fs::write(
            &path,
            "top_k = 3\nref_dir = \"/srv/refs\"\n\n[fetch]\ntimeout_secs = 4\n",
        )
        .unwrap();

        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.top_k, 3);
        assert_eq!(settings.ref_dir(), PathBuf::from("/srv/refs"));
        assert_eq!(settings.fetch.timeout_secs, 4);
        assert_eq!(settings.fetch.max_retries, 0);
    }

    #[test]
    fn test_load_missing_cli_file_fails() {
        let result = Settings::load(Some("/no/such/cardmatch.toml"));
        assert!(matches!(result, Err(CardError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let settings = Settings {
            workers: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_expand_tilde() {
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(expand_path("~/refs"), PathBuf::from(home).join("refs"));
        }
        assert_eq!(expand_path("data/refs"), PathBuf::from("data/refs"));
    }
}
