//! Configuration infrastructure
//!
//! Settings are layered, later layers winning:
//! 1. Built-in defaults (`defaults` module)
//! 2. Optional TOML file (`sk_market_scout.toml`, or `--config <path>`)
//! 3. Environment variables `SKMS__<SECTION>__<KEY>` (e.g. `SKMS__CRAWL__WORKER_COUNT=8`)
//! 4. Command-line overrides applied by the binaries

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::parsing::SelectorConfig;
use crate::domain::recommendation::EvaluationStrictness;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub crawl: CrawlConfig,
    pub evaluation: EvaluationConfig,
    pub storage: StorageConfig,
    pub selectors: SelectorConfig,
    pub logging: LoggingConfig,
}

/// Target site and HTTP behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    pub history_path: String,
    pub user_agent: String,
    pub request_timeout_ms: u64,
    /// Minimum spacing between requests from one page source
    pub request_delay_ms: u64,
}

/// History crawl settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Last history page to crawl
    pub total_pages: u32,
    /// Pages per worker between flushes
    pub batch_size: u32,
    pub worker_count: usize,
    pub start_page: u32,
    /// Attempts per page, including the first
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Attempts per flush before the worker halts
    pub flush_retries: u32,
}

/// Listing evaluation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub strictness: EvaluationStrictness,
    /// Stop after this many listing pages; `None` walks until the last page
    pub max_pages: Option<u32>,
    pub export_csv: bool,
    pub export_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Holds the JSON store, the checkpoint ledger and batch snapshots
    pub data_dir: PathBuf,
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,
    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,
    pub log_dir: PathBuf,
    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,
    pub auto_cleanup_logs: bool,
    /// Module-specific log level filters (e.g., "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: sk_ah::BASE_URL.to_string(),
            history_path: sk_ah::HISTORY_PATH.to_string(),
            user_agent: defaults::USER_AGENT.to_string(),
            request_timeout_ms: defaults::REQUEST_TIMEOUT_MS,
            request_delay_ms: defaults::REQUEST_DELAY_MS,
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            total_pages: defaults::TOTAL_PAGES,
            batch_size: defaults::BATCH_SIZE,
            worker_count: defaults::WORKER_COUNT,
            start_page: defaults::START_PAGE,
            max_attempts: defaults::MAX_ATTEMPTS,
            retry_base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: defaults::RETRY_MAX_DELAY_MS,
            flush_retries: defaults::FLUSH_RETRIES,
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            strictness: EvaluationStrictness::default(),
            max_pages: None,
            export_csv: true,
            export_dir: PathBuf::from("."),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(defaults::DATA_DIR),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: PathBuf::from(defaults::LOG_DIR),
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: true,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("html5ever".to_string(), "warn".to_string());
                filters.insert("selectors".to_string(), "warn".to_string());
                filters.insert("tokio".to_string(), "info".to_string());
                filters
            },
        }
    }
}

impl AppConfig {
    /// Reject settings the crawler cannot run with
    pub fn validate(&self) -> Result<()> {
        let crawl = &self.crawl;
        ensure!(crawl.batch_size > 0, "crawl.batch_size must be greater than 0");
        ensure!(crawl.worker_count > 0, "crawl.worker_count must be greater than 0");
        ensure!(crawl.start_page > 0, "crawl.start_page is 1-based and must be greater than 0");
        ensure!(
            crawl.start_page <= crawl.total_pages,
            "crawl.start_page ({}) is beyond crawl.total_pages ({})",
            crawl.start_page,
            crawl.total_pages
        );
        ensure!(
            crawl.total_pages <= defaults::MAX_TOTAL_PAGES,
            "crawl.total_pages ({}) exceeds the limit of {}",
            crawl.total_pages,
            defaults::MAX_TOTAL_PAGES
        );
        ensure!(crawl.max_attempts > 0, "crawl.max_attempts must be greater than 0");
        ensure!(crawl.flush_retries > 0, "crawl.flush_retries must be greater than 0");
        ensure!(
            self.evaluation.max_pages != Some(0),
            "evaluation.max_pages must be greater than 0 when set"
        );
        url::Url::parse(&self.site.base_url)
            .with_context(|| format!("site.base_url '{}' is not a valid URL", self.site.base_url))?;
        Ok(())
    }
}

/// Loads [`AppConfig`] from its layered sources
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
    explicit: bool,
}

impl ConfigManager {
    /// Use `path` if given (it must exist), else the default file in the working directory
    pub fn new(path: Option<&Path>) -> Self {
        match path {
            Some(p) => Self {
                config_path: p.to_path_buf(),
                explicit: true,
            },
            None => Self {
                config_path: PathBuf::from(defaults::CONFIG_FILE),
                explicit: false,
            },
        }
    }

    pub fn load(&self) -> Result<AppConfig> {
        let defaults = config::Config::try_from(&AppConfig::default())
            .context("Failed to build default configuration")?;

        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(
                config::File::from(self.config_path.as_path())
                    .format(config::FileFormat::Toml)
                    .required(self.explicit),
            )
            .add_source(
                config::Environment::with_prefix(defaults::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load configuration from {:?}", self.config_path))?;

        let app_config: AppConfig = settings
            .try_deserialize()
            .context("Configuration has invalid values")?;

        if self.config_path.exists() {
            info!("Loaded configuration from: {:?}", self.config_path);
        } else {
            debug!("No configuration file at {:?}, using defaults", self.config_path);
        }
        Ok(app_config)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// sk-ah.com URLs and file names
pub mod sk_ah {
    pub const BASE_URL: &str = "https://www.sk-ah.com/";

    /// Completed sales, addressed with `?page=N`
    pub const HISTORY_PATH: &str = "history";

    pub const STORE_FILE: &str = "item_database.json";
    pub const CHECKPOINT_FILE: &str = "crawl_checkpoints.json";
    pub const FULL_LISTINGS_EXPORT: &str = "auction_full_listings.csv";
    pub const RECOMMENDATIONS_EXPORT: &str = "auction_recommendations.csv";
}

/// Default configuration values
pub mod defaults {
    pub const CONFIG_FILE: &str = "sk_market_scout.toml";
    pub const ENV_PREFIX: &str = "SKMS";

    pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
    pub const REQUEST_TIMEOUT_MS: u64 = 60_000;
    pub const REQUEST_DELAY_MS: u64 = 500;

    /// History depth observed on the site
    pub const TOTAL_PAGES: u32 = 5910;
    pub const MAX_TOTAL_PAGES: u32 = 1_000_000;
    pub const BATCH_SIZE: u32 = 40;
    pub const WORKER_COUNT: usize = 4;
    pub const START_PAGE: u32 = 1;

    pub const MAX_ATTEMPTS: u32 = 3;
    pub const RETRY_BASE_DELAY_MS: u64 = 1000;
    pub const RETRY_MAX_DELAY_MS: u64 = 30_000;
    pub const FLUSH_RETRIES: u32 = 3;

    pub const DATA_DIR: &str = "sk_market_data";

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_DIR: &str = "logs";
    pub const LOG_MAX_FILES: u32 = 7;
}
