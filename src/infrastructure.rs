//! Infrastructure layer
//!
//! Configuration, logging, page sources (HTTP and replay), HTML parsing,
//! retry policy and the JSON history store.

pub mod config;
pub mod history_store;
pub mod logging;
pub mod page_source;
pub mod parsing;
pub mod parsing_error;
pub mod retry_manager;

pub use config::{AppConfig, ConfigManager, sk_ah};
pub use history_store::{BatchFlush, BatchSink, HistoryStore, MergeOutcome, StoreError};
pub use logging::{init_logging, log_system_info};
pub use page_source::{FetchOutcome, NavigationError, NextControl, PageSource, PageSourceFactory, RenderedPage};
pub use parsing::{HistoryExtractor, ListingExtractor, PageNavigator, ParsingError, ParsingResult, SelectorConfig};
pub use retry_manager::{RetryDecision, RetryPolicy};
