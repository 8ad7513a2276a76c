//! Configuration module for Tender-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use tender_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Harvesting {} from {}", config.source.resource, config.source.base_url);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CompressionConfig, Config, CrawlConfig, RetryConfig, SourceConfig, StorageConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
