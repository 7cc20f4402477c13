//! Configuration module for Presale-Crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use presale_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("presale.toml")).unwrap();
//! println!("Registry: {}", config.registry.base_url);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, OutputConfig, RegistryConfig, DEFAULT_USER_AGENT};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
