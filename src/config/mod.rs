//! Configuration module for Corpus-Tally
//!
//! This module handles loading, parsing, and validating configuration files.
//! TOML is the primary format; flat `.properties` files are accepted as well.
//!
//! # Example
//!
//! ```no_run
//! use corpus_tally::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Corpus prefix: {}", config.directory.corpus_prefix);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, DirectoryConfig, EngineConfig, FileConfig, WebConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_properties};
