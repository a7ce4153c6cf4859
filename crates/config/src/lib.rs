//! Configuration module for the replay batch renderer
//!
//! Handles loading configuration from TOML files, environment variable overrides
//! and validation of every external tool path before a run starts.

pub mod config;

pub use config::*;
