//! # Configuration Module
//!
//! Node configuration loading and validation.

pub mod config;

pub use config::NodeConfig;
