//! Configuration module
//!
//! This module handles application configuration, including loading from
//! different sources (files, environment variables, command line arguments)
//! and validating the configuration.

pub mod builder;
pub mod defaults;
pub mod error;
pub mod source;
pub mod types;
pub mod validator;

pub use builder::{auto_load, ConfigBuilder};
pub use defaults::{DEFAULT_CONFIG_FILE, ENV_PREFIX};
pub use error::ConfigError;
pub use source::{CliArgs, CliSource, ConfigSource, DefaultSource, EnvSource, FileSource};
pub use types::{ConfigValues, GatewayConfig, ValueSource};
pub use validator::{check_warnings, validate_config};
