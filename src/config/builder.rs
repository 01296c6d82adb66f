//! Configuration builder
//!
//! This module provides a builder pattern for constructing configuration.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::config::defaults::{DEFAULT_CONFIG_FILE, ENV_PREFIX};
use crate::config::error::Result;
use crate::config::source::{CliArgs, CliSource, ConfigSource, DefaultSource, EnvSource, FileSource};
use crate::config::types::GatewayConfig;
use crate::config::validator::{check_warnings, validate_config};

/// Configuration builder
///
/// Sources are applied in the order they are added, later ones winning.
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    validate: bool,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            validate: true,
        }
    }

    /// Add default source
    pub fn with_defaults(mut self) -> Self {
        debug!("Adding default configuration source");
        self.sources.push(Box::new(DefaultSource));
        self
    }

    /// Add file source
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        debug!("Adding file configuration source: {}", path.display());
        self.sources.push(Box::new(FileSource::new(path)));
        self
    }

    /// Add environment source
    pub fn with_env(mut self, prefix: &str) -> Self {
        debug!("Adding environment configuration source with prefix: {}", prefix);
        self.sources.push(Box::new(EnvSource::new(prefix)));
        self
    }

    /// Add command line source
    pub fn with_cli(mut self, args: CliArgs) -> Self {
        debug!("Adding command line configuration source");
        self.sources.push(Box::new(CliSource::new(args)));
        self
    }

    /// Add an arbitrary source
    pub fn with_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Disable validation
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<GatewayConfig> {
        let mut config = GatewayConfig::empty();

        debug!("Building configuration from {} sources", self.sources.len());

        for source in self.sources {
            let source_type = source.source_type();
            debug!("Loading configuration from source: {:?}", source_type);
            let source_config = source.load()?;
            config = config.merge(&source_config, source_type);
        }

        config.set_default_values();

        if self.validate {
            debug!("Validating configuration");
            validate_config(&config)?;
            for warning in check_warnings(&config) {
                warn!("{}", warning);
            }
        }

        config.log();

        Ok(config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
            .with_defaults()
            .with_file(DEFAULT_CONFIG_FILE)
            .with_env(ENV_PREFIX)
    }
}

/// Load configuration from auto-detected sources
///
/// Priority, lowest first:
/// 1. Default values
/// 2. Configuration file (if it exists)
/// 3. Environment variables
/// 4. Command line arguments
pub fn auto_load(args: CliArgs) -> Result<GatewayConfig> {
    let config_file = resolve_config_file(&args);

    if config_file.exists() {
        info!("Using configuration file: {}", config_file.display());
    } else {
        debug!("Configuration file not found: {}", config_file.display());
    }

    let mut builder = ConfigBuilder::new().with_defaults();
    if config_file.exists() {
        builder = builder.with_file(&config_file);
    }

    builder.with_env(ENV_PREFIX).with_cli(args).build()
}

/// `--config-file`, then `<PREFIX>CONFIG_FILE`, then the default file name
fn resolve_config_file(args: &CliArgs) -> PathBuf {
    if let Some(path) = &args.config_file {
        return path.clone();
    }

    if let Ok(path) = std::env::var(format!("{}CONFIG_FILE", ENV_PREFIX)) {
        return PathBuf::from(path);
    }

    PathBuf::from(DEFAULT_CONFIG_FILE)
}
