//! Engine configuration
//!
//! Read once by the interception layer. Values come from an optional TOML
//! file, then `MDLENS_*` environment variables override them.

use crate::driver::DriverRequest;
use anyhow::{Context, Result};
use mdlens_shared::SamplingMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides (e.g. `MDLENS_METRIC_SET`)
pub const ENV_PREFIX: &str = "MDLENS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Event-based or time-based sampling
    pub sampling: SamplingMode,

    /// Metric set to activate (e.g. "ComputeBasic")
    pub metric_set: String,

    /// Custom metrics definition file passed to the driver
    pub metrics_file: Option<PathBuf>,

    /// Decode and dump max companions of each metric
    pub include_max_values: bool,

    /// Print the per-operation summary table at shutdown
    pub report_timing: bool,

    /// Counter-driver library to load
    pub driver_library: String,

    /// Root directory for metric dumps
    pub dump_root: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingMode::EventBased,
            metric_set: "ComputeBasic".to_string(),
            metrics_file: None,
            include_max_values: false,
            report_timing: true,
            driver_library: default_driver_library(),
            dump_root: std::env::temp_dir(),
        }
    }
}

/// Platform file name of the counter-driver shim
pub fn default_driver_library() -> String {
    format!(
        "{}mdlens_mdapi{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    )
}

impl EngineConfig {
    /// Load from an optional TOML file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(true),
            );
        }
        builder =
            builder.add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config: EngineConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration values")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.metric_set.trim().is_empty() {
            anyhow::bail!("Metric set name must not be empty");
        }

        // The metric set name becomes part of the dump file name
        if self
            .metric_set
            .contains(|c: char| std::path::is_separator(c) || c == '\0')
        {
            anyhow::bail!("Invalid metric set name: {}", self.metric_set);
        }

        if self.driver_library.trim().is_empty() {
            anyhow::bail!("Driver library must not be empty");
        }

        Ok(())
    }

    /// Driver connection request described by this configuration
    pub fn driver_request(&self) -> DriverRequest {
        DriverRequest {
            mode: self.sampling,
            library: self.driver_library.clone(),
            metric_set: self.metric_set.clone(),
            metrics_file: self.metrics_file.clone(),
            include_max_values: self.include_max_values,
        }
    }

    /// Whether the summary table is printed at shutdown
    pub fn reports_summary(&self) -> bool {
        self.report_timing && self.sampling == SamplingMode::EventBased
    }
}
