use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::convolution::Accumulation;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Sleep between two polls of outstanding requests.
    pub poll_interval_secs: f64,
    pub distribution_timeout_secs: f64,
    pub collection_timeout_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Longest accepted input or output path, in bytes.
    pub max_path: usize,
    pub min_stdev: u32,
    pub max_stdev: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub protocol: ProtocolConfig,
    pub limits: Limits,
    /// Worker count. `None` uses the available parallelism.
    pub workers: Option<usize>,
    pub accumulation: Accumulation,
    /// Replace an existing output file instead of failing.
    pub overwrite_output: bool,
    pub log_level: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 0.1,
            distribution_timeout_secs: 15.0,
            collection_timeout_secs: 60.0,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_path: 128,
            min_stdev: 1,
            max_stdev: 20,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            limits: Limits::default(),
            workers: None,
            accumulation: Accumulation::default(),
            overwrite_output: false,
            log_level: "info".to_string(),
        }
    }
}

impl ProtocolConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    pub fn distribution_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.distribution_timeout_secs)
    }

    pub fn collection_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.collection_timeout_secs)
    }

    /// Rejects timings that cannot be turned into durations. The poll
    /// interval must be positive, budgets may be zero.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("poll_interval_secs", self.poll_interval_secs, false),
            ("distribution_timeout_secs", self.distribution_timeout_secs, true),
            ("collection_timeout_secs", self.collection_timeout_secs, true),
        ];

        for (field, value, zero_allowed) in fields {
            let valid = Duration::try_from_secs_f64(value)
                .is_ok_and(|duration| zero_allowed || !duration.is_zero());
            if !valid {
                tracing::error!(field, value, "invalid protocol timing");
                return Err(Error::InvalidConfig { field, value });
            }
        }

        Ok(())
    }

    /// Number of polls that fit in `budget`, one per poll interval.
    pub fn max_polls(&self, budget: Duration) -> u64 {
        let quantum = self.poll_interval().as_nanos().max(1);
        u64::try_from(budget.as_nanos() / quantum).unwrap_or(u64::MAX)
    }
}

impl Config {
    /// Reads a config file. The format follows the file extension.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: Config = common::serde::load_file(path)?;
        config.protocol.validate()?;
        tracing::debug!(path = %path.display(), ?config, "loaded config");
        Ok(config)
    }

    /// Resolved number of workers. An explicit zero is an error.
    pub fn worker_count(&self) -> Result<usize> {
        match self.workers {
            Some(0) => Err(Error::NoWorkers),
            Some(workers) => Ok(workers),
            None => Ok(std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)),
        }
    }

    /// Checks the path lengths and the standard deviation before any file is
    /// touched.
    pub fn validate_args(&self, input: &Path, output: &Path, stdev: u32) -> Result<()> {
        self.protocol.validate()?;
        self.worker_count()?;

        for path in [input, output] {
            if path.as_os_str().len() > self.limits.max_path {
                tracing::error!(path = %path.display(), limit = self.limits.max_path, "path too long");
                return Err(Error::PathTooLong {
                    path: path.to_path_buf(),
                    limit: self.limits.max_path,
                });
            }
        }

        if !(self.limits.min_stdev..=self.limits.max_stdev).contains(&stdev) {
            tracing::error!(stdev, "standard deviation out of range");
            return Err(Error::StdevOutOfRange {
                value: stdev,
                min: self.limits.min_stdev,
                max: self.limits.max_stdev,
            });
        }

        Ok(())
    }
}
