use crate::application::booking::BookingPolicy;
use crate::domain::catalog::{BoxEntry, Catalog};
use crate::error::{BookingError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

/// Runtime settings, read from a JSON file. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub sweep_interval_secs: u64,
    pub compensation_retry_secs: u64,
    pub request_timeout_ms: u64,
    pub max_party_size: u64,
    pub catalog: Vec<BoxEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            compensation_retry_secs: 5,
            request_timeout_ms: 5000,
            max_party_size: 4,
            catalog: Catalog::default().entries().cloned().collect(),
        }
    }
}

impl AppConfig {
    /// Reads `path` when given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("compensation_retry_secs", self.compensation_retry_secs),
            ("request_timeout_ms", self.request_timeout_ms),
            ("max_party_size", self.max_party_size),
        ] {
            if value == 0 {
                return Err(BookingError::invalid(format!("{name} must be positive")));
            }
        }
        if self.catalog.is_empty() {
            return Err(BookingError::invalid("catalog must list at least one box"));
        }
        Ok(())
    }

    pub fn catalog(&self) -> Result<Catalog> {
        Catalog::new(self.catalog.clone())
    }

    pub fn policy(&self) -> BookingPolicy {
        BookingPolicy {
            max_party: self.max_party_size,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn compensation_retry(&self) -> Duration {
        Duration::from_secs(self.compensation_retry_secs)
    }
}
