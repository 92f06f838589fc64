//! Harness configuration
//!
//! Loaded from a JSON file; every field has a default so `{}` is a valid
//! configuration. The config value is owned by the `Harness`, never global.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{HarnessError, HarnessResult};
use crate::observability::{log_event_with_fields, Event};

/// Upper bound accepted for `plan_depth_ceiling`
pub const MAX_PLAN_DEPTH_CEILING: usize = 64;

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Collection under test
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Allowed slowdown factor for timing comparisons
    #[serde(default = "default_tolerance_factor")]
    pub tolerance_factor: f64,

    /// Maximum number of plan nodes walked before a plan is malformed
    #[serde(default = "default_plan_depth_ceiling")]
    pub plan_depth_ceiling: usize,

    /// Prefix for scenario-scoped index names
    #[serde(default = "default_index_name_prefix")]
    pub index_name_prefix: String,

    /// Log the raw explain document of every executed query
    #[serde(default)]
    pub log_explain: bool,
}

fn default_collection() -> String {
    "movies".to_string()
}
fn default_tolerance_factor() -> f64 {
    1.2
}
fn default_plan_depth_ceiling() -> usize {
    10
}
fn default_index_name_prefix() -> String {
    "test".to_string()
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            tolerance_factor: default_tolerance_factor(),
            plan_depth_ceiling: default_plan_depth_ceiling(),
            index_name_prefix: default_index_name_prefix(),
            log_explain: false,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> HarnessResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HarnessError::config_invalid(format!("Failed to read config: {}", e))
        })?;

        let config = Self::from_json(&content)?;

        let path_display = path.display().to_string();
        log_event_with_fields(
            Event::ConfigLoaded,
            &[
                ("path", path_display.as_str()),
                ("collection", config.collection.as_str()),
            ],
        );

        Ok(config)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(content: &str) -> HarnessResult<Self> {
        let config: HarnessConfig = serde_json::from_str(content).map_err(|e| {
            HarnessError::config_invalid(format!("Invalid config JSON: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> HarnessResult<()> {
        if self.collection.trim().is_empty() {
            return Err(HarnessError::config_invalid("collection must not be empty"));
        }

        if !self.tolerance_factor.is_finite() || self.tolerance_factor < 1.0 {
            return Err(HarnessError::config_invalid(format!(
                "tolerance_factor must be a finite number >= 1.0, got {}",
                self.tolerance_factor
            )));
        }

        if self.plan_depth_ceiling == 0 || self.plan_depth_ceiling > MAX_PLAN_DEPTH_CEILING {
            return Err(HarnessError::config_invalid(format!(
                "plan_depth_ceiling must be in 1..={}, got {}",
                MAX_PLAN_DEPTH_CEILING, self.plan_depth_ceiling
            )));
        }

        if self.index_name_prefix.is_empty()
            || !self
                .index_name_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(HarnessError::config_invalid(format!(
                "index_name_prefix must be non-empty [A-Za-z0-9_], got '{}'",
                self.index_name_prefix
            )));
        }

        Ok(())
    }
}
