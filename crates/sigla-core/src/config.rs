//! Workflow inputs and pipeline tuning.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Which document store a workflow writes to or checks against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Staging,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Staging => "staging",
            Self::Production => "production",
        })
    }
}

impl FromStr for Environment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            other => Err(CoreError::InvalidWorkflowInputs(format!(
                "incorrect environment '{other}', use 'staging' or 'production'"
            ))),
        }
    }
}

/// Split a comma-delimited list of spreadsheet ids.
pub fn parse_spreadsheet_ids(raw: &str) -> Result<Vec<String>, CoreError> {
    let ids: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    if ids.is_empty() {
        return Err(CoreError::InvalidWorkflowInputs(
            "no spreadsheet ids found".to_string(),
        ));
    }
    Ok(ids)
}

/// Concurrency and quota settings shared by every pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on sheets processed at once.
    pub max_workers: usize,
    /// Wait before retrying after the sheet service reports its quota is used
    /// up, unless the service says otherwise.
    pub quota_wait_secs: u64,
    /// Attempts per read before a quota error is final.
    pub quota_max_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            quota_wait_secs: 20 * 60,
            quota_max_attempts: 3,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| CoreError::InvalidWorkflowInputs(format!("pipeline config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_workers == 0 {
            return Err(CoreError::InvalidWorkflowInputs(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.quota_max_attempts == 0 {
            return Err(CoreError::InvalidWorkflowInputs(
                "quota_max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
