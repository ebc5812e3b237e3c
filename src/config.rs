//! Environment-driven configuration for the binary.

use crate::policy::{load_policy, QuotaPolicy};
use crate::recurrence::{GenerateOptions, DEFAULT_MAX_GENERATION_YEARS, DEFAULT_MAX_OCCURRENCES};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_LOG_FILTER: &str = "leave_engine=info";

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub max_occurrences: usize,
    pub max_generation_years: u32,
    /// JSON quota policy; the built-in policy is used when unset.
    pub policy_file: Option<PathBuf>,
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_occurrences: DEFAULT_MAX_OCCURRENCES,
            max_generation_years: DEFAULT_MAX_GENERATION_YEARS,
            policy_file: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_occurrences = match lookup("LEAVE_MAX_OCCURRENCES") {
            Some(value) => value
                .trim()
                .parse()
                .ok()
                .filter(|n: &usize| *n > 0)
                .ok_or(ConfigError::InvalidMaxOccurrences(value))?,
            None => DEFAULT_MAX_OCCURRENCES,
        };

        let max_generation_years = match lookup("LEAVE_MAX_GENERATION_YEARS") {
            Some(value) => value
                .trim()
                .parse()
                .ok()
                .filter(|n: &u32| *n > 0)
                .ok_or(ConfigError::InvalidGenerationYears(value))?,
            None => DEFAULT_MAX_GENERATION_YEARS,
        };

        let policy_file = lookup("LEAVE_POLICY_FILE")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        let log_filter = lookup("LEAVE_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(EngineConfig {
            max_occurrences,
            max_generation_years,
            policy_file,
            log_filter,
        })
    }

    /// Generation options carrying the configured safety caps.
    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            max_occurrences: self.max_occurrences,
            max_generation_years: self.max_generation_years,
            ..GenerateOptions::default()
        }
    }

    pub fn load_policy(&self) -> anyhow::Result<QuotaPolicy> {
        match &self.policy_file {
            Some(path) => load_policy(path),
            None => Ok(QuotaPolicy::default()),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("LEAVE_MAX_OCCURRENCES must be a positive integer, got {0:?}")]
    InvalidMaxOccurrences(String),

    #[error("LEAVE_MAX_GENERATION_YEARS must be a positive integer, got {0:?}")]
    InvalidGenerationYears(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.generate_options().max_occurrences, 50);
        assert_eq!(config.load_policy().unwrap(), QuotaPolicy::default());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("LEAVE_MAX_OCCURRENCES", "12"),
            ("LEAVE_MAX_GENERATION_YEARS", " 5 "),
            ("LEAVE_POLICY_FILE", "/etc/leave/policy.json"),
            ("LEAVE_LOG", "leave_engine=debug"),
        ])
        .unwrap();
        assert_eq!(config.max_occurrences, 12);
        assert_eq!(config.generate_options().max_generation_years, 5);
        assert_eq!(config.policy_file, Some(PathBuf::from("/etc/leave/policy.json")));
        assert_eq!(config.log_filter, "leave_engine=debug");
        assert!(config.load_policy().is_err());
    }

    #[test]
    fn test_malformed_numbers_are_rejected() {
        assert_eq!(
            config(&[("LEAVE_MAX_OCCURRENCES", "lots")]),
            Err(ConfigError::InvalidMaxOccurrences("lots".into()))
        );
        assert!(config(&[("LEAVE_MAX_OCCURRENCES", "0")]).is_err());
        assert!(matches!(
            config(&[("LEAVE_MAX_GENERATION_YEARS", "-1")]),
            Err(ConfigError::InvalidGenerationYears(_))
        ));
    }
}
