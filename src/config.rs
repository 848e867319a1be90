//! Scraper configuration

use serde::{Deserialize, Serialize};

use crate::aggregator::AggregationOptions;
use crate::error::{Error, Result};
use crate::ranks::RankScanOptions;

pub const DEFAULT_BASE_URL: &str = "https://na.finalfantasyxiv.com";

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub base_url: String,
    pub user_agent: String,
    pub mobile_user_agent: String,
    pub timeout_secs: u64,
    /// Pause between consecutive page fetches
    pub delay_ms: u64,
    /// Pages fetched up front by the rank scan
    pub preload_pages: u32,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DESKTOP_USER_AGENT.to_string(),
            mobile_user_agent: MOBILE_USER_AGENT.to_string(),
            timeout_secs: 30,
            delay_ms: 100,
            preload_pages: 2,
        }
    }
}

impl ScraperConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Defaults overridden by `LODESTONE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("LODESTONE_BASE_URL") {
            config.base_url = v;
        }
        if let Some(v) = lookup("LODESTONE_USER_AGENT") {
            config.user_agent = v;
        }
        if let Some(v) = lookup("LODESTONE_MOBILE_USER_AGENT") {
            config.mobile_user_agent = v;
        }
        if let Some(v) = lookup("LODESTONE_TIMEOUT_SECS") {
            config.timeout_secs = parse_var("LODESTONE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("LODESTONE_DELAY_MS") {
            config.delay_ms = parse_var("LODESTONE_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("LODESTONE_PRELOAD_PAGES") {
            config.preload_pages = parse_var("LODESTONE_PRELOAD_PAGES", &v)?;
        }

        Ok(config)
    }

    /// Aggregation defaults: uncapped, resolving relative links against `base_url`
    pub fn aggregation_options(&self) -> AggregationOptions {
        AggregationOptions {
            base_url: Some(self.base_url.clone()),
            delay_ms: self.delay_ms,
            ..Default::default()
        }
    }

    pub fn rank_scan_options(&self) -> RankScanOptions {
        RankScanOptions {
            base_url: self.base_url.clone(),
            delay_ms: self.delay_ms,
            preload_pages: self.preload_pages,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ScraperConfig::from_json(r#"{"delay_ms": 0, "preload_pages": 4}"#).unwrap();
        assert_eq!(config.delay_ms, 0);
        assert_eq!(config.preload_pages, 4);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            ScraperConfig::from_json("{not json"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("LODESTONE_BASE_URL", "https://eu.finalfantasyxiv.com"),
            ("LODESTONE_DELAY_MS", "250"),
        ]
        .into_iter()
        .collect();

        let config =
            ScraperConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.base_url, "https://eu.finalfantasyxiv.com");
        assert_eq!(config.delay_ms, 250);
        assert_eq!(config.preload_pages, 2);

        let scan = config.rank_scan_options();
        assert_eq!(scan.base_url, "https://eu.finalfantasyxiv.com");
        assert_eq!(scan.delay_ms, 250);
    }

    #[test]
    fn test_env_rejects_non_numeric() {
        let result = ScraperConfig::from_lookup(|k| {
            (k == "LODESTONE_PRELOAD_PAGES").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
