//! Configuration module for the tourcat application.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `TOURCAT_`-prefixed environment variables. Durations may be given as
//! plain seconds or as strings like `"30m"` or `"250ms"`.

use anyhow::Context;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use crate::catalog::models::GeoPoint;
use fundu::DurationParser;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use url::Url;

/// Environment variable naming the TOML config file.
pub const CONFIG_PATH_VAR: &str = "TOURCAT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "tourcat.toml";

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Log level for the tourcat crate; other crates stay at `warn`.
    pub log_level: String,
    pub catalog_base_url: String,
    #[serde(deserialize_with = "deserialize_duration")]
    pub request_timeout: Duration,
    /// Outbound requests per second; 0 disables the limiter.
    pub rate_limit_per_second: u32,
    pub page_size: usize,
    /// Cap on pages fetched for one aggregated result set.
    pub max_pages: u32,
    pub max_parallel_requests: usize,
    pub aggregate_concurrency: usize,
    /// Categories prefetched alongside an uncategorized first page.
    pub related_categories: Vec<String>,
    /// Where the user is, if known. Enables the nearby-tours prefetch; set
    /// both or neither.
    pub user_lat: Option<f64>,
    pub user_lng: Option<f64>,
    #[serde(deserialize_with = "deserialize_duration")]
    pub ttl_static: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub ttl_listing: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub ttl_detail: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub ttl_search: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub ttl_aggregate: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub cache_max_age: Duration,
    pub cache_capacity: usize,
    #[serde(deserialize_with = "deserialize_duration")]
    pub slow_load_threshold: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            catalog_base_url: "http://localhost:8000/api/v1/".to_string(),
            request_timeout: Duration::from_secs(10),
            rate_limit_per_second: 10,
            page_size: 12,
            max_pages: 20,
            max_parallel_requests: 3,
            aggregate_concurrency: 6,
            related_categories: Vec::new(),
            user_lat: None,
            user_lng: None,
            ttl_static: Duration::from_secs(30 * 60),
            ttl_listing: Duration::from_secs(10 * 60),
            ttl_detail: Duration::from_secs(5 * 60),
            ttl_search: Duration::from_secs(2 * 60),
            ttl_aggregate: Duration::from_secs(5 * 60),
            cache_max_age: Duration::from_secs(60 * 60),
            cache_capacity: 500,
            slow_load_threshold: Duration::from_secs(2),
        }
    }
}

impl Config {
    /// Load from the file named by `TOURCAT_CONFIG` (if present) and the
    /// environment.
    pub fn load() -> anyhow::Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let figment = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TOURCAT_"));
        Self::from_figment(figment).with_context(|| format!("Failed to load config (file: {path})"))
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Config = figment.extract()?;
        config.catalog_url()?;
        config.user_location()?;
        Ok(config)
    }

    pub fn user_location(&self) -> anyhow::Result<Option<GeoPoint>> {
        match (self.user_lat, self.user_lng) {
            (None, None) => Ok(None),
            (Some(lat), Some(lng)) => {
                anyhow::ensure!(
                    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng),
                    "user location ({lat}, {lng}) is out of range"
                );
                Ok(Some(GeoPoint { lat, lng }))
            }
            _ => anyhow::bail!("user_lat and user_lng must be set together"),
        }
    }

    pub fn catalog_url(&self) -> anyhow::Result<Url> {
        Url::parse(&self.catalog_base_url)
            .with_context(|| format!("Invalid catalog_base_url '{}'", self.catalog_base_url))
    }
}

/// Duration from integer seconds or a human-readable string.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DurationValue {
        Seconds(u64),
        Text(String),
    }

    match DurationValue::deserialize(deserializer)? {
        DurationValue::Seconds(secs) => Ok(Duration::from_secs(secs)),
        DurationValue::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

fn parse_duration(text: &str) -> Result<Duration, String> {
    let parsed = DurationParser::with_all_time_units()
        .parse(text.trim())
        .map_err(|e| format!("invalid duration '{text}': {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration '{text}': {e}"))
}
