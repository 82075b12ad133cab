use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::capabilities::http::MAX_TIMEOUT_MS;
use crate::error::{AppError, ErrorKind};
use crate::trip::TripId;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_GEOCODER_USER_AGENT: &str = "tripbook/0.1 (travel journal)";
pub const DEFAULT_GEOCODER_LANGUAGE: &str = "it";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_SUGGESTION_MIN_CHARS: usize = 3;
pub const DEFAULT_SUGGESTION_LIMIT: usize = 5;
pub const DEFAULT_ASPECT_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid {field} '{value}': {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("request timeout {0}ms is out of range")]
    TimeoutOutOfRange(u64),
    #[error("{0} must be at least 1")]
    ZeroLimit(&'static str),
    #[error("configuration is not valid JSON: {0}")]
    Parse(String),
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::new(ErrorKind::InvalidState, "Invalid configuration").with_internal(e.to_string())
    }
}

/// Everything the core needs to know about its environment. Shells load it
/// once and hand it over with `Event::Configure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub geocoder_url: String,
    pub geocoder_user_agent: String,
    pub geocoder_language: String,
    pub request_timeout_ms: u64,
    pub suggestion_min_chars: usize,
    pub suggestion_limit: usize,
    pub aspect_cache_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            geocoder_url: DEFAULT_GEOCODER_URL.into(),
            geocoder_user_agent: DEFAULT_GEOCODER_USER_AGENT.into(),
            geocoder_language: DEFAULT_GEOCODER_LANGUAGE.into(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            suggestion_min_chars: DEFAULT_SUGGESTION_MIN_CHARS,
            suggestion_limit: DEFAULT_SUGGESTION_LIMIT,
            aspect_cache_capacity: DEFAULT_ASPECT_CACHE_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Missing keys fall back to their defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_geocoder_url(mut self, url: impl Into<String>) -> Self {
        self.geocoder_url = url.into();
        self
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn aspect_cache_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.aspect_cache_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn validate(&self) -> Result<Endpoints, ConfigError> {
        if self.request_timeout_ms == 0 || self.request_timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::TimeoutOutOfRange(self.request_timeout_ms));
        }
        if self.suggestion_min_chars == 0 {
            return Err(ConfigError::ZeroLimit("suggestion_min_chars"));
        }
        if self.suggestion_limit == 0 {
            return Err(ConfigError::ZeroLimit("suggestion_limit"));
        }
        if self.aspect_cache_capacity == 0 {
            return Err(ConfigError::ZeroLimit("aspect_cache_capacity"));
        }

        Ok(Endpoints {
            api_base: parse_http_url("api_base_url", &self.api_base_url)?,
            geocoder: parse_http_url("geocoder_url", &self.geocoder_url)?,
        })
    }
}

fn parse_http_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        field,
        value: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".into()));
    }
    if url.cannot_be_a_base() {
        return Err(invalid("not a base URL".into()));
    }
    Ok(url)
}

/// Resolved URLs for every remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    api_base: Url,
    geocoder: Url,
}

impl Endpoints {
    fn api(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    #[must_use]
    pub fn trips(&self) -> Url {
        self.api(&["api", "trips"])
    }

    #[must_use]
    pub fn trip(&self, id: TripId) -> Url {
        self.api(&["api", "trips", &id.to_string()])
    }

    #[must_use]
    pub fn trip_field(&self, id: TripId, field: crate::trip::TripField) -> Url {
        self.api(&["api", "trips", &id.to_string(), field.path_segment()])
    }

    #[must_use]
    pub fn categories(&self) -> Url {
        self.api(&["api", "tipology"])
    }

    /// The name is percent-encoded as a single path segment.
    #[must_use]
    pub fn category(&self, name: &str) -> Url {
        self.api(&["api", "tipology", name])
    }

    #[must_use]
    pub fn geocoder_search(&self, query: &str, limit: usize) -> Url {
        let mut url = self.geocoder.clone();
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("format", "json")
            .append_pair("addressdetails", "1")
            .append_pair("limit", &limit.to_string());
        url
    }

    /// Single best match for a free-form place, used to pin trips on the map.
    #[must_use]
    pub fn geocoder_lookup(&self, query: &str) -> Url {
        let mut url = self.geocoder.clone();
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("format", "json")
            .append_pair("limit", "1");
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trip::TripField;

    fn endpoints(base: &str) -> Endpoints {
        AppConfig::default()
            .with_api_base_url(base)
            .validate()
            .unwrap()
    }

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_from_json_fills_missing_keys() {
        let config = AppConfig::from_json(r#"{"api_base_url": "http://192.168.1.20:3000"}"#).unwrap();
        assert_eq!(config.api_base_url, "http://192.168.1.20:3000");
        assert_eq!(config.suggestion_limit, DEFAULT_SUGGESTION_LIMIT);
        assert!(AppConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_scheme = AppConfig::default().with_api_base_url("ftp://example.com");
        assert!(matches!(bad_scheme.validate(), Err(ConfigError::InvalidUrl { .. })));

        let zero_timeout = AppConfig {
            request_timeout_ms: 0,
            ..AppConfig::default()
        };
        assert!(matches!(zero_timeout.validate(), Err(ConfigError::TimeoutOutOfRange(0))));

        let zero_limit = AppConfig {
            suggestion_limit: 0,
            ..AppConfig::default()
        };
        assert!(matches!(zero_limit.validate(), Err(ConfigError::ZeroLimit(_))));
    }

    #[test]
    fn test_trip_urls() {
        let e = endpoints("http://localhost:3000");
        assert_eq!(e.trips().as_str(), "http://localhost:3000/api/trips");
        assert_eq!(e.trip(TripId(4)).as_str(), "http://localhost:3000/api/trips/4");
        assert_eq!(
            e.trip_field(TripId(4), TripField::Repeat).as_str(),
            "http://localhost:3000/api/trips/4/repeat"
        );
    }

    #[test]
    fn test_base_path_is_kept() {
        let e = endpoints("https://example.com/journal/");
        assert_eq!(e.trips().as_str(), "https://example.com/journal/api/trips");
    }

    #[test]
    fn test_category_name_is_encoded() {
        let e = endpoints("http://localhost:3000");
        assert_eq!(
            e.category("Beach House").as_str(),
            "http://localhost:3000/api/tipology/Beach%20House"
        );
        assert_eq!(
            e.category("a/b").as_str(),
            "http://localhost:3000/api/tipology/a%2Fb"
        );
    }

    #[test]
    fn test_geocoder_query() {
        let e = endpoints("http://localhost:3000");
        let url = e.geocoder_search("Roma centro", 5);
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("q".into(), "Roma centro".into()),
                ("format".into(), "json".into()),
                ("addressdetails".into(), "1".into()),
                ("limit".into(), "5".into()),
            ]
        );
    }

    #[test]
    fn test_geocoder_lookup_asks_for_one_match() {
        let e = endpoints("http://localhost:3000");
        let url = e.geocoder_lookup("Lago di Como");
        assert_eq!(url.query_pairs().count(), 3);
        assert!(url
            .query_pairs()
            .any(|(k, v)| k == "limit" && v == "1"));
        assert!(url.as_str().contains("q=Lago+di+Como"));
    }
}
