//! Shell-side half of the HTTP capability: checks a request the core emitted
//! before it goes on the wire and classifies transport failures.

use std::fmt;

use crux_http::protocol::HttpRequest;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const MAX_URL_LENGTH: usize = 2048;
// Trip creation carries every photo inline as base64.
pub const MAX_REQUEST_BODY_SIZE: usize = 100 * 1024 * 1024;
pub const MAX_TIMEOUT_MS: u64 = 120_000;
pub const MAX_HEADER_NAME_LENGTH: usize = 256;
pub const MAX_HEADER_VALUE_LENGTH: usize = 8192;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("request body too large: {size} bytes exceeds maximum of {max} bytes")]
    BodyTooLarge { size: usize, max: usize },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("connection failed to {host}: {message}")]
    Connection { host: String, message: String },

    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64, request_id: String },

    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String, request_id: String },
}

impl TransportError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Connection { .. })
    }

    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Timeout { request_id, .. } | Self::InvalidResponse { request_id, .. } => {
                Some(request_id)
            }
            _ => None,
        }
    }
}

impl From<TransportError> for crux_http::HttpError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout { .. } => Self::Timeout,
            TransportError::InvalidUrl { .. } => Self::Url(e.to_string()),
            other => Self::Io(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedUrl {
    url: Url,
    host: String,
}

impl ValidatedUrl {
    pub fn new(url: Url) -> Result<Self, TransportError> {
        let raw = url.as_str();
        if raw.len() > MAX_URL_LENGTH {
            return Err(TransportError::InvalidUrl {
                url: Self::truncate_url(raw),
                reason: format!("URL exceeds maximum length of {MAX_URL_LENGTH} bytes"),
            });
        }

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(TransportError::InvalidUrl {
                url: Self::truncate_url(raw),
                reason: format!(
                    "invalid scheme '{}', only 'http' and 'https' are allowed",
                    url.scheme()
                ),
            });
        }

        let host = url
            .host_str()
            .ok_or_else(|| TransportError::InvalidUrl {
                url: Self::truncate_url(raw),
                reason: "URL must have a host".to_string(),
            })?
            .to_lowercase();

        if !url.username().is_empty() || url.password().is_some() {
            return Err(TransportError::InvalidUrl {
                url: Self::truncate_url(raw),
                reason: "credentials in URL are not allowed".to_string(),
            });
        }

        Ok(Self { url, host })
    }

    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        let url = Url::parse(raw.trim()).map_err(|e| TransportError::InvalidUrl {
            url: Self::truncate_url(raw),
            reason: e.to_string(),
        })?;
        Self::new(url)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    #[must_use]
    pub fn as_url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Percent-encoded path, without query or fragment.
    #[must_use]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    fn truncate_url(url: &str) -> String {
        match url.char_indices().nth(100) {
            Some((i, _)) => format!("{}...", &url[..i]),
            None => url.to_string(),
        }
    }
}

impl fmt::Display for ValidatedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeaders {
    headers: Vec<(String, String)>,
}

impl HttpHeaders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), TransportError> {
        let name = name.into();
        let value = value.into();

        Self::validate_header_name(&name)?;
        Self::validate_header_value(&name, &value)?;

        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    fn validate_header_name(name: &str) -> Result<(), TransportError> {
        if name.is_empty() {
            return Err(TransportError::InvalidHeader {
                name: name.to_string(),
                reason: "header name cannot be empty".to_string(),
            });
        }

        if name.len() > MAX_HEADER_NAME_LENGTH {
            return Err(TransportError::InvalidHeader {
                name: name.chars().take(50).collect(),
                reason: format!(
                    "header name exceeds maximum length of {MAX_HEADER_NAME_LENGTH} bytes"
                ),
            });
        }

        if let Some(c) = name
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_')
        {
            return Err(TransportError::InvalidHeader {
                name: name.to_string(),
                reason: format!("invalid character '{c}' in header name"),
            });
        }

        if name.eq_ignore_ascii_case("host")
            || name.eq_ignore_ascii_case("content-length")
            || name.eq_ignore_ascii_case("transfer-encoding")
        {
            return Err(TransportError::InvalidHeader {
                name: name.to_string(),
                reason: "this header is managed automatically".to_string(),
            });
        }

        Ok(())
    }

    fn validate_header_value(name: &str, value: &str) -> Result<(), TransportError> {
        if value.len() > MAX_HEADER_VALUE_LENGTH {
            return Err(TransportError::InvalidHeader {
                name: name.to_string(),
                reason: format!(
                    "header value exceeds maximum length of {MAX_HEADER_VALUE_LENGTH} bytes"
                ),
            });
        }

        if value.contains(['\r', '\n', '\0']) {
            return Err(TransportError::InvalidHeader {
                name: name.to_string(),
                reason: "header value contains invalid characters (CR, LF, or NULL)".to_string(),
            });
        }

        Ok(())
    }
}

/// The methods the trip service and the geocoder are called with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        match raw.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(TransportError::InvalidRequest {
                reason: format!("unsupported method '{other}'"),
            }),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    #[must_use]
    pub const fn has_request_body(self) -> bool {
        matches!(self, Self::Post | Self::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request from the core, checked and ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    method: HttpMethod,
    url: ValidatedUrl,
    headers: HttpHeaders,
    body: Option<Vec<u8>>,
    request_id: String,
}

impl OutboundRequest {
    #[must_use]
    pub fn new(method: HttpMethod, url: ValidatedUrl) -> Self {
        Self {
            method,
            url,
            headers: HttpHeaders::new(),
            body: None,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, TransportError> {
        self.headers.insert(name, value)?;
        Ok(self)
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Result<Self, TransportError> {
        if body.is_empty() {
            return Ok(self);
        }
        if !self.method.has_request_body() {
            return Err(TransportError::InvalidRequest {
                reason: format!("{} requests cannot have a body", self.method),
            });
        }
        if body.len() > MAX_REQUEST_BODY_SIZE {
            return Err(TransportError::BodyTooLarge {
                size: body.len(),
                max: MAX_REQUEST_BODY_SIZE,
            });
        }
        self.body = Some(body);
        Ok(self)
    }

    #[must_use]
    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    #[must_use]
    pub fn url(&self) -> &ValidatedUrl {
        &self.url
    }

    #[must_use]
    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl TryFrom<&HttpRequest> for OutboundRequest {
    type Error = TransportError;

    fn try_from(request: &HttpRequest) -> Result<Self, Self::Error> {
        let mut outbound = Self::new(
            HttpMethod::parse(&request.method)?,
            ValidatedUrl::parse(&request.url)?,
        );
        for header in &request.headers {
            outbound = outbound.with_header(header.name.as_str(), header.value.as_str())?;
        }
        outbound.with_body(request.body.clone())
    }
}
