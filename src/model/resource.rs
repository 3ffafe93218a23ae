//! Proxied upstream resources ("journals").

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub type ResourceId = u64;
pub type SubjectId = u64;

const MAX_NAME_LEN: usize = 200;
const MAX_PATH_LEN: usize = 100;
const MAX_HEADER_VALUE_LEN: usize = 1024;
const MAX_TIMEOUT_SECS: u32 = 3600;

/// Rejected resource input. Raised before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("invalid slug {slug:?}: {reason}")]
    InvalidSlug { slug: String, reason: &'static str },

    #[error("invalid proxy path {path:?}: {reason}")]
    InvalidProxyPath { path: String, reason: &'static str },

    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: &'static str },

    #[error("timeout must be between 1 and {max} seconds, got {0}", max = MAX_TIMEOUT_SECS)]
    InvalidTimeout(u32),

    #[error("name must be at most {max} characters", max = MAX_NAME_LEN)]
    NameTooLong,

    #[error("slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("proxy path already exists: {0}")]
    DuplicateProxyPath(String),

    #[error("proxy path {path} overlaps existing path {existing}")]
    OverlappingProxyPath { path: String, existing: String },
}

/// How a subject proves who they are to the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    #[default]
    Ip,
    #[serde(alias = "username")]
    Header,
    Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    #[default]
    Public,
    Restricted,
    Admin,
}

/// A persisted upstream proxied under `/<proxy_path>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub slug: String,
    pub proxy_path: String,
    /// Scheme, host and optional port. Never ends with `/`.
    pub base_url: String,
    pub requires_auth: bool,
    pub auth_method: AuthMethod,
    /// Header name → value, set on proxied responses.
    pub custom_headers: BTreeMap<String, String>,
    pub timeout_secs: u32,
    pub is_active: bool,
    pub access_level: AccessLevel,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Host, port and TLS flag parsed from a base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Resource {
    /// Parse the base URL into a server target.
    pub fn upstream(&self) -> Result<Upstream, ValidationError> {
        parse_upstream(&self.base_url)
    }

    /// Request path that maps to the upstream root.
    pub fn route_prefix(&self) -> String {
        format!("/{}", self.proxy_path)
    }
}

/// Parse `scheme://host[:port]`. The port defaults to 443 for https and 80 otherwise.
pub fn parse_upstream(base_url: &str) -> Result<Upstream, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason,
    };

    let url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    let secure = match url.scheme() {
        "https" => true,
        "http" => false,
        other => return Err(invalid(format!("unsupported scheme {other}"))),
    };
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid("missing host".to_string()))?
        .to_string();
    let port = url
        .port_or_known_default()
        .unwrap_or(if secure { 443 } else { 80 });

    Ok(Upstream { host, port, secure })
}

/// Input for creating a resource.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NewResource {
    pub name: String,
    pub slug: String,
    pub proxy_path: String,
    pub base_url: String,
    #[serde(default = "default_requires_auth")]
    pub requires_auth: bool,
    #[serde(default)]
    pub auth_method: AuthMethod,
    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u32,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
    #[serde(default)]
    pub access_level: AccessLevel,
}

fn default_requires_auth() -> bool {
    true
}

fn default_timeout_secs() -> u32 {
    30
}

fn default_is_active() -> bool {
    true
}

impl NewResource {
    /// Minimal input with defaults for everything optional.
    pub fn new(
        name: impl Into<String>,
        slug: impl Into<String>,
        proxy_path: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            slug: slug.into(),
            proxy_path: proxy_path.into(),
            base_url: base_url.into(),
            requires_auth: default_requires_auth(),
            auth_method: AuthMethod::default(),
            custom_headers: BTreeMap::new(),
            timeout_secs: default_timeout_secs(),
            is_active: default_is_active(),
            access_level: AccessLevel::default(),
        }
    }

    /// Trim the stored forms: no trailing `/` on the URL, no leading `/` on the path.
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.base_url = normalize_base_url(&self.base_url);
        self.proxy_path = normalize_proxy_path(&self.proxy_path);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        validate_slug(&self.slug)?;
        validate_proxy_path(&self.proxy_path)?;
        parse_upstream(&self.base_url)?;
        validate_headers(&self.custom_headers)?;
        validate_timeout(self.timeout_secs)
    }

    pub fn into_resource(self, id: ResourceId, now: u64) -> Resource {
        Resource {
            id,
            name: self.name,
            slug: self.slug,
            proxy_path: self.proxy_path,
            base_url: self.base_url,
            requires_auth: self.requires_auth,
            auth_method: self.auth_method,
            custom_headers: self.custom_headers,
            timeout_secs: self.timeout_secs,
            is_active: self.is_active,
            access_level: self.access_level,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Allow-listed partial update. The slug is immutable once created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResourcePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_auth: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<AuthMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_level: Option<AccessLevel>,
}

impl ResourcePatch {
    pub fn activate() -> Self {
        Self {
            is_active: Some(true),
            ..Self::default()
        }
    }

    pub fn deactivate() -> Self {
        Self {
            is_active: Some(false),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn normalized(mut self) -> Self {
        self.name = self.name.map(|n| n.trim().to_string());
        self.base_url = self.base_url.as_deref().map(normalize_base_url);
        self.proxy_path = self.proxy_path.as_deref().map(normalize_proxy_path);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(path) = &self.proxy_path {
            validate_proxy_path(path)?;
        }
        if let Some(url) = &self.base_url {
            parse_upstream(url)?;
        }
        if let Some(headers) = &self.custom_headers {
            validate_headers(headers)?;
        }
        if let Some(timeout) = self.timeout_secs {
            validate_timeout(timeout)?;
        }
        Ok(())
    }

    /// Copy every present field onto `resource`.
    pub fn apply(&self, resource: &mut Resource, now: u64) {
        if let Some(name) = &self.name {
            resource.name = name.clone();
        }
        if let Some(url) = &self.base_url {
            resource.base_url = url.clone();
        }
        if let Some(path) = &self.proxy_path {
            resource.proxy_path = path.clone();
        }
        if let Some(requires_auth) = self.requires_auth {
            resource.requires_auth = requires_auth;
        }
        if let Some(method) = self.auth_method {
            resource.auth_method = method;
        }
        if let Some(headers) = &self.custom_headers {
            resource.custom_headers = headers.clone();
        }
        if let Some(timeout) = self.timeout_secs {
            resource.timeout_secs = timeout;
        }
        if let Some(active) = self.is_active {
            resource.is_active = active;
        }
        if let Some(level) = self.access_level {
            resource.access_level = level;
        }
        resource.updated_at = now;
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn normalize_proxy_path(path: &str) -> String {
    path.trim().trim_start_matches('/').to_string()
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::MissingField("name"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong);
    }
    Ok(())
}

/// Lowercase letters, digits and single hyphens; 2 to 50 characters.
pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    let invalid = |reason| ValidationError::InvalidSlug {
        slug: slug.to_string(),
        reason,
    };

    if slug.is_empty() {
        return Err(ValidationError::MissingField("slug"));
    }
    if slug.len() < 2 {
        return Err(invalid("must be at least 2 characters long"));
    }
    if slug.len() > 50 {
        return Err(invalid("must be less than 50 characters"));
    }
    if !slug
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(invalid(
            "can only contain lowercase letters, numbers, and hyphens",
        ));
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return Err(invalid("must start and end with a letter or number"));
    }
    if slug.contains("--") {
        return Err(invalid("cannot contain consecutive hyphens"));
    }
    Ok(())
}

/// Path segments of `[A-Za-z0-9_-]` separated by single slashes, stored without a leading slash.
pub fn validate_proxy_path(path: &str) -> Result<(), ValidationError> {
    let invalid = |reason| ValidationError::InvalidProxyPath {
        path: path.to_string(),
        reason,
    };

    if path.is_empty() {
        return Err(ValidationError::MissingField("proxy_path"));
    }
    if path.len() > MAX_PATH_LEN {
        return Err(invalid("too long"));
    }
    if path.starts_with('/') || path.ends_with('/') || path.contains("//") {
        return Err(invalid("must not start or end with '/' or contain empty segments"));
    }
    if !path
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'/'))
    {
        return Err(invalid(
            "can only contain letters, numbers, '-', '_' and '/'",
        ));
    }
    Ok(())
}

fn validate_headers(headers: &BTreeMap<String, String>) -> Result<(), ValidationError> {
    for (name, value) in headers {
        let invalid = |reason| ValidationError::InvalidHeader {
            name: name.clone(),
            reason,
        };
        if name.is_empty() || !name.bytes().all(is_tchar) {
            return Err(invalid("name must be a non-empty HTTP token"));
        }
        if value.len() > MAX_HEADER_VALUE_LEN {
            return Err(invalid("value too long"));
        }
        if value.chars().any(|c| c.is_control()) {
            return Err(invalid("value must not contain control characters"));
        }
    }
    Ok(())
}

fn validate_timeout(timeout: u32) -> Result<(), ValidationError> {
    if timeout == 0 || timeout > MAX_TIMEOUT_SECS {
        return Err(ValidationError::InvalidTimeout(timeout));
    }
    Ok(())
}

/// RFC 9110 token character.
pub(crate) fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
