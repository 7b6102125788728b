//! Registry configuration, read from the environment at boot.
//!
//! Every knob is an env var (see the table in the README). `from_env`
//! parses; `validate` returns a list of issues with severities — boot
//! aborts on any `Error`.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default upload cap: 50 MiB.
pub const DEFAULT_MAX_PACKAGE_SIZE: u64 = 50 * 1024 * 1024;

/// Minimum length of `SECRET_KEY` in bytes.
pub const MIN_SECRET_KEY_LEN: usize = 32;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub registry: RegistryConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub discovery: DiscoveryConfig,
    pub cors: CorsConfig,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// `BIND_ADDRESS`, default `0.0.0.0`.
    pub bind_address: String,
    /// `PORT`, default `8080`.
    pub port: u16,
    /// Per-IP rate limiting; `None` disables it.
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 8080,
            rate_limit: Some(RateLimitConfig::default()),
        }
    }
}

/// Token-bucket rate limit, from `RATE_LIMIT_PER_SECOND` /
/// `RATE_LIMIT_BURST`. Setting `RATE_LIMIT_PER_SECOND=0` disables limiting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u64,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // Refill of 1/s with a burst of 60 ≈ the 60 req/min anonymous cap.
        Self {
            requests_per_second: 1,
            burst_size: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// `REGISTRY_NAME` — displayed identity.
    pub name: String,
    /// `DOMAIN` — public host, used to synthesize URLs.
    pub domain: String,
    /// `REDIRECT_BASE_URL` — public base for OAuth/OIDC callbacks.
    pub redirect_base_url: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            name: "ziggurat".into(),
            domain: "localhost:8080".into(),
            redirect_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `DB_PATH` — catalog file path.
    pub db_path: PathBuf,
    /// `STORAGE_PATH` — blob store root.
    pub storage_path: PathBuf,
    /// `MAX_PACKAGE_SIZE` — upload cap in bytes.
    pub max_package_size: u64,
    /// `STATIC_PATH` — web UI asset root.
    pub static_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/catalog.db"),
            storage_path: PathBuf::from("./data"),
            max_package_size: DEFAULT_MAX_PACKAGE_SIZE,
            static_path: PathBuf::from("./web/dist"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// `SECRET_KEY` — HMAC key for signed bearer tokens (≥ 32 bytes).
    pub secret_key: String,
    /// `ADMIN_USERS` — comma-separated usernames granted the admin scope.
    pub admin_users: Vec<String>,
    pub oidc: Vec<OidcProviderConfig>,
    pub oauth: Vec<OauthProviderConfig>,
}

/// One OIDC provider, from `OIDC_{ID}_{ISSUER,CLIENT_ID,CLIENT_SECRET}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcProviderConfig {
    pub id: String,
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
}

/// One plain-OAuth provider, from `OAUTH_{ID}_{CLIENT_ID,CLIENT_SECRET}`.
///
/// Endpoint URLs default to GitHub's when the provider id is `github`;
/// other providers must set `OAUTH_{ID}_{AUTHORIZE,TOKEN,USERINFO}_URL`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OauthProviderConfig {
    pub id: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiscoveryConfig {
    /// `DISCOVERY_URL` — upstream discovery endpoint. `None` disables the
    /// discovery surface (it returns empty lists).
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// `CORS_ALLOWED_ORIGINS`, comma-separated. `*` means permissive
    /// (NOT recommended). Defaults to localhost-only.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:*".into(),
                "http://127.0.0.1:*".into(),
            ],
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment loading
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Config {
    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Load from an explicit variable set (testable without touching the
    /// process environment).
    pub fn from_vars(vars: impl Iterator<Item = (String, String)>) -> Result<Self> {
        let vars: Vec<(String, String)> = vars
            .filter(|(_, v)| !v.is_empty())
            .collect();
        let get = |name: &str| -> Option<&str> {
            vars.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
        };

        let mut config = Config {
            log_level: get("LOG_LEVEL").unwrap_or("info").to_owned(),
            ..Config::default()
        };

        if let Some(bind) = get("BIND_ADDRESS") {
            config.server.bind_address = bind.to_owned();
        }
        if let Some(port) = get("PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| Error::Config(format!("PORT is not a valid port: {port:?}")))?;
        }
        if let Some(rps) = get("RATE_LIMIT_PER_SECOND") {
            let rps: u64 = rps.parse().map_err(|_| {
                Error::Config(format!("RATE_LIMIT_PER_SECOND is not a number: {rps:?}"))
            })?;
            if rps == 0 {
                config.server.rate_limit = None;
            } else {
                let burst = match get("RATE_LIMIT_BURST") {
                    Some(b) => b.parse().map_err(|_| {
                        Error::Config(format!("RATE_LIMIT_BURST is not a number: {b:?}"))
                    })?,
                    None => RateLimitConfig::default().burst_size,
                };
                config.server.rate_limit = Some(RateLimitConfig {
                    requests_per_second: rps,
                    burst_size: burst,
                });
            }
        }

        if let Some(name) = get("REGISTRY_NAME") {
            config.registry.name = name.to_owned();
        }
        if let Some(domain) = get("DOMAIN") {
            config.registry.domain = domain.to_owned();
        }
        config.registry.redirect_base_url = get("REDIRECT_BASE_URL")
            .map(|s| s.trim_end_matches('/').to_owned());

        if let Some(db) = get("DB_PATH") {
            config.storage.db_path = PathBuf::from(db);
        }
        if let Some(root) = get("STORAGE_PATH") {
            config.storage.storage_path = PathBuf::from(root);
        }
        if let Some(path) = get("STATIC_PATH") {
            config.storage.static_path = PathBuf::from(path);
        }
        if let Some(max) = get("MAX_PACKAGE_SIZE") {
            config.storage.max_package_size = max.parse().map_err(|_| {
                Error::Config(format!("MAX_PACKAGE_SIZE is not a byte count: {max:?}"))
            })?;
        }

        config.auth.secret_key = get("SECRET_KEY").unwrap_or_default().to_owned();
        config.auth.admin_users = get("ADMIN_USERS")
            .map(|list| {
                list.split(',')
                    .map(|s| s.trim().to_owned())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        config.discovery.url = get("DISCOVERY_URL").map(|s| s.trim_end_matches('/').to_owned());

        if let Some(origins) = get("CORS_ALLOWED_ORIGINS") {
            config.cors.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect();
        }

        config.auth.oidc = collect_oidc_providers(&vars);
        config.auth.oauth = collect_oauth_providers(&vars);

        Ok(config)
    }

    /// Public base URL for synthesized links: `REDIRECT_BASE_URL` when set,
    /// otherwise `http://{DOMAIN}`.
    pub fn public_base_url(&self) -> String {
        match &self.registry.redirect_base_url {
            Some(base) => base.clone(),
            None => format!("http://{}", self.registry.domain),
        }
    }

    /// True when at least one federated identity provider is configured.
    pub fn has_federated_auth(&self) -> bool {
        !self.auth.oidc.is_empty() || !self.auth.oauth.is_empty()
    }
}

/// Enumerate `OIDC_{ID}_ISSUER` variables; companion client id/secret are
/// picked up by suffix. Half-configured providers surface in `validate`.
fn collect_oidc_providers(vars: &[(String, String)]) -> Vec<OidcProviderConfig> {
    let get = |name: String| -> String {
        vars.iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };

    let mut providers: Vec<OidcProviderConfig> = Vec::new();
    for (key, issuer) in vars {
        let Some(id) = key
            .strip_prefix("OIDC_")
            .and_then(|rest| rest.strip_suffix("_ISSUER"))
        else {
            continue;
        };
        if id.is_empty() {
            continue;
        }
        providers.push(OidcProviderConfig {
            id: id.to_ascii_lowercase(),
            issuer: issuer.trim_end_matches('/').to_owned(),
            client_id: get(format!("OIDC_{id}_CLIENT_ID")),
            client_secret: get(format!("OIDC_{id}_CLIENT_SECRET")),
        });
    }
    providers.sort_by(|a, b| a.id.cmp(&b.id));
    providers
}

/// Enumerate `OAUTH_{ID}_CLIENT_ID` variables. GitHub's endpoints are the
/// default for the `github` provider id.
fn collect_oauth_providers(vars: &[(String, String)]) -> Vec<OauthProviderConfig> {
    let get = |name: String| -> String {
        vars.iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };

    let mut providers: Vec<OauthProviderConfig> = Vec::new();
    for (key, client_id) in vars {
        let Some(id) = key
            .strip_prefix("OAUTH_")
            .and_then(|rest| rest.strip_suffix("_CLIENT_ID"))
        else {
            continue;
        };
        if id.is_empty() {
            continue;
        }
        let is_github = id.eq_ignore_ascii_case("github");
        let or_default = |value: String, default: &str| -> String {
            if value.is_empty() && is_github {
                default.to_owned()
            } else {
                value
            }
        };
        providers.push(OauthProviderConfig {
            id: id.to_ascii_lowercase(),
            client_id: client_id.clone(),
            client_secret: get(format!("OAUTH_{id}_CLIENT_SECRET")),
            authorize_url: or_default(
                get(format!("OAUTH_{id}_AUTHORIZE_URL")),
                "https://github.com/login/oauth/authorize",
            ),
            token_url: or_default(
                get(format!("OAUTH_{id}_TOKEN_URL")),
                "https://github.com/login/oauth/access_token",
            ),
            userinfo_url: or_default(
                get(format!("OAUTH_{id}_USERINFO_URL")),
                "https://api.github.com/user",
            ),
        });
    }
    providers.sort_by(|a, b| a.id.cmp(&b.id));
    providers
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let mut error = |field: &str, message: String| {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: field.into(),
                message,
            });
        };

        if self.server.port == 0 {
            error("PORT", "port must be greater than 0".into());
        }
        if self.server.bind_address.is_empty() {
            error("BIND_ADDRESS", "bind address must not be empty".into());
        }

        if self.auth.secret_key.is_empty() {
            error("SECRET_KEY", "secret key must be set".into());
        } else if self.auth.secret_key.len() < MIN_SECRET_KEY_LEN {
            error(
                "SECRET_KEY",
                format!(
                    "secret key must be at least {MIN_SECRET_KEY_LEN} bytes (got {})",
                    self.auth.secret_key.len()
                ),
            );
        }

        if self.storage.max_package_size == 0 {
            error("MAX_PACKAGE_SIZE", "upload cap must be greater than 0".into());
        }

        if let Some(url) = &self.discovery.url {
            if !is_http_url(url) {
                error(
                    "DISCOVERY_URL",
                    format!("must start with http:// or https:// (got \"{url}\")"),
                );
            }
        }

        for provider in &self.auth.oidc {
            let field = format!("OIDC_{}", provider.id.to_ascii_uppercase());
            if !is_http_url(&provider.issuer) {
                error(&field, format!("issuer must be a URL (got \"{}\")", provider.issuer));
            }
            if provider.client_id.is_empty() || provider.client_secret.is_empty() {
                error(&field, "client id and client secret are both required".into());
            }
        }
        for provider in &self.auth.oauth {
            let field = format!("OAUTH_{}", provider.id.to_ascii_uppercase());
            if provider.client_secret.is_empty() {
                error(&field, "client secret is required".into());
            }
            for (label, url) in [
                ("authorize URL", &provider.authorize_url),
                ("token URL", &provider.token_url),
                ("userinfo URL", &provider.userinfo_url),
            ] {
                if !is_http_url(url) {
                    error(&field, format!("{label} must be set for non-github providers"));
                }
            }
        }

        if self.has_federated_auth() && self.registry.redirect_base_url.is_none() {
            error(
                "REDIRECT_BASE_URL",
                "required when an OIDC/OAuth provider is configured (callback URLs)".into(),
            );
        }

        if self.discovery.url.is_none() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "DISCOVERY_URL".into(),
                message: "not set — discovery endpoints will return empty lists".into(),
            });
        }
        if !self.has_federated_auth() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "OIDC/OAUTH".into(),
                message: "no identity providers configured — federated sign-in disabled".into(),
            });
        }
        if self.cors.allowed_origins.iter().any(|o| o == "*") {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "CORS_ALLOWED_ORIGINS".into(),
                message: "wildcard \"*\" allows all origins".into(),
            });
        }
        if !matches!(self.log_level.as_str(), "debug" | "info" | "warn" | "error") {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "LOG_LEVEL".into(),
                message: format!("unknown level \"{}\", falling back to info", self.log_level),
            });
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Iterator<Item = (String, String)> + 'a {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string()))
    }

    #[test]
    fn defaults_without_env() {
        let config = Config::from_vars(vars(&[])).unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.max_package_size, DEFAULT_MAX_PACKAGE_SIZE);
        assert!(config.discovery.url.is_none());
    }

    #[test]
    fn env_overrides_apply() {
        let config = Config::from_vars(vars(&[
            ("PORT", "9000"),
            ("DOMAIN", "pkgs.example.com"),
            ("MAX_PACKAGE_SIZE", "1048576"),
            ("ADMIN_USERS", "alice, bob"),
        ]))
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.registry.domain, "pkgs.example.com");
        assert_eq!(config.storage.max_package_size, 1_048_576);
        assert_eq!(config.auth.admin_users, vec!["alice", "bob"]);
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(Config::from_vars(vars(&[("PORT", "not-a-port")])).is_err());
    }

    #[test]
    fn short_secret_key_fails_validation() {
        let mut config = Config::from_vars(vars(&[("SECRET_KEY", "short")])).unwrap();
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.field == "SECRET_KEY"));

        config.auth.secret_key = "x".repeat(32);
        let issues = config.validate();
        assert!(!issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.field == "SECRET_KEY"));
    }

    #[test]
    fn oidc_providers_enumerated_from_env() {
        let config = Config::from_vars(vars(&[
            ("SECRET_KEY", "0123456789abcdef0123456789abcdef"),
            ("OIDC_CORP_ISSUER", "https://id.example.com"),
            ("OIDC_CORP_CLIENT_ID", "registry"),
            ("OIDC_CORP_CLIENT_SECRET", "s3cret"),
            ("REDIRECT_BASE_URL", "https://pkgs.example.com/"),
        ]))
        .unwrap();
        assert_eq!(config.auth.oidc.len(), 1);
        let provider = &config.auth.oidc[0];
        assert_eq!(provider.id, "corp");
        assert_eq!(provider.issuer, "https://id.example.com");
        assert_eq!(config.registry.redirect_base_url.as_deref(), Some("https://pkgs.example.com"));
        assert!(!config
            .validate()
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn half_configured_oidc_provider_is_an_error() {
        let config = Config::from_vars(vars(&[
            ("OIDC_CORP_ISSUER", "https://id.example.com"),
        ]))
        .unwrap();
        assert!(config
            .validate()
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.field == "OIDC_CORP"));
    }

    #[test]
    fn github_oauth_gets_default_endpoints() {
        let config = Config::from_vars(vars(&[
            ("OAUTH_GITHUB_CLIENT_ID", "abc"),
            ("OAUTH_GITHUB_CLIENT_SECRET", "def"),
        ]))
        .unwrap();
        let provider = &config.auth.oauth[0];
        assert_eq!(provider.id, "github");
        assert!(provider.authorize_url.contains("github.com"));
        assert!(provider.userinfo_url.contains("api.github.com"));
    }
}
