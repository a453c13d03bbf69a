//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// Environment files to load before resolving secret references.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Public site layout (frontend origin, API domain, cookie scope)
    pub site: SiteConfig,
    /// GitHub OAuth endpoints
    pub github: GithubConfig,
    /// Secret references and cache policy
    pub secrets: SecretsConfig,
    /// Entry store backend
    pub store: StoreConfig,
    /// Guestbook rules
    pub guestbook: GuestbookConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (GUESTBOOK_ prefix, __ for nesting)
        figment = figment.merge(Env::prefixed("GUESTBOOK_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Env files must be loaded before ${VAR} expansion sees them
        config.load_env_files();
        config.expand_env_vars();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in config values
    fn expand_env_vars(&mut self) {
        #[allow(clippy::unwrap_used)]
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();

        for value in [
            &mut self.site.frontend_url,
            &mut self.site.api_domain,
            &mut self.secrets.client_id,
            &mut self.secrets.client_secret,
            &mut self.secrets.signing_key,
        ] {
            *value = Self::expand_string(&re, value);
        }

        if let Some(domain) = self.site.cookie_domain.as_mut() {
            *domain = Self::expand_string(&re, domain);
        }
        if let Some(path) = self.store.path.as_mut() {
            *path = Self::expand_string(&re, path);
        }
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
            max_body_size: 16 * 1024,
        }
    }
}

/// Where the site and its API live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Frontend origin; allowed by CORS and the post-login redirect target
    pub frontend_url: String,
    /// Public API host name (no scheme), e.g. `api.example.com`
    pub api_domain: String,
    /// Cookie `Domain` override. Defaults to the API domain with a leading
    /// `api.` replaced by `.`, so the cookie is shared with the site.
    #[serde(default)]
    pub cookie_domain: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            frontend_url: "https://example.com".to_string(),
            api_domain: "api.example.com".to_string(),
            cookie_domain: None,
        }
    }
}

impl SiteConfig {
    /// Domain attribute for the session cookie
    #[must_use]
    pub fn cookie_domain(&self) -> String {
        if let Some(ref domain) = self.cookie_domain {
            return domain.clone();
        }
        match self.api_domain.strip_prefix("api.") {
            Some(parent) => format!(".{parent}"),
            None => self.api_domain.clone(),
        }
    }

    /// OAuth redirect URI registered with the identity provider
    #[must_use]
    pub fn callback_url(&self) -> String {
        format!("https://{}/auth/callback", self.api_domain)
    }
}

/// GitHub OAuth configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// Browser-facing authorize endpoint
    pub authorize_url: String,
    /// Code-for-token exchange endpoint
    pub token_url: String,
    /// REST API base URL (profile lookup is `{api_url}/user`)
    pub api_url: String,
    /// Requested OAuth scope
    pub scope: String,
    /// Timeout for provider calls
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// User-Agent sent to the provider (GitHub rejects requests without one)
    pub user_agent: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            authorize_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            api_url: "https://api.github.com".to_string(),
            scope: "read:user".to_string(),
            timeout: Duration::from_secs(10),
            user_agent: concat!("guestbook/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Secret references
///
/// Each value is a literal, `env:VAR_NAME`, or `${VAR}`. `signing_key` also
/// accepts `auto`, which generates a random key per process (sessions do not
/// survive restarts).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Session signing key
    pub signing_key: String,
    /// How long fetched secrets are reused before the next lookup
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            client_id: "env:GITHUB_CLIENT_ID".to_string(),
            client_secret: "env:GITHUB_CLIENT_SECRET".to_string(),
            signing_key: "env:SESSION_SIGNING_KEY".to_string(),
            cache_ttl: Duration::from_secs(5 * 60),
        }
    }
}

/// Entry store backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process memory (lost on restart)
    #[default]
    Memory,
    /// JSON file on disk
    File,
}

/// Entry store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend kind
    pub backend: StoreBackend,
    /// File path for the `file` backend
    pub path: Option<String>,
}

/// Guestbook rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestbookConfig {
    /// Maximum message length in characters (after trimming)
    pub max_message_length: usize,
}

impl Default for GuestbookConfig {
    fn default() -> Self {
        Self {
            max_message_length: 500,
        }
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    /// Parse "30s", "5m", "100ms" or bare seconds
    pub(crate) fn parse(s: &str) -> Result<Duration, std::num::ParseIntError> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>().map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>().map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>().map(|m| Duration::from_secs(m * 60))
        } else {
            s.parse::<u64>().map(Duration::from_secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.secrets.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.guestbook.max_message_length, 500);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.github.scope, "read:user");
    }

    #[test]
    fn test_cookie_domain_derived_from_api_domain() {
        let site = SiteConfig {
            api_domain: "api.forfun.example.org".to_string(),
            ..Default::default()
        };
        assert_eq!(site.cookie_domain(), ".forfun.example.org");
        assert_eq!(
            site.callback_url(),
            "https://api.forfun.example.org/auth/callback"
        );
    }

    #[test]
    fn test_cookie_domain_override_and_passthrough() {
        let site = SiteConfig {
            api_domain: "guestbook.local".to_string(),
            ..Default::default()
        };
        assert_eq!(site.cookie_domain(), "guestbook.local");

        let site = SiteConfig {
            cookie_domain: Some(".custom.test".to_string()),
            ..Default::default()
        };
        assert_eq!(site.cookie_domain(), ".custom.test");
    }

    #[test]
    fn test_yaml_deserialization() {
        let yaml = r#"
server:
  port: 9000
  request_timeout: 5s
site:
  frontend_url: "https://site.test"
  api_domain: "api.site.test"
secrets:
  signing_key: auto
  cache_ttl: 1m
store:
  backend: file
  path: /tmp/guestbook.json
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.request_timeout, Duration::from_secs(5));
        assert_eq!(config.secrets.signing_key, "auto");
        assert_eq!(config.secrets.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.secrets.client_id, "env:GITHUB_CLIENT_ID");
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.store.path.as_deref(), Some("/tmp/guestbook.json"));
    }

    #[test]
    fn test_humantime_parse() {
        assert_eq!(humantime_serde::parse("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(humantime_serde::parse("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(
            humantime_serde::parse("100ms").unwrap(),
            Duration::from_millis(100)
        );
        assert_eq!(humantime_serde::parse("7").unwrap(), Duration::from_secs(7));
        assert!(humantime_serde::parse("soon").is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
        assert_eq!(
            Config::expand_string(&re, "${GB_TEST_SURELY_UNSET:-fallback}"),
            "fallback"
        );
        assert_eq!(Config::expand_string(&re, "plain"), "plain");
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = Config::load(Some(Path::new("/nonexistent/guestbook.yaml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guestbook.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "site:\n  api_domain: api.loaded.test").unwrap();
        drop(f);

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.site.api_domain, "api.loaded.test");
        assert_eq!(config.site.cookie_domain(), ".loaded.test");
    }

    #[test]
    fn test_load_env_files_sets_env_vars() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("test.env");
        let mut f = std::fs::File::create(&env_path).unwrap();
        writeln!(f, "GB_TEST_ENV_FILE_KEY=from_env_file").unwrap();
        drop(f);

        let config = Config {
            env_files: vec![env_path.to_string_lossy().to_string()],
            ..Default::default()
        };
        config.load_env_files();

        assert_eq!(env::var("GB_TEST_ENV_FILE_KEY").unwrap(), "from_env_file");
    }

    #[test]
    fn test_load_env_files_skips_missing() {
        let config = Config {
            env_files: vec!["/nonexistent/path/.env".to_string()],
            ..Default::default()
        };
        config.load_env_files();
    }
}
