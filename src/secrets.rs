//! Secret lookup with a time-bounded cache
//!
//! The API needs three secrets: the OAuth client id, the OAuth client secret,
//! and the session signing key. They are fetched together from a
//! [`SecretSource`] and reused for `secrets.cache_ttl` (5 minutes by default).
//!
//! References in configuration take one of these forms:
//! - `env:VAR` - environment variable
//! - `keychain:SERVICE` - macOS Keychain or Linux secret-tool
//! - anything else - literal value
//!
//! `signing_key: auto` generates a random key once per process.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use session_core::SigningKey;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::SecretsConfig;
use crate::{Error, Result};

/// The secrets the API runs on
#[derive(Clone)]
pub struct Secrets {
    /// OAuth client id
    pub github_client_id: String,
    /// OAuth client secret
    pub github_client_secret: String,
    /// Session signing key
    pub signing_key: SigningKey,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("github_client_id", &self.github_client_id)
            .field("github_client_secret", &"<redacted>")
            .field("signing_key", &self.signing_key)
            .finish()
    }
}

/// Where secrets come from
#[async_trait]
pub trait SecretSource: Send + Sync + 'static {
    /// Fetch the current value of every secret in one round-trip.
    async fn fetch(&self) -> Result<Secrets>;
}

/// Resolves the references in [`SecretsConfig`]
pub struct ConfigSecretSource {
    config: SecretsConfig,
    /// Process-lifetime key for `signing_key: auto`
    generated_key: Option<SigningKey>,
}

impl ConfigSecretSource {
    /// Create a source from configuration
    ///
    /// # Errors
    ///
    /// Fails only if a generated key is rejected, which cannot happen for a
    /// 32-byte key.
    pub fn new(config: SecretsConfig) -> Result<Self> {
        let generated_key = if config.signing_key == "auto" {
            let bytes: [u8; 32] = rand::rng().random();
            warn!("Using a generated session signing key; sessions will not survive a restart");
            Some(SigningKey::new(bytes.to_vec())?)
        } else {
            None
        };

        Ok(Self {
            config,
            generated_key,
        })
    }

    async fn signing_key(&self) -> Result<SigningKey> {
        if let Some(ref key) = self.generated_key {
            return Ok(key.clone());
        }
        let raw = resolve_reference("signing_key", &self.config.signing_key).await?;
        SigningKey::new(raw).map_err(|e| Error::Config(format!("signing_key: {e}")))
    }
}

#[async_trait]
impl SecretSource for ConfigSecretSource {
    async fn fetch(&self) -> Result<Secrets> {
        Ok(Secrets {
            github_client_id: resolve_reference("client_id", &self.config.client_id).await?,
            github_client_secret: resolve_reference("client_secret", &self.config.client_secret)
                .await?,
            signing_key: self.signing_key().await?,
        })
    }
}

/// A fixed set of secrets
pub struct StaticSecretSource(Secrets);

impl StaticSecretSource {
    /// Wrap already-known secrets
    #[must_use]
    pub fn new(secrets: Secrets) -> Self {
        Self(secrets)
    }
}

#[async_trait]
impl SecretSource for StaticSecretSource {
    async fn fetch(&self) -> Result<Secrets> {
        Ok(self.0.clone())
    }
}

/// Resolve one secret reference
async fn resolve_reference(name: &str, reference: &str) -> Result<String> {
    let value = if let Some(var) = reference.strip_prefix("env:") {
        std::env::var(var).map_err(|_| {
            Error::SecretStore(format!("{name}: environment variable {var} is not set"))
        })?
    } else if let Some(service) = reference.strip_prefix("keychain:") {
        fetch_from_keychain(service).await?
    } else {
        reference.to_string()
    };

    if value.is_empty() {
        return Err(Error::SecretStore(format!("{name} resolved to an empty value")));
    }
    Ok(value)
}

/// Fetch a secret from the macOS Keychain
#[cfg(target_os = "macos")]
async fn fetch_from_keychain(service: &str) -> Result<String> {
    let output = Command::new("security")
        .args(["find-generic-password", "-s", service, "-w"])
        .output()
        .await
        .map_err(|e| Error::SecretStore(format!("Failed to access macOS Keychain: {e}")))?;

    keychain_output(service, &output)
}

/// Fetch a secret from the Linux secret service
#[cfg(target_os = "linux")]
async fn fetch_from_keychain(service: &str) -> Result<String> {
    let output = Command::new("secret-tool")
        .args(["lookup", "service", service])
        .output()
        .await
        .map_err(|e| {
            Error::SecretStore(format!(
                "Failed to access Linux secret service: {e}. Is libsecret installed?"
            ))
        })?;

    keychain_output(service, &output)
}

/// Keychain lookups are unsupported elsewhere
#[cfg(not(any(target_os = "macos", target_os = "linux")))]
async fn fetch_from_keychain(_service: &str) -> Result<String> {
    Err(Error::SecretStore(
        "Keychain access is only supported on macOS and Linux. Use env:VAR instead.".to_string(),
    ))
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
fn keychain_output(service: &str, output: &std::process::Output) -> Result<String> {
    if output.status.success() {
        let secret = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if secret.is_empty() {
            Err(Error::SecretStore(format!("Keychain entry '{service}' is empty")))
        } else {
            Ok(secret)
        }
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(service = service, error = %stderr, "Keychain lookup failed");
        Err(Error::SecretStore(format!(
            "Keychain entry '{service}' not found"
        )))
    }
}

/// Secrets shared across requests, refreshed lazily once stale
///
/// Concurrent refreshes are harmless: each one re-fetches and the last
/// writer wins with an equivalent value.
pub struct SecretCache {
    source: Arc<dyn SecretSource>,
    ttl: Duration,
    cached: RwLock<Option<CachedSecrets>>,
}

struct CachedSecrets {
    secrets: Arc<Secrets>,
    expires_at: Instant,
}

impl SecretCache {
    /// Create an empty cache in front of `source`
    #[must_use]
    pub fn new(source: Arc<dyn SecretSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// Build the cache described by configuration
    pub fn from_config(config: &SecretsConfig) -> Result<Self> {
        let source = ConfigSecretSource::new(config.clone())?;
        Ok(Self::new(Arc::new(source), config.cache_ttl))
    }

    /// Current secrets, fetching them if the cache is empty or stale
    pub async fn get(&self) -> Result<Arc<Secrets>> {
        if let Some(secrets) = self.fresh() {
            return Ok(secrets);
        }
        self.refresh().await
    }

    /// Fetch from the source and replace the cached value
    pub async fn refresh(&self) -> Result<Arc<Secrets>> {
        let secrets = Arc::new(self.source.fetch().await?);
        *self.cached.write() = Some(CachedSecrets {
            secrets: Arc::clone(&secrets),
            expires_at: Instant::now() + self.ttl,
        });
        debug!(ttl_secs = self.ttl.as_secs(), "Secrets refreshed");
        Ok(secrets)
    }

    /// Fetch once at startup so misconfiguration shows up before traffic does
    pub async fn warm(&self) -> Result<()> {
        self.refresh().await?;
        info!("Secrets loaded");
        Ok(())
    }

    fn fresh(&self) -> Option<Arc<Secrets>> {
        let cached = self.cached.read();
        cached
            .as_ref()
            .filter(|c| Instant::now() < c.expires_at)
            .map(|c| Arc::clone(&c.secrets))
    }
}
