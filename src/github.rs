//! GitHub OAuth client
//!
//! Handles the server-to-server half of the authorization-code flow:
//! exchanging the code for an access token, then fetching the profile the
//! session is built from. The browser-facing redirect lives in the auth routes.

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::Deserialize;
use session_core::Identity;
use tracing::debug;
use url::Url;

use crate::config::GithubConfig;
use crate::{Error, Result};

/// OAuth client credentials
#[derive(Debug, Clone, Copy)]
pub struct ClientCredentials<'a> {
    /// OAuth client id
    pub client_id: &'a str,
    /// OAuth client secret
    pub client_secret: &'a str,
}

/// An identity provider that can turn an authorization code into an identity
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// URL the browser is sent to for authorization
    fn authorize_url(&self, client_id: &str, redirect_uri: &str) -> Result<String>;

    /// Exchange an authorization code for the user's identity
    async fn authenticate(&self, code: &str, credentials: ClientCredentials<'_>)
    -> Result<Identity>;
}

/// Authenticated user's public profile
#[derive(Debug, Clone, Deserialize)]
pub struct GithubUser {
    /// Numeric user id
    pub id: u64,
    /// Login name
    pub login: String,
    /// Avatar image URL
    #[serde(default)]
    pub avatar_url: String,
}

impl From<GithubUser> for Identity {
    fn from(user: GithubUser) -> Self {
        Identity::new(user.id.to_string(), user.login, user.avatar_url)
    }
}

/// Token endpoint response. GitHub reports failures with HTTP 200 and an
/// `error` field.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GitHub implementation of [`IdentityProvider`]
pub struct GithubClient {
    http_client: Client,
    config: GithubConfig,
}

impl GithubClient {
    /// Create a client from configuration
    pub fn new(config: GithubConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            http_client,
            config,
        })
    }

    /// Exchange an authorization code for an access token
    pub async fn exchange_code(
        &self,
        code: &str,
        credentials: ClientCredentials<'_>,
    ) -> Result<String> {
        let response = self
            .http_client
            .post(&self.config.token_url)
            .header(header::ACCEPT, "application/json")
            .json(&serde_json::json!({
                "client_id": credentials.client_id,
                "client_secret": credentials.client_secret,
                "code": code,
            }))
            .send()
            .await
            .map_err(|e| Error::IdentityProvider(format!("Token request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::IdentityProvider(format!(
                "Token exchange failed: HTTP {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::IdentityProvider(format!("Failed to parse token response: {e}")))?;

        if let Some(error) = token.error {
            let detail = token.error_description.unwrap_or(error);
            return Err(Error::IdentityProvider(format!("GitHub OAuth error: {detail}")));
        }

        token
            .access_token
            .ok_or_else(|| Error::IdentityProvider("Token response had no access_token".into()))
    }

    /// Fetch the profile of the user an access token belongs to
    pub async fn fetch_user(&self, access_token: &str) -> Result<GithubUser> {
        let url = format!("{}/user", self.config.api_url.trim_end_matches('/'));
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| Error::IdentityProvider(format!("User request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::IdentityProvider(format!("GitHub API error: {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::IdentityProvider(format!("Failed to parse user profile: {e}")))
    }
}

#[async_trait]
impl IdentityProvider for GithubClient {
    fn authorize_url(&self, client_id: &str, redirect_uri: &str) -> Result<String> {
        let mut url = Url::parse(&self.config.authorize_url)
            .map_err(|e| Error::Config(format!("Invalid authorize_url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.config.scope);
        Ok(url.to_string())
    }

    async fn authenticate(
        &self,
        code: &str,
        credentials: ClientCredentials<'_>,
    ) -> Result<Identity> {
        let access_token = self.exchange_code(code, credentials).await?;
        let user = self.fetch_user(&access_token).await?;
        debug!(login = %user.login, "Fetched GitHub profile");
        Ok(user.into())
    }
}
