//! OAuth2 and Graph API client
//!
//! Covers the two calls the demo needs: exchanging an authorization code
//! for an access token, and reading the logged-in user's profile.

use crate::config::Config;
use crate::error::{GraphError, Result};
use crate::types::{GraphErrorEnvelope, Profile, TokenResponse};
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Permissions requested at login
pub const SCOPES: &[&str] = &["email", "public_profile", "user_photos"];

/// Profile fields requested from `/me`
const PROFILE_FIELDS: &str = "first_name,last_name,email,picture";

const TIMEOUT_SECS: u64 = 30;

pub struct GraphClient {
    client: reqwest::Client,
    app_id: String,
    app_secret: String,
    redirect_url: String,
    graph_api_url: String,
    auth_url: String,
    token_url: String,
}

impl GraphClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            redirect_url: config.redirect_url.clone(),
            graph_api_url: config.graph_api_url.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
        })
    }

    /// URL the user is sent to for consent
    pub fn authorize_url(&self, state: &str) -> String {
        let separator = if self.auth_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.auth_url,
            separator,
            urlencoding::encode(&self.app_id),
            urlencoding::encode(&self.redirect_url),
            urlencoding::encode(&SCOPES.join(",")),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for an access token
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        let form = [
            ("client_id", self.app_id.as_str()),
            ("client_secret", self.app_secret.as_str()),
            ("redirect_uri", self.redirect_url.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ]
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

        debug!(url = %self.token_url, "Exchanging authorization code");

        let response = self
            .client
            .post(&self.token_url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await?;

        parse_response(response).await
    }

    /// Fetch the profile of the token's owner
    pub async fn me(&self, access_token: &str) -> Result<Profile> {
        self.get("me", access_token, &[("fields", PROFILE_FIELDS)])
            .await
    }

    /// GET `{graph}/{path}` with the access token and extra query parameters
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let mut url = format!(
            "{}/{}?access_token={}",
            self.graph_api_url,
            path.trim_start_matches('/'),
            urlencoding::encode(access_token)
        );
        for (name, value) in params {
            url.push('&');
            url.push_str(name);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }

        debug!(path = %path, "Graph API request");

        let response = self.client.get(&url).send().await?;
        parse_response(response).await
    }
}

/// Decode a success body, or turn an error body into [`GraphError::Api`]
async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.bytes().await?;

    if let Ok(envelope) = serde_json::from_slice::<GraphErrorEnvelope>(&body) {
        return Err(GraphError::Api(envelope.error));
    }

    if !status.is_success() {
        return Err(GraphError::Status(status.as_u16()));
    }

    serde_json::from_slice(&body)
        .map_err(|e| GraphError::Config(format!("unexpected Graph API response: {}", e)))
}
