//! Facebook Graph API wire types

use serde::Deserialize;
use std::fmt;

/// Token endpoint response
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Fields requested from `/me`
#[derive(Debug, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<Picture>,
}

impl Profile {
    pub fn picture_url(&self) -> Option<&str> {
        self.picture.as_ref().map(|p| p.data.url.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct Picture {
    pub data: PictureData,
}

#[derive(Debug, Deserialize)]
pub struct PictureData {
    pub url: String,
}

/// Error object returned by the Graph API
#[derive(Debug, Clone, Deserialize)]
pub struct GraphApiError {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: i64,
}

impl fmt::Display for GraphApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.error_type, self.message, self.code)
    }
}

/// Envelope around [`GraphApiError`]
#[derive(Debug, Deserialize)]
pub struct GraphErrorEnvelope {
    pub error: GraphApiError,
}
