use std::env;

const DEFAULT_GRAPH_API_URL: &str = "https://graph.facebook.com/v2.10";
const DEFAULT_AUTH_URL: &str = "https://www.facebook.com/v2.10/dialog/oauth";
const DEFAULT_TOKEN_URL: &str = "https://graph.facebook.com/v2.10/oauth/access_token";

/// Demo configuration parsed from environment variables
#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub app_id: String,
    pub app_secret: String,
    pub redirect_url: String,
    pub graph_api_url: String,
    pub auth_url: String,
    pub token_url: String,
}

impl Config {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let app_id = lookup("FB_APP_ID").unwrap_or_default();
        let app_secret = lookup("FB_APP_SECRET").unwrap_or_default();

        let redirect_url = lookup("REDIRECT_URL")
            .unwrap_or_else(|| format!("http://localhost:{}/callback", port));

        let graph_api_url = lookup("GRAPH_API_URL")
            .unwrap_or_else(|| DEFAULT_GRAPH_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let auth_url = lookup("FB_AUTH_URL").unwrap_or_else(|| DEFAULT_AUTH_URL.to_string());
        let token_url = lookup("FB_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());

        Self {
            port,
            app_id,
            app_secret,
            redirect_url,
            graph_api_url,
            auth_url,
            token_url,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .field("redirect_url", &self.redirect_url)
            .field("graph_api_url", &self.graph_api_url)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}
