//! Login flow and profile page

use crate::error::AppError;
use crate::graph::GraphClient;
use crate::types::Profile;
use axum::extract::{Query, State};
use axum::http::header::{AUTHORIZATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const AUTH_COOKIE: &str = "facebook-auth";
const STATE_COOKIE: &str = "oauth-state";
const STATE_MAX_AGE_SECS: u64 = 10 * 60;
const REFRESH_SECS: u64 = 5;

/// Accepted alongside `Authorization` for older clients
const AUTHENTICATION: HeaderName = HeaderName::from_static("authentication");

#[derive(Clone)]
pub struct AppState {
    pub graph: Arc<GraphClient>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/logout", get(logout))
        .route("/profile", get(profile))
        .with_state(state)
}

/// GET /login
/// Redirects to the provider's consent page with a fresh CSRF state.
async fn login(State(state): State<AppState>) -> Response {
    let csrf = Uuid::new_v4().simple().to_string();
    let url = state.graph.authorize_url(&csrf);

    info!("Login initiated");

    let cookie = format!(
        "{}={}; HttpOnly; Path=/; Max-Age={}",
        STATE_COOKIE, csrf, STATE_MAX_AGE_SECS
    );
    ([(SET_COOKIE, cookie)], Redirect::temporary(&url)).into_response()
}

#[derive(Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /callback?code=...&state=...
/// Exchanges the code, stores the token in a cookie and shows it briefly
/// before moving on to /profile.
async fn callback(
    State(state): State<AppState>,
    cookies: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AppError> {
    if let Some(err) = params.error {
        let message = params.error_description.unwrap_or(err);
        warn!(error = %message, "Provider returned an error");
        return Err(AppError::Provider(message));
    }

    let expected = cookies.get(STATE_COOKIE).map(|c| c.value().to_string());
    if expected.is_none() || expected != params.state {
        return Err(AppError::BadRequest("Invalid OAuth state".into()));
    }

    let code = params
        .code
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".into()))?;

    let token = state.graph.exchange_code(&code).await.map_err(|e| {
        error!(error = %e, "Code exchange failed");
        AppError::from(e)
    })?;

    info!("Login completed");

    let mut headers = HeaderMap::new();
    append_cookie(
        &mut headers,
        &format!("{}={}; HttpOnly; Path=/", AUTH_COOKIE, token.access_token),
    )?;
    append_cookie(
        &mut headers,
        &format!("{}=; HttpOnly; Path=/; Max-Age=0", STATE_COOKIE),
    )?;

    let page = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta http-equiv=\"refresh\" content=\"{}; url=/profile\">\n<title>Logged in</title>\n</head>\n<body>\n<p>Access token:</p>\n<pre>{}</pre>\n<p>Redirecting to your <a href=\"/profile\">profile</a>...</p>\n</body>\n</html>\n",
        REFRESH_SECS,
        escape_html(&token.access_token)
    );

    Ok((headers, Html(page)).into_response())
}

/// GET /logout
async fn logout() -> Response {
    let cookie = format!("{}=; HttpOnly; Path=/; Max-Age=0", AUTH_COOKIE);
    (
        [(SET_COOKIE, cookie)],
        Html("<p>Logged out. <a href=\"/login\">Log in again</a></p>"),
    )
        .into_response()
}

/// GET /profile
async fn profile(
    State(state): State<AppState>,
    cookies: CookieJar,
    headers: HeaderMap,
) -> Result<Html<String>, AppError> {
    let token = cookies
        .get(AUTH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers))
        .ok_or(AppError::Forbidden)?;

    let profile = state.graph.me(&token).await?;
    Ok(Html(render_profile(&profile)))
}

/// Token from `Authorization: Bearer ...` or `Authentication: Bearer ...`
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    [AUTHORIZATION, AUTHENTICATION].iter().find_map(|name| {
        let value = headers.get(name)?.to_str().ok()?;
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))?
            .trim();
        (!token.is_empty()).then(|| token.to_string())
    })
}

fn append_cookie(headers: &mut HeaderMap, cookie: &str) -> Result<(), AppError> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|_| AppError::BadRequest("Token is not a valid cookie value".into()))?;
    headers.append(SET_COOKIE, value);
    Ok(())
}

fn render_profile(profile: &Profile) -> String {
    let picture = profile
        .picture_url()
        .map(|url| format!("<img src=\"{}\" alt=\"\">\n", escape_html(url)))
        .unwrap_or_default();

    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Profile</title></head>\n<body>\n{}<h1>{} {}</h1>\n<p>{}</p>\n<p><a href=\"/logout\">Log out</a></p>\n</body>\n</html>\n",
        picture,
        escape_html(&profile.first_name),
        escape_html(&profile.last_name),
        escape_html(profile.email.as_deref().unwrap_or("")),
    )
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::routing::post;
    use axum::Json;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn graph_error() -> Value {
        json!({
            "error": {
                "message": "Invalid OAuth access token.",
                "type": "OAuthException",
                "code": 190,
                "fbtrace_id": "AbC"
            }
        })
    }

    /// Minimal stand-in for the token endpoint and `/me`
    async fn spawn_mock_graph() -> String {
        async fn access_token(body: String) -> (StatusCode, Json<Value>) {
            if body.contains("code=good") && body.contains("client_secret=secret") {
                (
                    StatusCode::OK,
                    Json(json!({"access_token": "EAAB", "token_type": "bearer", "expires_in": 3600})),
                )
            } else {
                (StatusCode::BAD_REQUEST, Json(graph_error()))
            }
        }

        async fn me(Query(query): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
            let fields = query.get("fields").map(String::as_str);
            match query.get("access_token").map(String::as_str) {
                Some("EAAB") if fields == Some("first_name,last_name,email,picture") => (
                    StatusCode::OK,
                    Json(json!({
                        "id": "42",
                        "first_name": "Ada <3",
                        "last_name": "Lovelace",
                        "email": "ada@example.com",
                        "picture": {"data": {"url": "https://cdn.example/ada.jpg?a=1&b=2"}}
                    })),
                ),
                _ => (StatusCode::BAD_REQUEST, Json(graph_error())),
            }
        }

        let router = Router::new()
            .route("/oauth/access_token", post(access_token))
            .route("/me", get(me));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn test_state(graph_url: &str) -> AppState {
        let graph_url = graph_url.to_string();
        let config = Config::from_lookup(move |name| match name {
            "FB_APP_ID" => Some("1234".to_string()),
            "FB_APP_SECRET" => Some("secret".to_string()),
            "FB_AUTH_URL" => Some("https://auth.example/dialog/oauth".to_string()),
            "FB_TOKEN_URL" => Some(format!("{}/oauth/access_token", graph_url)),
            "GRAPH_API_URL" => Some(graph_url.clone()),
            _ => None,
        });
        AppState {
            graph: Arc::new(GraphClient::new(&config).unwrap()),
        }
    }

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_login_redirects_to_provider() {
        let router = create_router(test_state("http://127.0.0.1:9"));

        let response = router.oneshot(request("/login", &[])).await.unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://auth.example/dialog/oauth?client_id=1234"));
        assert!(location.contains("scope=email%2Cpublic_profile%2Cuser_photos"));

        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].starts_with("oauth-state="));
        let csrf = cookies[0]
            .trim_start_matches("oauth-state=")
            .split(';')
            .next()
            .unwrap();
        assert!(location.ends_with(&format!("state={}", csrf)));
    }

    #[tokio::test]
    async fn test_callback_provider_error() {
        let router = create_router(test_state("http://127.0.0.1:9"));

        let response = router
            .oneshot(request(
                "/callback?error=access_denied&error_description=Permissions+error",
                &[],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "Permissions error");
    }

    #[tokio::test]
    async fn test_callback_rejects_state_mismatch() {
        let router = create_router(test_state("http://127.0.0.1:9"));

        let response = router
            .oneshot(request(
                "/callback?code=good&state=forged",
                &[("cookie", "oauth-state=expected")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_callback_sets_token_cookie() {
        let graph_url = spawn_mock_graph().await;
        let router = create_router(test_state(&graph_url));

        let response = router
            .oneshot(request(
                "/callback?code=good&state=xyz",
                &[("cookie", "oauth-state=xyz")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        assert!(cookies.iter().any(|c| c.starts_with("facebook-auth=EAAB;")));
        assert!(cookies
            .iter()
            .any(|c| c.starts_with("oauth-state=;") && c.contains("Max-Age=0")));

        let body = body_text(response).await;
        assert!(body.contains("<pre>EAAB</pre>"));
        assert!(body.contains("content=\"5; url=/profile\""));
    }

    #[tokio::test]
    async fn test_callback_exchange_failure() {
        let graph_url = spawn_mock_graph().await;
        let router = create_router(test_state(&graph_url));

        let response = router
            .oneshot(request(
                "/callback?code=bad&state=xyz",
                &[("cookie", "oauth-state=xyz")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(set_cookies(&response).is_empty());
    }

    #[tokio::test]
    async fn test_profile_without_token_is_forbidden() {
        let router = create_router(test_state("http://127.0.0.1:9"));

        let response = router.oneshot(request("/profile", &[])).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_profile_from_cookie() {
        let graph_url = spawn_mock_graph().await;
        let router = create_router(test_state(&graph_url));

        let response = router
            .oneshot(request("/profile", &[("cookie", "facebook-auth=EAAB")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("<h1>Ada &lt;3 Lovelace</h1>"));
        assert!(body.contains("ada@example.com"));
        assert!(body.contains("src=\"https://cdn.example/ada.jpg?a=1&amp;b=2\""));
    }

    #[tokio::test]
    async fn test_profile_from_bearer_headers() {
        let graph_url = spawn_mock_graph().await;
        let router = create_router(test_state(&graph_url));

        for header_name in ["authorization", "authentication"] {
            let response = router
                .clone()
                .oneshot(request("/profile", &[(header_name, "Bearer EAAB")]))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", header_name);
        }
    }

    #[tokio::test]
    async fn test_profile_graph_error() {
        let graph_url = spawn_mock_graph().await;
        let router = create_router(test_state(&graph_url));

        let response = router
            .oneshot(request("/profile", &[("authorization", "Bearer expired")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_text(response).await,
            "OAuthException: Invalid OAuth access token. (190)"
        );
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let router = create_router(test_state("http://127.0.0.1:9"));

        let response = router.oneshot(request("/logout", &[])).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        assert_eq!(cookies, vec!["facebook-auth=; HttpOnly; Path=/; Max-Age=0"]);
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHENTICATION, HeaderValue::from_static("Bearer  tok "));
        assert_eq!(bearer_token(&headers).as_deref(), Some("tok"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }
}
