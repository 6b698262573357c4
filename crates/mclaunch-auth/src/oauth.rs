use mclaunch_types::{AuthorizationCode, Credentials};
use reqwest::Url;

use crate::AuthError;

pub const DEFAULT_CLIENT_ID: &str = "d83138ec-c608-4b87-959d-0b228f218bb3";
/// Auth backend: receives the redirect from the identity provider, bounces
/// the browser to the local listener, and exchanges codes for credentials.
pub const DEFAULT_AUTH_BACKEND: &str = "https://mclauncher.bobdotcom.xyz/authorize";
pub const DEFAULT_REDIRECT_URL: &str = "https://mclauncher.bobdotcom.xyz/authorize";

const AUTHORIZE_ENDPOINT: &str = "https://login.live.com/oauth20_authorize.srf";
const SCOPE: &str = "XboxLive.signin offline_access";
const PORT_PLACEHOLDER: &str = "{port}";
const MAX_ERROR_BODY_BYTES: usize = 2 * 1024;

/// Builds the sign-in URL. `{port}` in `redirect_template` is substituted and
/// the port also travels as `state`, which the backend uses to find the
/// local listener.
pub fn authorization_url(client_id: &str, redirect_template: &str, port: u16) -> Result<Url, AuthError> {
    let port = port.to_string();
    let redirect = redirect_template.replace(PORT_PLACEHOLDER, &port);
    Url::parse_with_params(
        AUTHORIZE_ENDPOINT,
        &[
            ("client_id", client_id),
            ("response_type", "code"),
            ("redirect_uri", redirect.as_str()),
            ("response_mode", "query"),
            ("scope", SCOPE),
            ("state", port.as_str()),
        ],
    )
    .map_err(|e| AuthError::InvalidUrl(e.to_string()))
}

/// Manual flow: pulls `code` out of the URL the browser ended up on.
pub fn code_from_redirect_url(raw: &str) -> Result<AuthorizationCode, AuthError> {
    let url = Url::parse(raw.trim()).map_err(|_| AuthError::NoCodeInUrl)?;
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
        .map(AuthorizationCode::new)
        .ok_or(AuthError::NoCodeInUrl)
}

fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(truncated)", &s[..end])
}

/// `POST <endpoint>` with form field `code`; the JSON reply is the credential
/// material handed to the launch command builder.
pub async fn exchange_code(
    client: &reqwest::Client,
    endpoint: &str,
    code: &AuthorizationCode,
) -> Result<Credentials, AuthError> {
    let resp = client
        .post(endpoint)
        .form(&[("code", code.as_str())])
        .send()
        .await?;
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(AuthError::Exchange {
            status: status.as_u16(),
            body: truncate_utf8(&body, MAX_ERROR_BODY_BYTES),
        });
    }

    let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| AuthError::Exchange {
        status: status.as_u16(),
        body: format!("invalid JSON ({e}): {}", truncate_utf8(&body, MAX_ERROR_BODY_BYTES)),
    })?;

    let creds = Credentials::from_value(value);
    if let Some(err) = creds.error() {
        return Err(AuthError::Exchange {
            status: status.as_u16(),
            body: err.to_string(),
        });
    }
    Ok(creds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Form, Json, Router, http::StatusCode, routing::post};
    use std::collections::HashMap;

    async fn serve(app: Router) -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://127.0.0.1:{port}/authorize"), task)
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    #[test]
    fn authorization_url_carries_port_and_client() {
        let url = authorization_url(
            DEFAULT_CLIENT_ID,
            "https://example.com/authorize?port={port}",
            45678,
        )
        .unwrap();
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(url.host_str(), Some("login.live.com"));
        assert_eq!(pairs["client_id"], DEFAULT_CLIENT_ID);
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["redirect_uri"], "https://example.com/authorize?port=45678");
        assert_eq!(pairs["state"], "45678");
        assert_eq!(pairs["scope"], "XboxLive.signin offline_access");
    }

    #[test]
    fn redirect_template_without_placeholder_is_kept() {
        let url = authorization_url("id", DEFAULT_REDIRECT_URL, 1234).unwrap();
        let redirect = url
            .query_pairs()
            .find(|(k, _)| k == "redirect_uri")
            .map(|(_, v)| v.into_owned());
        assert_eq!(redirect.as_deref(), Some(DEFAULT_REDIRECT_URL));
    }

    #[test]
    fn manual_code_extraction() {
        let code = code_from_redirect_url(" https://example.com/authorize?code=M.abc&state=1 \n").unwrap();
        assert_eq!(code.as_str(), "M.abc");

        assert!(matches!(
            code_from_redirect_url("https://example.com/authorize?state=1"),
            Err(AuthError::NoCodeInUrl)
        ));
        assert!(matches!(
            code_from_redirect_url("https://example.com/?code="),
            Err(AuthError::NoCodeInUrl)
        ));
        assert!(matches!(code_from_redirect_url("not a url"), Err(AuthError::NoCodeInUrl)));
    }

    #[tokio::test]
    async fn exchange_posts_code_and_returns_credentials() {
        let app = Router::new().route(
            "/authorize",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                Json(serde_json::json!({
                    "name": "Steve",
                    "id": "069a79f444e94726a5befca90e38aaf5",
                    "access_token": format!("token-for-{}", form["code"]),
                }))
            }),
        );
        let (endpoint, task) = serve(app).await;

        let creds = exchange_code(&client(), &endpoint, &AuthorizationCode::new("abc"))
            .await
            .unwrap();
        assert_eq!(creds.name(), Some("Steve"));
        assert_eq!(creds.access_token(), Some("token-for-abc"));
        task.abort();
    }

    #[tokio::test]
    async fn exchange_surfaces_backend_errors() {
        let app = Router::new()
            .route(
                "/authorize",
                post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
            );
        let (endpoint, task) = serve(app).await;
        let err = exchange_code(&client(), &endpoint, &AuthorizationCode::new("abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Exchange { status: 502, .. }));
        task.abort();

        let app = Router::new().route(
            "/authorize",
            post(|| async { Json(serde_json::json!({"error": "invalid_grant"})) }),
        );
        let (endpoint, task) = serve(app).await;
        let err = exchange_code(&client(), &endpoint, &AuthorizationCode::new("abc"))
            .await
            .unwrap_err();
        match err {
            AuthError::Exchange { body, .. } => assert_eq!(body, "invalid_grant"),
            other => panic!("unexpected error: {other:?}"),
        }
        task.abort();
    }

    #[test]
    fn truncate_keeps_char_boundaries() {
        let s = "é".repeat(10);
        let t = truncate_utf8(&s, 5);
        assert!(t.starts_with("éé"));
        assert!(t.ends_with("…(truncated)"));
    }
}
