use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Token grant endpoint, relative to the server base URL
pub const AUTH_TOKEN_PATH: &str = "/rest-gateway/rest/api/v1/auth/token";

/// Current-user endpoint used to probe a bearer token
pub const AUTH_USER_PATH: &str = "/rest-gateway/rest/api/v1/auth/user";

/// Timeout applied to every NSP request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the shared HTTP client
///
/// NSP lab deployments commonly run behind private or self-signed CAs, so
/// certificate verification is only enforced when `verify_ssl` is set.
pub fn build_client(verify_ssl: bool) -> Result<Client> {
    if !verify_ssl {
        tracing::warn!(
            "TLS certificate verification disabled for NSP requests (verify_ssl = false)"
        );
    }

    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .danger_accept_invalid_certs(!verify_ssl)
        .build()
        .context("Failed to create HTTP client")
}

/// Base URL for a configured server; bare hosts default to HTTPS
pub fn base_url(server: &str) -> String {
    let server = server.trim().trim_end_matches('/');
    if server.contains("://") {
        server.to_string()
    } else {
        format!("https://{}", server)
    }
}

/// User details returned by the current-user endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Result of probing a bearer token against the API
#[derive(Debug)]
pub enum VerifyOutcome {
    Valid(UserInfo),
    /// 401 Unauthorized
    Invalid,
    Unexpected { status: StatusCode, body: String },
}

/// Check that `token` is accepted by the NSP API
pub async fn verify_token(client: &Client, server: &str, token: &str) -> Result<VerifyOutcome> {
    let url = format!("{}{}", base_url(server), AUTH_USER_PATH);
    tracing::debug!(url = %url, "Verifying bearer token");

    let response = client
        .get(&url)
        .bearer_auth(token)
        .header("Content-Type", "application/json")
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?;

    let status = response.status();
    match status {
        StatusCode::OK => {
            // Some NSP releases return an empty or partial body here
            let info = response.json::<UserInfo>().await.unwrap_or_default();
            Ok(VerifyOutcome::Valid(info))
        }
        StatusCode::UNAUTHORIZED => Ok(VerifyOutcome::Invalid),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Ok(VerifyOutcome::Unexpected { status, body })
        }
    }
}
