// Grant exchanges against the NSP auth endpoint

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};

use crate::error::TokenAcquisitionError;
use crate::http_client::{self, AUTH_TOKEN_PATH};

use super::types::{ErrorResponse, GrantRequest, TokenResponse};

/// Performs the two grant exchanges used by the lifecycle manager
#[async_trait]
pub trait TokenAcquirer: Send + Sync {
    /// Client-credentials grant with basic auth
    async fn request_initial(
        &self,
        server: &str,
        user: &str,
        password: &str,
    ) -> Result<TokenResponse, TokenAcquisitionError>;

    /// Refresh-token grant, no basic auth
    async fn refresh(
        &self,
        server: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse, TokenAcquisitionError>;
}

/// reqwest-backed acquirer
pub struct HttpTokenAcquirer {
    client: Client,
}

impl HttpTokenAcquirer {
    /// Create an acquirer with the standard 30s timeout
    pub fn new(verify_ssl: bool) -> Result<Self, TokenAcquisitionError> {
        let client = http_client::build_client(verify_ssl)
            .map_err(|e| TokenAcquisitionError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn token_request(&self, server: &str, grant: &GrantRequest<'_>) -> RequestBuilder {
        let url = format!("{}{}", http_client::base_url(server), AUTH_TOKEN_PATH);
        self.client
            .post(url)
            .header("Content-Type", "application/json")
            .json(grant)
    }

    async fn exchange(
        &self,
        server: &str,
        request: RequestBuilder,
    ) -> Result<TokenResponse, TokenAcquisitionError> {
        let response = request
            .send()
            .await
            .map_err(|e| classify_transport_error(server, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = rejection_message(&body);
            tracing::error!(
                server = %server,
                status = status.as_u16(),
                message = %message,
                "Token request rejected"
            );
            return Err(TokenAcquisitionError::AuthRejected {
                status: status.as_u16(),
                message,
            });
        }

        let data: TokenResponse = response.json().await.map_err(|e| {
            TokenAcquisitionError::Transport(format!("Failed to parse token response: {}", e))
        })?;

        if data.access_token.is_empty() {
            return Err(TokenAcquisitionError::Transport(
                "Token response does not contain access_token".to_string(),
            ));
        }

        Ok(data)
    }
}

#[async_trait]
impl TokenAcquirer for HttpTokenAcquirer {
    async fn request_initial(
        &self,
        server: &str,
        user: &str,
        password: &str,
    ) -> Result<TokenResponse, TokenAcquisitionError> {
        tracing::info!(server = %server, "Requesting new initial token");

        let request = self
            .token_request(server, &GrantRequest::ClientCredentials)
            .basic_auth(user, Some(password));
        let data = self.exchange(server, request).await?;

        tracing::info!("Successfully obtained initial token");
        Ok(data)
    }

    async fn refresh(
        &self,
        server: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse, TokenAcquisitionError> {
        tracing::info!(server = %server, "Refreshing existing token");

        let request = self.token_request(server, &GrantRequest::RefreshToken { refresh_token });
        let data = self.exchange(server, request).await?;

        tracing::info!("Successfully refreshed token");
        Ok(data)
    }
}

/// Map a reqwest failure onto the acquisition taxonomy
fn classify_transport_error(server: &str, e: reqwest::Error) -> TokenAcquisitionError {
    if e.is_timeout() {
        tracing::error!(server = %server, "Timeout connecting to NSP server");
        TokenAcquisitionError::Timeout {
            server: server.to_string(),
        }
    } else if e.is_connect() {
        tracing::error!(server = %server, error = %e, "Cannot reach NSP server");
        TokenAcquisitionError::NetworkUnreachable {
            server: server.to_string(),
            message: error_chain(&e),
        }
    } else {
        tracing::error!(server = %server, error = %e, "Token request failed");
        TokenAcquisitionError::Transport(error_chain(&e))
    }
}

/// Flatten an error and its sources into one line
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// Prefer the structured `error`/`error_description` fields over the raw body
fn rejection_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse {
            error: Some(error),
            error_description: Some(description),
        }) => format!("{}: {}", error, description),
        Ok(ErrorResponse {
            error: Some(error), ..
        }) => error,
        Ok(ErrorResponse {
            error_description: Some(description),
            ..
        }) => description,
        _ => body.to_string(),
    }
}
