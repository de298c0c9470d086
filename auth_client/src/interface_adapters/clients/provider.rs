use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::domain::ports::CodeExchange;

// Provider endpoints and registration used to redeem an authorization code.
#[derive(Clone, Debug)]
pub struct TokenExchangeSettings {
    pub token_url: Url,
    pub userinfo_url: Url,
    pub client_id: String,
    // Must match the redirect_uri sent with the authorization request.
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

#[derive(Debug)]
pub enum ProviderClientError {
    Transport(reqwest::Error),
    Upstream {
        status: StatusCode,
        message: Option<String>,
    },
    Decode(reqwest::Error),
}

impl fmt::Display for ProviderClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderClientError::Transport(err) => {
                write!(f, "could not reach identity provider: {err}")
            }
            ProviderClientError::Upstream { status, message } => {
                if let Some(message) = message {
                    write!(f, "identity provider returned {status}: {message}")
                } else {
                    write!(f, "identity provider returned {status}")
                }
            }
            ProviderClientError::Decode(err) => {
                write!(f, "unexpected identity provider response: {err}")
            }
        }
    }
}

impl std::error::Error for ProviderClientError {}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

// OAuth error body; userinfo endpoints use the same field names.
#[derive(Debug, Default, Deserialize)]
struct ProviderErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

// Redeems the code at the token endpoint, then reads the user from userinfo.
#[derive(Clone)]
pub struct ProviderClient {
    http: Client,
    settings: TokenExchangeSettings,
}

impl ProviderClient {
    pub fn new(settings: TokenExchangeSettings, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, settings })
    }

    pub async fn exchange_code(&self, code: &str) -> Result<String, ProviderClientError> {
        let scope = self.settings.scopes.join(" ");
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.settings.client_id.as_str()),
            ("code", code),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
            ("scope", scope.as_str()),
        ];

        let res = self
            .http
            .post(self.settings.token_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(ProviderClientError::Transport)?;

        let token: TokenResponse = decode(res).await?;
        Ok(token.access_token)
    }

    pub async fn fetch_user(&self, access_token: &str) -> Result<Value, ProviderClientError> {
        let res = self
            .http
            .get(self.settings.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(ProviderClientError::Transport)?;

        decode(res).await
    }
}

async fn decode<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, ProviderClientError> {
    let status = res.status();
    if !status.is_success() {
        let message = res
            .json::<ProviderErrorResponse>()
            .await
            .ok()
            .and_then(|payload| payload.error_description.or(payload.error));
        return Err(ProviderClientError::Upstream { status, message });
    }

    res.json::<T>().await.map_err(ProviderClientError::Decode)
}

#[async_trait]
impl CodeExchange for ProviderClient {
    async fn exchange(&self, code: &str) -> Result<Value, String> {
        let access_token = self
            .exchange_code(code)
            .await
            .map_err(|err| err.to_string())?;
        self.fetch_user(&access_token)
            .await
            .map_err(|err| err.to_string())
    }
}
