// meteo_exporter - Prometheus metrics exporter for the Meteo-France observation API
//
// Copyright 2024 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::error;
use std::fmt;
use std::time::Duration;

const EXPIRED_TOKEN_MARKER: &str = "Invalid JWT token";
const JSON_CONTENT: &str = "application/json";

#[derive(Debug)]
pub enum ClientError {
    Internal(reqwest::Error),
    Authentication(String),
    Parse(serde_json::Error),
    EmptyObservations(String),
    InvalidUrl(String),
    Unexpected(StatusCode, Url),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::Authentication(msg) => write!(f, "unable to obtain access token: {}", msg),
            Self::Parse(e) => write!(f, "unable to parse response: {}", e),
            Self::EmptyObservations(s) => write!(f, "no observations for station {}", s),
            Self::InvalidUrl(msg) => write!(f, "invalid URL: {}", msg),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

/// Transport settings used to build a `reqwest::Client`.
///
/// The Meteo-France endpoints have historically needed certificate verification disabled
/// and the token endpoint must not follow redirects. Both are spelled out here so that
/// callers have to pick them explicitly.
#[derive(Debug, Clone, Copy)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
    pub follow_redirects: bool,
}

impl HttpOptions {
    pub fn build(&self) -> Result<Client, ClientError> {
        let redirect = if self.follow_redirects {
            Policy::default()
        } else {
            Policy::none()
        };

        Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .redirect(redirect)
            .build()
            .map_err(ClientError::Internal)
    }
}

/// Fully read HTTP response: status, headers, and body text.
///
/// The body is only parsed as JSON when asked via `ApiResponse::json`.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl ApiResponse {
    async fn read(res: Response) -> Result<Self, ClientError> {
        let status = res.status();
        let headers = res.headers().clone();
        let body = res.text().await.map_err(ClientError::Internal)?;
        Ok(ApiResponse { status, headers, body })
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_str(&self.body).map_err(ClientError::Parse)
    }

    fn is_json(&self) -> bool {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains(JSON_CONTENT))
            .unwrap_or(false)
    }
}

/// Return true if the response is the API gateway rejecting an expired access token.
///
/// That is a 401 with a JSON body whose `description` mentions an invalid JWT. Anything
/// else, including a body that can't be parsed, is not treated as expiry.
pub fn token_has_expired(res: &ApiResponse) -> bool {
    if res.status != StatusCode::UNAUTHORIZED || !res.is_json() {
        return false;
    }

    serde_json::from_str::<serde_json::Value>(&res.body)
        .ok()
        .and_then(|v| {
            v.get("description")
                .and_then(|d| d.as_str())
                .map(|d| d.contains(EXPIRED_TOKEN_MARKER))
        })
        .unwrap_or(false)
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
}

/// HTTP client that holds a bearer token for the Meteo-France API.
///
/// A token is obtained before the first request. When a response says the token has
/// expired, a new one is obtained and the request is sent one more time. Whatever comes
/// back from that second attempt is returned as-is.
#[derive(Debug)]
pub struct AuthenticatedClient {
    client: Client,
    token_client: Client,
    token_url: Url,
    application_id: String,
    headers: HeaderMap,
}

impl AuthenticatedClient {
    const USER_AGENT: &'static str = concat!("meteo_exporter/", env!("CARGO_PKG_VERSION"));

    /// Create a new client. `token_client` is used only for the token endpoint and should be
    /// built with redirects disabled.
    pub fn new(client: Client, token_client: Client, token_url: Url, application_id: String) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_CONTENT));
        headers.insert(USER_AGENT, HeaderValue::from_static(Self::USER_AGENT));

        AuthenticatedClient {
            client,
            token_client,
            token_url,
            application_id,
            headers,
        }
    }

    /// Current `Authorization` header value, if a token has been obtained.
    pub fn token(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
    }

    pub async fn request(&mut self, method: Method, url: Url) -> Result<ApiResponse, ClientError> {
        if !self.headers.contains_key(AUTHORIZATION) {
            tracing::debug!(message = "no access token held, obtaining one", token_url = %self.token_url);
            self.obtain_token().await?;
        }

        let res = self.dispatch(method.clone(), url.clone()).await?;
        if !token_has_expired(&res) {
            return Ok(res);
        }

        tracing::info!(message = "access token expired, obtaining a new one", url = %url);
        self.obtain_token().await?;
        self.dispatch(method, url).await
    }

    /// Request a new access token using client credentials, replacing any held token.
    pub async fn obtain_token(&mut self) -> Result<(), ClientError> {
        let res = self
            .token_client
            .post(self.token_url.clone())
            .header(AUTHORIZATION, format!("Basic {}", self.application_id))
            .header(USER_AGENT, Self::USER_AGENT)
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(ClientError::Internal)?;

        let res = ApiResponse::read(res).await?;
        if !res.status.is_success() {
            return Err(ClientError::Authentication(format!(
                "unexpected status {} for {}",
                res.status, self.token_url
            )));
        }

        let token = res
            .json::<TokenResponse>()
            .map_err(|e| ClientError::Authentication(format!("malformed token response: {}", e)))?;

        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.access_token))
            .map_err(|e| ClientError::Authentication(format!("unusable access token: {}", e)))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);

        tracing::debug!(message = "obtained new access token", token_url = %self.token_url);
        Ok(())
    }

    async fn dispatch(&self, method: Method, url: Url) -> Result<ApiResponse, ClientError> {
        let res = self
            .client
            .request(method, url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(ClientError::Internal)?;

        ApiResponse::read(res).await
    }
}
