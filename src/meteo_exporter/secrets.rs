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

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error;
use std::fmt;

pub const APPLICATION_ID: &str = "APPLICATION_ID";
pub const TOKEN_URL: &str = "TOKEN_URL";
pub const STATION_ID: &str = "STATION_ID";

pub const SECRET_PATH: &str = "/Supervision/Meteofrance";

#[derive(Debug)]
pub enum SecretError {
    Internal(reqwest::Error),
    InvalidUrl(String),
    Missing(&'static str),
    Unexpected(StatusCode, Url),
}

impl fmt::Display for SecretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::InvalidUrl(msg) => write!(f, "invalid URL: {}", msg),
            Self::Missing(key) => write!(f, "missing secret {}", key),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
        }
    }
}

impl error::Error for SecretError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            _ => None,
        }
    }
}

/// Secrets needed to talk to the Meteo-France API, loaded once at startup.
#[derive(Clone)]
pub struct Credentials {
    pub application_id: String,
    pub token_url: Url,
    pub station_id: String,
}

impl Credentials {
    pub fn from_secrets(secrets: &HashMap<String, String>) -> Result<Self, SecretError> {
        let lookup = |key: &'static str| secrets.get(key).cloned().ok_or(SecretError::Missing(key));

        let application_id = lookup(APPLICATION_ID)?;
        let raw_url = lookup(TOKEN_URL)?;
        let token_url = Url::parse(&raw_url).map_err(|e| SecretError::InvalidUrl(format!("{}: {}", raw_url, e)))?;
        let station_id = lookup(STATION_ID)?;

        Ok(Credentials {
            application_id,
            token_url,
            station_id,
        })
    }
}

// Keep the application ID out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("application_id", &"<redacted>")
            .field("token_url", &self.token_url.as_str())
            .field("station_id", &self.station_id)
            .finish()
    }
}

/// Machine identity used to log in to Infisical with universal auth.
#[derive(Debug, Clone)]
pub struct UniversalAuth {
    pub client_id: String,
    pub client_secret: String,
}

/// Where in an Infisical project to list secrets from.
#[derive(Debug, Clone)]
pub struct SecretScope {
    pub project_id: String,
    pub environment: String,
    pub path: String,
}

#[derive(Debug)]
pub struct InfisicalClient {
    client: Client,
    site_url: Url,
}

impl InfisicalClient {
    pub fn new(client: Client, site_url: &str) -> Result<Self, SecretError> {
        let site_url = Url::parse(site_url).map_err(|e| SecretError::InvalidUrl(format!("{}: {}", site_url, e)))?;
        Ok(InfisicalClient { client, site_url })
    }

    /// Log in and return every secret in the scope as a key to value mapping.
    pub async fn secrets(
        &self,
        auth: &UniversalAuth,
        scope: &SecretScope,
    ) -> Result<HashMap<String, String>, SecretError> {
        let token = self.login(auth).await?;
        self.list_secrets(&token, scope).await
    }

    pub async fn login(&self, auth: &UniversalAuth) -> Result<String, SecretError> {
        let login_url = self.api_url(&["api", "v1", "auth", "universal-auth", "login"])?;
        tracing::debug!(message = "making secret store login request", url = %login_url);

        let body = LoginRequest {
            client_id: &auth.client_id,
            client_secret: &auth.client_secret,
        };

        let res = self
            .client
            .post(login_url.clone())
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(SecretError::Internal)?;

        let res = Self::check_status(res, login_url)?;
        Ok(res.json::<LoginResponse>().await.map_err(SecretError::Internal)?.access_token)
    }

    pub async fn list_secrets(&self, token: &str, scope: &SecretScope) -> Result<HashMap<String, String>, SecretError> {
        let mut secrets_url = self.api_url(&["api", "v3", "secrets", "raw"])?;
        secrets_url
            .query_pairs_mut()
            .append_pair("workspaceId", &scope.project_id)
            .append_pair("environment", &scope.environment)
            .append_pair("secretPath", &scope.path);
        tracing::debug!(message = "making secret list request", url = %secrets_url);

        let res = self
            .client
            .get(secrets_url.clone())
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await
            .map_err(SecretError::Internal)?;

        let res = Self::check_status(res, secrets_url)?;
        let list = res.json::<SecretList>().await.map_err(SecretError::Internal)?;

        Ok(list
            .secrets
            .into_iter()
            .map(|s| (s.secret_key, s.secret_value))
            .collect())
    }

    fn check_status(res: Response, url: Url) -> Result<Response, SecretError> {
        let status = res.status();
        if status.is_success() {
            Ok(res)
        } else {
            Err(SecretError::Unexpected(status, url))
        }
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url, SecretError> {
        let mut url = self.site_url.clone();
        url.path_segments_mut()
            .map(|mut p| {
                p.pop_if_empty().extend(segments);
            })
            .map_err(|_| SecretError::InvalidUrl(format!("{} cannot be a base", self.site_url)))?;

        Ok(url)
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
}

#[derive(Deserialize, Debug)]
struct SecretList {
    secrets: Vec<Secret>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Secret {
    secret_key: String,
    secret_value: String,
}
