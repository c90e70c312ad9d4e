//! HTTP client for the management web API.
//!
//! Every command is a `POST <base_url>/<command>` with a JSON body. A session
//! id obtained from `login` travels in the `X-chkp-sid` header. Non-success
//! statuses carry a `{ "code", "message" }` body.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::payload::{
    ApiFailure, DeleteGroupRequest, GroupSnapshot, SetGroupRequest, ShowGroupRequest,
};
use crate::store::{GroupStore, StoreError};

/// Header carrying the session id.
pub const SESSION_HEADER: &str = "X-chkp-sid";

/// Connection settings for [`MgmtClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Web API root, e.g. `https://mgmt.example.net/web_api`.
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Domain to log into on multi-domain servers.
    pub domain: Option<String>,
    /// Reuse an existing session instead of logging in.
    pub session_id: Option<String>,
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            username: None,
            password: None,
            domain: None,
            session_id: None,
            timeout: Duration::from_secs(60),
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    user: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    domain: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    sid: String,
    #[serde(rename = "api-server-version", default)]
    api_server_version: Option<String>,
}

/// Management API client implementing [`GroupStore`].
pub struct MgmtClient {
    http: reqwest::Client,
    config: ClientConfig,
    session: RwLock<Option<String>>,
}

impl MgmtClient {
    pub fn new(config: ClientConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| StoreError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            session: RwLock::new(config.session_id.clone()),
            config,
        })
    }

    fn url(&self, command: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), command)
    }

    pub async fn session_id(&self) -> Option<String> {
        self.session.read().await.clone()
    }

    /// Log in with the configured credentials, unless a session is already set.
    pub async fn login(&self) -> Result<(), StoreError> {
        if self.session.read().await.is_some() {
            return Ok(());
        }

        let (Some(user), Some(password)) = (&self.config.username, &self.config.password) else {
            return Err(StoreError::Transport(
                "no session id and no credentials configured".to_string(),
            ));
        };

        info!(user = %user, url = %self.config.base_url, "Logging in to management server");
        let request = LoginRequest {
            user,
            password,
            domain: self.config.domain.as_deref(),
        };
        let response: LoginResponse = self.call("login", &request).await?;
        debug!(version = ?response.api_server_version, "Session established");

        *self.session.write().await = Some(response.sid);
        Ok(())
    }

    /// End the current session, if any.
    pub async fn logout(&self) -> Result<(), StoreError> {
        if self.session.read().await.is_none() {
            return Ok(());
        }
        let _: serde_json::Value = self.call("logout", &serde_json::json!({})).await?;
        *self.session.write().await = None;
        Ok(())
    }

    /// Issue one API command.
    async fn call<Req, Resp>(&self, command: &str, body: &Req) -> Result<Resp, StoreError>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned + Send,
    {
        let mut request = self.http.post(self.url(command)).json(body);
        if let Some(sid) = self.session.read().await.as_deref() {
            request = request.header(SESSION_HEADER, sid);
        }

        debug!(command = %command, "Calling management API");
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("{} failed: {}", command, e)))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Resp>()
                .await
                .map_err(|e| StoreError::Malformed(format!("{} response: {}", command, e)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| StoreError::Transport(format!("{} failed: {}", command, e)))?;
        let failure = serde_json::from_str::<ApiFailure>(&text).unwrap_or_default();
        warn!(
            command = %command,
            status = %status,
            code = ?failure.code,
            "Management API rejected request"
        );

        let message = if failure.message.is_empty() {
            format!("{} returned {}", command, status)
        } else {
            failure.message
        };
        Err(StoreError::Rejected {
            code: failure.code,
            message,
        })
    }
}

#[async_trait]
impl GroupStore for MgmtClient {
    async fn upsert_group(&self, request: &SetGroupRequest) -> Result<GroupSnapshot, StoreError> {
        self.call("set-group", request).await
    }

    async fn fetch_group(&self, uid: &str) -> Result<GroupSnapshot, StoreError> {
        let request = ShowGroupRequest {
            uid: uid.to_string(),
        };
        self.call("show-group", &request).await
    }

    async fn delete_group(&self, uid: &str) -> Result<(), StoreError> {
        let request = DeleteGroupRequest {
            uid: uid.to_string(),
        };
        let _: serde_json::Value = self.call("delete-group", &request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base_and_command() {
        let client =
            MgmtClient::new(ClientConfig::new("https://mgmt.example.net/web_api/")).unwrap();
        assert_eq!(
            client.url("show-group"),
            "https://mgmt.example.net/web_api/show-group"
        );
    }

    #[tokio::test]
    async fn test_login_without_credentials_fails() {
        let client = MgmtClient::new(ClientConfig::new("http://127.0.0.1:9")).unwrap();
        assert!(client.login().await.is_err());
    }

    #[tokio::test]
    async fn test_configured_session_skips_login() {
        let mut config = ClientConfig::new("http://127.0.0.1:9");
        config.session_id = Some("sid-1".to_string());
        let client = MgmtClient::new(config).unwrap();

        client.login().await.unwrap();
        assert_eq!(client.session_id().await.as_deref(), Some("sid-1"));
    }
}
