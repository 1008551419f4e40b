use crate::api::{auth_failure_action, AuthAction, PreferencesApi, UpdateApi};
use crate::config::ShellConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{
    AgentVersion, AgentVersionsResponse, ColorMode, FrontendSettings, ServerSettings,
    ServerSettingsResponse, SnoozeUpdateRequest, ThemePreference, UpdateStartResponse,
    UpdateStatusRequest, UpdateStatusResponse, UserInfo, VersionInfo,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

const UPDATES_PATH: &str = "v1/server/updates";
const UPDATE_START_PATH: &str = "v1/server/updates:start";
const UPDATE_STATUS_PATH: &str = "v1/server/updates:getStatus";
const AGENT_VERSIONS_PATH: &str = "v1/management/agents/versions";
const SERVER_SETTINGS_PATH: &str = "v1/server/settings";
const CURRENT_USER_PATH: &str = "v1/users/me";
const PREFERENCES_PATH: &str = "graph/api/user/preferences";
const FRONTEND_SETTINGS_PATH: &str = "graph/api/frontend/settings";
const ROTATE_TOKEN_PATH: &str = "graph/api/user/auth-tokens/rotate";

/// JSON client for the server and Grafana APIs.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    authorization: Option<String>,
}

pub fn basic_auth_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}

/// Pulls a human-readable message out of an error body.
fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
}

impl RestClient {
    pub fn new(base_url: &str, credentials: Option<(&str, &str)>, timeout: Duration) -> AppResult<Self> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|err| AppError::Config(format!("invalid API base URL {}: {}", base_url, err)))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Internal(err.to_string()))?;
        Ok(Self {
            http,
            base_url,
            authorization: credentials.map(|(username, password)| basic_auth_header(username, password)),
        })
    }

    pub fn from_config(config: &ShellConfig) -> AppResult<Self> {
        let credentials = match (&config.username, &config.password) {
            (Some(username), Some(password)) => Some((username.as_str(), password.as_str())),
            _ => None,
        };
        Self::new(
            &config.api_base_url,
            credentials,
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    pub fn endpoint(&self, path: &str) -> AppResult<Url> {
        self.base_url
            .join(path)
            .map_err(|err| AppError::Internal(format!("cannot build URL for {}: {}", path, err)))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> AppResult<T> {
        let request = match &self.authorization {
            Some(value) => request.header(AUTHORIZATION, value),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|err| AppError::Network(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Server {
                status: status.as_u16(),
                message: server_message(&body),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| AppError::Network(err.to_string()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_slice(b"{}")?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn frontend_settings(&self) -> AppResult<FrontendSettings> {
        let url = self.endpoint(FRONTEND_SETTINGS_PATH)?;
        self.send_json(self.http.get(url)).await
    }

    /// Rotates the session cookie and turns a failure into a navigation
    /// decision. Network failures are returned as errors.
    pub async fn rotate_session(&self, anonymous_enabled: bool) -> AppResult<AuthAction> {
        let url = self.endpoint(ROTATE_TOKEN_PATH)?;
        match self.send_json::<serde_json::Value>(self.http.post(url)).await {
            Ok(_) => Ok(AuthAction::Proceed),
            Err(AppError::Server { status, .. }) => {
                let action = auth_failure_action(status, anonymous_enabled);
                tracing::info!(status, ?action, "session rotation failed");
                Ok(action)
            }
            Err(error) => Err(error),
        }
    }
}

impl UpdateApi for RestClient {
    async fn check_updates(&self, force: bool) -> AppResult<VersionInfo> {
        let mut url = self.endpoint(UPDATES_PATH)?;
        url.query_pairs_mut()
            .append_pair("force", if force { "true" } else { "false" });
        self.send_json(self.http.get(url)).await
    }

    async fn start_update(&self) -> AppResult<UpdateStartResponse> {
        let url = self.endpoint(UPDATE_START_PATH)?;
        self.send_json(self.http.post(url).json(&serde_json::json!({})))
            .await
    }

    async fn update_status(&self, auth_token: &str, log_offset: u64) -> AppResult<UpdateStatusResponse> {
        let url = self.endpoint(UPDATE_STATUS_PATH)?;
        let body = UpdateStatusRequest {
            auth_token: auth_token.to_string(),
            log_offset,
        };
        self.send_json(self.http.post(url).json(&body)).await
    }

    async fn list_agent_versions(&self) -> AppResult<Vec<AgentVersion>> {
        let url = self.endpoint(AGENT_VERSIONS_PATH)?;
        let response: AgentVersionsResponse = self.send_json(self.http.get(url)).await?;
        Ok(response.agent_versions)
    }

    async fn server_settings(&self) -> AppResult<ServerSettings> {
        let url = self.endpoint(SERVER_SETTINGS_PATH)?;
        let response: ServerSettingsResponse = self.send_json(self.http.get(url)).await?;
        Ok(response.settings)
    }

    async fn current_user(&self) -> AppResult<UserInfo> {
        let url = self.endpoint(CURRENT_USER_PATH)?;
        self.send_json(self.http.get(url)).await
    }

    async fn snooze_update(&self, version: &str) -> AppResult<UserInfo> {
        let url = self.endpoint(CURRENT_USER_PATH)?;
        let body = SnoozeUpdateRequest {
            snoozed_pmm_version: version.to_string(),
        };
        self.send_json(self.http.put(url).json(&body)).await
    }
}

impl PreferencesApi for RestClient {
    async fn save_theme(&self, mode: ColorMode) -> AppResult<()> {
        let url = self.endpoint(PREFERENCES_PATH)?;
        let _: serde_json::Value = self
            .send_json(self.http.put(url).json(&ThemePreference { theme: mode }))
            .await?;
        Ok(())
    }
}
