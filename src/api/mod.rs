mod client;

pub use client::RestClient;

use crate::errors::AppResult;
use crate::models::{
    AgentVersion, ColorMode, ServerSettings, UpdateStartResponse, UpdateStatusResponse, UserInfo,
    VersionInfo,
};
use std::future::Future;

/// Server endpoints the update flow depends on.
pub trait UpdateApi: Send + Sync {
    fn check_updates(&self, force: bool) -> impl Future<Output = AppResult<VersionInfo>> + Send;
    fn start_update(&self) -> impl Future<Output = AppResult<UpdateStartResponse>> + Send;
    fn update_status(
        &self,
        auth_token: &str,
        log_offset: u64,
    ) -> impl Future<Output = AppResult<UpdateStatusResponse>> + Send;
    fn list_agent_versions(&self) -> impl Future<Output = AppResult<Vec<AgentVersion>>> + Send;
    fn server_settings(&self) -> impl Future<Output = AppResult<ServerSettings>> + Send;
    fn current_user(&self) -> impl Future<Output = AppResult<UserInfo>> + Send;
    fn snooze_update(&self, version: &str) -> impl Future<Output = AppResult<UserInfo>> + Send;
}

pub trait PreferencesApi: Send + Sync {
    fn save_theme(&self, mode: ColorMode) -> impl Future<Output = AppResult<()>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    Proceed,
    RedirectToLogin,
    /// Anonymous access is on; the failure is swallowed.
    Suppress,
}

/// Decides what a failed session rotation or settings fetch means for the
/// user. Only 401 and 5xx are treated as authorization failures.
pub fn auth_failure_action(status: u16, anonymous_enabled: bool) -> AuthAction {
    let unauthorized = status == 401 || (500..600).contains(&status);
    match (unauthorized, anonymous_enabled) {
        (false, _) => AuthAction::Proceed,
        (true, true) => AuthAction::Suppress,
        (true, false) => AuthAction::RedirectToLogin,
    }
}

#[cfg(test)]
mod tests {
    use super::{auth_failure_action, AuthAction};

    #[test]
    fn unauthorized_redirects_unless_anonymous() {
        assert_eq!(auth_failure_action(401, false), AuthAction::RedirectToLogin);
        assert_eq!(auth_failure_action(503, false), AuthAction::RedirectToLogin);
        assert_eq!(auth_failure_action(401, true), AuthAction::Suppress);
        assert_eq!(auth_failure_action(404, false), AuthAction::Proceed);
        assert_eq!(auth_failure_action(200, false), AuthAction::Proceed);
    }
}
