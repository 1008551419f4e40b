use crate::api::UpdateApi;
use crate::config::ShellConfig;
use crate::errors::{AppError, AppResult};
use crate::models::UserInfo;
use crate::update::snooze::snooze_active;
use crate::update::state::{clients_up_to_date, notification_message, UpdateEvent, UpdateSession, UpdateStatus};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;

/// Drives an [`UpdateSession`] against the server: version checks, the
/// update kick-off and log polling until the server reports completion.
pub struct UpdateDriver<A: UpdateApi> {
    api: Arc<A>,
    session: UpdateSession,
    poll_interval: Duration,
    max_poll_errors: u32,
}

impl<A: UpdateApi> UpdateDriver<A> {
    pub fn new(api: Arc<A>, poll_interval: Duration, max_poll_errors: u32) -> Self {
        Self {
            api,
            session: UpdateSession::new(),
            poll_interval,
            max_poll_errors,
        }
    }

    pub fn from_config(api: Arc<A>, config: &ShellConfig) -> Self {
        Self::new(
            api,
            Duration::from_millis(config.poll_interval_ms),
            config.max_poll_errors,
        )
    }

    pub fn session(&self) -> &UpdateSession {
        &self.session
    }

    pub fn status(&self) -> UpdateStatus {
        self.session.status
    }

    pub fn reset(&mut self) {
        self.session.reset();
    }

    pub async fn check(&mut self, force: bool) -> UpdateStatus {
        if self.session.apply(&UpdateEvent::CheckStarted) != UpdateStatus::Checking {
            tracing::debug!(status = self.session.status.as_str(), "check skipped while update runs");
            return self.session.status;
        }

        let versions = match self.api.check_updates(force).await {
            Ok(versions) => versions,
            Err(error) => {
                tracing::warn!(error = %error, "update check failed");
                return self.session.apply(&UpdateEvent::CheckFailed);
            }
        };
        let agents = match self.api.list_agent_versions().await {
            Ok(agents) => agents,
            Err(error) => {
                tracing::warn!(error = %error, "agent version listing failed");
                return self.session.apply(&UpdateEvent::CheckFailed);
            }
        };

        let event = UpdateEvent::CheckResolved {
            installed_is_latest: versions.installed_is_latest(),
            clients_up_to_date: clients_up_to_date(&agents),
        };
        tracing::info!(
            installed = %versions.installed.version,
            latest = versions.latest_version().unwrap_or(""),
            agents = agents.len(),
            "update check resolved"
        );
        self.session.version_info = Some(versions);
        self.session.agents = agents;
        self.session.apply(&event)
    }

    /// Kicks off the server-side update. Only valid while `Pending`.
    pub async fn start_update(&mut self) -> UpdateStatus {
        if self.session.apply(&UpdateEvent::UpdateRequested) != UpdateStatus::Updating {
            return self.session.status;
        }

        match self.api.start_update().await {
            Ok(started) => {
                tracing::info!(log_offset = started.log_offset, "update started");
                self.session.begin_run(started.auth_token, started.log_offset);
                self.session.apply(&UpdateEvent::UpdateStarted)
            }
            Err(error) => {
                tracing::error!(error = %error, "update start failed");
                self.session.notify(notification_message(&error));
                self.session.apply(&UpdateEvent::UpdateStartFailed)
            }
        }
    }

    /// Polls update logs while `Restarting`. Stops on completion, after too
    /// many consecutive failures, or when `shutdown` flips or is dropped.
    pub async fn follow_logs(&mut self, shutdown: &mut watch::Receiver<bool>) -> UpdateStatus {
        let mut consecutive_errors = 0u32;

        while self.session.status == UpdateStatus::Restarting {
            if *shutdown.borrow() {
                break;
            }
            let Some(auth_token) = self.session.auth_token.clone() else {
                tracing::error!("update run has no auth token");
                return self.session.apply(&UpdateEvent::PollingFailed);
            };
            let request_offset = self.session.log_offset;

            let polled = tokio::select! {
                polled = self.api.update_status(&auth_token, request_offset) => polled,
                _ = shutdown.changed() => break,
            };
            match polled {
                Ok(chunk) => {
                    consecutive_errors = 0;
                    self.session.apply_log_chunk(request_offset, &chunk);
                    if self.session.status != UpdateStatus::Restarting {
                        break;
                    }
                }
                Err(error) => {
                    consecutive_errors += 1;
                    tracing::debug!(error = %error, consecutive_errors, "update status poll failed");
                    if consecutive_errors > self.max_poll_errors {
                        tracing::error!(error = %error, "giving up on update status");
                        self.session.notify(notification_message(&error));
                        return self.session.apply(&UpdateEvent::PollingFailed);
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        if self.session.status == UpdateStatus::Completed {
            tracing::info!(log_lines = self.session.log_lines.len(), "update completed");
        }
        self.session.status
    }

    pub async fn run_update(&mut self, shutdown: &mut watch::Receiver<bool>) -> UpdateStatus {
        if self.start_update().await != UpdateStatus::Restarting {
            return self.session.status;
        }
        self.follow_logs(shutdown).await
    }

    /// Snoozes the latest release seen by the last check.
    pub async fn snooze(&mut self) -> AppResult<UserInfo> {
        let version = self
            .session
            .version_info
            .as_ref()
            .and_then(|info| info.latest_version())
            .filter(|version| !version.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::NotFound("no release to snooze".to_string()))?;
        let user = self.api.snooze_update(&version).await?;
        tracing::info!(version = %version, "update snoozed");
        Ok(user)
    }

    /// Whether the update notice should stay hidden for the current user.
    pub async fn is_snoozed(&self) -> AppResult<bool> {
        let latest = self
            .session
            .version_info
            .as_ref()
            .and_then(|info| info.latest_version());
        if latest.is_none() {
            return Ok(false);
        }
        let settings = self.api.server_settings().await?;
        let user = self.api.current_user().await?;
        Ok(snooze_active(
            latest,
            &user,
            &settings.update_snooze_duration,
            Utc::now(),
        ))
    }
}
