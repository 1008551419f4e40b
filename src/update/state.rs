use crate::errors::AppError;
use crate::models::{AgentVersion, UpdateSeverity, UpdateStatusResponse, VersionInfo};
use serde::{Deserialize, Serialize};

const GENERIC_UPDATE_FAILURE: &str = "Something went wrong while updating, please try again";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateStatus {
    /// A newer release exists and waits for the user.
    #[default]
    Pending,
    Checking,
    Updating,
    Restarting,
    Completed,
    Error,
    UpToDate,
    UpdateClients,
}

impl UpdateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Checking => "checking",
            Self::Updating => "updating",
            Self::Restarting => "restarting",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::UpToDate => "up-to-date",
            Self::UpdateClients => "update-clients",
        }
    }

    pub fn is_update_running(self) -> bool {
        matches!(self, Self::Updating | Self::Restarting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateEvent {
    CheckStarted,
    CheckFailed,
    CheckResolved {
        installed_is_latest: bool,
        clients_up_to_date: bool,
    },
    UpdateRequested,
    UpdateStarted,
    UpdateStartFailed,
    LogsPolled {
        done: bool,
    },
    PollingFailed,
}

/// Pure transition function. Check results are evaluated on their own
/// unless an update run is in flight; run events only advance the run in
/// order. Anything else leaves the state untouched.
pub fn transition(state: UpdateStatus, event: &UpdateEvent) -> UpdateStatus {
    use UpdateStatus::*;

    let running = state.is_update_running();
    match *event {
        UpdateEvent::CheckStarted if !running => Checking,
        UpdateEvent::CheckFailed if !running => Error,
        UpdateEvent::CheckResolved {
            installed_is_latest,
            clients_up_to_date,
        } if !running => match (installed_is_latest, clients_up_to_date) {
            (true, true) => UpToDate,
            (true, false) => UpdateClients,
            (false, _) => Pending,
        },
        UpdateEvent::UpdateRequested if state == Pending => Updating,
        UpdateEvent::UpdateStarted if state == Updating => Restarting,
        UpdateEvent::UpdateStartFailed if state == Updating => Error,
        UpdateEvent::LogsPolled { done: true } if state == Restarting => Completed,
        UpdateEvent::PollingFailed if running => Error,
        _ => state,
    }
}

/// Every agent reports up to date. No agents counts as up to date.
pub fn clients_up_to_date(agents: &[AgentVersion]) -> bool {
    agents
        .iter()
        .all(|agent| agent.severity == UpdateSeverity::UpToDate)
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Text shown to the user when an update action fails.
pub fn notification_message(error: &AppError) -> String {
    match error.server_message() {
        Some(message) => capitalize(message),
        None => GENERIC_UPDATE_FAILURE.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub message: String,
    pub dismissible: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSession {
    pub status: UpdateStatus,
    pub version_info: Option<VersionInfo>,
    pub agents: Vec<AgentVersion>,
    pub auth_token: Option<String>,
    pub log_offset: u64,
    pub log_lines: Vec<String>,
    pub notification: Option<Notification>,
    history: Vec<UpdateStatus>,
}

impl UpdateSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses entered so far, in order.
    pub fn history(&self) -> &[UpdateStatus] {
        &self.history
    }

    pub fn apply(&mut self, event: &UpdateEvent) -> UpdateStatus {
        let next = transition(self.status, event);
        if next != self.status {
            tracing::debug!(from = self.status.as_str(), to = next.as_str(), ?event, "update status changed");
            self.history.push(next);
        } else {
            tracing::trace!(status = self.status.as_str(), ?event, "update event ignored");
        }
        self.status = next;
        next
    }

    pub fn begin_run(&mut self, auth_token: String, log_offset: u64) {
        self.auth_token = Some(auth_token);
        self.log_offset = log_offset;
        self.log_lines.clear();
    }

    pub fn notify(&mut self, message: String) {
        self.notification = Some(Notification {
            message,
            dismissible: true,
        });
    }

    pub fn dismiss_notification(&mut self) {
        self.notification = None;
    }

    /// Appends a polled chunk only while the update is restarting, if it was
    /// requested at the current offset and does not move the offset
    /// backwards. Returns whether it applied.
    pub fn apply_log_chunk(&mut self, request_offset: u64, chunk: &UpdateStatusResponse) -> bool {
        if self.status != UpdateStatus::Restarting {
            tracing::debug!(status = self.status.as_str(), "log chunk outside update run ignored");
            return false;
        }
        if request_offset != self.log_offset || chunk.log_offset < self.log_offset {
            tracing::debug!(
                request_offset,
                current_offset = self.log_offset,
                response_offset = chunk.log_offset,
                "stale log chunk ignored"
            );
            return false;
        }
        self.log_lines.extend(chunk.log_lines.iter().cloned());
        self.log_offset = chunk.log_offset;
        self.apply(&UpdateEvent::LogsPolled { done: chunk.done });
        true
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
