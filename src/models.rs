use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of the frame boundary this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FrameRole {
    /// The outer shell application.
    #[default]
    Host,
    /// The embedded Grafana frame.
    Embedded,
}

impl FrameRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Embedded => "embedded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Light,
    Dark,
}

impl ColorMode {
    /// Collapses any theme name to the two supported modes. Only `dark`
    /// (case-insensitive) maps to dark.
    pub fn normalize(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("dark") {
            Self::Dark
        } else {
            Self::Light
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NavigationAction {
    Push,
    Replace,
    Pop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub pathname: String,
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub hash: String,
}

impl Location {
    pub fn new(pathname: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            search: String::new(),
            hash: String::new(),
        }
    }

    /// Splits `scheme://authority` off an absolute URL. Relative URLs have
    /// an empty origin part.
    pub fn split_origin(raw: &str) -> (&str, &str) {
        let Some(scheme_end) = raw.find("://") else {
            return ("", raw);
        };
        let authority_start = scheme_end + 3;
        let authority_end = raw[authority_start..]
            .find(['/', '?', '#'])
            .map(|idx| authority_start + idx)
            .unwrap_or(raw.len());
        raw.split_at(authority_end)
    }

    /// Splits a relative or absolute URL into path, search and hash.
    pub fn parse(raw: &str) -> Self {
        let (origin, without_origin) = Self::split_origin(raw);
        let (before_hash, hash) = match without_origin.find('#') {
            Some(idx) => (&without_origin[..idx], &without_origin[idx..]),
            None => (without_origin, ""),
        };
        let (pathname, search) = match before_hash.find('?') {
            Some(idx) => (&before_hash[..idx], &before_hash[idx..]),
            None => (before_hash, ""),
        };
        let pathname = if pathname.is_empty() && !origin.is_empty() {
            "/"
        } else {
            pathname
        };
        Self {
            pathname: pathname.to_string(),
            search: search.to_string(),
            hash: hash.to_string(),
        }
    }

    pub fn href(&self) -> String {
        format!("{}{}{}", self.pathname, self.search, self.hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InstalledVersion {
    #[serde(default)]
    pub version: String,
    #[serde(default, alias = "fullVersion")]
    pub full_version: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LatestVersion {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, alias = "releaseNotesUrl")]
    pub release_notes_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VersionInfo {
    #[serde(default)]
    pub installed: InstalledVersion,
    #[serde(default)]
    pub latest: Option<LatestVersion>,
    #[serde(default, alias = "updateAvailable")]
    pub update_available: bool,
    #[serde(default, alias = "lastCheck")]
    pub last_check: Option<DateTime<Utc>>,
}

impl VersionInfo {
    /// True when no newer release is known: either the server reported no
    /// latest release or its version matches the installed one.
    pub fn installed_is_latest(&self) -> bool {
        match &self.latest {
            Some(latest) if !latest.version.is_empty() => latest.version == self.installed.version,
            _ => true,
        }
    }

    pub fn latest_version(&self) -> Option<&str> {
        self.latest
            .as_ref()
            .map(|latest| latest.version.as_str())
            .filter(|version| !version.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateSeverity {
    #[serde(rename = "UPDATE_SEVERITY_UP_TO_DATE")]
    UpToDate,
    #[serde(rename = "UPDATE_SEVERITY_REQUIRED")]
    Required,
    #[serde(rename = "UPDATE_SEVERITY_CRITICAL")]
    Critical,
    #[serde(rename = "UPDATE_SEVERITY_UNSUPPORTED")]
    Unsupported,
    #[serde(other)]
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentVersion {
    pub agent_id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub node_name: String,
    pub severity: UpdateSeverity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AgentVersionsResponse {
    #[serde(default)]
    pub agent_versions: Vec<AgentVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStartResponse {
    pub auth_token: String,
    #[serde(default)]
    pub log_offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub auth_token: String,
    pub log_offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UpdateStatusResponse {
    #[serde(default)]
    pub log_lines: Vec<String>,
    #[serde(default)]
    pub log_offset: u64,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerSettings {
    #[serde(default)]
    pub updates_enabled: bool,
    #[serde(default)]
    pub update_snooze_duration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerSettingsResponse {
    #[serde(default)]
    pub settings: ServerSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FrontendSettings {
    #[serde(default)]
    pub anonymous_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UserInfo {
    pub user_id: u64,
    #[serde(default)]
    pub product_tour_completed: bool,
    #[serde(default)]
    pub snoozed_pmm_version: String,
    #[serde(default)]
    pub snoozed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnoozeUpdateRequest {
    pub snoozed_pmm_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemePreference {
    pub theme: ColorMode,
}

#[cfg(test)]
mod tests {
    use super::{AgentVersionsResponse, ColorMode, Location, UpdateSeverity, VersionInfo};

    #[test]
    fn color_mode_normalizes_unknown_names_to_light() {
        assert_eq!(ColorMode::normalize("DARK"), ColorMode::Dark);
        assert_eq!(ColorMode::normalize("system"), ColorMode::Light);
        assert_eq!(ColorMode::normalize(""), ColorMode::Light);
    }

    #[test]
    fn location_parse_splits_components() {
        let location = Location::parse("https://pmm.local/graph/d/mysql-overview/x?var-node=a#panel-2");
        assert_eq!(location.pathname, "/graph/d/mysql-overview/x");
        assert_eq!(location.search, "?var-node=a");
        assert_eq!(location.hash, "#panel-2");
        assert_eq!(location.href(), "/graph/d/mysql-overview/x?var-node=a#panel-2");
    }

    #[test]
    fn location_parse_keeps_query_after_bare_authority() {
        let location = Location::parse("https://pmm.local?x=1#top");
        assert_eq!(location.pathname, "/");
        assert_eq!(location.search, "?x=1");
        assert_eq!(location.hash, "#top");
        assert_eq!(Location::split_origin("https://pmm.local?x=1"), ("https://pmm.local", "?x=1"));
        assert_eq!(Location::split_origin("/graph/d/x"), ("", "/graph/d/x"));
    }

    #[test]
    fn version_info_accepts_both_field_spellings() {
        let snake: VersionInfo = serde_json::from_value(serde_json::json!({
            "installed": { "version": "3.0.0", "full_version": "3.0.0-abc" },
            "latest": { "version": "3.1.0" },
            "update_available": true
        }))
        .expect("snake case");
        let camel: VersionInfo = serde_json::from_value(serde_json::json!({
            "installed": { "version": "3.0.0", "fullVersion": "3.0.0-abc" }
        }))
        .expect("camel case");
        assert_eq!(snake.installed.full_version, camel.installed.full_version);
        assert!(!snake.installed_is_latest());
        assert!(camel.installed_is_latest());
    }

    #[test]
    fn unknown_severity_maps_to_unspecified() {
        let parsed: AgentVersionsResponse = serde_json::from_value(serde_json::json!({
            "agent_versions": [
                { "agent_id": "a", "severity": "UPDATE_SEVERITY_UP_TO_DATE" },
                { "agent_id": "b", "severity": "SOMETHING_NEW" }
            ]
        }))
        .expect("parse");
        assert_eq!(parsed.agent_versions[0].severity, UpdateSeverity::UpToDate);
        assert_eq!(parsed.agent_versions[1].severity, UpdateSeverity::Unspecified);
    }
}
