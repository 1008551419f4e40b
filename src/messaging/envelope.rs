use crate::errors::{AppError, AppResult};
use crate::models::{ColorMode, Location, NavigationAction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "MESSENGER_READY")]
    MessengerReady,
    #[serde(rename = "GRAFANA_READY")]
    GrafanaReady,
    #[serde(rename = "NAVIGATE_TO")]
    NavigateTo,
    #[serde(rename = "LOCATION_CHANGE")]
    LocationChange,
    #[serde(rename = "CHANGE_THEME")]
    ChangeTheme,
    #[serde(rename = "grafana.theme.changed")]
    ThemeChanged,
    #[serde(rename = "DOCUMENT_TITLE_CHANGE")]
    DocumentTitleChange,
    #[serde(rename = "DASHBOARD_VARIABLES")]
    DashboardVariables,
    #[serde(rename = "DASHBOARD_VARIABLES_RESULT")]
    DashboardVariablesResult,
    #[serde(rename = "ORIGIN_HANDSHAKE")]
    OriginHandshake,
    #[serde(rename = "ORIGIN_HANDSHAKE_ACK")]
    OriginHandshakeAck,
}

impl MessageType {
    pub const ALL: [MessageType; 11] = [
        Self::MessengerReady,
        Self::GrafanaReady,
        Self::NavigateTo,
        Self::LocationChange,
        Self::ChangeTheme,
        Self::ThemeChanged,
        Self::DocumentTitleChange,
        Self::DashboardVariables,
        Self::DashboardVariablesResult,
        Self::OriginHandshake,
        Self::OriginHandshakeAck,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MessengerReady => "MESSENGER_READY",
            Self::GrafanaReady => "GRAFANA_READY",
            Self::NavigateTo => "NAVIGATE_TO",
            Self::LocationChange => "LOCATION_CHANGE",
            Self::ChangeTheme => "CHANGE_THEME",
            Self::ThemeChanged => "grafana.theme.changed",
            Self::DocumentTitleChange => "DOCUMENT_TITLE_CHANGE",
            Self::DashboardVariables => "DASHBOARD_VARIABLES",
            Self::DashboardVariablesResult => "DASHBOARD_VARIABLES_RESULT",
            Self::OriginHandshake => "ORIGIN_HANDSHAKE",
            Self::OriginHandshakeAck => "ORIGIN_HANDSHAKE_ACK",
        }
    }

    pub fn from_wire(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == raw)
    }

    /// Reply type for request/response exchanges.
    pub fn result_type(self) -> Option<Self> {
        match self {
            Self::DashboardVariables => Some(Self::DashboardVariablesResult),
            Self::OriginHandshake => Some(Self::OriginHandshakeAck),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire form of every cross-frame message: `{id?, type, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub r#type: MessageType,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(r#type: MessageType, payload: serde_json::Value) -> Self {
        Self {
            id: None,
            r#type,
            payload,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_value(self.payload.clone()).map_err(|err| {
            AppError::Protocol(format!("{} payload is malformed: {}", self.r#type, err))
        })
    }

    /// Validates the payload against the shape its type requires.
    pub fn decode(&self) -> AppResult<Message> {
        let message = match self.r#type {
            MessageType::MessengerReady => Message::MessengerReady,
            MessageType::GrafanaReady => Message::GrafanaReady,
            MessageType::NavigateTo => Message::NavigateTo(self.payload_as()?),
            MessageType::LocationChange => Message::LocationChange(self.payload_as()?),
            MessageType::ChangeTheme => Message::ChangeTheme(self.payload_as()?),
            MessageType::ThemeChanged => Message::ThemeChanged(self.payload_as()?),
            MessageType::DocumentTitleChange => Message::DocumentTitleChange(self.payload_as()?),
            MessageType::DashboardVariables => Message::DashboardVariables(self.payload_as()?),
            MessageType::DashboardVariablesResult => {
                Message::DashboardVariablesResult(self.payload_as()?)
            }
            MessageType::OriginHandshake => Message::OriginHandshake(self.payload_as()?),
            MessageType::OriginHandshakeAck => Message::OriginHandshakeAck(self.payload_as()?),
        };
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatePayload {
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationChangePayload {
    pub location: Location,
    pub action: NavigationAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemePayload {
    pub mode: String,
}

impl ThemePayload {
    pub fn color_mode(&self) -> ColorMode {
        ColorMode::normalize(&self.mode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitlePayload {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardVariablesPayload {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakePayload {
    pub origin: String,
}

/// Typed view over an [`Envelope`].
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    MessengerReady,
    GrafanaReady,
    NavigateTo(NavigatePayload),
    LocationChange(LocationChangePayload),
    ChangeTheme(ThemePayload),
    ThemeChanged(ThemePayload),
    DocumentTitleChange(TitlePayload),
    DashboardVariables(DashboardVariablesPayload),
    DashboardVariablesResult(DashboardVariablesPayload),
    OriginHandshake(HandshakePayload),
    OriginHandshakeAck(HandshakePayload),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::MessengerReady => MessageType::MessengerReady,
            Self::GrafanaReady => MessageType::GrafanaReady,
            Self::NavigateTo(_) => MessageType::NavigateTo,
            Self::LocationChange(_) => MessageType::LocationChange,
            Self::ChangeTheme(_) => MessageType::ChangeTheme,
            Self::ThemeChanged(_) => MessageType::ThemeChanged,
            Self::DocumentTitleChange(_) => MessageType::DocumentTitleChange,
            Self::DashboardVariables(_) => MessageType::DashboardVariables,
            Self::DashboardVariablesResult(_) => MessageType::DashboardVariablesResult,
            Self::OriginHandshake(_) => MessageType::OriginHandshake,
            Self::OriginHandshakeAck(_) => MessageType::OriginHandshakeAck,
        }
    }

    pub fn into_envelope(self) -> AppResult<Envelope> {
        let r#type = self.message_type();
        let payload = match self {
            Self::MessengerReady | Self::GrafanaReady => serde_json::Value::Null,
            Self::NavigateTo(payload) => serde_json::to_value(payload)?,
            Self::LocationChange(payload) => serde_json::to_value(payload)?,
            Self::ChangeTheme(payload) | Self::ThemeChanged(payload) => serde_json::to_value(payload)?,
            Self::DocumentTitleChange(payload) => serde_json::to_value(payload)?,
            Self::DashboardVariables(payload) | Self::DashboardVariablesResult(payload) => {
                serde_json::to_value(payload)?
            }
            Self::OriginHandshake(payload) | Self::OriginHandshakeAck(payload) => {
                serde_json::to_value(payload)?
            }
        };
        Ok(Envelope::new(r#type, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::{Envelope, Message, MessageType, ThemePayload};
    use crate::models::ColorMode;

    #[test]
    fn wire_names_resolve_both_ways() {
        for message_type in MessageType::ALL {
            assert_eq!(MessageType::from_wire(message_type.as_str()), Some(message_type));
            let json = serde_json::to_value(message_type).expect("serialize");
            assert_eq!(json, serde_json::json!(message_type.as_str()));
        }
        assert_eq!(MessageType::from_wire("SOMETHING_ELSE"), None);
    }

    #[test]
    fn envelope_omits_absent_id_and_payload() {
        let envelope = Envelope::new(MessageType::MessengerReady, serde_json::Value::Null);
        let json = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(json, serde_json::json!({ "type": "MESSENGER_READY" }));
    }

    #[test]
    fn decode_rejects_malformed_payload() {
        let envelope = Envelope::new(MessageType::LocationChange, serde_json::json!({ "pathname": 3 }));
        let err = envelope.decode().expect_err("malformed payload");
        assert!(err.to_string().starts_with("PROTOCOL:"));
    }

    #[test]
    fn theme_message_round_trips_through_envelope() {
        let envelope = Message::ChangeTheme(ThemePayload {
            mode: "Dark".to_string(),
        })
        .into_envelope()
        .expect("envelope");
        assert_eq!(envelope.r#type, MessageType::ChangeTheme);
        match envelope.decode().expect("decode") {
            Message::ChangeTheme(payload) => assert_eq!(payload.color_mode(), ColorMode::Dark),
            other => panic!("unexpected message {:?}", other),
        }
    }
}
