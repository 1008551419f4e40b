use crate::errors::AppResult;
use crate::messaging::envelope::{DashboardVariablesPayload, MessageType};
use crate::messaging::{ListenerHandle, Messenger};
use crate::models::Location;
use std::sync::Arc;

const VARIABLE_PREFIX: &str = "var-";

/// Dashboard uid from a `/d/<uid>/<slug>` path.
pub fn dashboard_uid(pathname: &str) -> Option<&str> {
    let mut segments = pathname.split('/').filter(|segment| !segment.is_empty());
    segments.find(|segment| *segment == "d")?;
    segments.next()
}

/// Database-engine family of a dashboard, taken from the uid prefix
/// (`mysql-instance-summary` -> `mysql`).
pub fn engine_family(uid: &str) -> &str {
    uid.split('-').next().unwrap_or(uid)
}

pub fn same_engine_family(current: &str, target: &str) -> bool {
    match (dashboard_uid(current), dashboard_uid(target)) {
        (Some(current), Some(target)) => engine_family(current) == engine_family(target),
        _ => false,
    }
}

/// Replaces the `var-*` parameters named in `variables` and keeps every
/// other query parameter in place.
pub fn apply_variables(url: &str, variables: &[(String, Vec<String>)]) -> String {
    let (prefix, _) = Location::split_origin(url);
    let location = Location::parse(url);
    let names = variables
        .iter()
        .map(|(name, _)| format!("{}{}", VARIABLE_PREFIX, name))
        .collect::<Vec<_>>();

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in url::form_urlencoded::parse(location.search.trim_start_matches('?').as_bytes()) {
        if !names.iter().any(|name| name.as_str() == key.as_ref()) {
            serializer.append_pair(&key, &value);
        }
    }
    for (name, values) in variables {
        for value in values {
            serializer.append_pair(&format!("{}{}", VARIABLE_PREFIX, name), value);
        }
    }
    let query = serializer.finish();
    let search = if query.is_empty() {
        String::new()
    } else {
        format!("?{}", query)
    };
    format!("{}{}{}{}", prefix, location.pathname, search, location.hash)
}

/// Host side: resolves dashboard links against the variables currently
/// selected in the embedded frame.
#[derive(Clone)]
pub struct VariableLinks {
    messenger: Messenger,
}

impl VariableLinks {
    pub fn new(messenger: Messenger) -> Self {
        Self { messenger }
    }

    /// Never fails: any problem yields the original URL.
    pub async fn link_with_variables(&self, current: &Location, url: &str) -> String {
        let target = Location::parse(url);
        if !same_engine_family(&current.pathname, &target.pathname) {
            return url.to_string();
        }

        match self.resolve(url).await {
            Ok(resolved) => resolved,
            Err(error) => {
                tracing::debug!(url, error = %error, "falling back to link without variables");
                url.to_string()
            }
        }
    }

    async fn resolve(&self, url: &str) -> AppResult<String> {
        let payload = serde_json::to_value(DashboardVariablesPayload { url: url.to_string() })?;
        let reply = self
            .messenger
            .send_message_with_result(MessageType::DashboardVariables, payload)
            .await?;
        let reply: DashboardVariablesPayload = serde_json::from_value(reply)?;
        Ok(reply.url)
    }
}

/// Current template-variable selections of the embedded dashboard.
pub trait VariableSource: Send + Sync {
    fn selected_variables(&self) -> Vec<(String, Vec<String>)>;
}

/// Embedded side: answers `DASHBOARD_VARIABLES` requests.
pub struct VariableResponder;

impl VariableResponder {
    pub fn attach(messenger: &Messenger, source: Arc<dyn VariableSource>) -> ListenerHandle {
        let responder = messenger.clone();
        messenger.add_listener(MessageType::DashboardVariables, move |inbound| {
            let request: DashboardVariablesPayload = inbound.envelope.payload_as()?;
            let url = apply_variables(&request.url, &source.selected_variables());
            responder.reply(inbound, serde_json::to_value(DashboardVariablesPayload { url })?)
        })
    }
}
