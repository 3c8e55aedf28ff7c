//! Commands received from the management console

use serde::{Deserialize, Serialize};

use crate::AppId;

/// A single command returned by a command poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Server-assigned command id
    pub id: String,

    /// Application the command is addressed to
    pub app_id: AppId,

    /// Server creation time, as sent
    pub creation_time: String,

    /// Raw XML body
    pub body: String,
}

/// What a command body asks the endpoint to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Body is a `<policy>` document
    Policy,
    /// Anything else is handed to the owning application as an action
    Action,
}

impl Command {
    pub fn new(id: impl Into<String>, app_id: impl Into<AppId>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            app_id: app_id.into(),
            creation_time: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            body: body.into(),
        }
    }

    /// Classify the body by its root element name.
    pub fn kind(&self) -> CommandKind {
        if root_element_name(&self.body) == Some("policy") {
            CommandKind::Policy
        } else {
            CommandKind::Action
        }
    }
}

/// Local name of the first element in an XML string, skipping the prolog.
fn root_element_name(xml: &str) -> Option<&str> {
    let mut rest = xml;
    loop {
        let start = rest.find('<')?;
        rest = &rest[start + 1..];
        if rest.starts_with('?') || rest.starts_with('!') {
            continue;
        }
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(rest.len());
        let name = &rest[..end];
        return Some(name.rsplit(':').next().unwrap_or(name));
    }
}

/// Credentials issued by a successful registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub endpoint_id: String,
    pub password: String,
}
