//! Status documents reported to the management console

use serde::{Deserialize, Serialize};

use crate::AppId;

/// Latest status XML for one application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStatus {
    pub app_id: AppId,
    pub xml: String,
}

impl AppStatus {
    pub fn new(app_id: impl Into<AppId>, xml: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            xml: xml.into(),
        }
    }
}

/// One status upload carrying any number of application statuses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub statuses: Vec<AppStatus>,
}

impl StatusEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, status: AppStatus) {
        self.statuses.push(status);
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn app_ids(&self) -> Vec<&str> {
        self.statuses.iter().map(|s| s.app_id.as_str()).collect()
    }
}

/// Compliance value reported in the router's own status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplianceResult {
    /// Applied configuration matches the last received policy
    Same,
    /// Applied configuration differs from the last received policy
    Diff,
    /// No policy has been received yet
    NoRef,
}

impl std::fmt::Display for ComplianceResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComplianceResult::Same => write!(f, "Same"),
            ComplianceResult::Diff => write!(f, "Diff"),
            ComplianceResult::NoRef => write!(f, "NoRef"),
        }
    }
}
