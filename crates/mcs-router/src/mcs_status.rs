//! The router's own `MCS` status document

use mcs_core::AgentSettings;
use mcs_types::{ComplianceResult, MCS_POLICY_TYPE};

/// Fields reported in the `MCS` status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McsStatus {
    pub computer_name: String,
    pub platform: String,
    pub software_version: String,
    pub compliance: ComplianceResult,
    /// RevID of the last applied policy
    pub rev_id: Option<String>,
}

impl McsStatus {
    pub fn new(settings: &AgentSettings, compliance: ComplianceResult, rev_id: Option<String>) -> Self {
        Self {
            computer_name: settings.computer_name.clone(),
            platform: settings.platform.clone(),
            software_version: settings.software_version.clone(),
            compliance,
            rev_id,
        }
    }

    /// Render with the current time
    pub fn to_xml(&self) -> String {
        self.to_xml_at(&chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
    }

    /// The `timestamp` attribute is ignored by the status cache, so two
    /// renders differing only in time are the same status.
    pub fn to_xml_at(&self, timestamp: &str) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="utf-8"?>"#,
                r#"<ns:mcsStatus xmlns:ns="http://www.sophos.com/xml/mcs/status">"#,
                r#"<meta protocolVersion="1.0" timestamp="{timestamp}"/>"#,
                r#"<computerName>{name}</computerName>"#,
                r#"<platform>{platform}</platform>"#,
                r#"<softwareVersion>{version}</softwareVersion>"#,
                r#"<policyCompliance res="{res}" policyType="{policy_type}" revId="{rev_id}"/>"#,
                r#"</ns:mcsStatus>"#
            ),
            timestamp = escape(timestamp),
            name = escape(&self.computer_name),
            platform = escape(&self.platform),
            version = escape(&self.software_version),
            res = self.compliance,
            policy_type = MCS_POLICY_TYPE,
            rev_id = escape(self.rev_id.as_deref().unwrap_or_default()),
        )
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcs_router_core::status_hash;

    fn status(compliance: ComplianceResult) -> McsStatus {
        let mut settings = AgentSettings::with_install_dir("/tmp/mcs");
        settings.computer_name = "host<1>".into();
        McsStatus::new(&settings, compliance, Some("rev-1".into()))
    }

    #[test]
    fn test_status_contents() {
        let xml = status(ComplianceResult::Same).to_xml_at("2024-01-01T00:00:00.000Z");
        assert!(xml.contains("<computerName>host&lt;1&gt;</computerName>"));
        assert!(xml.contains(r#"<policyCompliance res="Same" policyType="25" revId="rev-1"/>"#));
        assert!(xml.ends_with("</ns:mcsStatus>"));
    }

    #[test]
    fn test_timestamp_does_not_change_hash() {
        let diff = status(ComplianceResult::Diff);
        assert_eq!(
            status_hash(&diff.to_xml_at("2024-01-01T00:00:00.000Z")),
            status_hash(&diff.to_xml_at("2025-06-30T12:00:00.000Z"))
        );
        assert_ne!(
            status_hash(&diff.to_xml_at("x")),
            status_hash(&status(ComplianceResult::Same).to_xml_at("x"))
        );
    }
}
