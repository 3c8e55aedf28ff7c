//! MCS policy XML parsing and validation
//!
//! A policy is rejected as a whole unless it has a `<policy>` root and
//! exactly one compliance node carrying non-empty `policyType` and `RevID`.
//! Everything under `<configuration>` is optional.

use roxmltree::{Document, Node};

use mcs_types::{Compliance, MessageRelay, PolicyDocument, PollingDelay};

use crate::error::PolicyError;

/// Parse and validate a policy document
pub fn parse_policy(xml: &str) -> Result<PolicyDocument, PolicyError> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    if root.tag_name().name() != "policy" {
        return Err(PolicyError::WrongRoot(root.tag_name().name().to_string()));
    }

    let compliance = parse_compliance(root)?;
    let mut policy = PolicyDocument::new(compliance);

    let Some(config) = child(root, "configuration") else {
        return Ok(policy);
    };

    policy.registration_token = child(config, "registrationToken").map(text);
    policy.servers = list(config, "servers", "server");
    policy.push_servers = list(config, "pushServers", "pushServer");
    policy.message_relays = relays(config);

    policy.use_system_proxy = scalar(config, "useSystemProxy");
    policy.use_automatic_proxy = scalar(config, "useAutomaticProxy");
    policy.use_direct = scalar(config, "useDirect");
    policy.random_skew_factor = scalar(config, "randomSkewFactor");
    policy.push_ping_timeout = scalar(config, "pushPingTimeout");
    policy.push_fallback_poll_interval = scalar(config, "pushFallbackPollInterval");

    policy.polling_delay = child(config, "commandPollingDelay")
        .and_then(|node| node.attribute("default"))
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(PollingDelay);

    policy.proxy = list(config, "proxies", "proxy").into_iter().next();
    if policy.proxy.is_some() {
        policy.proxy_credentials = scalar(config, "proxyCredentials").filter(|c| !c.is_empty());
    }

    Ok(policy)
}

fn parse_compliance(root: Node) -> Result<Compliance, PolicyError> {
    let nodes: Vec<Node> = root
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "Comp")
        .collect();
    if nodes.len() != 1 {
        return Err(PolicyError::ComplianceCount(nodes.len()));
    }

    let node = nodes[0];
    let required = |name: &'static str| {
        node.attribute(name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or(PolicyError::MissingComplianceField(name))
    };

    Ok(Compliance {
        policy_type: required("policyType")?,
        rev_id: required("RevID")?,
    })
}

/// First element child with the given local name
fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// Trimmed concatenated text content
fn text(node: Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

fn scalar(config: Node, name: &str) -> Option<String> {
    child(config, name).map(text)
}

/// Non-empty texts of `container/item` elements, in document order
fn list(config: Node, container: &str, item: &str) -> Vec<String> {
    child(config, container)
        .map(|c| {
            c.children()
                .filter(|n| n.is_element() && n.tag_name().name() == item)
                .map(text)
                .filter(|value| !value.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn relays(config: Node) -> Vec<MessageRelay> {
    child(config, "messageRelays")
        .map(|c| {
            c.children()
                .filter(|n| n.is_element() && n.tag_name().name() == "messageRelay")
                .map(|n| {
                    let attr = |name: &str| n.attribute(name).unwrap_or_default().trim().to_string();
                    MessageRelay::new(attr("priority"), attr("port"), attr("address"), attr("id"))
                })
                .collect()
        })
        .unwrap_or_default()
}
