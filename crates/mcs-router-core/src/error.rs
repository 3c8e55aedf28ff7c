//! Error types for the router core

use thiserror::Error;

/// How the main loop should react to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network failures and generic server errors: back off on the base delay
    Transient,
    /// Bad requests and credential mismatches: back off on the larger delay
    SemiPermanent,
    /// The server asked the endpoint to register again
    ReregistrationRequired,
}

/// Failures reported by the transport
#[derive(Debug, Clone, Error)]
pub enum CommsError {
    /// Could not reach any server or relay
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Server answered with an error status
    #[error("HTTP error {status}")]
    Http {
        status: u16,
        headers: Vec<(String, String)>,
    },

    /// 401 with the server's authentication challenge, if any
    #[error("Unauthorized (challenge: {challenge:?})")]
    Unauthorized { challenge: Option<String> },

    /// Response body could not be understood
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl CommsError {
    /// Classify the failure for backoff and re-registration
    pub fn class(&self) -> ErrorClass {
        match self {
            CommsError::ConnectionFailed(_) | CommsError::MalformedResponse(_) => ErrorClass::Transient,
            CommsError::Http { status: 400, .. } => ErrorClass::SemiPermanent,
            CommsError::Http { status: 401, headers } => {
                let challenge = headers
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case("www-authenticate"))
                    .map(|(_, value)| value.as_str());
                classify_challenge(challenge)
            }
            CommsError::Http { .. } => ErrorClass::Transient,
            CommsError::Unauthorized { challenge } => classify_challenge(challenge.as_deref()),
        }
    }
}

fn classify_challenge(challenge: Option<&str>) -> ErrorClass {
    match challenge {
        Some(value) if value.to_ascii_lowercase().contains("register") => {
            ErrorClass::ReregistrationRequired
        }
        _ => ErrorClass::SemiPermanent,
    }
}

/// Policy rejection reasons
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Policy XML parse error: {0}")]
    Parse(#[from] roxmltree::Error),

    #[error("Root element is <{0}>, expected <policy>")]
    WrongRoot(String),

    #[error("Expected exactly one compliance node, found {0}")]
    ComplianceCount(usize),

    #[error("Compliance node missing {0}")]
    MissingComplianceField(&'static str),

    #[error("Failed to persist policy: {0}")]
    Persist(String),
}

/// Router core error types
#[derive(Debug, Error)]
pub enum RouterError {
    /// Invalid IP address literal
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}
