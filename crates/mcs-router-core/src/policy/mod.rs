//! MCS policy handling
//!
//! ```text
//! policy XML ──► parse_policy ──► write_policy ──► policy store (etc/mcs_policy.config)
//!                  (validate)      (codec)               │
//!                                                        │ commit (after connect)
//!                                                        ▼
//!                                                  applied store
//! ```
//!
//! A rejected policy changes nothing: the previous policy values stay in
//! the policy store and the XML on disk is not replaced.

pub mod codec;
pub mod compliance;
mod document;

pub use codec::{read_numbered_list, read_relays, write_numbered_list, write_policy, write_relays};
pub use compliance::{commit, is_compliant, TRACKED_LISTS, TRACKED_SCALARS};
pub use document::parse_policy;

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use mcs_core::store::atomic_write;
use mcs_core::SharedConfig;
use mcs_types::{ComplianceResult, PolicyDocument};

use crate::error::PolicyError;

/// How the handler treats a policy already on disk at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Registering: ignore any leftover policy file
    Registration,
    /// Normal start: re-apply the policy file if there is one
    LoadExisting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyState {
    Uninitialized,
    /// Applied from the file found on disk
    Loaded,
    /// Applied from a policy received this run
    Applied,
}

/// Applies MCS policies to the policy store and tracks compliance
pub struct PolicyHandler {
    policy_path: PathBuf,
    policy_config: SharedConfig,
    applied_config: SharedConfig,
    state: PolicyState,
    current: Option<PolicyDocument>,
}

impl PolicyHandler {
    pub fn new(
        policy_path: impl Into<PathBuf>,
        policy_config: SharedConfig,
        applied_config: SharedConfig,
        mode: LoadMode,
    ) -> Self {
        let mut handler = Self {
            policy_path: policy_path.into(),
            policy_config,
            applied_config,
            state: PolicyState::Uninitialized,
            current: None,
        };
        if mode == LoadMode::LoadExisting {
            handler.load_existing();
        }
        handler
    }

    pub fn state(&self) -> PolicyState {
        self.state
    }

    pub fn policy_path(&self) -> &Path {
        &self.policy_path
    }

    /// The last successfully applied policy
    pub fn current(&self) -> Option<&PolicyDocument> {
        self.current.as_ref()
    }

    fn load_existing(&mut self) {
        let xml = match fs::read_to_string(&self.policy_path) {
            Ok(xml) => xml,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.policy_path.display(), "No existing MCS policy");
                return;
            }
            Err(e) => {
                warn!(path = %self.policy_path.display(), error = %e, "Failed to read existing MCS policy");
                return;
            }
        };
        match self.apply_policy(&xml) {
            Ok(()) => {
                self.state = PolicyState::Loaded;
                info!(path = %self.policy_path.display(), "Loaded existing MCS policy");
            }
            Err(e) => warn!(error = %e, "Existing MCS policy rejected"),
        }
    }

    /// Apply a newly received policy. Failures are logged and the previous
    /// configuration stays in effect. Returns whether the policy was applied.
    pub fn process(&mut self, xml: &str) -> bool {
        if let Err(e) = self.apply_policy(xml) {
            error!(error = %e, "MCS policy rejected");
            return false;
        }
        self.state = PolicyState::Applied;

        if let Err(e) = atomic_write(&self.policy_path, xml.as_bytes()) {
            warn!(path = %self.policy_path.display(), error = %e, "Failed to persist MCS policy");
        }
        if let Some(policy) = &self.current {
            info!(
                policy_type = %policy.compliance.policy_type,
                rev_id = %policy.compliance.rev_id,
                servers = policy.servers.len(),
                relays = policy.message_relays.len(),
                "Applied MCS policy"
            );
        }
        true
    }

    /// Validate the whole document, then write it to the policy store
    pub fn apply_policy(&mut self, xml: &str) -> Result<(), PolicyError> {
        let policy = parse_policy(xml)?;

        {
            // Stage on a copy so a failed save leaves the store untouched
            let mut store = self.policy_config.write();
            let mut staged = store.clone();
            write_policy(&mut staged, &policy);
            staged.save().map_err(|e| PolicyError::Persist(e.to_string()))?;
            *store = staged;
        }

        self.current = Some(policy);
        Ok(())
    }

    pub fn is_compliant(&self) -> bool {
        is_compliant(&self.policy_config.read(), &self.applied_config.read())
    }

    /// Make the applied store match the policy store
    pub fn commit(&self) {
        let policy = self.policy_config.read();
        let mut applied = self.applied_config.write();
        commit(&policy, &mut applied);
        debug!("Committed policy configuration to applied configuration");
    }

    /// Compliance as reported in the router status
    pub fn compliance_result(&self) -> ComplianceResult {
        match self.state {
            PolicyState::Uninitialized => ComplianceResult::NoRef,
            _ if self.is_compliant() => ComplianceResult::Same,
            _ => ComplianceResult::Diff,
        }
    }
}
