//! Construction session
//!
//! A [`ConstructionSession`] tracks the names handed out while one plan is
//! being built: role names, stage names and generated resource names. It
//! also carries the feature flags, resolved once when the session is
//! created. One build gets one session; sessions are never shared between
//! builds and are dropped once the plan is finalized or the build fails.

use crate::error::{PlanError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt::{self, Display, Formatter};
use uuid::Uuid;

/// Feature flag gating conditional statements
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureFlag {
    /// A customer-supplied encryption key is configured
    KmsKeyProvided,
    /// Caller-defined flag
    Custom(String),
}

impl Display for FeatureFlag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::KmsKeyProvided => f.write_str("kms-key-provided"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// Set of enabled feature flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    enabled: BTreeSet<FeatureFlag>,
}

impl FeatureFlags {
    /// No flags enabled
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With `flag` enabled
    #[must_use]
    pub fn with(mut self, flag: FeatureFlag) -> Self {
        self.enabled.insert(flag);
        self
    }

    /// With `flag` enabled when `condition` holds
    #[must_use]
    pub fn with_if(self, flag: FeatureFlag, condition: bool) -> Self {
        if condition {
            self.with(flag)
        } else {
            self
        }
    }

    /// Check if `flag` is enabled
    #[inline]
    #[must_use]
    pub fn is_enabled(&self, flag: &FeatureFlag) -> bool {
        self.enabled.contains(flag)
    }

    /// Enabled flags in order
    pub fn iter(&self) -> impl Iterator<Item = &FeatureFlag> {
        self.enabled.iter()
    }
}

/// Name registry and resolved flags for one plan build
#[derive(Debug, Clone)]
pub struct ConstructionSession {
    id: Uuid,
    flags: FeatureFlags,
    role_names: HashSet<String>,
    stage_names: HashSet<String>,
    generated_names: HashSet<String>,
}

impl ConstructionSession {
    /// Start a session with `flags` resolved
    #[must_use]
    pub fn new(flags: FeatureFlags) -> Self {
        Self {
            id: Uuid::new_v4(),
            flags,
            role_names: HashSet::new(),
            stage_names: HashSet::new(),
            generated_names: HashSet::new(),
        }
    }

    /// Session id, for log correlation
    #[inline]
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Flags resolved for this session
    #[inline]
    #[must_use]
    pub fn flags(&self) -> &FeatureFlags {
        &self.flags
    }

    /// Check if `flag` is enabled
    #[inline]
    #[must_use]
    pub fn is_enabled(&self, flag: &FeatureFlag) -> bool {
        self.flags.is_enabled(flag)
    }

    /// Claim a role name
    pub fn register_role(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(PlanError::EmptyName { kind: "role" });
        }
        if !self.role_names.insert(name.to_string()) {
            return Err(PlanError::DuplicateRoleName(name.to_string()));
        }
        Ok(())
    }

    /// Claim a stage name
    pub fn register_stage(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(PlanError::EmptyName { kind: "stage" });
        }
        if !self.stage_names.insert(name.to_string()) {
            return Err(PlanError::DuplicateStageName(name.to_string()));
        }
        Ok(())
    }

    /// Check if a stage name is taken
    #[inline]
    #[must_use]
    pub fn has_stage(&self, name: &str) -> bool {
        self.stage_names.contains(name)
    }

    /// Claim a generated name; false if already taken
    pub fn claim_name(&mut self, name: &str) -> bool {
        self.generated_names.insert(name.to_string())
    }

    /// Check if a generated name is taken
    #[inline]
    #[must_use]
    pub fn has_name(&self, name: &str) -> bool {
        self.generated_names.contains(name)
    }

    /// Number of roles registered
    #[inline]
    #[must_use]
    pub fn role_count(&self) -> usize {
        self.role_names.len()
    }

    /// Number of stages registered
    #[inline]
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stage_names.len()
    }
}

impl Default for ConstructionSession {
    fn default() -> Self {
        Self::new(FeatureFlags::default())
    }
}
