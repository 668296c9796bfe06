//! Policy builder
//!
//! Turns a resource category and a set of resource identifiers into a
//! single allow statement. Each category carries a fixed action list, and
//! the statement is scoped to exactly the identifiers supplied: nothing is
//! widened, nothing is added.

use crate::arn::ResourceIdentifier;
use crate::error::{PlanError, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Operation category of a permission statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyCategory {
    /// Read objects and list buckets
    StorageRead,
    /// Write objects
    StorageWrite,
    /// Manage processing (baseline) jobs
    ComputeBaselineJob,
    /// Manage batch transform jobs
    ComputeBatchTransform,
    /// Manage a stack set and its operations
    StackManagement,
    /// Manage the instances of a stack set
    StackInstances,
    /// Create, update and inspect a single stack
    StackDeployment,
    /// Use a customer-supplied encryption key
    KeyManagement,
    /// Invoke a serverless function
    FunctionInvoke,
    /// Hand a role to a service
    RolePass,
    /// Assume a role
    RoleAssume,
    /// Write function and job logs
    LogsWrite,
}

impl PolicyCategory {
    /// Every category, in declaration order
    pub const ALL: [PolicyCategory; 12] = [
        Self::StorageRead,
        Self::StorageWrite,
        Self::ComputeBaselineJob,
        Self::ComputeBatchTransform,
        Self::StackManagement,
        Self::StackInstances,
        Self::StackDeployment,
        Self::KeyManagement,
        Self::FunctionInvoke,
        Self::RolePass,
        Self::RoleAssume,
        Self::LogsWrite,
    ];

    /// Stable kebab-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StorageRead => "storage-read",
            Self::StorageWrite => "storage-write",
            Self::ComputeBaselineJob => "compute-baseline-job",
            Self::ComputeBatchTransform => "compute-batch-transform",
            Self::StackManagement => "stack-management",
            Self::StackInstances => "stack-instances",
            Self::StackDeployment => "stack-deployment",
            Self::KeyManagement => "key-management",
            Self::FunctionInvoke => "function-invoke",
            Self::RolePass => "role-pass",
            Self::RoleAssume => "role-assume",
            Self::LogsWrite => "logs-write",
        }
    }

    /// Fixed action list granted by this category
    #[must_use]
    pub const fn actions(self) -> &'static [&'static str] {
        match self {
            Self::StorageRead => &["s3:GetObject", "s3:ListBucket"],
            Self::StorageWrite => &["s3:PutObject"],
            Self::ComputeBaselineJob => &[
                "sagemaker:CreateProcessingJob",
                "sagemaker:DescribeProcessingJob",
                "sagemaker:StopProcessingJob",
                "sagemaker:ListProcessingJobs",
            ],
            Self::ComputeBatchTransform => &[
                "sagemaker:CreateTransformJob",
                "sagemaker:DescribeTransformJob",
                "sagemaker:StopTransformJob",
                "sagemaker:DescribeModel",
                "sagemaker:DescribeEndpoint",
            ],
            Self::StackManagement => &[
                "cloudformation:CreateStackSet",
                "cloudformation:UpdateStackSet",
                "cloudformation:DeleteStackSet",
                "cloudformation:DescribeStackSet",
                "cloudformation:DescribeStackSetOperation",
                "cloudformation:ListStackSetOperations",
            ],
            Self::StackInstances => &[
                "cloudformation:CreateStackInstances",
                "cloudformation:UpdateStackInstances",
                "cloudformation:DeleteStackInstances",
                "cloudformation:DescribeStackInstance",
                "cloudformation:ListStackInstances",
            ],
            Self::StackDeployment => &[
                "cloudformation:CreateStack",
                "cloudformation:UpdateStack",
                "cloudformation:DeleteStack",
                "cloudformation:DescribeStacks",
                "cloudformation:DescribeStackEvents",
                "cloudformation:CreateChangeSet",
                "cloudformation:DescribeChangeSet",
                "cloudformation:ExecuteChangeSet",
                "cloudformation:DeleteChangeSet",
            ],
            Self::KeyManagement => &[
                "kms:Encrypt",
                "kms:Decrypt",
                "kms:GenerateDataKey",
                "kms:DescribeKey",
            ],
            Self::FunctionInvoke => &["lambda:InvokeFunction"],
            Self::RolePass => &["iam:PassRole"],
            Self::RoleAssume => &["sts:AssumeRole"],
            Self::LogsWrite => &[
                "logs:CreateLogGroup",
                "logs:CreateLogStream",
                "logs:PutLogEvents",
            ],
        }
    }

    /// True if the category grants no mutating action
    #[inline]
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::StorageRead)
    }
}

impl Display for PolicyCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyCategory {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| PlanError::InvalidCategory(s.to_string()))
    }
}

/// Statement effect
///
/// Only allow statements are ever built; anything not granted is denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub enum Effect {
    /// Grant the listed actions
    #[default]
    Allow,
}

/// Minimal-privilege permission statement
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PermissionStatement {
    category: PolicyCategory,
    effect: Effect,
    actions: &'static [&'static str],
    resources: BTreeSet<ResourceIdentifier>,
}

impl PermissionStatement {
    /// Category the statement was built from
    #[inline]
    #[must_use]
    pub fn category(&self) -> PolicyCategory {
        self.category
    }

    /// Statement effect
    #[inline]
    #[must_use]
    pub fn effect(&self) -> Effect {
        self.effect
    }

    /// Granted actions
    #[inline]
    #[must_use]
    pub fn actions(&self) -> &'static [&'static str] {
        self.actions
    }

    /// Resources the actions are scoped to
    #[inline]
    #[must_use]
    pub fn resources(&self) -> &BTreeSet<ResourceIdentifier> {
        &self.resources
    }

    /// Check if the statement covers `resource` exactly
    #[must_use]
    pub fn covers(&self, resource: &ResourceIdentifier) -> bool {
        self.resources.contains(resource)
    }
}

/// Build a statement for `category` scoped to `resources`
///
/// Duplicate identifiers collapse to one. Fails with
/// [`PlanError::EmptyResourceSet`] if nothing is left to scope to.
pub fn build_policy<I>(category: PolicyCategory, resources: I) -> Result<PermissionStatement>
where
    I: IntoIterator<Item = ResourceIdentifier>,
{
    let resources: BTreeSet<ResourceIdentifier> = resources.into_iter().collect();
    if resources.is_empty() {
        return Err(PlanError::EmptyResourceSet { category });
    }

    Ok(PermissionStatement {
        category,
        effect: Effect::Allow,
        actions: category.actions(),
        resources,
    })
}

/// Like [`build_policy`], with the category given by name
///
/// Unknown names fail with [`PlanError::InvalidCategory`].
pub fn build_named_policy<I>(category: &str, resources: I) -> Result<PermissionStatement>
where
    I: IntoIterator<Item = ResourceIdentifier>,
{
    build_policy(category.parse()?, resources)
}

/// Key-management statement, or nothing when no key is configured
pub fn key_policy(key: Option<&ResourceIdentifier>) -> Result<Option<PermissionStatement>> {
    key.map(|key| build_policy(PolicyCategory::KeyManagement, [key.clone()]))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ResourceIdentifier {
        ResourceIdentifier::parse(s).unwrap()
    }

    #[test]
    fn build_policy_deduplicates_resources() {
        let statement = build_policy(
            PolicyCategory::StorageRead,
            [
                id("arn:aws:s3:::assets"),
                id("arn:aws:s3:::assets/*"),
                id("arn:aws:s3:::assets"),
            ],
        )
        .unwrap();

        assert_eq!(statement.resources().len(), 2);
        assert!(statement.covers(&id("arn:aws:s3:::assets/*")));
        assert_eq!(statement.actions(), &["s3:GetObject", "s3:ListBucket"]);
        assert_eq!(statement.effect(), Effect::Allow);
    }

    #[test]
    fn build_policy_rejects_empty_set() {
        let result = build_policy(PolicyCategory::StorageWrite, Vec::new());
        assert_eq!(
            result,
            Err(PlanError::EmptyResourceSet {
                category: PolicyCategory::StorageWrite
            })
        );
    }

    #[test]
    fn named_policy_rejects_unknown_category() {
        let result = build_named_policy("storage-delete", [id("arn:aws:s3:::assets")]);
        assert!(matches!(result, Err(PlanError::InvalidCategory(name)) if name == "storage-delete"));
    }

    #[test]
    fn category_names_round_trip() {
        for category in PolicyCategory::ALL {
            assert_eq!(category.as_str().parse::<PolicyCategory>().unwrap(), category);
        }
    }

    #[test]
    fn read_only_categories_carry_no_write_actions() {
        for category in PolicyCategory::ALL.into_iter().filter(|c| c.is_read_only()) {
            for action in category.actions() {
                assert!(!action.contains("Put") && !action.contains("Create") && !action.contains("Delete"));
            }
        }
    }

    #[test]
    fn key_policy_is_skipped_without_key() {
        assert_eq!(key_policy(None).unwrap(), None);

        let key = id("arn:aws:kms:us-east-1:1:key/abc");
        let statement = key_policy(Some(&key)).unwrap().unwrap();
        assert_eq!(statement.category(), PolicyCategory::KeyManagement);
        assert!(statement.covers(&key));
    }

    #[test]
    fn build_policy_is_structurally_idempotent() {
        let resources = [id("arn:aws:s3:::out/*")];
        let a = build_policy(PolicyCategory::StorageWrite, resources.clone()).unwrap();
        let b = build_policy(PolicyCategory::StorageWrite, resources).unwrap();
        assert_eq!(a, b);
    }
}
