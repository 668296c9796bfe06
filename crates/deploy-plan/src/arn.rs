//! Resource identifiers
//!
//! Provides [`ResourceIdentifier`], a validated ARN, and
//! [`DeploymentContext`], which derives the ARN patterns policies are
//! scoped to from the account, region and buckets of one deployment.

use crate::error::{PlanError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Validated cloud resource locator
///
/// Format: `arn:<partition>:<service>:<region>:<account>:<resource>`.
/// Region and account may be empty (global services such as S3 and IAM) or
/// a bare `*`. Inside the resource part a `*` may only appear as the final
/// character, so `bucket/prefix/*` means every object under the prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceIdentifier(String);

impl ResourceIdentifier {
    /// Parse and validate a locator
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        match check_locator(&value) {
            Ok(()) => Ok(Self(value)),
            Err(reason) => Err(PlanError::InvalidResourceIdentifier { value, reason }),
        }
    }

    /// Locator as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Service segment (`s3`, `sagemaker`, ...)
    #[must_use]
    pub fn service(&self) -> &str {
        self.0.split(':').nth(2).unwrap_or_default()
    }

    /// Resource segment, everything after the account
    #[must_use]
    pub fn resource(&self) -> &str {
        self.0.splitn(6, ':').nth(5).unwrap_or_default()
    }

    /// True if the locator ends in a wildcard
    #[inline]
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0.ends_with('*')
    }
}

fn check_locator(value: &str) -> std::result::Result<(), &'static str> {
    if value.chars().any(char::is_whitespace) {
        return Err("contains whitespace");
    }

    let parts: Vec<&str> = value.splitn(6, ':').collect();
    if parts.len() != 6 || parts[0] != "arn" {
        return Err("expected arn:<partition>:<service>:<region>:<account>:<resource>");
    }

    let (partition, service, region, account, resource) =
        (parts[1], parts[2], parts[3], parts[4], parts[5]);

    if partition.is_empty() || partition.contains('*') {
        return Err("missing or wildcard partition");
    }
    if service.is_empty() || service.contains('*') {
        return Err("missing or wildcard service");
    }
    for segment in [region, account] {
        if segment.contains('*') && segment != "*" {
            return Err("partial wildcard in region or account");
        }
    }
    if resource.is_empty() {
        return Err("missing resource");
    }
    if let Some(pos) = resource.find('*') {
        if pos != resource.len() - 1 {
            return Err("wildcard is only allowed as the final character");
        }
    }

    Ok(())
}

impl FromStr for ResourceIdentifier {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceIdentifier {
    type Error = PlanError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<ResourceIdentifier> for String {
    fn from(value: ResourceIdentifier) -> Self {
        value.0
    }
}

impl Display for ResourceIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn default_partition() -> String {
    "aws".to_string()
}

/// Account, region and buckets of one deployment
///
/// All ARN patterns handed to the policy builder are derived here, so every
/// stage of a plan scopes its permissions against the same account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentContext {
    /// ARN partition (`aws`, `aws-cn`, `aws-us-gov`)
    #[serde(default = "default_partition")]
    pub partition: String,
    /// Deployment region
    pub region: String,
    /// Deployment account
    pub account_id: String,
    /// Bucket holding function code and layers
    pub blueprint_bucket: String,
    /// Bucket holding pipeline assets
    pub assets_bucket: String,
    /// Customer-supplied encryption key
    #[serde(default)]
    pub kms_key_arn: Option<ResourceIdentifier>,
}

impl DeploymentContext {
    /// Create a context in the default partition
    #[must_use]
    pub fn new(
        region: impl Into<String>,
        account_id: impl Into<String>,
        blueprint_bucket: impl Into<String>,
        assets_bucket: impl Into<String>,
    ) -> Self {
        Self {
            partition: default_partition(),
            region: region.into(),
            account_id: account_id.into(),
            blueprint_bucket: blueprint_bucket.into(),
            assets_bucket: assets_bucket.into(),
            kms_key_arn: None,
        }
    }

    /// With customer-supplied encryption key
    #[must_use]
    pub fn with_kms_key(mut self, key: ResourceIdentifier) -> Self {
        self.kms_key_arn = Some(key);
        self
    }

    /// Bucket itself: `arn:<p>:s3:::<bucket>`
    pub fn bucket(&self, bucket: &str) -> Result<ResourceIdentifier> {
        ResourceIdentifier::parse(format!("arn:{}:s3:::{bucket}", self.partition))
    }

    /// Single object or exact key: `arn:<p>:s3:::<path>`
    pub fn object(&self, path: &str) -> Result<ResourceIdentifier> {
        ResourceIdentifier::parse(format!("arn:{}:s3:::{path}", self.partition))
    }

    /// Every object under a prefix: `arn:<p>:s3:::<prefix>/*`
    pub fn objects(&self, prefix: &str) -> Result<ResourceIdentifier> {
        let prefix = prefix.trim_end_matches('/');
        ResourceIdentifier::parse(format!("arn:{}:s3:::{prefix}/*", self.partition))
    }

    /// SageMaker resource in this account and region
    pub fn sagemaker(&self, resource: &str) -> Result<ResourceIdentifier> {
        self.regional("sagemaker", resource)
    }

    /// Stack set: `stackset/<name>:*`
    pub fn stack_set(&self, name: &str) -> Result<ResourceIdentifier> {
        self.regional("cloudformation", &format!("stackset/{name}:*"))
    }

    /// Stack set deployment targets: `stackset-target/<name>:*`
    pub fn stack_set_target(&self, name: &str) -> Result<ResourceIdentifier> {
        self.regional("cloudformation", &format!("stackset-target/{name}:*"))
    }

    /// Single stack: `stack/<name>/*`
    pub fn stack(&self, name: &str) -> Result<ResourceIdentifier> {
        self.regional("cloudformation", &format!("stack/{name}/*"))
    }

    /// IAM role (global, no region)
    pub fn role(&self, name: &str) -> Result<ResourceIdentifier> {
        ResourceIdentifier::parse(format!(
            "arn:{}:iam::{}:role/{name}",
            self.partition, self.account_id
        ))
    }

    /// Serverless function
    pub fn function(&self, name: &str) -> Result<ResourceIdentifier> {
        self.regional("lambda", &format!("function:{name}"))
    }

    /// Log groups whose name starts with `prefix`
    pub fn log_groups(&self, prefix: &str) -> Result<ResourceIdentifier> {
        self.regional("logs", &format!("log-group:{prefix}*"))
    }

    fn regional(&self, service: &str, resource: &str) -> Result<ResourceIdentifier> {
        ResourceIdentifier::parse(format!(
            "arn:{}:{service}:{}:{}:{resource}",
            self.partition, self.region, self.account_id
        ))
    }
}
