//! Deployment configuration
//!
//! A TOML document describing the deployment context, extra feature
//! flags and the stages to build, in declaration order.

use crate::arn::DeploymentContext;
use crate::construction::PlanBuilder;
use crate::error::PlanError;
use crate::factories::{
    batch_transform, cloud_formation, data_baseline, invoke_function, stack_set,
    BaselineJobConfig, BatchTransformConfig, CloudFormationConfig, InvokeFunctionConfig,
    StackSetConfig,
};
use crate::plan::PipelinePlan;
use crate::session::{FeatureFlag, FeatureFlags};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors loading a configuration or building its plan
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Document is not valid configuration
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configured stages do not form a valid plan
    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Extra feature flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FeaturesConfig {
    /// Custom flags to enable
    #[serde(default)]
    pub enabled: Vec<String>,
}

/// One configured stage
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StageConfig {
    /// See [`batch_transform`]
    BatchTransform(BatchTransformConfig),
    /// See [`data_baseline`]
    DataBaseline(BaselineJobConfig),
    /// See [`stack_set`]
    StackSet(StackSetConfig),
    /// See [`cloud_formation`]
    CloudFormation(CloudFormationConfig),
    /// See [`invoke_function`]
    InvokeFunction(InvokeFunctionConfig),
}

impl StageConfig {
    /// Run the matching factory; returns the stage name
    pub fn apply(self, builder: &mut PlanBuilder) -> crate::error::Result<String> {
        match self {
            Self::BatchTransform(config) => batch_transform(builder, config),
            Self::DataBaseline(config) => data_baseline(builder, config),
            Self::StackSet(config) => stack_set(builder, config).map(|s| s.stage),
            Self::CloudFormation(config) => cloud_formation(builder, config),
            Self::InvokeFunction(config) => invoke_function(builder, config),
        }
    }
}

/// Complete deployment description
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeploymentConfig {
    /// Where the pipeline is deployed
    pub deployment: DeploymentContext,
    /// Extra feature flags
    #[serde(default)]
    pub features: FeaturesConfig,
    /// Stages in declaration order
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

impl DeploymentConfig {
    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Flags for this deployment, before key detection
    #[must_use]
    pub fn feature_flags(&self) -> FeatureFlags {
        self.features
            .enabled
            .iter()
            .fold(FeatureFlags::new(), |flags, name| {
                flags.with(FeatureFlag::Custom(name.clone()))
            })
    }

    /// Run every configured factory and validate the result
    pub fn build_plan(self) -> Result<PipelinePlan, ConfigError> {
        let flags = self.feature_flags();
        let mut builder = PlanBuilder::with_flags(self.deployment, flags);
        for stage in self.stages {
            let name = stage.apply(&mut builder)?;
            debug!(stage = %name, "configured stage added");
        }
        Ok(builder.build()?)
    }
}

/// Load a configuration file
pub fn load_config(path: impl AsRef<Path>) -> Result<DeploymentConfig, ConfigError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    DeploymentConfig::from_toml_str(&source)
}
