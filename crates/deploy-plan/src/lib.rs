//! Deploy Plan (deploy-plan)
//!
//! Least-privilege plan construction for model deployment pipelines:
//! 1. **Construction Phase**: compose scoped roles, generate unique names,
//!    assemble stages
//! 2. **Handoff**: a validated, run-order-sorted `PipelinePlan` for the
//!    provisioning engine
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use deploy_plan::prelude::*;
//!
//! let context = DeploymentContext::new("us-east-1", "123456789012", "blueprints", "assets");
//! let mut builder = PlanBuilder::new(context);
//!
//! batch_transform(&mut builder, BatchTransformConfig::new(
//!     "churn-model", "ml.m5.large", "input", "input/data.csv", "assets/out",
//! ))?;
//!
//! let plan = builder.build()?;
//! println!("{}", plan.to_json()?);
//! ```

// Core modules
pub mod arn;
pub mod error;
pub mod naming;
pub mod plan;
pub mod policy;
pub mod role;
pub mod session;
pub mod stage;

// Construction
pub mod config;
pub mod construction;
pub mod factories;

// Re-exports
pub use arn::{DeploymentContext, ResourceIdentifier};
pub use error::*;
pub use plan::PipelinePlan;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::arn::{DeploymentContext, ResourceIdentifier};
    pub use crate::config::{load_config, ConfigError, DeploymentConfig, StageConfig};
    pub use crate::construction::PlanBuilder;
    pub use crate::error::{PlanError, Result};
    pub use crate::factories::{
        batch_transform, cloud_formation, data_baseline, invoke_function, stack_set,
        BaselineJobConfig, BatchTransformConfig, CloudFormationConfig, InvokeFunctionConfig,
        StackSetConfig, StackSetStage,
    };
    pub use crate::naming::{generate_unique_name, ResourceNamer, SuffixSource, UuidSuffix};
    pub use crate::plan::{build_plan, PipelinePlan, ProvisioningInstruction};
    pub use crate::policy::{build_named_policy, build_policy, key_policy, PermissionStatement, PolicyCategory};
    pub use crate::role::{compose_role, ConditionalStatement, ExecutionRole, TrustedPrincipal};
    pub use crate::session::{ConstructionSession, FeatureFlag, FeatureFlags};
    pub use crate::stage::{
        assemble_stage, ArtifactReference, ComputeTarget, StageDescriptor, StageSpec,
    };
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
