//! Data baseline stage
//!
//! A function that launches a processing job computing the data baseline
//! for a monitored endpoint. Two roles are involved: the function's own
//! role, and the job role the function hands to the processing job. The
//! job role gets key-management permissions only when a customer key is
//! configured.

use super::{
    add_and_name, blueprint_code, default_run_order, function_logs_policy, merge_passthrough,
    DEFAULT_HANDLER, FUNCTION_RUNTIME, LOG_LEVEL,
};
use crate::construction::PlanBuilder;
use crate::error::Result;
use crate::policy::{build_policy, key_policy, PolicyCategory};
use crate::role::{ConditionalStatement, TrustedPrincipal};
use crate::session::FeatureFlag;
use crate::stage::{ArtifactReference, ComputeTarget, FunctionTarget, StageSpec};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Environment keys set by [`data_baseline`]
pub const BASELINE_KEYS: [&str; 12] = [
    "BASELINE_JOB_NAME",
    "ASSETS_BUCKET",
    "SAGEMAKER_ENDPOINT_NAME",
    "TRAINING_DATA_LOCATION",
    "BASELINE_JOB_OUTPUT_LOCATION",
    "INSTANCE_TYPE",
    "INSTANCE_VOLUME_SIZE",
    "MAX_RUNTIME_SECONDS",
    "ROLE_ARN",
    "KMS_KEY_ARN",
    "STACK_NAME",
    "LOG_LEVEL",
];

fn default_id() -> String {
    "create_data_baseline_job".to_string()
}

fn default_timeout() -> u64 {
    600
}

/// Data baseline stage settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BaselineJobConfig {
    /// Stage name
    #[serde(default = "default_id")]
    pub id: String,
    /// Processing job name
    pub baseline_job_name: String,
    /// Key of the training data inside the assets bucket
    pub training_data_location: String,
    /// `bucket/prefix` the job writes to
    pub baseline_job_output_location: String,
    /// Monitored endpoint
    pub endpoint_name: String,
    /// Job instance type
    pub instance_type: String,
    /// Job volume size in GB
    pub instance_volume_size: String,
    /// Job runtime limit
    pub max_runtime_seconds: String,
    /// Monitoring stack name
    pub stack_name: String,
    /// Execution order
    #[serde(default = "default_run_order")]
    pub run_order: u32,
    /// Function timeout
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Consumed artifacts
    #[serde(default)]
    pub inputs: Vec<ArtifactReference>,
    /// Extra environment entries
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Add a data baseline stage; returns its name
pub fn data_baseline(builder: &mut PlanBuilder, config: BaselineJobConfig) -> Result<String> {
    builder.atomically(|builder| add_data_baseline(builder, config))
}

fn add_data_baseline(builder: &mut PlanBuilder, config: BaselineJobConfig) -> Result<String> {
    let ctx = builder.context().clone();
    let assets = &ctx.assets_bucket;

    let s3_read = build_policy(
        PolicyCategory::StorageRead,
        [
            ctx.bucket(assets)?,
            ctx.object(&format!("{assets}/{}", config.training_data_location))?,
        ],
    )?;
    let s3_write = build_policy(
        PolicyCategory::StorageWrite,
        [ctx.objects(&config.baseline_job_output_location)?],
    )?;
    let baseline_job = build_policy(
        PolicyCategory::ComputeBaselineJob,
        [ctx.sagemaker(&format!("processing-job/{}", config.baseline_job_name))?],
    )?;
    let job_logs = build_policy(
        PolicyCategory::LogsWrite,
        [ctx.log_groups("/aws/sagemaker/")?],
    )?;

    let job_role_name = format!("{}_sagemaker_role", config.id);
    let job_role_arn = ctx.role(&job_role_name)?;
    let assume_self = build_policy(PolicyCategory::RoleAssume, [job_role_arn.clone()])?;
    let conditional = key_policy(ctx.kms_key_arn.as_ref())?
        .map(|kms| ConditionalStatement::new(kms, FeatureFlag::KmsKeyProvided))
        .into_iter()
        .collect();

    let job_role = builder.compose_role(
        job_role_name,
        "Role the baseline processing job runs as",
        TrustedPrincipal::JobRuntime,
        vec![
            job_logs,
            baseline_job.clone(),
            s3_read.clone(),
            s3_write.clone(),
            assume_self,
        ],
        conditional,
    )?;

    let pass_job_role = build_policy(PolicyCategory::RolePass, [job_role_arn.clone()])?;
    let role = builder.compose_role(
        format!("{}_role", config.id),
        "Role assumed by the function that creates a baseline job",
        TrustedPrincipal::ComputeRuntime,
        vec![
            pass_job_role,
            baseline_job,
            s3_write,
            s3_read,
            function_logs_policy(&ctx)?,
        ],
        Vec::new(),
    )?;

    let kms_key_arn = ctx
        .kms_key_arn
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    let mut environment = BTreeMap::from([
        ("BASELINE_JOB_NAME".to_string(), config.baseline_job_name),
        ("ASSETS_BUCKET".to_string(), assets.clone()),
        ("SAGEMAKER_ENDPOINT_NAME".to_string(), config.endpoint_name),
        ("TRAINING_DATA_LOCATION".to_string(), config.training_data_location),
        (
            "BASELINE_JOB_OUTPUT_LOCATION".to_string(),
            config.baseline_job_output_location.clone(),
        ),
        ("INSTANCE_TYPE".to_string(), config.instance_type),
        ("INSTANCE_VOLUME_SIZE".to_string(), config.instance_volume_size),
        ("MAX_RUNTIME_SECONDS".to_string(), config.max_runtime_seconds),
        ("ROLE_ARN".to_string(), job_role_arn.to_string()),
        ("KMS_KEY_ARN".to_string(), kms_key_arn),
        ("STACK_NAME".to_string(), config.stack_name),
        ("LOG_LEVEL".to_string(), LOG_LEVEL.to_string()),
    ]);
    merge_passthrough(&config.id, &mut environment, config.environment)?;

    let target = ComputeTarget::Function(FunctionTarget {
        function_name: config.id.clone(),
        handler: DEFAULT_HANDLER.to_string(),
        runtime: FUNCTION_RUNTIME.to_string(),
        code: blueprint_code(&ctx, "create_data_baseline_job.zip"),
        layers: Vec::new(),
    });

    let mut spec = StageSpec::new(config.id, role, target, config.run_order, config.timeout_seconds)
        .delegate(job_role)
        .output(config.baseline_job_output_location);
    spec.environment = environment;
    spec.inputs = config.inputs;

    add_and_name(builder, spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arn::{DeploymentContext, ResourceIdentifier};

    fn context() -> DeploymentContext {
        DeploymentContext::new("us-east-1", "123456789012", "blueprints", "assets")
    }

    fn config() -> BaselineJobConfig {
        BaselineJobConfig {
            id: default_id(),
            baseline_job_name: "churn-baseline".to_string(),
            training_data_location: "training/data.csv".to_string(),
            baseline_job_output_location: "assets/baseline".to_string(),
            endpoint_name: "churn-endpoint".to_string(),
            instance_type: "ml.m5.large".to_string(),
            instance_volume_size: "20".to_string(),
            max_runtime_seconds: "3600".to_string(),
            stack_name: "monitor".to_string(),
            run_order: 1,
            timeout_seconds: default_timeout(),
            inputs: Vec::new(),
            environment: BTreeMap::new(),
        }
    }

    #[test]
    fn baseline_passes_job_role() {
        let mut builder = PlanBuilder::new(context());
        let name = data_baseline(&mut builder, config()).unwrap();
        let stage = builder.get_stage(&name).unwrap();

        let job_role = &stage.delegated_roles()[0];
        assert_eq!(job_role.name(), "create_data_baseline_job_sagemaker_role");
        assert_eq!(job_role.principal(), TrustedPrincipal::JobRuntime);

        let job_arn = ResourceIdentifier::parse(
            "arn:aws:iam::123456789012:role/create_data_baseline_job_sagemaker_role",
        )
        .unwrap();
        let pass = &stage.role().statements()[0];
        assert_eq!(pass.category(), PolicyCategory::RolePass);
        assert!(pass.covers(&job_arn));
        assert_eq!(stage.environment()["ROLE_ARN"], job_arn.as_str());
        assert_eq!(stage.timeout_seconds(), 600);
    }

    #[test]
    fn baseline_without_key_has_no_key_statements() {
        let mut builder = PlanBuilder::new(context());
        let name = data_baseline(&mut builder, config()).unwrap();
        let stage = builder.get_stage(&name).unwrap();

        let job_role = &stage.delegated_roles()[0];
        assert!(job_role
            .materialized_statements()
            .iter()
            .all(|s| s.category() != PolicyCategory::KeyManagement));
        assert_eq!(stage.environment()["KMS_KEY_ARN"], "");
    }

    #[test]
    fn baseline_with_key_adds_key_statement_once() {
        let key = ResourceIdentifier::parse("arn:aws:kms:us-east-1:123456789012:key/k").unwrap();
        let mut builder = PlanBuilder::new(context().with_kms_key(key.clone()));
        let name = data_baseline(&mut builder, config()).unwrap();
        let stage = builder.get_stage(&name).unwrap();

        let job_role = &stage.delegated_roles()[0];
        let kms: Vec<_> = job_role
            .materialized_statements()
            .into_iter()
            .filter(|s| s.category() == PolicyCategory::KeyManagement)
            .collect();
        assert_eq!(kms.len(), 1);
        assert!(kms[0].covers(&key));
        assert!(stage
            .role()
            .materialized_statements()
            .iter()
            .all(|s| s.category() != PolicyCategory::KeyManagement));
    }

    #[test]
    fn baseline_environment_keys() {
        let mut builder = PlanBuilder::new(context());
        let name = data_baseline(&mut builder, config()).unwrap();
        let env = builder.get_stage(&name).unwrap().environment();

        for key in BASELINE_KEYS {
            assert!(env.contains_key(key), "missing {key}");
        }
        assert_eq!(env.len(), BASELINE_KEYS.len());
    }

    #[test]
    fn baseline_retry_after_shadowed_key() {
        let mut builder = PlanBuilder::new(context());
        let mut shadowing = config();
        shadowing
            .environment
            .insert("ROLE_ARN".to_string(), "arn:aws:iam::1:role/x".to_string());

        assert!(matches!(
            data_baseline(&mut builder, shadowing),
            Err(crate::PlanError::ReservedEnvironmentKey { .. })
        ));
        assert_eq!(builder.session().role_count(), 0);
        assert_eq!(builder.stage_count(), 0);

        let name = data_baseline(&mut builder, config()).unwrap();
        assert_eq!(name, "create_data_baseline_job");
        assert_eq!(builder.session().role_count(), 2);
    }

    #[test]
    fn baseline_scopes_job_to_its_name() {
        let mut builder = PlanBuilder::new(context());
        let name = data_baseline(&mut builder, config()).unwrap();
        let stage = builder.get_stage(&name).unwrap();

        let job = &stage.role().statements()[1];
        assert_eq!(job.category(), PolicyCategory::ComputeBaselineJob);
        assert_eq!(
            job.resources().iter().next().unwrap().as_str(),
            "arn:aws:sagemaker:us-east-1:123456789012:processing-job/churn-baseline"
        );
    }
}
