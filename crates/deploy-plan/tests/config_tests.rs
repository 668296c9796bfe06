use deploy_plan::config::{load_config, ConfigError, DeploymentConfig, StageConfig};
use deploy_plan::policy::PolicyCategory;
use deploy_plan::PlanError;
use deploy_plan_test_utils::{DEPLOYMENT_TOML, FULL_PIPELINE_TOML, KMS_KEY};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn full_config() -> String {
    format!("{DEPLOYMENT_TOML}{FULL_PIPELINE_TOML}")
}

#[test]
fn test_load_full_pipeline() {
    let file = write_config(&full_config());
    let config = load_config(file.path()).unwrap();

    let kinds: Vec<&str> = config
        .stages
        .iter()
        .map(|s| match s {
            StageConfig::BatchTransform(_) => "batch-transform",
            StageConfig::DataBaseline(_) => "data-baseline",
            StageConfig::StackSet(_) => "stack-set",
            StageConfig::CloudFormation(_) => "cloud-formation",
            StageConfig::InvokeFunction(_) => "invoke-function",
        })
        .collect();
    assert_eq!(
        kinds,
        [
            "data-baseline",
            "batch-transform",
            "stack-set",
            "cloud-formation",
            "invoke-function"
        ]
    );

    let plan = config.build_plan().unwrap();
    assert_eq!(plan.len(), 5);
    assert_eq!(plan.stages()[0].name(), "create_data_baseline_job");
    assert_eq!(plan.stages()[4].name(), "deploy_model");
}

#[test]
fn test_configured_key_enables_kms_statement() {
    let with_key = DEPLOYMENT_TOML.replace(
        "assets_bucket = \"assets\"",
        &format!("assets_bucket = \"assets\"\nkms_key_arn = \"{KMS_KEY}\""),
    );
    let plan = DeploymentConfig::from_toml_str(&format!("{with_key}{FULL_PIPELINE_TOML}"))
        .unwrap()
        .build_plan()
        .unwrap();

    let kms_roles = plan
        .roles()
        .filter(|r| {
            r.materialized_statements()
                .iter()
                .any(|s| s.category() == PolicyCategory::KeyManagement)
        })
        .count();
    assert_eq!(kms_roles, 1);

    let baseline = plan.get("create_data_baseline_job").unwrap();
    assert_eq!(baseline.environment()["KMS_KEY_ARN"], KMS_KEY);
}

#[test]
fn test_out_of_order_config_fails_validation() {
    let broken = full_config().replacen("run_order = 2\ninputs", "run_order = 1\ninputs", 1);
    let result = DeploymentConfig::from_toml_str(&broken)
        .unwrap()
        .build_plan();

    assert!(matches!(
        result,
        Err(ConfigError::Plan(PlanError::DependencyOrderViolation { .. }))
    ));
}

#[test]
fn test_missing_required_key_is_parse_error() {
    let broken = full_config().replace("model_name = \"churn\"\n", "");
    let file = write_config(&broken);
    assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
}

#[test]
fn test_empty_pipeline_builds_empty_plan() {
    let plan = DeploymentConfig::from_toml_str(DEPLOYMENT_TOML)
        .unwrap()
        .build_plan()
        .unwrap();
    assert!(plan.is_empty());
}
