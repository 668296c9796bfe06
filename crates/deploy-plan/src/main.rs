use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use deploy_plan::config::load_config;
use deploy_plan::naming::ResourceNamer;
use deploy_plan::session::{ConstructionSession, FeatureFlags};
use deploy_plan::PipelinePlan;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .short('c')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Deployment configuration (TOML)")
}

fn cli() -> Command {
    Command::new("deploy-plan")
        .version(deploy_plan::VERSION)
        .about("Least-privilege plan construction for model deployment pipelines")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("plan")
                .about("Build a plan and print it")
                .arg(config_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the provisioning handoff as JSON"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Build a plan and report whether it is valid")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("name")
                .about("Generate unique resource names")
                .arg(
                    Arg::new("prefix")
                        .long("prefix")
                        .required(true)
                        .help("Name prefix"),
                )
                .arg(
                    Arg::new("count")
                        .long("count")
                        .default_value("1")
                        .value_parser(value_parser!(usize))
                        .help("Number of names to generate"),
                ),
        )
}

fn init_tracing(json: bool) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn build(args: &ArgMatches) -> Result<PipelinePlan> {
    let path = args
        .get_one::<PathBuf>("config")
        .context("missing --config")?;
    let config = load_config(path)?;
    let plan = config
        .build_plan()
        .with_context(|| format!("building plan from {}", path.display()))?;
    Ok(plan)
}

fn print_summary(plan: &PipelinePlan) {
    for (run_order, stages) in plan.waves() {
        println!("wave {run_order}");
        for stage in stages {
            println!("  {} (timeout {}s)", stage.name(), stage.timeout_seconds());
            let roles = std::iter::once(stage.role()).chain(stage.delegated_roles());
            for role in roles {
                println!("    role {} [{}]", role.name(), role.principal().service());
                for statement in role.materialized_statements() {
                    println!(
                        "      {} -> {} resource(s)",
                        statement.category(),
                        statement.resources().len()
                    );
                }
            }
        }
    }
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("plan", args)) => {
            let plan = build(args)?;
            if args.get_flag("json") {
                println!("{}", plan.to_json()?);
            } else {
                print_summary(&plan);
            }
        }
        Some(("validate", args)) => match build(args) {
            Ok(plan) => println!("valid: {} stage(s)", plan.len()),
            Err(err) => {
                eprintln!("invalid: {err:#}");
                std::process::exit(1);
            }
        },
        Some(("name", args)) => {
            let prefix = args
                .get_one::<String>("prefix")
                .context("missing --prefix")?;
            let count = args.get_one::<usize>("count").copied().unwrap_or(1);

            let mut session = ConstructionSession::new(FeatureFlags::new());
            let mut namer = ResourceNamer::new();
            for _ in 0..count {
                println!("{}", namer.generate_unique_name(&mut session, prefix)?);
            }
        }
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deploy_plan::config::ConfigError;
    use deploy_plan_test_utils::{DEPLOYMENT_TOML, FULL_PIPELINE_TOML};
    use std::io::Write;

    const OUT_OF_ORDER_TOML: &str = r#"
[[stages]]
kind = "data-baseline"
baseline_job_name = "churn-baseline"
training_data_location = "training/data.csv"
baseline_job_output_location = "assets/baseline"
endpoint_name = "churn-endpoint"
instance_type = "ml.m5.large"
instance_volume_size = "20"
max_runtime_seconds = "3600"
stack_name = "monitor"

[[stages]]
kind = "batch-transform"
model_name = "churn"
inference_instance = "ml.m5.large"
batch_input_bucket = "batch-input"
batch_inference_data = "batch-input/data.csv"
batch_job_output_location = "assets/batch_output"
run_order = 1
inputs = [{ stage = "create_data_baseline_job", path = "assets/baseline" }]
"#;

    fn config_file(stages: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{DEPLOYMENT_TOML}{stages}").unwrap();
        file
    }

    #[test]
    fn parses_plan() {
        let matches = cli()
            .try_get_matches_from(["deploy-plan", "plan", "--config", "x.toml", "--json"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "plan");
        assert_eq!(
            args.get_one::<PathBuf>("config"),
            Some(&PathBuf::from("x.toml"))
        );
        assert!(args.get_flag("json"));
    }

    #[test]
    fn parses_validate_with_global_log_flag() {
        let matches = cli()
            .try_get_matches_from(["deploy-plan", "validate", "-c", "x.toml", "--log-json"])
            .unwrap();
        assert!(matches.get_flag("log-json"));
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "validate");
        assert!(args.get_one::<PathBuf>("config").is_some());
    }

    #[test]
    fn parses_name() {
        let matches = cli()
            .try_get_matches_from(["deploy-plan", "name", "--prefix", "monitor", "--count", "3"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "name");
        assert_eq!(args.get_one::<String>("prefix").unwrap(), "monitor");
        assert_eq!(args.get_one::<usize>("count"), Some(&3));

        let matches = cli()
            .try_get_matches_from(["deploy-plan", "name", "--prefix", "monitor"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(args.get_one::<usize>("count"), Some(&1));
    }

    #[test]
    fn rejects_missing_required_args() {
        assert!(cli().try_get_matches_from(["deploy-plan", "plan"]).is_err());
        assert!(cli().try_get_matches_from(["deploy-plan", "name"]).is_err());
        assert!(cli()
            .try_get_matches_from(["deploy-plan", "name", "--prefix", "p", "--count", "many"])
            .is_err());
        assert!(cli().try_get_matches_from(["deploy-plan"]).is_err());
    }

    #[test]
    fn validate_accepts_full_pipeline() {
        let file = config_file(FULL_PIPELINE_TOML);
        let path = file.path().to_str().unwrap();
        let matches = cli()
            .try_get_matches_from(["deploy-plan", "validate", "--config", path])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(build(args).unwrap().len(), 5);
    }

    #[test]
    fn validate_fails_on_out_of_order_stages() {
        let file = config_file(OUT_OF_ORDER_TOML);
        let path = file.path().to_str().unwrap();
        let matches = cli()
            .try_get_matches_from(["deploy-plan", "validate", "--config", path])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();

        let err = build(args).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Plan(plan)) if plan.is_ordering_error()
        ));
    }

    #[test]
    fn validate_reports_missing_file() {
        let matches = cli()
            .try_get_matches_from(["deploy-plan", "validate", "--config", "/nonexistent/plan.toml"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert!(matches!(
            build(args).unwrap_err().downcast_ref::<ConfigError>(),
            Some(ConfigError::Io { .. })
        ));
    }
}
