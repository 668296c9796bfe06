//! Pipeline plan
//!
//! The ordered, validated collection of stages handed to the provisioning
//! engine. A [`PipelinePlan`] only exists if every stage name is unique and
//! every non-external input is produced by a stage with a strictly smaller
//! run order, so the plan is acyclic and executable top to bottom.

use crate::error::{PlanError, Result};
use crate::policy::PermissionStatement;
use crate::role::ExecutionRole;
use crate::stage::{ArtifactReference, ComputeTarget, StageDescriptor};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::info;

/// Validated, execution-ordered stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelinePlan {
    stages: Vec<StageDescriptor>,
}

/// Validate `stages` and order them for execution
///
/// Stages are sorted by run order; stages sharing a run order keep their
/// declaration order.
pub fn build_plan(stages: Vec<StageDescriptor>) -> Result<PipelinePlan> {
    let mut by_name: HashMap<&str, &StageDescriptor> = HashMap::with_capacity(stages.len());
    for stage in &stages {
        if by_name.insert(stage.name(), stage).is_some() {
            return Err(PlanError::DuplicateStageName(stage.name().to_string()));
        }
    }

    for stage in &stages {
        for input in stage.inputs() {
            let Some(producer_name) = input.producing_stage.as_deref() else {
                continue;
            };
            let Some(producer) = by_name.get(producer_name) else {
                return Err(unresolved(stage, input, producer_name));
            };
            if producer.run_order() >= stage.run_order() {
                return Err(PlanError::DependencyOrderViolation {
                    stage: stage.name().to_string(),
                    run_order: stage.run_order(),
                    artifact: input.path.clone(),
                    producer: producer_name.to_string(),
                    producer_run_order: producer.run_order(),
                });
            }
            if !producer.produces(&input.path) {
                return Err(unresolved(stage, input, producer_name));
            }
        }
    }

    let mut stages = stages;
    stages.sort_by_key(StageDescriptor::run_order);

    info!(
        stages = stages.len(),
        waves = stages
            .iter()
            .map(StageDescriptor::run_order)
            .collect::<BTreeSet<_>>()
            .len(),
        "built pipeline plan"
    );

    Ok(PipelinePlan { stages })
}

fn unresolved(stage: &StageDescriptor, input: &ArtifactReference, producer: &str) -> PlanError {
    PlanError::UnresolvedArtifact {
        stage: stage.name().to_string(),
        artifact: input.path.clone(),
        producer: producer.to_string(),
    }
}

impl PipelinePlan {
    /// Alias for [`build_plan`]
    pub fn build(stages: Vec<StageDescriptor>) -> Result<Self> {
        build_plan(stages)
    }

    /// Stages in execution order
    #[inline]
    #[must_use]
    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    /// Number of stages
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True if the plan has no stages
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StageDescriptor> {
        self.stages.iter().find(|s| s.name() == name)
    }

    /// Stages grouped by run order, ascending
    #[must_use]
    pub fn waves(&self) -> Vec<(u32, Vec<&StageDescriptor>)> {
        let mut waves: Vec<(u32, Vec<&StageDescriptor>)> = Vec::new();
        for stage in &self.stages {
            match waves.last_mut() {
                Some((order, members)) if *order == stage.run_order() => members.push(stage),
                _ => waves.push((stage.run_order(), vec![stage])),
            }
        }
        waves
    }

    /// Every role in the plan, owned and delegated
    pub fn roles(&self) -> impl Iterator<Item = &ExecutionRole> {
        self.stages
            .iter()
            .flat_map(|s| std::iter::once(s.role()).chain(s.delegated_roles()))
    }

    /// Provisioning instructions, one per stage, in execution order
    #[must_use]
    pub fn instructions(&self) -> Vec<ProvisioningInstruction<'_>> {
        self.stages.iter().map(ProvisioningInstruction::from).collect()
    }

    /// Instructions as pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.instructions())
    }
}

/// Declarative handoff for one stage
#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningInstruction<'a> {
    /// Stage name
    pub name: &'a str,
    /// Execution order
    pub run_order: u32,
    /// Timeout in seconds
    pub timeout_seconds: u64,
    /// Role the stage runs as
    pub role: RoleInstruction<'a>,
    /// Roles handed to launched jobs
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub delegated_roles: Vec<RoleInstruction<'a>>,
    /// Runtime environment
    pub environment: &'a BTreeMap<String, String>,
    /// What the stage runs
    pub target: &'a ComputeTarget,
    /// Consumed artifacts
    pub inputs: &'a BTreeSet<ArtifactReference>,
    /// Produced artifacts
    pub outputs: &'a BTreeSet<ArtifactReference>,
    /// Output variable namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables_namespace: Option<&'a str>,
}

/// Role materialized for the provisioning engine
#[derive(Debug, Clone, Serialize)]
pub struct RoleInstruction<'a> {
    /// Role name
    pub name: &'a str,
    /// Service principal allowed to assume the role
    pub principal: &'static str,
    /// Purpose
    #[serde(skip_serializing_if = "str::is_empty")]
    pub description: &'a str,
    /// Statements after flag resolution
    pub statements: Vec<&'a PermissionStatement>,
}

impl<'a> From<&'a ExecutionRole> for RoleInstruction<'a> {
    fn from(role: &'a ExecutionRole) -> Self {
        Self {
            name: role.name(),
            principal: role.principal().service(),
            description: role.description(),
            statements: role.materialized_statements(),
        }
    }
}

impl<'a> From<&'a StageDescriptor> for ProvisioningInstruction<'a> {
    fn from(stage: &'a StageDescriptor) -> Self {
        Self {
            name: stage.name(),
            run_order: stage.run_order(),
            timeout_seconds: stage.timeout_seconds(),
            role: RoleInstruction::from(stage.role()),
            delegated_roles: stage.delegated_roles().iter().map(RoleInstruction::from).collect(),
            environment: stage.environment(),
            target: stage.target(),
            inputs: stage.inputs(),
            outputs: stage.outputs(),
            variables_namespace: stage.variables_namespace(),
        }
    }
}
