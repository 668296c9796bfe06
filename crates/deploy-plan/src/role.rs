//! Role composer
//!
//! Aggregates permission statements into a named [`ExecutionRole`] bound to
//! one trusted principal. Conditional statements are kept only when their
//! feature flag is enabled in the construction session.

use crate::arn::{DeploymentContext, ResourceIdentifier};
use crate::error::Result;
use crate::policy::PermissionStatement;
use crate::session::{ConstructionSession, FeatureFlag};
use serde::Serialize;
use tracing::debug;

/// Service allowed to assume a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrustedPrincipal {
    /// Serverless function runtime
    ComputeRuntime,
    /// Pipeline orchestrator
    OrchestrationRuntime,
    /// Managed ML job runtime
    JobRuntime,
}

impl TrustedPrincipal {
    /// Service principal string
    #[must_use]
    pub const fn service(self) -> &'static str {
        match self {
            Self::ComputeRuntime => "lambda.amazonaws.com",
            Self::OrchestrationRuntime => "codepipeline.amazonaws.com",
            Self::JobRuntime => "sagemaker.amazonaws.com",
        }
    }
}

/// Statement attached only when `flag` is enabled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionalStatement {
    /// Gated statement
    pub statement: PermissionStatement,
    /// Flag that must be enabled
    pub flag: FeatureFlag,
}

impl ConditionalStatement {
    /// Pair a statement with its flag
    #[inline]
    #[must_use]
    pub fn new(statement: PermissionStatement, flag: FeatureFlag) -> Self {
        Self { statement, flag }
    }
}

/// Named role with its statements
///
/// Only created through [`compose_role`]; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRole {
    name: String,
    principal: TrustedPrincipal,
    description: String,
    statements: Vec<PermissionStatement>,
    conditional_statements: Vec<ConditionalStatement>,
}

impl ExecutionRole {
    /// Role name, unique within the plan
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Trusted principal
    #[inline]
    #[must_use]
    pub fn principal(&self) -> TrustedPrincipal {
        self.principal
    }

    /// Human-readable purpose
    #[inline]
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Unconditional statements, in attachment order
    #[inline]
    #[must_use]
    pub fn statements(&self) -> &[PermissionStatement] {
        &self.statements
    }

    /// Conditional statements whose flag was enabled
    #[inline]
    #[must_use]
    pub fn conditional_statements(&self) -> &[ConditionalStatement] {
        &self.conditional_statements
    }

    /// All statements the role ends up with, each distinct statement once
    #[must_use]
    pub fn materialized_statements(&self) -> Vec<&PermissionStatement> {
        let mut out: Vec<&PermissionStatement> = Vec::new();
        let all = self
            .statements
            .iter()
            .chain(self.conditional_statements.iter().map(|c| &c.statement));
        for statement in all {
            if !out.contains(&statement) {
                out.push(statement);
            }
        }
        out
    }

    /// Role ARN within `context`
    pub fn arn(&self, context: &DeploymentContext) -> Result<ResourceIdentifier> {
        context.role(&self.name)
    }
}

/// Compose a role and register its name in `session`
///
/// Fails with [`crate::PlanError::DuplicateRoleName`] if the name is
/// already taken in this session.
pub fn compose_role(
    session: &mut ConstructionSession,
    name: impl Into<String>,
    principal: TrustedPrincipal,
    statements: Vec<PermissionStatement>,
    conditional: Vec<ConditionalStatement>,
) -> Result<ExecutionRole> {
    let name = name.into();
    session.register_role(&name)?;

    let total = conditional.len();
    let conditional_statements: Vec<ConditionalStatement> = conditional
        .into_iter()
        .filter(|c| session.is_enabled(&c.flag))
        .collect();

    debug!(
        session = %session.id(),
        role = %name,
        principal = principal.service(),
        statements = statements.len(),
        conditional = conditional_statements.len(),
        skipped = total - conditional_statements.len(),
        "composed role"
    );

    Ok(ExecutionRole {
        name,
        principal,
        description: String::new(),
        statements,
        conditional_statements,
    })
}

/// Like [`compose_role`], with a description for the provisioning engine
pub fn compose_described_role(
    session: &mut ConstructionSession,
    name: impl Into<String>,
    description: impl Into<String>,
    principal: TrustedPrincipal,
    statements: Vec<PermissionStatement>,
    conditional: Vec<ConditionalStatement>,
) -> Result<ExecutionRole> {
    let mut role = compose_role(session, name, principal, statements, conditional)?;
    role.description = description.into();
    Ok(role)
}
