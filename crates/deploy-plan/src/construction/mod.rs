//! Construction Phase
//!
//! Everything needed to turn a deployment description into a validated
//! `PipelinePlan`. All validation happens here; the provisioning engine
//! receives a plan that is already known to be well ordered and
//! minimally scoped.
//!
//! # Build lifecycle
//!
//! 1. Create a `PlanBuilder` (opens a fresh construction session and
//!    resolves feature flags)
//! 2. Compose roles, generate names, add stages
//! 3. `build()` validates ordering and ends the session

pub mod builder;

pub use builder::PlanBuilder;
