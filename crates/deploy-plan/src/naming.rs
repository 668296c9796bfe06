//! Resource namer
//!
//! Generates names for stateful resources (stack sets, stacks) that must
//! not collide across concurrent deployments of the same pipeline.
//!
//! # Entropy budget
//!
//! A name is `<prefix>-<suffix>` where the suffix is the first
//! [`SUFFIX_LEN`] hex characters of a v4 UUID, i.e. [`SUFFIX_ENTROPY_BITS`]
//! bits drawn from the OS CSPRNG. Across deployments uniqueness is
//! probabilistic: [`collision_probability`] gives the birthday bound, about
//! 1.2% at 10,000 names. Within one construction session uniqueness is
//! guaranteed: a suffix already claimed in the session is redrawn, up to
//! [`MAX_NAME_ATTEMPTS`] times.

use crate::error::{PlanError, Result};
use crate::session::ConstructionSession;
use tracing::warn;
use uuid::Uuid;

/// Separator between prefix and suffix
pub const NAME_SEPARATOR: char = '-';

/// Hex characters in a suffix
pub const SUFFIX_LEN: usize = 8;

/// Random bits in a suffix
pub const SUFFIX_ENTROPY_BITS: u32 = 32;

/// Draws per name before giving up
pub const MAX_NAME_ATTEMPTS: usize = 8;

/// Source of name suffixes
pub trait SuffixSource {
    /// Next candidate suffix
    fn next_suffix(&mut self) -> String;
}

/// Suffixes from v4 UUIDs
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidSuffix;

impl SuffixSource for UuidSuffix {
    fn next_suffix(&mut self) -> String {
        let mut buf = Uuid::encode_buffer();
        let hex = Uuid::new_v4().simple().encode_lower(&mut buf);
        hex[..SUFFIX_LEN].to_string()
    }
}

impl<S: SuffixSource + ?Sized> SuffixSource for Box<S> {
    fn next_suffix(&mut self) -> String {
        (**self).next_suffix()
    }
}

/// Name generator with a bounded collision retry
#[derive(Debug, Clone)]
pub struct ResourceNamer<S = UuidSuffix> {
    source: S,
    max_attempts: usize,
}

impl ResourceNamer<UuidSuffix> {
    /// Namer backed by the OS CSPRNG
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_source(UuidSuffix)
    }
}

impl Default for ResourceNamer<UuidSuffix> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SuffixSource> ResourceNamer<S> {
    /// Namer with a custom suffix source
    #[inline]
    #[must_use]
    pub fn with_source(source: S) -> Self {
        Self {
            source,
            max_attempts: MAX_NAME_ATTEMPTS,
        }
    }

    /// Override the retry bound (minimum 1)
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Generate `prefix-xxxxxxxx`, unique within `session`
    pub fn generate_unique_name(
        &mut self,
        session: &mut ConstructionSession,
        prefix: &str,
    ) -> Result<String> {
        if prefix.is_empty() {
            return Err(PlanError::EmptyName { kind: "name prefix" });
        }

        for attempt in 1..=self.max_attempts {
            let candidate = format!("{prefix}{NAME_SEPARATOR}{}", self.source.next_suffix());
            if session.claim_name(&candidate) {
                return Ok(candidate);
            }
            warn!(session = %session.id(), %candidate, attempt, "generated name collided, redrawing");
        }

        Err(PlanError::NameGenerationExhausted {
            prefix: prefix.to_string(),
            attempts: self.max_attempts,
        })
    }
}

/// Generate a session-unique name with the default namer
pub fn generate_unique_name(session: &mut ConstructionSession, prefix: &str) -> Result<String> {
    ResourceNamer::new().generate_unique_name(session, prefix)
}

/// Birthday-bound probability of any collision among `draws` suffixes
#[must_use]
pub fn collision_probability(draws: u64) -> f64 {
    if draws < 2 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = draws as f64;
    let space = f64::from(2u32).powi(i32::try_from(SUFFIX_ENTROPY_BITS).unwrap_or(i32::MAX));
    1.0 - (-(n * (n - 1.0)) / (2.0 * space)).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_suffix_is_lowercase_hex() {
        let suffix = UuidSuffix.next_suffix();
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn name_has_prefix_and_separator() {
        let mut session = ConstructionSession::default();
        let name = generate_unique_name(&mut session, "model-monitor").unwrap();

        assert!(name.starts_with("model-monitor-"));
        assert_eq!(name.len(), "model-monitor-".len() + SUFFIX_LEN);
        assert!(session.has_name(&name));
    }

    #[test]
    fn empty_prefix_rejected() {
        let mut session = ConstructionSession::default();
        assert!(matches!(
            generate_unique_name(&mut session, ""),
            Err(PlanError::EmptyName { .. })
        ));
    }

    #[test]
    fn collision_budget() {
        assert_eq!(collision_probability(1), 0.0);
        let p = collision_probability(10_000);
        assert!(p > 0.01 && p < 0.02, "p = {p}");
    }
}
