//! Pluggable rules evaluated per [Node]
//!
//! A [Policy] looks at exactly one node at a time and reports what it finds as a list of
//! [Finding]s. Findings are data: a policy that encounters a non-compliant node returns a
//! finding, it only returns `Err` when the policy itself is broken (for example a rule that
//! cannot be evaluated at all). The engine turns such an error into a
//! [PolicyDefect](crate::engine::PolicyDefect) and aborts the run.
//!
//! Policies do not decide about severity. The only exception is [Finding::force_error] for
//! findings that must never be downgraded to a warning.
use crate::config::ConfigurationError;
use crate::resource_tree::Node;

mod compliance;
mod tag_policy;

pub use compliance::{CompliancePolicy, ComplianceRule, RuleCatalog};
pub use tag_policy::{TagPolicy, MISSING_DOCUMENTATION_TAG};

/// Error returned by a defective policy
pub type PolicyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub trait Policy {
    /// Name used in logs and defect reports, unique within a [PolicySet]
    fn name(&self) -> &str;

    fn evaluate(&self, node: &Node) -> Result<Vec<Finding>, PolicyError>;
}

/// An unclassified potential problem at the node that was evaluated
#[derive(Debug, Clone, PartialEq, derive_new::new)]
pub struct Finding {
    #[new(into)]
    pub rule_id: String,
    #[new(into)]
    pub message: String,
    /// Always reported as an error, regardless of strict mode
    #[new(default)]
    pub force_error: bool,
}

impl Finding {
    pub fn forced(mut self) -> Self {
        self.force_error = true;
        self
    }
}

/// Ordered set of registered policies
#[derive(Default)]
pub struct PolicySet {
    policies: Vec<Box<dyn Policy>>,
}

impl PolicySet {
    /// Registers a policy after all previously registered ones
    pub fn register(
        &mut self,
        policy: impl Policy + 'static,
    ) -> Result<&mut Self, ConfigurationError> {
        self.register_boxed(Box::new(policy))
    }

    pub fn register_boxed(
        &mut self,
        policy: Box<dyn Policy>,
    ) -> Result<&mut Self, ConfigurationError> {
        if self.policies.iter().any(|p| p.name() == policy.name()) {
            return Err(ConfigurationError::DuplicatePolicy(policy.name().to_string()));
        }

        tracing::debug!(policy = policy.name(), "policy registered");
        self.policies.push(policy);
        Ok(self)
    }

    /// Policies in registration order
    pub fn iter(&self) -> impl Iterator<Item = &dyn Policy> {
        self.policies.iter().map(|p| p.as_ref())
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl std::fmt::Debug for PolicySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter().map(|p| p.name())).finish()
    }
}

/// Rule ids are non-empty and consist of ascii alphanumerics, `-`, `_` and `.`
pub fn is_valid_rule_id(rule_id: &str) -> bool {
    !rule_id.is_empty()
        && rule_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
