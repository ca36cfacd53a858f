//! Aspect engine
//!
//! [run] walks the tree in pre-order and asks every policy about every node. Raw findings are
//! filtered through the [SuppressionRegistry], what survives is classified into [Violation]s.
//!
//! The engine keeps no state between runs. A policy that fails aborts the run, there is no
//! partial report.
use crate::policy::{PolicyError, PolicySet};
use crate::resource_tree::{Node, ResourceTree};
use crate::suppression::{SuppressionMatch, SuppressionRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// A finding that was not suppressed
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Violation {
    pub rule_id: String,
    pub path: String,
    pub resource_type: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DiagnosticsReport {
    /// In traversal order, per node in policy order
    pub violations: Vec<Violation>,
    pub suppressed_count: usize,
    pub passed: bool,
    /// One entry per suppressed finding
    pub suppressions: Vec<SuppressionMatch>,
}

impl DiagnosticsReport {
    pub fn errors(&self) -> impl Iterator<Item = &Violation> {
        self.with_severity(Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.with_severity(Severity::Warning)
    }

    fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(move |violation| violation.severity == severity)
    }
}

#[derive(thiserror::Error, Debug)]
#[error("policy {policy} failed on {path}")]
pub struct PolicyDefect {
    pub policy: String,
    pub path: String,
    #[source]
    pub source: PolicyError,
}

#[tracing::instrument(
    skip_all,
    fields(nodes = tree.len(), policies = policies.len(), strict = strict)
)]
pub fn run(
    tree: &ResourceTree,
    policies: &PolicySet,
    suppressions: &SuppressionRegistry,
    strict: bool,
) -> Result<DiagnosticsReport, PolicyDefect> {
    let mut violations = vec![];
    let mut audit = vec![];

    for node in tree {
        for policy in policies.iter() {
            let findings = policy.evaluate(node).map_err(|source| PolicyDefect {
                policy: policy.name().to_string(),
                path: node.path().to_string(),
                source,
            })?;

            for finding in findings {
                if let Some(suppression) = suppressions.lookup(&finding.rule_id, node.path()) {
                    tracing::debug!(
                        rule = %finding.rule_id,
                        path = node.path(),
                        scope = %suppression.scope(),
                        "finding suppressed"
                    );
                    audit.push(SuppressionMatch {
                        rule_id: finding.rule_id,
                        path: node.path().to_string(),
                        scope: suppression.scope(),
                        reason: suppression.reason.clone(),
                    });
                    continue;
                }

                let severity = if strict || finding.force_error {
                    Severity::Error
                } else {
                    Severity::Warning
                };

                violations.push(violation(node, finding.rule_id, finding.message, severity));
            }
        }
    }

    let passed = violations
        .iter()
        .all(|violation| violation.severity != Severity::Error);

    tracing::info!(
        violations = violations.len(),
        suppressed = audit.len(),
        passed,
        "run finished"
    );

    Ok(DiagnosticsReport {
        violations,
        suppressed_count: audit.len(),
        passed,
        suppressions: audit,
    })
}

fn violation(node: &Node, rule_id: String, message: String, severity: Severity) -> Violation {
    Violation {
        rule_id,
        path: node.path().to_string(),
        resource_type: node.resource_type().to_string(),
        severity,
        message,
    }
}
