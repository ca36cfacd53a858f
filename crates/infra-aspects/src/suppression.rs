//! Justified exemptions from rules
//!
//! A [Suppression] without a path applies to every node, one with a path only to findings at
//! exactly that path. When both exist for the same finding the path specific one wins, which is
//! visible in the audit trail ([SuppressionMatch::scope]).
use crate::config::ConfigurationError;
use crate::policy::is_valid_rule_id;
use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, serde::Serialize, derive_new::new)]
pub struct Suppression {
    #[new(into)]
    pub rule_id: String,
    pub path: Option<String>,
    #[new(into)]
    pub reason: String,
}

impl Suppression {
    pub fn global(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(rule_id, None, reason)
    }

    pub fn at(
        rule_id: impl Into<String>,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(rule_id, Some(path.into()), reason)
    }

    pub fn scope(&self) -> Scope {
        match self.path {
            Some(_) => Scope::Path,
            None => Scope::Global,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Suppression for one exact path
    Path,
    /// Suppression for every node
    Global,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Path => f.write_str("path"),
            Scope::Global => f.write_str("global"),
        }
    }
}

/// Audit record of a finding that was suppressed
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SuppressionMatch {
    pub rule_id: String,
    /// Path of the suppressed finding
    pub path: String,
    /// Which suppression fired
    pub scope: Scope,
    pub reason: String,
}

/// Validated, immutable lookup structure for [Suppression]s
#[derive(Debug, Clone, Default)]
pub struct SuppressionRegistry {
    /// rule id -> path -> suppression
    by_path: IndexMap<String, IndexMap<String, Suppression>>,
    /// rule id -> suppression
    global: IndexMap<String, Suppression>,
}

impl SuppressionRegistry {
    /// Validates all records, the first invalid one is returned as error
    pub fn new(
        suppressions: impl IntoIterator<Item = Suppression>,
    ) -> Result<Self, ConfigurationError> {
        let mut registry = Self::default();
        for suppression in suppressions {
            registry.insert(suppression)?;
        }
        Ok(registry)
    }

    fn insert(&mut self, suppression: Suppression) -> Result<(), ConfigurationError> {
        if !is_valid_rule_id(&suppression.rule_id) {
            return Err(ConfigurationError::MalformedRuleId(suppression.rule_id));
        }

        if suppression.reason.trim().is_empty() {
            return Err(ConfigurationError::EmptyReason {
                rule_id: suppression.rule_id,
            });
        }

        let duplicate = match &suppression.path {
            Some(path) => {
                if !path.starts_with('/') {
                    return Err(ConfigurationError::MalformedPath {
                        rule_id: suppression.rule_id,
                        path: path.clone(),
                    });
                }

                self.by_path
                    .entry(suppression.rule_id.clone())
                    .or_default()
                    .insert(path.clone(), suppression.clone())
            }
            None => self
                .global
                .insert(suppression.rule_id.clone(), suppression.clone()),
        };

        if duplicate.is_some() {
            return Err(ConfigurationError::DuplicateSuppression {
                rule_id: suppression.rule_id,
                scope: suppression.path.unwrap_or_else(|| "all paths".to_string()),
            });
        }

        tracing::trace!(
            rule = %suppression.rule_id,
            path = ?suppression.path,
            "suppression registered"
        );
        Ok(())
    }

    /// The suppression that applies to `rule_id` at `path`, path specific ones first
    pub fn lookup(&self, rule_id: &str, path: &str) -> Option<&Suppression> {
        self.by_path
            .get(rule_id)
            .and_then(|paths| paths.get(path))
            .or_else(|| self.global.get(rule_id))
    }

    /// All suppressions, path specific ones first
    pub fn iter(&self) -> impl Iterator<Item = &Suppression> {
        self.by_path
            .values()
            .flat_map(|paths| paths.values())
            .chain(self.global.values())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty() && self.global.is_empty()
    }
}
