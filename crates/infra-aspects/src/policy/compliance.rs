//! Catalog based best-practice checks
//!
//! Rules are data. Each [ComplianceRule] carries an hcl expression that is evaluated per node
//! with two variables in scope:
//!
//! | variable   | content                                              |
//! |------------|------------------------------------------------------|
//! | `self`     | the node's properties                                |
//! | `resource` | `{ id, path, type, tags }` of the node                |
//!
//! ```hcl
//! rule "encryption-at-rest-missing" {
//!   message        = "data must be encrypted at rest"
//!   resource_types = ["storage-bucket", "table"]
//!   check          = self.encryption != "none"
//! }
//! ```
//!
//! `true` means compliant. A check that reads a property the node does not have, or looks into a
//! property that is null or of another shape than expected, is treated as non-compliant, so
//! "property must be set" needs no special syntax. Anything else that makes the check fail, or a
//! result that is not a boolean, is a defect of the rule.
use super::{is_valid_rule_id, Finding, Policy, PolicyError};
use crate::config::ConfigurationError;
use crate::resource_tree::Node;
use crate::visit::{Reference, VisitReferences};
use hcl::eval::{Context, ErrorKind, Evaluate};
use indexmap::{IndexMap, IndexSet};

/// Variables a check may refer to
const CHECK_VARIABLES: [&str; 2] = ["self", "resource"];

#[derive(Debug, Clone)]
pub struct ComplianceRule {
    id: String,
    message: String,
    resource_types: IndexSet<String>,
    check: hcl::Expression,
    force_error: bool,
}

impl ComplianceRule {
    /// Validates the rule id and the variables used by `check`
    pub fn new(
        id: impl Into<String>,
        message: impl Into<String>,
        check: hcl::Expression,
    ) -> Result<Self, ConfigurationError> {
        let id = id.into();
        if !is_valid_rule_id(&id) {
            return Err(ConfigurationError::MalformedRuleId(id));
        }

        let mut unknown = vec![];
        check.visit_references(&mut |reference: &Reference| match reference {
            Reference::Variable(name) if CHECK_VARIABLES.contains(&name.as_str()) => {}
            Reference::Variable(name) => unknown.push(format!("unknown variable `{name}`")),
            Reference::Function => unknown.push("function calls are not supported".to_string()),
        });

        if let Some(reason) = unknown.into_iter().next() {
            return Err(ConfigurationError::MalformedRule { rule_id: id, reason });
        }

        Ok(Self {
            id,
            message: message.into(),
            resource_types: Default::default(),
            check,
            force_error: false,
        })
    }

    /// Convenience constructor parsing `check` from hcl source
    pub fn parse(
        id: impl Into<String>,
        message: impl Into<String>,
        check: &str,
    ) -> Result<Self, ConfigurationError> {
        let id = id.into();
        let check = check
            .parse::<hcl_edit::expr::Expression>()
            .map_err(|err| ConfigurationError::MalformedRule {
                rule_id: id.clone(),
                reason: err.to_string(),
            })?;

        Self::new(id, message, check.into())
    }

    /// Restrict the rule to the given resource types, an empty list applies to all types
    pub fn for_types<I, S>(mut self, resource_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resource_types = resource_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_force_error(mut self, force_error: bool) -> Self {
        self.force_error = force_error;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn applies_to(&self, node: &Node) -> bool {
        self.resource_types.is_empty() || self.resource_types.contains(node.resource_type())
    }

    /// `None` when compliant, otherwise the finding
    fn evaluate(&self, context: &Context) -> Result<Option<Finding>, PolicyError> {
        let mut check = self.check.clone();

        if let Err(errors) = check.evaluate_in_place(context) {
            let shape_errors: Option<Vec<String>> =
                errors.iter().map(|err| shape_error(err.kind())).collect();

            let Some(shape_errors) = shape_errors else {
                return Err(format!("check of rule {} failed: {errors}", self.id).into());
            };

            let message = format!("{} ({})", self.message, shape_errors.join(", "));
            return Ok(Some(self.finding(message)));
        }

        match check {
            hcl::Expression::Bool(true) => Ok(None),
            hcl::Expression::Bool(false) => Ok(Some(self.finding(self.message.clone()))),
            other => Err(format!(
                "check of rule {} must evaluate to a boolean, got `{}`",
                self.id,
                hcl::format::to_string(&other).unwrap_or_else(|_| format!("{other:?}"))
            )
            .into()),
        }
    }

    fn finding(&self, message: String) -> Finding {
        let finding = Finding::new(self.id.as_str(), message);
        if self.force_error {
            finding.forced()
        } else {
            finding
        }
    }
}

/// Describes errors caused by the shape of the node's values
///
/// Reading `self.encryption.enabled` from a node whose `encryption` is missing, null or a
/// string says something about the node, not about the rule. Everything else (undefined
/// functions, operators applied to incompatible operands, ...) is `None`.
fn shape_error(kind: &ErrorKind) -> Option<String> {
    match kind {
        ErrorKind::NoSuchKey(key) => Some(format!("missing {key}")),
        ErrorKind::Index(index) => Some(format!("missing index {index}")),
        ErrorKind::Unexpected(_, expected) => Some(format!("expected {expected}")),
        _ => None,
    }
}

/// Ordered collection of [ComplianceRule]s with unique ids
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    rules: IndexMap<String, ComplianceRule>,
}

impl RuleCatalog {
    pub fn insert(&mut self, rule: ComplianceRule) -> Result<(), ConfigurationError> {
        if self.rules.contains_key(rule.id()) {
            return Err(ConfigurationError::MalformedRule {
                rule_id: rule.id,
                reason: "defined more than once".to_string(),
            });
        }

        self.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    pub fn rules(&self) -> impl Iterator<Item = &ComplianceRule> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Evaluates every applicable rule of a [RuleCatalog], in catalog order
#[derive(Debug, Clone)]
pub struct CompliancePolicy {
    name: String,
    catalog: RuleCatalog,
}

impl CompliancePolicy {
    pub fn new(catalog: RuleCatalog) -> Self {
        Self::named("compliance", catalog)
    }

    /// Use distinct names to register more than one catalog
    pub fn named(name: impl Into<String>, catalog: RuleCatalog) -> Self {
        Self {
            name: name.into(),
            catalog,
        }
    }
}

impl Policy for CompliancePolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, node: &Node) -> Result<Vec<Finding>, PolicyError> {
        let mut applicable = self
            .catalog
            .rules()
            .filter(|rule| rule.applies_to(node))
            .peekable();
        if applicable.peek().is_none() {
            return Ok(vec![]);
        }

        let context = node_context(node);
        let mut findings = vec![];
        for rule in applicable {
            if let Some(finding) = rule.evaluate(&context)? {
                tracing::trace!(rule = rule.id(), path = node.path(), "non-compliant");
                findings.push(finding);
            }
        }

        Ok(findings)
    }
}

fn node_context(node: &Node) -> Context<'static> {
    let tags: hcl::value::Map<String, hcl::Value> = node
        .tags()
        .iter()
        .map(|(key, value)| (key.clone(), hcl::Value::String(value.clone())))
        .collect();

    let mut resource = hcl::value::Map::new();
    resource.insert("id".to_string(), hcl::Value::String(node.id().to_string()));
    resource.insert("path".to_string(), hcl::Value::String(node.path().to_string()));
    resource.insert("type".to_string(), hcl::Value::String(node.resource_type().to_string()));
    resource.insert("tags".to_string(), hcl::Value::Object(tags));

    let mut context = Context::new();
    context.declare_var(
        hcl::Identifier::unchecked("self"),
        hcl::Value::from(node.properties()),
    );
    context.declare_var(
        hcl::Identifier::unchecked("resource"),
        hcl::Value::Object(resource),
    );
    context
}
