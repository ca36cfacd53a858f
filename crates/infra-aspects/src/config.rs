//! Aspect configuration
//!
//! Everything the engine needs besides the resource tree is read from an hcl file before a run
//! starts. Invalid configuration never reaches the engine.
//!
//! ```hcl
//! strict  = false
//! verbose = false
//!
//! tag_policy {
//!   required_tags = ["Owner", "Purpose"]
//!   exclude_types = ["custom-resource-provider"]
//! }
//!
//! rule "encryption-at-rest-missing" {
//!   message        = "data must be encrypted at rest"
//!   resource_types = ["storage-bucket"]
//!   check          = self.encrypted
//!   force_error    = true
//! }
//!
//! suppression "missing-documentation-tag" {
//!   path   = "/root/legacy-bucket"
//!   reason = "tracked in the decommissioning plan"
//! }
//! ```
use crate::hcl_documents::{evaluate_literal, Document, HclDocuments, LoadError};
use crate::policy::{CompliancePolicy, ComplianceRule, PolicySet, RuleCatalog, TagPolicy};
use crate::suppression::{Suppression, SuppressionRegistry};
use crate::value::Value;
use hcl_edit::structure::{Attribute, Block};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum ConfigurationError {
    #[error("malformed rule id {0:?}")]
    MalformedRuleId(String),
    #[error("suppression of {rule_id} has no reason")]
    EmptyReason { rule_id: String },
    #[error("suppression of {rule_id} has malformed path {path:?}, expected an absolute path")]
    MalformedPath { rule_id: String, path: String },
    #[error("{rule_id} is suppressed more than once for {scope}")]
    DuplicateSuppression { rule_id: String, scope: String },
    #[error("policy {0} is registered more than once")]
    DuplicatePolicy(String),
    #[error("rule {rule_id}: {reason}")]
    MalformedRule { rule_id: String, reason: String },
    #[error("{origin}: {reason}")]
    Invalid { origin: String, reason: String },
    #[error("Unable to load configuration")]
    Load(#[from] LoadError),
}

/// Configured policies, suppressions and flags
#[derive(Debug, Default)]
pub struct AspectConfig {
    pub strict: bool,
    /// Print suppressed findings too, does not influence severities
    pub verbose: bool,
    pub tag_policy: Option<TagPolicy>,
    pub catalog: RuleCatalog,
    pub suppressions: SuppressionRegistry,
}

impl AspectConfig {
    pub fn load(file_path: &Path) -> Result<Self, ConfigurationError> {
        let mut documents = HclDocuments::default();
        documents.load_file(file_path)?;
        Self::from_documents(&documents)
    }

    pub fn from_documents(documents: &HclDocuments) -> Result<Self, ConfigurationError> {
        let mut config = Self::default();
        let mut suppressions = vec![];

        for (document, attribute) in documents.attributes() {
            match attribute.key.value().as_str() {
                "strict" => config.strict = boolean(document, attribute)?,
                "verbose" => config.verbose = boolean(document, attribute)?,
                key => return Err(invalid(document, format!("unknown setting `{key}`"))),
            }
        }

        for (document, block) in documents.blocks() {
            match block.ident.value().as_str() {
                "tag_policy" => {
                    if config.tag_policy.is_some() {
                        return Err(invalid(document, "tag_policy is defined more than once"));
                    }
                    config.tag_policy = Some(tag_policy(document, block)?);
                }
                "rule" => config.catalog.insert(rule(document, block)?)?,
                "suppression" => suppressions.push(suppression(document, block)?),
                ident => return Err(invalid(document, format!("unknown block type `{ident}`"))),
            }
        }

        config.suppressions = SuppressionRegistry::new(suppressions)?;

        tracing::debug!(
            strict = config.strict,
            rules = config.catalog.len(),
            suppressions = config.suppressions.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Tag policy first, then the compliance catalog
    pub fn policies(&self) -> Result<PolicySet, ConfigurationError> {
        let mut policies = PolicySet::default();

        if let Some(tag_policy) = &self.tag_policy {
            policies.register(tag_policy.clone())?;
        }

        if !self.catalog.is_empty() {
            policies.register(CompliancePolicy::new(self.catalog.clone()))?;
        }

        Ok(policies)
    }
}

fn tag_policy(document: &Document, block: &Block) -> Result<TagPolicy, ConfigurationError> {
    labels(document, block, 0)?;

    let mut required_tags = vec![];
    let mut excluded_types = vec![];
    for attribute in block.body.attributes() {
        match attribute.key.value().as_str() {
            "required_tags" => required_tags = strings(document, attribute)?,
            "exclude_types" => excluded_types = strings(document, attribute)?,
            key => return Err(invalid(document, format!("unknown tag_policy setting `{key}`"))),
        }
    }

    Ok(excluded_types
        .into_iter()
        .fold(TagPolicy::new(required_tags), |policy, resource_type| {
            policy.exclude_type(resource_type)
        }))
}

fn rule(document: &Document, block: &Block) -> Result<ComplianceRule, ConfigurationError> {
    let rule_id = labels(document, block, 1)?.remove(0);

    let mut message = None;
    let mut check = None;
    let mut resource_types = vec![];
    let mut force_error = false;
    for attribute in block.body.attributes() {
        match attribute.key.value().as_str() {
            "message" => message = Some(string(document, attribute)?),
            "check" => check = Some(hcl::Expression::from(attribute.value.clone())),
            "resource_types" => resource_types = strings(document, attribute)?,
            "force_error" => force_error = boolean(document, attribute)?,
            key => {
                return Err(invalid(
                    document,
                    format!("unknown setting `{key}` in rule {rule_id}"),
                ))
            }
        }
    }

    let Some(check) = check else {
        return Err(ConfigurationError::MalformedRule {
            rule_id,
            reason: "check is missing".to_string(),
        });
    };
    let message = message.unwrap_or_else(|| format!("{rule_id} is not satisfied"));

    Ok(ComplianceRule::new(rule_id, message, check)?
        .for_types(resource_types)
        .with_force_error(force_error))
}

fn suppression(document: &Document, block: &Block) -> Result<Suppression, ConfigurationError> {
    let rule_id = labels(document, block, 1)?.remove(0);

    let mut path = None;
    let mut reason = String::new();
    for attribute in block.body.attributes() {
        match attribute.key.value().as_str() {
            "path" => path = Some(string(document, attribute)?),
            "reason" => reason = string(document, attribute)?,
            key => {
                return Err(invalid(
                    document,
                    format!("unknown setting `{key}` in suppression of {rule_id}"),
                ))
            }
        }
    }

    Ok(Suppression::new(rule_id, path, reason))
}

fn labels(
    document: &Document,
    block: &Block,
    expected: usize,
) -> Result<Vec<String>, ConfigurationError> {
    if block.labels.len() != expected {
        return Err(invalid(
            document,
            format!(
                "{} expects {expected} label(s), found {}",
                block.ident.value().as_str(),
                block.labels.len()
            ),
        ));
    }

    Ok(block
        .labels
        .iter()
        .map(|label| label.as_str().to_string())
        .collect())
}

fn literal(document: &Document, attribute: &Attribute) -> Result<Value, ConfigurationError> {
    evaluate_literal(&attribute.value).ok_or_else(|| {
        invalid(
            document,
            format!("`{}` must be a literal", attribute.key.value().as_str()),
        )
    })
}

fn boolean(document: &Document, attribute: &Attribute) -> Result<bool, ConfigurationError> {
    match literal(document, attribute)? {
        Value::Boolean(value) => Ok(value),
        _ => Err(expected(document, attribute, "a boolean")),
    }
}

fn string(document: &Document, attribute: &Attribute) -> Result<String, ConfigurationError> {
    match literal(document, attribute)? {
        Value::String(value) => Ok(value),
        _ => Err(expected(document, attribute, "a string")),
    }
}

fn strings(document: &Document, attribute: &Attribute) -> Result<Vec<String>, ConfigurationError> {
    let Value::Array(values) = literal(document, attribute)? else {
        return Err(expected(document, attribute, "a list of strings"));
    };

    values
        .into_iter()
        .map(|value| match value {
            Value::String(value) => Ok(value),
            _ => Err(expected(document, attribute, "a list of strings")),
        })
        .collect()
}

fn expected(document: &Document, attribute: &Attribute, what: &str) -> ConfigurationError {
    invalid(
        document,
        format!("`{}` must be {what}", attribute.key.value().as_str()),
    )
}

fn invalid(document: &Document, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::Invalid {
        origin: document.origin(),
        reason: reason.into(),
    }
}
