//! Resource declarations in hcl
//!
//! ```hcl
//! default_tags = { Project = "shop" }
//!
//! resource "storage-bucket" "assets" {
//!   tags      = { Owner = "team-x" }
//!   encrypted = true
//!
//!   resource "bucket-policy" "public-read" {
//!     statements = ["s3:GetObject"]
//!   }
//!
//!   output "bucket-name" {
//!     value = "assets"
//!   }
//! }
//! ```
//!
//! - `resource <type> <id>` declares a node which is taggable unless `taggable = false`
//! - `output <id>` and `metadata <id>` declare nodes that can not carry tags
//! - `tags` are the node's own tags, `default_tags` are propagated to all taggable nodes of the
//!   subtree ([ResourceTree::apply_tags]) without overriding tags a node declares itself. The
//!   closest `default_tags` win over those of enclosing blocks
//! - every other attribute becomes a property of the node and must be a literal
//!
//! All root blocks of all documents become children of a single, non-taggable root node of
//! type [ROOT_TYPE].
use crate::hcl_documents::{evaluate_literal, Document, HclDocuments};
use crate::resource_tree::{NodeDeclaration, ResourceTree, StructuralError, Tags, TreeBuilder};
use crate::value::Value;
use hcl_edit::structure::{Block, Structure};

pub const ROOT_TYPE: &str = "app";
pub const OUTPUT_TYPE: &str = "deployment-output";
pub const METADATA_TYPE: &str = "metadata";

/// Builds the resource tree declared by `documents` below a root node `/<root_id>`
pub fn build_tree(
    documents: &HclDocuments,
    root_id: &str,
) -> Result<ResourceTree, DeclarationError> {
    let root_path = format!("/{root_id}");
    let mut parser = Parser::default();

    parser
        .builder
        .declare(NodeDeclaration::new(root_path.as_str(), ROOT_TYPE).with_taggable(false));

    for (document, attribute) in documents.attributes() {
        match attribute.key.value().as_str() {
            "default_tags" => {
                if let Some(tags) = parser.tags(document, &root_path, &attribute.value) {
                    parser.default_tags.push((root_path.clone(), tags));
                }
            }
            key => parser.issues.log(Issue::RootAttribute {
                origin: document.origin(),
                key: key.to_string(),
            }),
        }
    }

    for (document, block) in documents.blocks() {
        parser.block(document, &root_path, block);
    }

    let Parser {
        builder,
        issues,
        default_tags,
    } = parser;

    if !issues.issues.is_empty() {
        return Err(issues.into());
    }

    // innermost first, so the closest default_tags fill a gap before outer ones do
    let mut default_tags = default_tags;
    default_tags.sort_by_key(|(path, _)| std::cmp::Reverse(path.matches('/').count()));

    let mut tree = builder.build()?;
    for (path, tags) in default_tags {
        tree = tree.apply_tags(&path, &tags)?;
    }

    Ok(tree)
}

#[derive(Default)]
struct Parser {
    builder: TreeBuilder,
    issues: DeclarationIssues,
    /// (subtree path, tags) in declaration order
    default_tags: Vec<(String, Tags)>,
}

impl Parser {
    fn block(&mut self, document: &Document, parent: &str, block: &Block) {
        let ident = block.ident.value().as_str();
        let labels: Vec<&str> = block.labels.iter().map(|label| label.as_str()).collect();

        let (resource_type, id, taggable) = match (ident, labels.as_slice()) {
            ("resource", [resource_type, id]) => (resource_type.to_string(), *id, true),
            ("output", [id]) => (OUTPUT_TYPE.to_string(), *id, false),
            ("metadata", [id]) => (METADATA_TYPE.to_string(), *id, false),
            ("resource" | "output" | "metadata", _) => {
                self.issues.log(Issue::LabelMismatch {
                    origin: document.origin(),
                    ident: ident.to_string(),
                    found: labels.len(),
                });
                return;
            }
            _ => {
                self.issues.log(Issue::UnknownBlockType {
                    origin: document.origin(),
                    ident: ident.to_string(),
                });
                return;
            }
        };

        if id.is_empty() || id.contains('/') {
            self.issues.log(Issue::InvalidId {
                origin: document.origin(),
                id: id.to_string(),
            });
            return;
        }

        let path = format!("{parent}/{id}");
        let mut declaration = NodeDeclaration::new(path.as_str(), resource_type);
        declaration.taggable = taggable;
        let mut properties = indexmap::IndexMap::new();

        for structure in block.body.iter() {
            match structure {
                Structure::Attribute(attribute) => match attribute.key.value().as_str() {
                    "tags" if !taggable => self.issues.log(Issue::TagsOnUntaggable {
                        origin: document.origin(),
                        path: path.clone(),
                    }),
                    "tags" => {
                        if let Some(tags) = self.tags(document, &path, &attribute.value) {
                            declaration.tags = tags;
                        }
                    }
                    "default_tags" => {
                        if let Some(tags) = self.tags(document, &path, &attribute.value) {
                            self.default_tags.push((path.clone(), tags));
                        }
                    }
                    "taggable" if ident == "resource" => {
                        match evaluate_literal(&attribute.value) {
                            Some(Value::Boolean(value)) => declaration.taggable = value,
                            _ => self.issues.log(Issue::InvalidProperty {
                                origin: document.origin(),
                                path: path.clone(),
                                key: "taggable".to_string(),
                            }),
                        }
                    }
                    key => match evaluate_literal(&attribute.value) {
                        Some(value) => {
                            properties.insert(key.to_string(), value);
                        }
                        None => self.issues.log(Issue::InvalidProperty {
                            origin: document.origin(),
                            path: path.clone(),
                            key: key.to_string(),
                        }),
                    },
                },
                Structure::Block(child) if ident == "resource" => {
                    self.block(document, &path, child);
                }
                Structure::Block(child) => self.issues.log(Issue::UnexpectedChild {
                    origin: document.origin(),
                    path: path.clone(),
                    ident: child.ident.value().as_str().to_string(),
                }),
            }
        }

        // an untaggable resource can not have tags of its own either
        if !declaration.taggable && !declaration.tags.is_empty() {
            self.issues.log(Issue::TagsOnUntaggable {
                origin: document.origin(),
                path: path.clone(),
            });
        }

        declaration.properties = Value::Object(properties);
        self.builder.declare(declaration);
    }

    fn tags(
        &mut self,
        document: &Document,
        path: &str,
        expression: &hcl_edit::expr::Expression,
    ) -> Option<Tags> {
        let tags = match evaluate_literal(expression) {
            Some(Value::Object(object)) => object
                .into_iter()
                .map(|(key, value)| match value {
                    Value::String(value) => Some((key, value)),
                    _ => None,
                })
                .collect::<Option<Tags>>(),
            _ => None,
        };

        if tags.is_none() {
            self.issues.log(Issue::InvalidTags {
                origin: document.origin(),
                path: path.to_string(),
            });
        }

        tags
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DeclarationError {
    #[error(transparent)]
    Issues(#[from] DeclarationIssues),
    #[error(transparent)]
    Structural(#[from] StructuralError),
}

/// All issues found while reading declarations
#[derive(derive_new::new, Debug, Default)]
pub struct DeclarationIssues {
    #[new(default)]
    issues: Vec<Issue>,
}

impl DeclarationIssues {
    pub fn log(&mut self, issue: Issue) {
        tracing::trace!(?issue, "issue found");
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }
}

impl std::error::Error for DeclarationIssues {}

impl std::fmt::Display for DeclarationIssues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, issue) in self.issues.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Issue {
    #[error("{origin}: unexpected root attribute `{key}`")]
    RootAttribute { origin: String, key: String },
    #[error("{origin}: unknown block type `{ident}`")]
    UnknownBlockType { origin: String, ident: String },
    #[error("{origin}: `{ident}` block with {found} label(s)")]
    LabelMismatch {
        origin: String,
        ident: String,
        found: usize,
    },
    #[error("{origin}: invalid id {id:?}")]
    InvalidId { origin: String, id: String },
    #[error("{origin}: {path} can not carry tags")]
    TagsOnUntaggable { origin: String, path: String },
    #[error("{origin}: tags of {path} must be an object of strings")]
    InvalidTags { origin: String, path: String },
    #[error("{origin}: property `{key}` of {path} must be a literal")]
    InvalidProperty {
        origin: String,
        path: String,
        key: String,
    },
    #[error("{origin}: `{ident}` block is not allowed inside {path}")]
    UnexpectedChild {
        origin: String,
        path: String,
        ident: String,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hcl_documents;
    use crate::resource_tree::Node;
    use pretty_assertions::assert_eq;

    fn issues_for(documents: HclDocuments) -> Vec<Issue> {
        match build_tree(&documents, "root").expect_err("must error") {
            DeclarationError::Issues(issues) => issues.issues().to_vec(),
            DeclarationError::Structural(err) => panic!("unexpected structural error {err}"),
        }
    }

    #[test]
    fn nested_declarations() {
        let tree = build_tree(
            &hcl_documents! {r#"
            default_tags = { Project = "shop" }

            resource "storage-bucket" "assets" {
              tags      = { Owner = "team-x", "cost-center" = "" }
              encrypted = true

              resource "bucket-policy" "public-read" {
                statements = ["s3:GetObject"]
              }

              output "bucket-name" {
                value = "assets"
              }
            }

            metadata "cdk-metadata" {}
            "#},
            "root",
        )
        .expect("valid declarations");

        let paths: Vec<_> = tree.iter().map(Node::path).collect();
        assert_eq!(
            paths,
            vec![
                "/root",
                "/root/assets",
                "/root/assets/public-read",
                "/root/assets/bucket-name",
                "/root/cdk-metadata"
            ]
        );

        let assets = tree.get("/root/assets").expect("assets");
        assert_eq!(assets.resource_type(), "storage-bucket");
        assert_eq!(
            assets.tags().keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["Owner", "cost-center", "Project"]
        );
        assert_eq!(assets.properties().get("encrypted"), Some(&Value::Boolean(true)));

        let policy = tree.get("/root/assets/public-read").expect("policy");
        assert_eq!(policy.tags().get("Project").map(String::as_str), Some("shop"));

        let output = tree.get("/root/assets/bucket-name").expect("output");
        assert_eq!(output.resource_type(), OUTPUT_TYPE);
        assert!(!output.taggable());
        assert!(output.tags().is_empty());

        assert!(!tree.root().taggable());
        assert_eq!(tree.root().resource_type(), ROOT_TYPE);
    }

    #[test]
    fn closest_default_tags_win() {
        let tree = build_tree(
            &hcl_documents! {r#"
            default_tags = { Owner = "platform", Project = "shop" }

            resource "network" "vpc" {
              resource "subnet" "private" {}
              default_tags = { Owner = "team-net" }
            }
            "#},
            "root",
        )
        .expect("valid declarations");

        let subnet = tree.get("/root/vpc/private").expect("subnet");
        assert_eq!(subnet.tags().get("Owner").map(String::as_str), Some("team-net"));
        assert_eq!(subnet.tags().get("Project").map(String::as_str), Some("shop"));
    }

    #[test]
    fn untaggable_resource() {
        let tree = build_tree(
            &hcl_documents! {r#"
            resource "custom-resource-provider" "helper" {
              taggable = false
            }
            "#},
            "app",
        )
        .expect("valid declarations");

        let helper = tree.get("/app/helper").expect("helper");
        assert!(!helper.taggable());
        assert_eq!(helper.properties(), &Value::Object(Default::default()));
    }

    #[test]
    fn collects_all_issues() {
        let issues = issues_for(hcl_documents! {r#"
        region = "eu-west-1"
        bucket "x" {}
        resource "only-type" {}
        output "o" { tags = { A = "b" } }
        resource "t" "a/b" {}
        resource "t" "c" { size = var.size }
        resource "t" "d" { tags = { A = 1 } }
        output "e" { resource "t" "f" {} }
        "#});

        assert_eq!(
            issues,
            vec![
                Issue::RootAttribute {
                    origin: "<stdin>".into(),
                    key: "region".into()
                },
                Issue::UnknownBlockType {
                    origin: "<stdin>".into(),
                    ident: "bucket".into()
                },
                Issue::LabelMismatch {
                    origin: "<stdin>".into(),
                    ident: "resource".into(),
                    found: 1
                },
                Issue::TagsOnUntaggable {
                    origin: "<stdin>".into(),
                    path: "/root/o".into()
                },
                Issue::InvalidId {
                    origin: "<stdin>".into(),
                    id: "a/b".into()
                },
                Issue::InvalidProperty {
                    origin: "<stdin>".into(),
                    path: "/root/c".into(),
                    key: "size".into()
                },
                Issue::InvalidTags {
                    origin: "<stdin>".into(),
                    path: "/root/d".into()
                },
                Issue::UnexpectedChild {
                    origin: "<stdin>".into(),
                    path: "/root/e".into(),
                    ident: "resource".into()
                },
            ]
        );
    }

    #[test]
    fn duplicate_ids_are_structural_errors() {
        let err = build_tree(
            &hcl_documents! {
                "a.infra.hcl" => r#"resource "storage-bucket" "assets" {}"#,
                "b.infra.hcl" => r#"resource "table" "assets" {}"#
            },
            "root",
        )
        .expect_err("duplicate");

        let DeclarationError::Structural(StructuralError::DuplicatePath(path)) = err else {
            panic!("expected a duplicate path, got {err:?}");
        };
        assert_eq!(path, "/root/assets");
    }
}
