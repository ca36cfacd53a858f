//! # infra-aspects - policy checks over declared infrastructure
//!
//! ## Introduction for developers
//!
//! Read this to understand how `infra-aspects` works internally.
//!
//! ### Loading files
//!
//! Both inputs are hcl. Declarations live in `*.infra.hcl` files, the aspect configuration in a
//! single file (`aspects.hcl` by default). Every document is parsed as a `body`
//! ([hcl_edit::structure::Body]) and stored in [hcl_documents::HclDocuments] together with its
//! source path, so error messages can point at the file a problem came from.
//!
//! ### Building the tree
//!
//! see [declarations::build_tree]
//!
//! `resource`, `output` and `metadata` blocks become [resource_tree::Node]s. Nodes are addressed
//! by their path (`/root/assets/public-read`) and the tree is assembled by
//! [resource_tree::TreeBuilder], which rejects duplicate paths, dangling parents and a missing
//! root. Since a node only names its own path, a cycle can not be written down at all.
//!
//! `default_tags` are applied afterwards with [resource_tree::ResourceTree::apply_tags], which
//! returns a new tree. The tree is never mutated while policies look at it.
//!
//! ### Configuration
//!
//! see [config::AspectConfig]
//!
//! The required tags, the compliance rule catalog and the suppressions are validated before a
//! run starts. Compliance checks are hcl expressions, their variables are checked up front with
//! the reference visitor in `visit`.
//!
//! ### Running
//!
//! see [engine::run]
//!
//! | step     | what happens                                                           |
//! |----------|------------------------------------------------------------------------|
//! | traverse | pre-order, children in declaration order                               |
//! | evaluate | every [policy::Policy] in registration order, findings are data        |
//! | suppress | path specific suppressions first, then global ones, audited            |
//! | classify | `Error` when strict or forced, `Warning` otherwise                     |
//! | verdict  | passed unless there is an `Error`                                      |
//!
//! ### Output
//!
//! [engine::DiagnosticsReport] is serialized via [serde] or rendered with [render::text].
//!
pub mod config;
pub mod declarations;
pub mod engine;
pub mod hcl_documents;
pub mod policy;
pub mod render;
pub mod resource_tree;
pub mod suppression;
pub mod value;
mod visit;
