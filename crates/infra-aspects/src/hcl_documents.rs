//! collection of hcl documents ([Body] and path to source file)
//!
//! Both resource declarations (`*.infra.hcl`) and the aspect configuration are plain HCL.
//! [HclDocuments] keeps the root structures of every loaded document together with the
//! path it was loaded from so that issues can point at the offending file.
use crate::value::Value;
use hcl::eval::Evaluate;
use hcl_edit::structure::{Attribute, Block, Body, Structure};
use std::path::Path;

/// File name suffix of resource declaration files
pub const INFRA_FILE_SUFFIX: &str = ".infra.hcl";

#[derive(Default, Debug)]
pub struct HclDocuments {
    documents: Vec<Document>,
}

/// Root structures of one parsed document
#[derive(Debug)]
pub struct Document {
    pub source: Source,
    pub attributes: Vec<Attribute>,
    pub blocks: Vec<Block>,
}

impl Document {
    /// Human readable origin, used in error messages
    pub fn origin(&self) -> String {
        origin(&self.source)
    }
}

impl HclDocuments {
    /// Inserts a parsed document, keeping its structures in source order
    pub fn insert(&mut self, document: Body, path: impl Into<Option<std::path::PathBuf>>) {
        let mut attributes = vec![];
        let mut blocks = vec![];

        for structure in document.into_iter() {
            match structure {
                Structure::Block(block) => blocks.push(block),
                Structure::Attribute(attribute) => attributes.push(attribute),
            }
        }

        self.documents.push(Document {
            source: path.into(),
            attributes,
            blocks,
        });
    }

    /// All root attributes with the document they belong to
    pub fn attributes(&self) -> impl Iterator<Item = (&Document, &Attribute)> {
        self.documents
            .iter()
            .flat_map(|document| document.attributes.iter().map(move |a| (document, a)))
    }

    /// All root blocks with the document they belong to
    pub fn blocks(&self) -> impl Iterator<Item = (&Document, &Block)> {
        self.documents
            .iter()
            .flat_map(|document| document.blocks.iter().map(move |b| (document, b)))
    }

    pub fn source_count(&self) -> usize {
        self.documents.len()
    }
}

impl HclDocuments {
    pub fn load_file(&mut self, file_path: &Path) -> Result<(), LoadError> {
        let file_path = file_path.canonicalize()?;
        tracing::info!(path=%file_path.display(), "loading file");

        let file_contents = std::fs::read_to_string(&file_path)?;
        let body = hcl_edit::parser::parse_body(&file_contents)?;

        self.insert(body, Some(file_path));
        Ok(())
    }

    /// Loads every file in `dir_path` whose name ends with [INFRA_FILE_SUFFIX]
    ///
    /// Files are loaded in file name order so that declaration order does not depend on the
    /// file system.
    pub fn load_directory(&mut self, dir_path: &Path) -> Result<(), LoadError> {
        let mut file_paths = vec![];

        for dir_entry in std::fs::read_dir(dir_path)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }

            let is_infra_file = dir_entry
                .file_name()
                .to_string_lossy()
                .ends_with(INFRA_FILE_SUFFIX);
            if is_infra_file {
                file_paths.push(dir_entry.path());
            }
        }

        if file_paths.is_empty() {
            return Err(LoadError::NoFilesFound(dir_path.to_path_buf()));
        }

        file_paths.sort();
        for file_path in file_paths {
            self.load_file(&file_path)?;
        }

        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("No *.infra.hcl files found in {}", .0.display())]
    NoFilesFound(std::path::PathBuf),
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to parse hcl file")]
    HclParseFailed(#[from] hcl_edit::parser::Error),
}

impl From<Body> for HclDocuments {
    fn from(value: Body) -> Self {
        let mut documents = HclDocuments::default();
        documents.insert(value, None);
        documents
    }
}

/// Evaluates an expression that must not depend on anything but itself
///
/// Arithmetic, conditionals and templates over literals are fine, variables and function calls
/// are not.
pub fn evaluate_literal(expression: &hcl_edit::expr::Expression) -> Option<Value> {
    let mut expression: hcl::Expression = expression.clone().into();
    if let Err(errors) = expression.evaluate_in_place(&hcl::eval::Context::new()) {
        tracing::debug!(%errors, "expression is not a literal");
        return None;
    }

    Value::try_from(expression).ok()
}

/// Utility macro to create [HclDocuments]
///
/// Create from a single document
/// ```
/// # use infra_aspects::hcl_documents;
/// hcl_documents!(r#"resource "storage-bucket" "assets" {}"#);
/// ```
///
/// Create from multiple documents (path required)
/// ```
/// # use infra_aspects::hcl_documents;
/// hcl_documents! {
///   "storage.infra.hcl" => r#"resource "storage-bucket" "assets" {}"#,
///   "compute.infra.hcl" => r#"resource "function" "handler" {}"#
/// };
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use infra_aspects::hcl_documents;
/// hcl_documents!("not = valid = hcl");
/// ```
#[macro_export]
macro_rules! hcl_documents {
    // single document without source
    { $expr:expr } => {
        $crate::hcl_documents::HclDocuments::from(hcl_edit::parser::parse_body($expr).expect("body must parse"))
    };
    // multi document with sources
    { $($source:expr => $expr:expr),+ } => {{
        let mut docs = $crate::hcl_documents::HclDocuments::default();
        $(
            docs.insert(hcl_edit::parser::parse_body($expr).expect("body must parse"), Some($source.into()));
        )+

        docs
    }};
}

pub type Source = Option<std::path::PathBuf>;

pub fn origin(source: &Source) -> String {
    match source {
        Some(path) => path.display().to_string(),
        None => "<stdin>".to_string(),
    }
}
