//! Hierarchical tree of declared infrastructure objects
//!
//! A [ResourceTree] is built once from a flat list of [NodeDeclaration]s via [TreeBuilder] and is
//! immutable afterwards. Nodes are declared by their full path (`/root/bucket/policy`), the parent
//! of a node is the path without its last segment. A parent reference can therefore only point
//! "upwards" and a cycle cannot be declared at all.
//!
//! All structural problems surface in [TreeBuilder::build] as [StructuralError]. A tree that was
//! built successfully is always valid.
use crate::value::Value;
use indexmap::IndexMap;

/// Tag key -> tag value
pub type Tags = IndexMap<String, String>;

/// One declared infrastructure object
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Node {
    id: String,
    path: String,
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    tags: Tags,
    taggable: bool,
    properties: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<Node>,
}

impl Node {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Slash-joined identifier starting at the root, unique within the tree
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Whether this kind of node can carry tags at all
    pub fn taggable(&self) -> bool {
        self.taggable
    }

    pub fn properties(&self) -> &Value {
        &self.properties
    }

    /// Children in declaration order
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    fn find_mut(&mut self, path: &str) -> Option<&mut Node> {
        if self.path == path {
            return Some(self);
        }

        let prefix = format!("{}/", self.path);
        if !path.starts_with(&prefix) {
            return None;
        }

        self.children
            .iter_mut()
            .find_map(|child| child.find_mut(path))
    }

    fn propagate_tags(&mut self, tags: &Tags) {
        if self.taggable {
            for (key, value) in tags {
                self.tags
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }

        for child in &mut self.children {
            child.propagate_tags(tags);
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct ResourceTree {
    root: Node,
}

impl ResourceTree {
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Pre-order iterator, children are visited in declaration order
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder {
            stack: vec![&self.root],
        }
    }

    pub fn get(&self, path: &str) -> Option<&Node> {
        self.iter().find(|node| node.path == path)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// A tree always has its root node
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns a copy of this tree where every taggable node at or below `path` carries `tags`
    ///
    /// Tags that a node already declares itself are kept, propagated tags only fill gaps.
    /// Nodes that are not taggable are skipped but their children are still visited.
    pub fn apply_tags(&self, path: &str, tags: &Tags) -> Result<ResourceTree, StructuralError> {
        let mut tree = self.clone();
        let Some(subtree) = tree.root.find_mut(path) else {
            return Err(StructuralError::UnknownPath(path.to_string()));
        };

        tracing::debug!(path, tags = tags.len(), "propagating tags");
        subtree.propagate_tags(tags);

        Ok(tree)
    }
}

impl<'a> IntoIterator for &'a ResourceTree {
    type Item = &'a Node;
    type IntoIter = PreOrder<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// See [ResourceTree::iter]
pub struct PreOrder<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// A node as declared by the source, before it is placed in the tree
#[derive(Debug, Clone, PartialEq, derive_new::new)]
pub struct NodeDeclaration {
    #[new(into)]
    pub path: String,
    #[new(into)]
    pub resource_type: String,
    #[new(default)]
    pub tags: Tags,
    #[new(value = "true")]
    pub taggable: bool,
    #[new(default)]
    pub properties: Value,
}

impl NodeDeclaration {
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_taggable(mut self, taggable: bool) -> Self {
        self.taggable = taggable;
        self
    }

    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StructuralError {
    #[error("path {0} is declared more than once")]
    DuplicatePath(String),
    #[error("invalid path {0:?}, expected /<id>[/<id>...] without empty segments")]
    InvalidPath(String),
    #[error("no root node declared")]
    MissingRoot,
    #[error("more than one root node declared: {first} and {second}")]
    MultipleRoots { first: String, second: String },
    #[error("{path} refers to parent {parent} which is not declared")]
    DanglingParent { path: String, parent: String },
    #[error("no node at path {0}")]
    UnknownPath(String),
}

/// Collects [NodeDeclaration]s and turns them into a [ResourceTree]
#[derive(Debug, Default)]
pub struct TreeBuilder {
    declarations: Vec<NodeDeclaration>,
}

impl TreeBuilder {
    pub fn declare(&mut self, declaration: NodeDeclaration) -> &mut Self {
        tracing::trace!(path = %declaration.path, "declare node");
        self.declarations.push(declaration);
        self
    }

    pub fn build(self) -> Result<ResourceTree, StructuralError> {
        let mut index: IndexMap<&str, usize> = IndexMap::new();
        let mut root = None;

        for (position, declaration) in self.declarations.iter().enumerate() {
            let path = declaration.path.as_str();
            let valid = path
                .strip_prefix('/')
                .is_some_and(|rest| rest.split('/').all(|segment| !segment.is_empty()));
            if !valid {
                return Err(StructuralError::InvalidPath(path.to_string()));
            }

            if index.insert(path, position).is_some() {
                return Err(StructuralError::DuplicatePath(path.to_string()));
            }

            if parent_of(path).is_none() {
                if let Some(first) = root {
                    let first: &NodeDeclaration = &self.declarations[first];
                    return Err(StructuralError::MultipleRoots {
                        first: first.path.clone(),
                        second: path.to_string(),
                    });
                }
                root = Some(position);
            }
        }

        let root = root.ok_or(StructuralError::MissingRoot)?;

        // parent position -> child positions, in declaration order
        let mut children: IndexMap<usize, Vec<usize>> = IndexMap::new();
        for (position, declaration) in self.declarations.iter().enumerate() {
            let Some(parent) = parent_of(&declaration.path) else {
                continue;
            };

            let Some(parent_position) = index.get(parent).copied() else {
                return Err(StructuralError::DanglingParent {
                    path: declaration.path.clone(),
                    parent: parent.to_string(),
                });
            };

            children.entry(parent_position).or_default().push(position);
        }

        let mut declarations: Vec<Option<NodeDeclaration>> =
            self.declarations.into_iter().map(Some).collect();
        let root = assemble(root, &mut declarations, &children);

        tracing::debug!(root = %root.path, "resource tree built");
        Ok(ResourceTree { root })
    }
}

/// `None` for a root path (`/root`)
fn parent_of(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) | None => None,
        Some(separator) => Some(&path[..separator]),
    }
}

fn assemble(
    position: usize,
    declarations: &mut [Option<NodeDeclaration>],
    children: &IndexMap<usize, Vec<usize>>,
) -> Node {
    // every position is reached exactly once, its parent is unique
    let declaration = declarations[position]
        .take()
        .unwrap_or_else(|| unreachable!("declaration {position} assembled twice"));

    let child_nodes = children
        .get(&position)
        .map(|positions| {
            positions
                .iter()
                .map(|child| assemble(*child, declarations, children))
                .collect()
        })
        .unwrap_or_default();

    let id = declaration
        .path
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();

    Node {
        id,
        path: declaration.path,
        resource_type: declaration.resource_type,
        tags: declaration.tags,
        taggable: declaration.taggable,
        properties: declaration.properties,
        children: child_nodes,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn build(declarations: Vec<NodeDeclaration>) -> Result<ResourceTree, StructuralError> {
        let mut builder = TreeBuilder::default();
        for declaration in declarations {
            builder.declare(declaration);
        }
        builder.build()
    }

    fn paths(tree: &ResourceTree) -> Vec<&str> {
        tree.iter().map(Node::path).collect()
    }

    #[test]
    fn pre_order_in_declaration_order() {
        let tree = build(vec![
            NodeDeclaration::new("/root", "app").with_taggable(false),
            NodeDeclaration::new("/root/b", "storage-bucket"),
            NodeDeclaration::new("/root/a", "function"),
            NodeDeclaration::new("/root/b/policy", "bucket-policy"),
            NodeDeclaration::new("/root/a/role", "role"),
        ])
        .expect("valid tree");

        assert_eq!(
            paths(&tree),
            vec!["/root", "/root/b", "/root/b/policy", "/root/a", "/root/a/role"]
        );
        assert_eq!(tree.root().children()[0].id(), "b");
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn children_may_be_declared_before_parents() {
        let tree = build(vec![
            NodeDeclaration::new("/root/a/b", "x"),
            NodeDeclaration::new("/root", "app"),
            NodeDeclaration::new("/root/a", "x"),
        ])
        .expect("valid tree");

        assert_eq!(paths(&tree), vec!["/root", "/root/a", "/root/a/b"]);
    }

    #[test]
    fn duplicate_path() {
        let err = build(vec![
            NodeDeclaration::new("/root", "app"),
            NodeDeclaration::new("/root/a", "x"),
            NodeDeclaration::new("/root/a", "y"),
        ])
        .expect_err("must fail");

        assert_eq!(err, StructuralError::DuplicatePath("/root/a".into()));
    }

    #[test]
    fn dangling_parent() {
        let err = build(vec![
            NodeDeclaration::new("/root", "app"),
            NodeDeclaration::new("/root/missing/a", "x"),
        ])
        .expect_err("must fail");

        assert_eq!(
            err,
            StructuralError::DanglingParent {
                path: "/root/missing/a".into(),
                parent: "/root/missing".into()
            }
        );
    }

    #[test]
    fn root_errors() {
        assert_eq!(
            build(vec![NodeDeclaration::new("/root/a", "x")]).expect_err("must fail"),
            StructuralError::MissingRoot
        );
        assert_eq!(build(vec![]).expect_err("must fail"), StructuralError::MissingRoot);
        assert_eq!(
            build(vec![
                NodeDeclaration::new("/one", "app"),
                NodeDeclaration::new("/two", "app"),
            ])
            .expect_err("must fail"),
            StructuralError::MultipleRoots {
                first: "/one".into(),
                second: "/two".into()
            }
        );
    }

    #[test]
    fn invalid_paths() {
        for path in ["", "root", "/", "/root//a", "/root/"] {
            let err = build(vec![NodeDeclaration::new(path, "x")]).expect_err("must fail");
            assert_eq!(err, StructuralError::InvalidPath(path.into()));
        }
    }

    #[test]
    fn apply_tags_fills_gaps_on_taggable_nodes() {
        let tree = build(vec![
            NodeDeclaration::new("/root", "app").with_taggable(false),
            NodeDeclaration::new("/root/bucket", "storage-bucket").with_tag("Owner", "team-x"),
            NodeDeclaration::new("/root/bucket/out", "deployment-output").with_taggable(false),
            NodeDeclaration::new("/root/other", "function"),
        ])
        .expect("valid tree");

        let tags: Tags = [("Owner", "platform"), ("Purpose", "demo")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let tagged = tree.apply_tags("/root/bucket", &tags).expect("path exists");

        let bucket = tagged.get("/root/bucket").expect("bucket");
        assert_eq!(bucket.tags().get("Owner").map(String::as_str), Some("team-x"));
        assert_eq!(bucket.tags().get("Purpose").map(String::as_str), Some("demo"));
        assert!(tagged.get("/root/bucket/out").expect("out").tags().is_empty());
        assert!(tagged.get("/root/other").expect("other").tags().is_empty());
        assert!(tagged.root().tags().is_empty());

        // the original is untouched
        assert_eq!(tree.get("/root/bucket").expect("bucket").tags().len(), 1);

        assert_eq!(
            tree.apply_tags("/root/nope", &tags).expect_err("unknown"),
            StructuralError::UnknownPath("/root/nope".into())
        );
    }
}
