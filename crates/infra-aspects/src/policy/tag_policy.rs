use super::{Finding, Policy, PolicyError};
use crate::resource_tree::Node;
use indexmap::IndexSet;

pub const MISSING_DOCUMENTATION_TAG: &str = "missing-documentation-tag";

/// Requires a fixed set of tag keys on every taggable node
///
/// Presence is checked by exact (case-sensitive) key, an empty value counts as present.
/// Nodes that are not taggable, or whose type is excluded, are out of scope: they produce no
/// findings at all, which is different from a suppressed finding.
#[derive(Debug, Clone, Default)]
pub struct TagPolicy {
    required_tags: IndexSet<String>,
    excluded_types: IndexSet<String>,
}

impl TagPolicy {
    pub fn new<I, S>(required_tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_tags: required_tags.into_iter().map(Into::into).collect(),
            excluded_types: Default::default(),
        }
    }

    pub fn exclude_type(mut self, resource_type: impl Into<String>) -> Self {
        self.excluded_types.insert(resource_type.into());
        self
    }

    pub fn required_tags(&self) -> impl Iterator<Item = &str> {
        self.required_tags.iter().map(String::as_str)
    }

    fn in_scope(&self, node: &Node) -> bool {
        node.taggable() && !self.excluded_types.contains(node.resource_type())
    }
}

impl Policy for TagPolicy {
    fn name(&self) -> &str {
        "tags"
    }

    fn evaluate(&self, node: &Node) -> Result<Vec<Finding>, PolicyError> {
        if !self.in_scope(node) {
            tracing::trace!(path = node.path(), "out of scope for tag policy");
            return Ok(vec![]);
        }

        Ok(self
            .required_tags
            .iter()
            .filter(|key| !node.tags().contains_key(key.as_str()))
            .map(|key| {
                Finding::new(
                    MISSING_DOCUMENTATION_TAG,
                    format!("missing required tag \"{key}\""),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resource_tree::{NodeDeclaration, ResourceTree, TreeBuilder};
    use pretty_assertions::assert_eq;

    fn tree(child: NodeDeclaration) -> ResourceTree {
        let mut builder = TreeBuilder::default();
        builder
            .declare(NodeDeclaration::new("/root", "app").with_taggable(false))
            .declare(child);
        builder.build().expect("valid tree")
    }

    fn child(resource_type: &str) -> NodeDeclaration {
        NodeDeclaration::new("/root/child", resource_type)
    }

    fn messages(policy: &TagPolicy, tree: &ResourceTree) -> Vec<String> {
        let node = tree.get("/root/child").expect("child");
        policy
            .evaluate(node)
            .expect("tag policy never fails")
            .into_iter()
            .map(|finding| {
                assert_eq!(finding.rule_id, MISSING_DOCUMENTATION_TAG);
                assert!(!finding.force_error);
                finding.message
            })
            .collect()
    }

    #[test]
    fn missing_tags_in_configuration_order() {
        let policy = TagPolicy::new(["Purpose", "Owner", "CostCenter"]);
        let tree = tree(child("storage-bucket").with_tag("Owner", "x"));

        assert_eq!(
            messages(&policy, &tree),
            vec![
                "missing required tag \"Purpose\"",
                "missing required tag \"CostCenter\""
            ]
        );
    }

    #[test]
    fn empty_value_counts_as_present() {
        let policy = TagPolicy::new(["Owner"]);
        let tree = tree(child("storage-bucket").with_tag("Owner", ""));

        assert!(messages(&policy, &tree).is_empty());
    }

    #[test]
    fn keys_are_case_sensitive() {
        let policy = TagPolicy::new(["Owner"]);
        let tree = tree(child("storage-bucket").with_tag("owner", "x"));

        assert_eq!(messages(&policy, &tree), vec!["missing required tag \"Owner\""]);
    }

    #[test]
    fn untaggable_nodes_are_out_of_scope() {
        let policy = TagPolicy::new(["Owner", "Purpose"]);
        let tree = tree(child("deployment-output").with_taggable(false));

        assert!(messages(&policy, &tree).is_empty());
    }

    #[test]
    fn excluded_types_are_out_of_scope() {
        let policy = TagPolicy::new(["Owner"]).exclude_type("custom-resource-provider");
        let tree = tree(child("custom-resource-provider"));

        assert!(messages(&policy, &tree).is_empty());
    }
}
