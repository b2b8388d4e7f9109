//! Source tree introspection
//!
//! Groups a flat list of dotted source paths by their shared prefixes.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::mappers::ARRAY_MARKER;
use crate::path::SEPARATOR;

/// Source paths grouped by shared prefix
///
/// `fields` lists the leaf names reachable directly at this level, `from`
/// holds deeper levels keyed by segment and `array` marks a level holding a
/// sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceTree {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub array: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub from: BTreeMap<String, SourceTree>,
}

/// Intermediate trie; later paths overwrite earlier ones at the same position.
enum Node {
    Leaf,
    Branch(Vec<(String, Node)>),
}

impl Node {
    fn insert(&mut self, segments: &[&str]) {
        let Some((segment, rest)) = segments.split_first() else {
            return;
        };
        if !matches!(self, Node::Branch(_)) {
            *self = Node::Branch(Vec::new());
        }
        let Node::Branch(children) = self else {
            return;
        };

        let position = match children.iter().position(|(key, _)| key.as_str() == *segment) {
            Some(position) => position,
            None => {
                children.push((segment.to_string(), Node::Leaf));
                children.len() - 1
            }
        };

        let child = &mut children[position].1;
        if rest.is_empty() {
            *child = Node::Leaf;
        } else {
            child.insert(rest);
        }
    }

    fn into_tree(self) -> SourceTree {
        let mut tree = SourceTree::default();
        let Node::Branch(children) = self else {
            return tree;
        };
        for (key, child) in children {
            match child {
                Node::Leaf if key == ARRAY_MARKER => tree.array = true,
                Node::Leaf => tree.fields.push(key),
                branch @ Node::Branch(_) => {
                    tree.from.insert(key, branch.into_tree());
                }
            }
        }
        tree
    }
}

impl SourceTree {
    /// Build the tree for `paths`; duplicates collapse to one entry.
    pub fn from_paths<S: AsRef<str>>(paths: &[S]) -> Self {
        let mut root = Node::Branch(Vec::new());
        for path in paths {
            let segments: Vec<&str> = path.as_ref().split(SEPARATOR).collect();
            root.insert(&segments);
        }
        root.into_tree()
    }

    /// Whether no source path is reachable from this level.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && !self.array && self.from.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_groups_by_prefix() {
        let tree = SourceTree::from_paths(&[
            "Person.FirstName",
            "Person.LastName",
            "Person.Address.City",
            "Person.Address.Country",
        ]);

        let person = &tree.from["Person"];
        assert!(tree.fields.is_empty());
        assert_eq!(person.fields, vec!["FirstName", "LastName"]);
        assert_eq!(person.from["Address"].fields, vec!["City", "Country"]);
    }

    #[test]
    fn test_duplicates_collapse() {
        let tree = SourceTree::from_paths(&["PersonName", "PersonName"]);
        assert_eq!(tree.fields, vec!["PersonName"]);
    }

    #[test]
    fn test_array_marker() {
        let tree = SourceTree::from_paths(&["PersonList.PersonName", "PersonList.[]"]);
        let list = &tree.from["PersonList"];
        assert!(list.array);
        assert_eq!(list.fields, vec!["PersonName"]);
    }

    #[test]
    fn test_serializes_like_a_plain_object() {
        let tree = SourceTree::from_paths(&["Top", "List.Name", "List.[]"]);
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            json!({
                "fields": ["Top"],
                "from": {"List": {"array": true, "fields": ["Name"]}}
            })
        );
    }

    #[test]
    fn test_empty() {
        let tree = SourceTree::from_paths::<&str>(&[]);
        assert!(tree.is_empty());
    }
}
