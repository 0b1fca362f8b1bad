//! Named collection accessors
//!
//! Known collection names are registered up front; dotted names nest, so
//! `logs.errors` yields a `logs` node with an `errors` child that resolves
//! to the collection `logs.errors`.

use std::collections::BTreeMap;

use super::Database;
use crate::collection::Collection;

/// Tree of registered collection names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct NameTree {
    declared: bool,
    children: BTreeMap<String, NameTree>,
}

impl NameTree {
    /// Register a (possibly dotted) collection name
    pub(crate) fn insert(&mut self, name: &str) {
        let mut node = self;
        for part in name.split('.').filter(|p| !p.is_empty()) {
            node = node.children.entry(part.to_string()).or_default();
        }
        node.declared = true;
    }

    fn lookup(&self, path: &str) -> Option<&NameTree> {
        path.split('.')
            .try_fold(self, |node, part| node.children.get(part))
    }
}

/// A node in the accessor tree
#[derive(Debug, Clone)]
pub struct CollectionNode<'a> {
    db: &'a Database,
    path: String,
    tree: &'a NameTree,
}

impl<'a> CollectionNode<'a> {
    pub(crate) fn resolve(db: &'a Database, tree: &'a NameTree, path: &str) -> Option<Self> {
        tree.lookup(path).map(|tree| Self {
            db,
            path: path.to_string(),
            tree,
        })
    }

    /// Full collection name of this node
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether this exact name was registered, as opposed to being only a
    /// prefix of registered names
    pub fn is_declared(&self) -> bool {
        self.tree.declared
    }

    /// Child accessor
    pub fn get(&self, name: &str) -> Option<CollectionNode<'a>> {
        self.tree.children.get(name).map(|tree| CollectionNode {
            db: self.db,
            path: format!("{}.{}", self.path, name),
            tree,
        })
    }

    /// Names of the child accessors
    pub fn children(&self) -> impl Iterator<Item = &str> {
        self.tree.children.keys().map(String::as_str)
    }

    /// The collection this node stands for
    pub fn collection(&self) -> Collection {
        self.db.collection(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_names_nest() {
        let mut tree = NameTree::default();
        tree.insert("users");
        tree.insert("logs.errors");
        tree.insert("logs.access");

        assert!(tree.lookup("users").unwrap().declared);
        let logs = tree.lookup("logs").unwrap();
        assert!(!logs.declared);
        assert_eq!(logs.children.len(), 2);
        assert!(tree.lookup("logs.errors").unwrap().declared);
        assert!(tree.lookup("missing").is_none());
    }
}
