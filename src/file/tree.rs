//! In-memory view of the folder hierarchy.
//!
//! Built from `(id, parent_id)` links. Traversals are iterative and keep
//! a visited set, so they terminate even if stored data contains a cycle.

use std::collections::{HashMap, HashSet};

use super::Folder;

/// Parent/children adjacency over a set of folders.
#[derive(Debug, Clone, Default)]
pub struct FolderTree {
    parents: HashMap<i64, Option<i64>>,
    children: HashMap<i64, Vec<i64>>,
}

impl FolderTree {
    /// Build a tree from `(id, parent_id)` links.
    pub fn from_links(links: impl IntoIterator<Item = (i64, Option<i64>)>) -> Self {
        let mut tree = Self::default();
        for (id, parent_id) in links {
            tree.parents.insert(id, parent_id);
            if let Some(parent) = parent_id {
                tree.children.entry(parent).or_default().push(id);
            }
        }
        for kids in tree.children.values_mut() {
            kids.sort_unstable();
        }
        tree
    }

    /// Build a tree from folder records.
    pub fn from_folders(folders: &[Folder]) -> Self {
        Self::from_links(folders.iter().map(|f| (f.id, f.parent_id)))
    }

    /// Whether the tree knows `id`.
    pub fn contains(&self, id: i64) -> bool {
        self.parents.contains_key(&id)
    }

    /// Direct children of `id`.
    pub fn children(&self, id: i64) -> &[i64] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All folders strictly below `root`, in depth-first order.
    pub fn descendants(&self, root: i64) -> Vec<i64> {
        let mut visited = HashSet::from([root]);
        let mut order = Vec::new();
        let mut stack: Vec<i64> = self.children(root).iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        order
    }

    /// Whether `candidate` is `root` itself or lies below it.
    pub fn is_self_or_descendant(&self, root: i64, candidate: i64) -> bool {
        root == candidate || self.descendants(root).contains(&candidate)
    }

    /// Ancestors of `id` from its parent up to the root.
    pub fn ancestors(&self, id: i64) -> Vec<i64> {
        let mut visited = HashSet::from([id]);
        let mut chain = Vec::new();
        let mut current = self.parents.get(&id).copied().flatten();

        while let Some(parent) = current {
            if !visited.insert(parent) {
                break;
            }
            chain.push(parent);
            current = self.parents.get(&parent).copied().flatten();
        }
        chain
    }

    /// Relative path of `id` below `root`, e.g. `["March", "Week 1"]`.
    ///
    /// `names` maps folder ids to their names. Returns an empty path for
    /// `root` itself.
    pub fn relative_path(&self, root: i64, id: i64, names: &HashMap<i64, String>) -> Vec<String> {
        let mut segments = Vec::new();
        if id == root {
            return segments;
        }
        if let Some(name) = names.get(&id) {
            segments.push(name.clone());
        }
        for ancestor in self.ancestors(id) {
            if ancestor == root {
                break;
            }
            if let Some(name) = names.get(&ancestor) {
                segments.push(name.clone());
            }
        }
        segments.reverse();
        segments
    }
}
