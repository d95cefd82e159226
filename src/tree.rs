//! Canonical component-tree store
//!
//! Holds every live node reported by connected runtimes: node records,
//! parent/child edges, the ordered root list, and a lowercased name index
//! for lookup. Mutation arrives exclusively as decoded operations batches
//! from [`crate::wire`]; queries serve the IPC surface.
//!
//! Tree reads assign short `@cN` labels to emitted nodes. Labels are
//! rebuilt on every read and are only stable until the next structural
//! change, so they resolve against the most recent read.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::wire::{DecodedBatch, TreeOp};

/// Element kind as reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Class,
    Function,
    Host,
    Memo,
    ForwardRef,
    Profiler,
    Suspense,
    Context,
    Root,
    Other,
}

impl ElementKind {
    /// Map a wire integer code to a kind. Unlisted codes fold into `Other`.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Class,
            2 => Self::Context,
            5 => Self::Function,
            6 => Self::ForwardRef,
            7 => Self::Host,
            8 => Self::Memo,
            10 => Self::Profiler,
            11 => Self::Root,
            12 => Self::Suspense,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "Class",
            Self::Function => "Function",
            Self::Host => "Host",
            Self::Memo => "Memo",
            Self::ForwardRef => "ForwardRef",
            Self::Profiler => "Profiler",
            Self::Suspense => "Suspense",
            Self::Context => "Context",
            Self::Root => "Root",
            Self::Other => "Other",
        }
    }
}

/// Fallback display name for host elements with no interned name
const HOST_FALLBACK_NAME: &str = "HostComponent";
/// Fallback display name for everything else
const ANONYMOUS_NAME: &str = "Anonymous";
/// Display name given to root nodes
const ROOT_NAME: &str = "Root";

/// One live component node
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: u32,
    pub display_name: String,
    pub kind: ElementKind,
    pub key: Option<String>,
    pub parent_id: Option<u32>,
    /// Child order is observable: it is whatever the runtime sent last
    pub child_ids: Vec<u32>,
    pub renderer_id: u32,
}

/// Id and resolved display name of a node created by a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedSummary {
    pub id: u32,
    pub display_name: String,
}

/// One entry of a flattened tree read
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatNode {
    pub id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub display_name: String,
    pub kind: ElementKind,
    pub key: Option<String>,
    pub parent_id: Option<u32>,
    pub child_ids: Vec<u32>,
    pub depth: usize,
}

/// The canonical store
#[derive(Debug, Default)]
pub struct ComponentTree {
    nodes: HashMap<u32, Node>,
    /// Root ids in arrival order
    roots: Vec<u32>,
    /// lowercase(displayName) -> node ids
    name_index: HashMap<String, HashSet<u32>>,
    /// `@cN` labels from the most recent `flatten` call
    label_to_id: HashMap<String, u32>,
    id_to_label: HashMap<u32, String>,
}

impl ComponentTree {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Apply one decoded batch in opcode order. Returns summaries for every
    /// node the batch created, with name defaults already applied.
    pub fn apply(&mut self, batch: &DecodedBatch) -> Vec<AddedSummary> {
        let mut added = Vec::new();

        for op in &batch.ops {
            match op {
                TreeOp::AddRoot { id } => {
                    if self.nodes.contains_key(id) {
                        warn!(id, "duplicate root ADD, replacing");
                        self.remove_subtree(*id);
                    }
                    self.insert_node(Node {
                        id: *id,
                        display_name: ROOT_NAME.to_string(),
                        kind: ElementKind::Other,
                        key: None,
                        parent_id: None,
                        child_ids: Vec::new(),
                        renderer_id: batch.renderer_id,
                    });
                    self.roots.push(*id);
                    added.push(AddedSummary {
                        id: *id,
                        display_name: ROOT_NAME.to_string(),
                    });
                }
                TreeOp::Add {
                    id,
                    kind,
                    parent_id,
                    display_name,
                    key,
                } => {
                    if !self.nodes.contains_key(parent_id) {
                        warn!(id, parent_id, "ADD references unknown parent, dropping");
                        continue;
                    }
                    if self.nodes.contains_key(id) {
                        warn!(id, "duplicate ADD, replacing");
                        self.remove_subtree(*id);
                    }

                    let display_name = display_name.clone().unwrap_or_else(|| {
                        if *kind == ElementKind::Host {
                            HOST_FALLBACK_NAME.to_string()
                        } else {
                            ANONYMOUS_NAME.to_string()
                        }
                    });

                    self.insert_node(Node {
                        id: *id,
                        display_name: display_name.clone(),
                        kind: *kind,
                        key: key.clone(),
                        parent_id: Some(*parent_id),
                        child_ids: Vec::new(),
                        renderer_id: batch.renderer_id,
                    });
                    if let Some(parent) = self.nodes.get_mut(parent_id) {
                        parent.child_ids.push(*id);
                    }
                    added.push(AddedSummary {
                        id: *id,
                        display_name,
                    });
                }
                TreeOp::Remove { ids } => {
                    for id in ids {
                        self.remove_subtree(*id);
                    }
                }
                TreeOp::ReorderChildren {
                    parent_id,
                    children,
                } => {
                    if let Some(parent) = self.nodes.get_mut(parent_id) {
                        parent.child_ids = children.clone();
                    } else {
                        warn!(parent_id, "REORDER references unknown parent");
                    }
                }
                TreeOp::RemoveRoot => {
                    self.remove_root(batch.root_id);
                }
            }
        }

        debug!(
            renderer_id = batch.renderer_id,
            root_id = batch.root_id,
            ops = batch.ops.len(),
            added = added.len(),
            nodes = self.nodes.len(),
            "applied operations batch"
        );
        added
    }

    fn insert_node(&mut self, node: Node) {
        self.name_index
            .entry(node.display_name.to_lowercase())
            .or_default()
            .insert(node.id);
        self.nodes.insert(node.id, node);
    }

    /// Remove `id` and its entire subtree, scrubbing the name index and
    /// detaching from the parent (or the root list). Unknown ids are ignored.
    fn remove_subtree(&mut self, id: u32) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };

        // Detach before the cascade so partial removal can't leave a
        // dangling edge
        match node.parent_id {
            Some(parent_id) => {
                if let Some(parent) = self.nodes.get_mut(&parent_id) {
                    parent.child_ids.retain(|&c| c != id);
                }
            }
            None => self.roots.retain(|&r| r != id),
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(&node.child_ids);
                let lower = node.display_name.to_lowercase();
                if let Some(set) = self.name_index.get_mut(&lower) {
                    set.remove(&current);
                    if set.is_empty() {
                        self.name_index.remove(&lower);
                    }
                }
            }
        }
    }

    /// Recursive root removal; ignored when the id is unknown or not a root
    pub fn remove_root(&mut self, root_id: u32) {
        if self
            .nodes
            .get(&root_id)
            .is_some_and(|n| n.parent_id.is_none())
        {
            self.remove_subtree(root_id);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get_node(&self, id: u32) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn all_node_ids(&self) -> Vec<u32> {
        self.nodes.keys().copied().collect()
    }

    /// Depth-first pre-order flatten over all roots.
    ///
    /// Rebuilds the label map: emitted nodes get dense labels `@c1..@cK` in
    /// emission order. With a depth limit, deeper nodes are simply not
    /// emitted (their parents still are).
    pub fn flatten(&mut self, max_depth: Option<usize>) -> Vec<FlatNode> {
        self.label_to_id.clear();
        self.id_to_label.clear();

        let mut out = Vec::new();
        let mut next_label = 1usize;
        // Iterate roots by index; stack-based DFS preserves child order
        let roots = self.roots.clone();
        for root in roots {
            let mut stack = vec![(root, 0usize)];
            while let Some((id, depth)) = stack.pop() {
                if max_depth.is_some_and(|limit| depth > limit) {
                    continue;
                }
                let Some(node) = self.nodes.get(&id) else {
                    continue;
                };

                let label = format!("@c{next_label}");
                next_label += 1;
                self.label_to_id.insert(label.clone(), id);
                self.id_to_label.insert(id, label.clone());

                out.push(FlatNode {
                    id,
                    label: Some(label),
                    display_name: node.display_name.clone(),
                    kind: node.kind,
                    key: node.key.clone(),
                    parent_id: node.parent_id,
                    child_ids: node.child_ids.clone(),
                    depth,
                });

                // Push children reversed so the first child pops first
                for &child in node.child_ids.iter().rev() {
                    stack.push((child, depth + 1));
                }
            }
        }
        out
    }

    /// Case-insensitive name search. Exact mode hits the name index
    /// directly; fuzzy mode substring-matches over index keys.
    pub fn find_by_name(&self, name: &str, exact: bool) -> Vec<FlatNode> {
        let needle = name.to_lowercase();
        let mut ids: Vec<u32> = if exact {
            self.name_index
                .get(&needle)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default()
        } else {
            self.name_index
                .iter()
                .filter(|(key, _)| key.contains(needle.as_str()))
                .flat_map(|(_, set)| set.iter().copied())
                .collect()
        };
        ids.sort_unstable();

        ids.into_iter()
            .filter_map(|id| self.flat_entry(id))
            .collect()
    }

    /// Flat entry for one node; label comes from the most recent flatten
    fn flat_entry(&self, id: u32) -> Option<FlatNode> {
        let node = self.nodes.get(&id)?;
        Some(FlatNode {
            id,
            label: self.id_to_label.get(&id).cloned(),
            display_name: node.display_name.clone(),
            kind: node.kind,
            key: node.key.clone(),
            parent_id: node.parent_id,
            child_ids: node.child_ids.clone(),
            depth: self.depth_of(id),
        })
    }

    fn depth_of(&self, id: u32) -> usize {
        let mut depth = 0;
        let mut current = self.nodes.get(&id).and_then(|n| n.parent_id);
        while let Some(parent_id) = current {
            depth += 1;
            current = self.nodes.get(&parent_id).and_then(|n| n.parent_id);
        }
        depth
    }

    pub fn count_by_kind(&self) -> BTreeMap<ElementKind, usize> {
        let mut counts = BTreeMap::new();
        for node in self.nodes.values() {
            *counts.entry(node.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Does any live node carry exactly this display name (case-sensitive)?
    pub fn has_component_named(&self, name: &str) -> bool {
        self.name_index
            .get(&name.to_lowercase())
            .is_some_and(|set| {
                set.iter().any(|id| {
                    self.nodes
                        .get(id)
                        .is_some_and(|n| n.display_name == name)
                })
            })
    }

    /// Resolve a `@cN` label against the most recent flatten
    pub fn resolve_label(&self, label: &str) -> Option<u32> {
        self.label_to_id.get(label).copied()
    }

    /// Label currently assigned to an id, if any
    pub fn label_of(&self, id: u32) -> Option<&str> {
        self.id_to_label.get(&id).map(String::as_str)
    }

    /// Snapshot of id -> display name for every live node
    pub fn display_names(&self) -> HashMap<u32, String> {
        self.nodes
            .iter()
            .map(|(&id, node)| (id, node.display_name.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::OpsDecoder;

    fn str_entry(s: &str) -> Vec<i64> {
        let mut out = vec![s.chars().count() as i64];
        out.extend(s.chars().map(|c| c as i64));
        out
    }

    fn batch(renderer: i64, root: i64, strings: &[&str], ops: &[i64]) -> Vec<i64> {
        let table: Vec<i64> = strings.iter().flat_map(|s| str_entry(s)).collect();
        let mut out = vec![renderer, root, table.len() as i64];
        out.extend(table);
        out.extend(ops);
        out
    }

    fn apply(tree: &mut ComponentTree, decoder: &mut OpsDecoder, ints: &[i64]) -> Vec<AddedSummary> {
        let decoded = decoder.decode(ints).unwrap();
        tree.apply(&decoded)
    }

    /// Root 100 with App(1) -> Shell(2)
    fn seed_small_tree(tree: &mut ComponentTree) {
        let mut decoder = OpsDecoder::new();
        let ints = batch(
            1,
            100,
            &["App", "Shell"],
            &[
                1, 100, 11, 1, 1, 1, 0, // ADD root
                1, 1, 5, 100, 0, 1, 0, // ADD App under root
                1, 2, 5, 1, 0, 2, 0, // ADD Shell under App
            ],
        );
        apply(tree, &mut decoder, &ints);
    }

    #[test]
    fn test_add_and_flatten_preorder() {
        let mut tree = ComponentTree::new();
        seed_small_tree(&mut tree);

        let flat = tree.flatten(None);
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[0].id, 100);
        assert_eq!(flat[0].label.as_deref(), Some("@c1"));
        assert_eq!(flat[0].depth, 0);
        assert_eq!(flat[1].display_name, "App");
        assert_eq!(flat[1].label.as_deref(), Some("@c2"));
        assert_eq!(flat[1].depth, 1);
        assert_eq!(flat[2].display_name, "Shell");
        assert_eq!(flat[2].label.as_deref(), Some("@c3"));
        assert_eq!(flat[2].depth, 2);
    }

    #[test]
    fn test_flatten_depth_limits() {
        let mut tree = ComponentTree::new();
        seed_small_tree(&mut tree);

        assert_eq!(tree.flatten(Some(0)).len(), 1);
        assert_eq!(tree.flatten(Some(1)).len(), 2);
        assert_eq!(tree.flatten(Some(2)).len(), 3);
    }

    #[test]
    fn test_root_node_shape() {
        let mut tree = ComponentTree::new();
        seed_small_tree(&mut tree);

        let root = tree.get_node(100).unwrap();
        assert_eq!(root.parent_id, None);
        assert_eq!(root.kind, ElementKind::Other);
        assert_eq!(root.display_name, "Root");
    }

    #[test]
    fn test_name_defaults() {
        let mut tree = ComponentTree::new();
        let mut decoder = OpsDecoder::new();
        let ints = batch(
            1,
            100,
            &[],
            &[
                1, 100, 11, 1, 1, 1, 0, // root
                1, 1, 7, 100, 0, 0, 0, // host, no name
                1, 2, 5, 100, 0, 0, 0, // function, no name
            ],
        );
        apply(&mut tree, &mut decoder, &ints);

        assert_eq!(tree.get_node(1).unwrap().display_name, "HostComponent");
        assert_eq!(tree.get_node(2).unwrap().display_name, "Anonymous");
    }

    #[test]
    fn test_find_exact_vs_fuzzy() {
        let mut tree = ComponentTree::new();
        let mut decoder = OpsDecoder::new();
        let ints = batch(
            1,
            100,
            &["User", "UserCard", "UserProfile"],
            &[
                1, 100, 11, 1, 1, 1, 0, //
                1, 1, 5, 100, 0, 1, 0, //
                1, 2, 5, 100, 0, 2, 0, //
                1, 3, 5, 100, 0, 3, 0,
            ],
        );
        apply(&mut tree, &mut decoder, &ints);

        let fuzzy = tree.find_by_name("user", false);
        assert_eq!(fuzzy.len(), 3);

        let exact = tree.find_by_name("User", true);
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].display_name, "User");

        // Exact results are a subset of fuzzy results
        let fuzzy_ids: HashSet<u32> = fuzzy.iter().map(|f| f.id).collect();
        assert!(exact.iter().all(|f| fuzzy_ids.contains(&f.id)));
    }

    #[test]
    fn test_remove_cascades() {
        // App(1) -> Header(2), Body(3) -> Item(4)
        let mut tree = ComponentTree::new();
        let mut decoder = OpsDecoder::new();
        let ints = batch(
            1,
            1,
            &["App", "Header", "Body", "Item"],
            &[
                1, 1, 11, 1, 1, 1, 0, //
                1, 2, 5, 1, 0, 2, 0, //
                1, 3, 5, 1, 0, 3, 0, //
                1, 4, 5, 3, 0, 4, 0,
            ],
        );
        apply(&mut tree, &mut decoder, &ints);
        assert_eq!(tree.node_count(), 4);

        let remove = batch(1, 1, &[], &[2, 1, 3]); // REMOVE [3]
        apply(&mut tree, &mut decoder, &remove);

        let mut ids = tree.all_node_ids();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
        assert!(tree.get_node(4).is_none());
        // Name index scrubbed for the whole subtree
        assert!(tree.find_by_name("Item", true).is_empty());
        assert!(tree.find_by_name("Body", true).is_empty());
    }

    #[test]
    fn test_reorder_replaces_child_list() {
        let mut tree = ComponentTree::new();
        let mut decoder = OpsDecoder::new();
        let ints = batch(
            1,
            1,
            &["A", "B"],
            &[
                1, 1, 11, 1, 1, 1, 0, //
                1, 2, 5, 1, 0, 1, 0, //
                1, 3, 5, 1, 0, 2, 0,
            ],
        );
        apply(&mut tree, &mut decoder, &ints);
        assert_eq!(tree.get_node(1).unwrap().child_ids, vec![2, 3]);

        let reorder = batch(1, 1, &[], &[3, 1, 2, 3, 2]);
        apply(&mut tree, &mut decoder, &reorder);
        assert_eq!(tree.get_node(1).unwrap().child_ids, vec![3, 2]);

        // Flatten follows the new order
        let flat = tree.flatten(None);
        assert_eq!(flat[1].id, 3);
        assert_eq!(flat[2].id, 2);
    }

    #[test]
    fn test_empty_batch_leaves_tree_unchanged() {
        let mut tree = ComponentTree::new();
        seed_small_tree(&mut tree);
        let before = tree.node_count();

        let mut decoder = OpsDecoder::new();
        let empty = batch(1, 100, &[], &[]);
        let added = apply(&mut tree, &mut decoder, &empty);
        assert!(added.is_empty());
        assert_eq!(tree.node_count(), before);
    }

    #[test]
    fn test_count_by_kind_sums_to_node_count() {
        let mut tree = ComponentTree::new();
        let mut decoder = OpsDecoder::new();
        let ints = batch(
            1,
            1,
            &["A", "B"],
            &[
                1, 1, 11, 1, 1, 1, 0, //
                1, 2, 5, 1, 0, 1, 0, // function
                1, 3, 7, 2, 0, 0, 0, // host
                1, 4, 1, 2, 0, 2, 0, // class
            ],
        );
        apply(&mut tree, &mut decoder, &ints);

        let counts = tree.count_by_kind();
        let total: usize = counts.values().sum();
        assert_eq!(total, tree.all_node_ids().len());
        assert_eq!(counts.get(&ElementKind::Function), Some(&1));
        assert_eq!(counts.get(&ElementKind::Host), Some(&1));
        assert_eq!(counts.get(&ElementKind::Class), Some(&1));
        // The root counts as Other
        assert_eq!(counts.get(&ElementKind::Other), Some(&1));
    }

    #[test]
    fn test_parent_child_edges_agree() {
        let mut tree = ComponentTree::new();
        seed_small_tree(&mut tree);

        for id in tree.all_node_ids() {
            let node = tree.get_node(id).unwrap();
            if let Some(parent_id) = node.parent_id {
                let parent = tree.get_node(parent_id).unwrap();
                assert!(parent.child_ids.contains(&id));
            }
            for &child in &node.child_ids {
                assert_eq!(tree.get_node(child).unwrap().parent_id, Some(id));
            }
        }
    }

    #[test]
    fn test_remove_root_cascade() {
        let mut tree = ComponentTree::new();
        seed_small_tree(&mut tree);

        tree.remove_root(100);
        assert!(tree.is_empty());
        assert!(tree.flatten(None).is_empty());

        // Unknown root ignored
        tree.remove_root(42);
    }

    #[test]
    fn test_multi_root_ownership_is_disjoint() {
        let mut tree = ComponentTree::new();
        let mut dec_a = OpsDecoder::new();
        let mut dec_b = OpsDecoder::new();

        let a = batch(
            1,
            100,
            &["A1", "A2"],
            &[
                1, 100, 11, 1, 1, 1, 0, //
                1, 1, 5, 100, 0, 1, 0, //
                1, 2, 5, 100, 0, 2, 0,
            ],
        );
        let b = batch(
            1,
            200,
            &["B1"],
            &[
                1, 200, 11, 1, 1, 1, 0, //
                1, 10, 5, 200, 0, 1, 0,
            ],
        );
        apply(&mut tree, &mut dec_a, &a);
        apply(&mut tree, &mut dec_b, &b);
        assert_eq!(tree.node_count(), 5);

        tree.remove_root(100);
        let mut ids = tree.all_node_ids();
        ids.sort_unstable();
        assert_eq!(ids, vec![10, 200]);
    }

    #[test]
    fn test_labels_resolve_until_next_flatten() {
        let mut tree = ComponentTree::new();
        seed_small_tree(&mut tree);

        tree.flatten(None);
        assert_eq!(tree.resolve_label("@c2"), Some(1));
        assert_eq!(tree.resolve_label("@c9"), None);

        // A depth-limited flatten rebuilds the map densely over emitted nodes
        tree.flatten(Some(0));
        assert_eq!(tree.resolve_label("@c1"), Some(100));
        assert_eq!(tree.resolve_label("@c2"), None);
    }

    #[test]
    fn test_has_component_named_is_case_sensitive() {
        let mut tree = ComponentTree::new();
        let mut decoder = OpsDecoder::new();
        let ints = batch(
            1,
            1,
            &["Counter"],
            &[1, 1, 11, 1, 1, 1, 0, 1, 2, 5, 1, 0, 1, 0],
        );
        apply(&mut tree, &mut decoder, &ints);

        assert!(tree.has_component_named("Counter"));
        assert!(!tree.has_component_named("counter"));
    }

    #[test]
    fn test_add_with_key() {
        let mut tree = ComponentTree::new();
        let mut decoder = OpsDecoder::new();
        let ints = batch(
            1,
            1,
            &["Item", "row-1"],
            &[1, 1, 11, 1, 1, 1, 0, 1, 2, 5, 1, 0, 1, 2],
        );
        apply(&mut tree, &mut decoder, &ints);

        assert_eq!(tree.get_node(2).unwrap().key.as_deref(), Some("row-1"));
    }

    #[test]
    fn test_orphan_add_dropped() {
        let mut tree = ComponentTree::new();
        let mut decoder = OpsDecoder::new();
        // ADD referencing a parent that was never created
        let ints = batch(1, 1, &["X"], &[1, 5, 5, 77, 0, 1, 0]);
        let added = apply(&mut tree, &mut decoder, &ints);
        assert!(added.is_empty());
        assert!(tree.is_empty());
    }
}
