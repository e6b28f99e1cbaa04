//! Pure post-processing pass that turns the flat discovery arena into a
//! nested forest.

use mccgraph_core::{Account, AccountId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// An account with its children attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyNode {
    #[serde(flatten)]
    pub account: Account,
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    pub fn leaf(account: Account) -> Self {
        Self {
            account,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.account.id
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Number of nodes in this subtree, including this one.
    pub fn subtree_size(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(HierarchyNode::subtree_size)
            .sum::<usize>()
    }

    pub fn find(&self, account_id: &str) -> Option<&HierarchyNode> {
        if self.account.id == account_id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(account_id))
    }

    /// Pre-order walk in display order.
    pub fn walk<'a>(&'a self, out: &mut Vec<&'a Account>) {
        out.push(&self.account);
        for child in &self.children {
            child.walk(out);
        }
    }
}

/// Display ordering among siblings: managers before clients, then ordinal
/// (byte-wise) comparison of display names, so "Zulu" precedes "apple".
pub fn display_order(a: &Account, b: &Account) -> Ordering {
    b.is_manager
        .cmp(&a.is_manager)
        .then_with(|| a.display_name.as_bytes().cmp(b.display_name.as_bytes()))
}

/// Applies [`display_order`] to every children list below `nodes`
/// (the slice itself is left in place).
pub fn sort_descendants(nodes: &mut [HierarchyNode]) {
    for node in nodes {
        node.children
            .sort_by(|a, b| display_order(&a.account, &b.account));
        sort_descendants(&mut node.children);
    }
}

/// Builds the forest from discovered nodes and `child -> parent` edges.
///
/// Roots keep the order of `nodes`. A node is a root when it has no edge,
/// points at itself, or points at a parent missing from `nodes`. Nodes that
/// only sit on a cycle of edges are promoted to roots in `nodes` order, so
/// every distinct id in `nodes` appears in the forest exactly once.
pub fn assemble(nodes: &[Account], edges: &HashMap<AccountId, AccountId>) -> Vec<HierarchyNode> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    let mut order: Vec<usize> = Vec::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if !index.contains_key(node.id.as_str()) {
            index.insert(node.id.as_str(), i);
            order.push(i);
        }
    }

    let mut children_of: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();
    for &i in &order {
        let id = nodes[i].id.as_str();
        match edges.get(id).and_then(|parent| index.get(parent.as_str())) {
            Some(&parent) if parent != i => children_of.entry(parent).or_default().push(i),
            _ => roots.push(i),
        }
    }

    let mut placed = vec![false; nodes.len()];
    let mut forest: Vec<HierarchyNode> = roots
        .into_iter()
        .map(|root| build(root, nodes, &children_of, &mut placed))
        .collect();

    for &i in &order {
        if !placed[i] {
            forest.push(build(i, nodes, &children_of, &mut placed));
        }
    }

    sort_descendants(&mut forest);
    forest
}

fn build(
    i: usize,
    nodes: &[Account],
    children_of: &HashMap<usize, Vec<usize>>,
    placed: &mut [bool],
) -> HierarchyNode {
    placed[i] = true;
    let mut node = HierarchyNode::leaf(nodes[i].clone());
    if let Some(children) = children_of.get(&i) {
        for &child in children {
            if !placed[child] {
                node.children.push(build(child, nodes, children_of, placed));
            }
        }
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use mccgraph_core::{AccessLevel, AccountDetails};

    fn account(id: &str, name: &str, is_manager: bool, via: &str) -> Account {
        Account::from_details(
            id,
            AccountDetails::new(name, is_manager),
            0,
            via,
            AccessLevel::ViaManager,
        )
    }

    fn edges(pairs: &[(&str, &str)]) -> HashMap<AccountId, AccountId> {
        pairs
            .iter()
            .map(|(c, p)| (c.to_string(), p.to_string()))
            .collect()
    }

    fn names(nodes: &[HierarchyNode]) -> Vec<&str> {
        nodes
            .iter()
            .map(|n| n.account.display_name.as_str())
            .collect()
    }

    #[test]
    fn managers_first_then_ordinal_names() {
        let nodes = vec![
            account("root", "Root", true, "root"),
            account("1", "bravo", false, "root"),
            account("2", "Alpha", true, "root"),
            account("3", "Zulu", true, "root"),
            account("4", "apple", false, "root"),
        ];
        let forest = assemble(
            &nodes,
            &edges(&[("1", "root"), ("2", "root"), ("3", "root"), ("4", "root")]),
        );

        assert_eq!(forest.len(), 1);
        assert_eq!(names(&forest[0].children), vec!["Alpha", "Zulu", "apple", "bravo"]);
    }

    #[test]
    fn empty_names_sort_first_within_group() {
        let nodes = vec![
            account("root", "Root", true, "root"),
            account("1", "beta", false, "root"),
            account("2", "", false, "root"),
        ];
        let forest = assemble(&nodes, &edges(&[("1", "root"), ("2", "root")]));
        assert_eq!(names(&forest[0].children), vec!["", "beta"]);
    }

    #[test]
    fn orphan_is_promoted_to_root() {
        let nodes = vec![
            account("root", "Root", true, "root"),
            account("orphan", "Lost", false, "missing"),
        ];
        let forest = assemble(&nodes, &edges(&[("orphan", "missing")]));

        assert_eq!(forest.len(), 2);
        assert_eq!(forest[1].id(), "orphan");
        assert!(!forest[0].has_children());
    }

    #[test]
    fn roots_keep_input_order_and_nest_deeply() {
        let nodes = vec![
            account("b", "Second", true, "b"),
            account("a", "First", true, "a"),
            account("a1", "Mid", true, "a"),
            account("a2", "Leaf", false, "a1"),
        ];
        let forest = assemble(&nodes, &edges(&[("a1", "a"), ("a2", "a1")]));

        assert_eq!(names(&forest), vec!["Second", "First"]);
        let leaf = forest[1].find("a2").expect("leaf nested under a1");
        assert_eq!(leaf.account.display_name, "Leaf");
        assert_eq!(forest[1].subtree_size(), 3);
    }

    #[test]
    fn cyclic_edges_do_not_drop_nodes() {
        let nodes = vec![
            account("x", "X", true, "y"),
            account("y", "Y", true, "x"),
        ];
        let forest = assemble(&nodes, &edges(&[("x", "y"), ("y", "x")]));

        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].id(), "x");
        assert_eq!(forest[0].children[0].id(), "y");
    }

    #[test]
    fn duplicate_ids_keep_first_record() {
        let nodes = vec![
            account("a", "First copy", true, "a"),
            account("a", "Second copy", true, "a"),
        ];
        let forest = assemble(&nodes, &HashMap::new());
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].account.display_name, "First copy");
    }
}
