use crate::config::ConfigIO;
use crate::data::{Attribute, AttributeKind, AttributeSet};
use crate::errors::DTreeError;
use crate::node::{Node, Slot, Summary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A decision or regression tree.
///
/// Nodes live in an arena with the root at index 0. Test nodes refer to their
/// children by arena index through owned slots, aliased slots never own a node,
/// so every reachable node is owned exactly once.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Tree {
    pub attributes: Arc<AttributeSet>,
    pub target: usize,
    pub nodes: Vec<Node>,
    /// Number of levels, a single leaf has height 1.
    pub height: usize,
    /// Number of reachable nodes.
    pub size: usize,
    pub leaves: usize,
    /// Root evaluation of every attribute, filled by evaluation-only growing.
    #[serde(default)]
    pub attribute_scores: Option<Vec<Option<f64>>>,
}

impl Tree {
    /// A tree consisting of a single leaf.
    pub fn new(attributes: Arc<AttributeSet>, target: usize, root: Summary) -> Result<Self, DTreeError> {
        if target >= attributes.len() {
            return Err(DTreeError::InvalidTarget(target.to_string()));
        }
        let mut tree = Tree {
            attributes,
            target,
            nodes: Vec::new(),
            height: 1,
            size: 1,
            leaves: 1,
            attribute_scores: None,
        };
        tree.push(Node::leaf(root))?;
        Ok(tree)
    }

    /// Append a node to the arena, returning its index.
    pub(crate) fn push(&mut self, node: Node) -> Result<usize, DTreeError> {
        self.nodes.try_reserve(1).map_err(|_| DTreeError::OutOfMemory)?;
        self.nodes.push(node);
        Ok(self.nodes.len() - 1)
    }

    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    pub fn node(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    pub fn target_attribute(&self) -> Option<&Attribute> {
        self.attributes.get(self.target)
    }

    /// Whether the target is nominal (a classification tree).
    pub fn is_nominal(&self) -> bool {
        self.root().summary.is_nominal()
    }

    /// Leaves of the subtree rooted at `id`, following owned slots only.
    pub fn leaves_under(&self, id: usize) -> Vec<usize> {
        let mut leaves = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            match &self.nodes[n].split {
                None => leaves.push(n),
                Some(split) => stack.extend(split.children()),
            }
        }
        leaves
    }

    /// Target statistics of the subtree at `id`, aggregated from its leaves.
    pub fn aggregate(&self, id: usize) -> Summary {
        let mut summary = self.nodes[id].summary.empty_like();
        for leaf in self.leaves_under(id) {
            summary.merge(&self.nodes[leaf].summary);
        }
        summary
    }

    /// Sum of the training errors of the leaves under `id`.
    pub fn subtree_error(&self, id: usize) -> f64 {
        self.leaves_under(id).iter().map(|l| self.nodes[*l].error()).sum()
    }

    /// Replace the subtree at `id` by a leaf aggregated from its leaves.
    /// The removed nodes stay in the arena until the next `compact`.
    pub fn collapse(&mut self, id: usize) {
        if self.nodes[id].is_leaf() {
            return;
        }
        let summary = self.aggregate(id);
        self.nodes[id] = Node::leaf(summary);
    }

    /// Rebuild the arena in pre-order with only the nodes reachable from the root.
    pub fn compact(&mut self) -> Result<(), DTreeError> {
        let mut map: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut order = Vec::new();
        let mut stack = vec![0];
        while let Some(id) = stack.pop() {
            match map.get(id) {
                Some(None) => {}
                Some(Some(_)) => return Err(DTreeError::InconsistentTree(format!("node {} is owned twice", id))),
                None => return Err(DTreeError::InconsistentTree(format!("child {} out of range", id))),
            }
            map[id] = Some(order.len());
            order.push(id);
            if let Some(split) = &self.nodes[id].split {
                let children: Vec<usize> = split.children().collect();
                stack.extend(children.into_iter().rev());
            }
        }
        let mut nodes = Vec::new();
        nodes.try_reserve(order.len()).map_err(|_| DTreeError::OutOfMemory)?;
        for old in order {
            let mut node = self.nodes[old].clone();
            if let Some(split) = &mut node.split {
                for slot in split.slots.iter_mut() {
                    if let Slot::Owned(c) = slot {
                        *c = map[*c].ok_or_else(|| DTreeError::InconsistentTree(format!("dangling child {}", c)))?;
                    }
                }
            }
            nodes.push(node);
        }
        self.nodes = nodes;
        self.update_stats();
        Ok(())
    }

    /// Re-derive height, size and number of leaves.
    pub fn update_stats(&mut self) {
        let mut height = 0;
        let mut size = 0;
        let mut leaves = 0;
        let mut stack = vec![(0, 1)];
        while let Some((id, level)) = stack.pop() {
            size += 1;
            height = height.max(level);
            match &self.nodes[id].split {
                None => leaves += 1,
                Some(split) => stack.extend(split.children().map(|c| (c, level + 1))),
            }
        }
        self.height = height;
        self.size = size;
        self.leaves = leaves;
    }

    /// Validate every reachable node against the attribute set.
    pub fn check(&self) -> Result<(), DTreeError> {
        let target = self
            .target_attribute()
            .ok_or_else(|| DTreeError::InvalidTarget(self.target.to_string()))?;
        if self.nodes.is_empty() {
            return Err(DTreeError::InconsistentTree("tree has no root".to_string()));
        }
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![0];
        while let Some(id) = stack.pop() {
            let node = self
                .nodes
                .get(id)
                .ok_or_else(|| DTreeError::InconsistentTree(format!("child {} out of range", id)))?;
            if seen[id] {
                return Err(DTreeError::InconsistentTree(format!("node {} is owned twice", id)));
            }
            seen[id] = true;
            match (&target.kind, &node.summary) {
                (AttributeKind::Nominal(values), Summary::Nominal { frqs, .. }) if frqs.len() == values.len() => {}
                (AttributeKind::Integer | AttributeKind::Continuous, Summary::Metric { .. }) => {}
                _ => {
                    return Err(DTreeError::InconsistentTree(format!(
                        "node {} does not match target {}",
                        id, target.name
                    )))
                }
            }
            let split = match &node.split {
                Some(split) => split,
                None => continue,
            };
            let att = self
                .attributes
                .get(split.attribute)
                .ok_or_else(|| DTreeError::InconsistentTree(format!("node {} tests unknown attribute", id)))?;
            if split.attribute == self.target {
                return Err(DTreeError::InconsistentTree(format!("node {} tests the target", id)));
            }
            let shape_ok = match (&att.kind, split.cut) {
                (AttributeKind::Nominal(values), None) => split.slots.len() == values.len(),
                (AttributeKind::Integer | AttributeKind::Continuous, Some(cut)) => {
                    split.slots.len() == 2 && !cut.is_nan()
                }
                _ => false,
            };
            if !shape_ok {
                return Err(DTreeError::InconsistentTree(format!(
                    "node {} does not match attribute {}",
                    id, att.name
                )));
            }
            for (i, slot) in split.slots.iter().enumerate() {
                match slot {
                    Slot::Owned(c) => stack.push(*c),
                    Slot::Alias(_) => {
                        if split.owner(i).is_none() {
                            return Err(DTreeError::InconsistentTree(format!(
                                "broken alias chain at node {} slot {}",
                                id, i
                            )));
                        }
                    }
                    Slot::Empty => {}
                }
            }
        }
        Ok(())
    }

    /// Flags for the attributes tested anywhere in the tree.
    pub fn used_attributes(&self) -> Vec<bool> {
        let mut used = vec![false; self.attributes.len()];
        let mut stack = vec![0];
        while let Some(id) = stack.pop() {
            if let Some(split) = &self.nodes[id].split {
                used[split.attribute] = true;
                stack.extend(split.children());
            }
        }
        used
    }
}

impl ConfigIO for Tree {
    /// Load a tree from a JSON string, restoring the attribute index and
    /// validating the node shapes.
    fn from_json(json_str: &str) -> Result<Self, DTreeError> {
        let mut tree = serde_json::from_str::<Tree>(json_str).map_err(|e| DTreeError::UnableToRead(e.to_string()))?;
        Arc::make_mut(&mut tree.attributes).reindex();
        tree.check()?;
        tree.update_stats();
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Split;
    use tempfile::tempdir;

    fn attributes() -> Arc<AttributeSet> {
        Arc::new(
            AttributeSet::from_attributes(vec![
                Attribute::nominal("color", &["red", "green", "blue"]),
                Attribute::continuous("size"),
                Attribute::nominal("class", &["yes", "no"]),
            ])
            .unwrap(),
        )
    }

    /// color: red, blue -> leaf, green -> (size|1.5) with two leaves.
    fn sample_tree() -> Tree {
        let mut tree = Tree::new(attributes(), 2, Summary::nominal(vec![6.0, 4.0])).unwrap();
        let a = tree.push(Node::leaf(Summary::nominal(vec![5.0, 1.0]))).unwrap();
        let b = tree.push(Node::leaf(Summary::nominal(vec![1.0, 3.0]))).unwrap();
        let c = tree.push(Node::leaf(Summary::nominal(vec![1.0, 0.0]))).unwrap();
        let d = tree.push(Node::leaf(Summary::nominal(vec![0.0, 3.0]))).unwrap();
        let mut inner = Split::new(1, Some(1.5), 2);
        inner.slots = vec![Slot::Owned(c), Slot::Owned(d)];
        tree.nodes[b].split = Some(inner);
        let mut split = Split::new(0, None, 3);
        split.slots = vec![Slot::Owned(a), Slot::Owned(b), Slot::Alias(0)];
        tree.nodes[0].split = Some(split);
        tree.update_stats();
        tree
    }

    #[test]
    fn test_stats_and_aggregate() {
        let tree = sample_tree();
        assert_eq!(3, tree.height);
        assert_eq!(5, tree.size);
        assert_eq!(3, tree.leaves);
        assert_eq!(Summary::nominal(vec![6.0, 4.0]), tree.aggregate(0));
        assert_eq!(1.0, tree.subtree_error(0));
        assert_eq!(vec![true, true, false], tree.used_attributes());
        assert!(tree.check().is_ok());
    }

    #[test]
    fn test_collapse_and_compact() {
        let mut tree = sample_tree();
        tree.collapse(2);
        assert_eq!(Summary::nominal(vec![1.0, 3.0]), tree.nodes[2].summary);
        assert_eq!(5, tree.nodes.len());
        tree.compact().unwrap();
        assert_eq!(3, tree.nodes.len());
        assert_eq!(2, tree.height);
        assert_eq!(2, tree.leaves);
        assert!(tree.check().is_ok());
        let split = tree.root().split.as_ref().unwrap();
        assert_eq!(Some(1), split.child(0));
        assert_eq!(Some(1), split.child(2));
        assert_eq!(Some(2), split.child(1));
    }

    #[test]
    fn test_check_rejects_bad_shapes() {
        let mut tree = sample_tree();
        tree.nodes[0].split.as_mut().unwrap().slots.pop();
        assert!(matches!(tree.check(), Err(DTreeError::InconsistentTree(_))));

        let mut tree = sample_tree();
        let split = tree.nodes[0].split.as_mut().unwrap();
        split.slots[0] = Slot::Alias(2);
        assert!(tree.check().is_err());

        let mut tree = sample_tree();
        tree.nodes[2].split.as_mut().unwrap().cut = None;
        assert!(tree.check().is_err());

        let mut tree = sample_tree();
        tree.nodes[3].summary = Summary::metric(1.0, 1.0, 1.0);
        assert!(tree.check().is_err());

        let mut tree = sample_tree();
        tree.nodes[2].split.as_mut().unwrap().slots[1] = Slot::Owned(1);
        assert!(tree.check().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let tree = sample_tree();
        let dir = tempdir().unwrap();
        let path = dir.path().join("tree.json");
        tree.save(&path).unwrap();
        let loaded = Tree::load(&path).unwrap();
        assert_eq!(tree.nodes, loaded.nodes);
        assert_eq!(tree.target, loaded.target);
        assert_eq!(Some(1), loaded.attributes.index_of("size"));
        assert_eq!(tree.height, loaded.height);
        assert!(Tree::from_json("{\"nodes\": []}").is_err());
    }
}
