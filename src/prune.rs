//! Prune
//!
//! Post-order pruning of a grown tree. Without a table every node is scored
//! with a closed-form error estimate, with a table the tuples are partitioned
//! down the tree and each node is scored by its error on the tuples reaching
//! it. A subtree that is no better than a leaf is collapsed.
use crate::config::{PruneConfig, PruneMethod};
use crate::constants::{EPSILON, REL_TOLERANCE};
use crate::data::Table;
use crate::errors::DTreeError;
use crate::node::Summary;
use crate::partition::{pivot, pivot_missing};
use crate::tree::Tree;
use crate::utils::normal_quantile;
use log::{debug, info};

/// Prune `tree` in place.
///
/// * `config` - Estimator, height limit and node selection threshold.
/// * `table` - Hold-out tuples over the tree's attribute set. If given,
///   errors are measured on it instead of being estimated.
///
/// Pessimistic estimates with a zero increment never collapse a node, only
/// the height and weight limits do.
///
/// A tree that fails [`Tree::check`] is refused. On error the tree is left as
/// it was.
pub fn prune(tree: &mut Tree, config: &PruneConfig, table: Option<&Table>) -> Result<(), DTreeError> {
    config.validate()?;
    tree.check()?;
    let before = tree.size;
    let mut work = tree.clone();
    match table {
        None => {
            prune_estimated(&mut work, 0, 1, config);
        }
        Some(table) => {
            if **table.attributes() != *work.attributes {
                return Err(DTreeError::IncompatibleTable("attribute sets differ".to_string()));
            }
            let mut pruner = TablePruner::new(table, work.target, config)?;
            let mut index = std::mem::take(&mut pruner.index);
            pruner.descend(&mut work, 0, &mut index, 1, true)?;
        }
    }
    work.compact()?;
    *tree = work;
    info!(
        "Pruned tree from {} to {} nodes, {} leaves, height {}.",
        before, tree.size, tree.leaves, tree.height
    );
    Ok(())
}

/// Error count of a nominal leaf at the upper confidence bound, in excess of
/// the observed errors `e` out of `n` cases.
fn added_errors(n: f64, e: f64, cf: f64) -> f64 {
    if n < EPSILON {
        return 0.0;
    }
    if e < 1.0 {
        // exact binomial bound for zero errors, interpolated up to one
        let base = n * (1.0 - cf.powf(1.0 / n));
        if e <= 0.0 {
            return base;
        }
        return base + e * (added_errors(n, 1.0, cf) - base);
    }
    if e + 0.5 >= n {
        return (n - e).max(0.0);
    }
    let z = normal_quantile(1.0 - cf);
    let f = (e + 0.5) / n;
    let r = (f + z * z / (2.0 * n) + z * (f / n - f * f / n + z * z / (4.0 * n * n)).sqrt()) / (1.0 + z * z / n);
    (r * n - e).max(0.0)
}

/// Lower `cf` quantile of the chi-squared distribution with `k` degrees of
/// freedom (Wilson-Hilferty).
fn chi2_lower(k: f64, cf: f64) -> f64 {
    let z = normal_quantile(cf);
    let a = 2.0 / (9.0 * k);
    let base = (1.0 - a + z * a.sqrt()).max(1e-3);
    k * base * base * base
}

/// Estimated error of a node turned into a leaf.
pub fn estimate(summary: &Summary, config: &PruneConfig) -> f64 {
    let w = summary.weight();
    let err = summary.error();
    match (config.method, summary) {
        (PruneMethod::Pessimistic, Summary::Nominal { .. }) => (err + config.param).min(w),
        (PruneMethod::Pessimistic, Summary::Metric { .. }) => {
            if w < EPSILON {
                0.0
            } else {
                err + config.param * err / w
            }
        }
        (PruneMethod::Confidence, Summary::Nominal { .. }) => err + added_errors(w, err, config.param),
        (PruneMethod::Confidence, Summary::Metric { .. }) => {
            if w < EPSILON {
                0.0
            } else {
                w * err / chi2_lower((w - 1.0).max(1.0), config.param)
            }
        }
    }
}

fn forced_leaf(tree: &Tree, id: usize, level: usize, config: &PruneConfig) -> bool {
    (config.max_height > 0 && level >= config.max_height) || tree.nodes[id].weight() < config.min_weight
}

/// Prune the subtree at `id` by error estimates, returning its estimated error.
fn prune_estimated(tree: &mut Tree, id: usize, level: usize, config: &PruneConfig) -> f64 {
    let leaf = estimate(&tree.nodes[id].summary, config);
    let children: Vec<usize> = match &tree.nodes[id].split {
        None => return leaf,
        Some(split) => split.children().collect(),
    };
    if forced_leaf(tree, id, level, config) {
        tree.collapse(id);
        return estimate(&tree.nodes[id].summary, config);
    }
    let subtree: f64 = children
        .into_iter()
        .map(|c| prune_estimated(tree, c, level + 1, config))
        .sum();
    // a leaf's observed error is never below its subtree's
    let exact = config.method == PruneMethod::Pessimistic && config.param <= 0.0;
    if !exact && leaf <= subtree * (1.0 + REL_TOLERANCE) {
        debug!("Level {}: collapsed subtree, estimate {} against {}.", level, leaf, subtree);
        tree.collapse(id);
        return estimate(&tree.nodes[id].summary, config);
    }
    subtree
}

/// Scale the summaries of a whole subtree.
fn scale_subtree(tree: &mut Tree, id: usize, factor: f64) {
    let mut stack = vec![id];
    while let Some(n) = stack.pop() {
        tree.nodes[n].summary.scale(factor);
        if let Some(split) = &tree.nodes[n].split {
            stack.extend(split.children());
        }
    }
}

struct TablePruner<'a> {
    table: &'a Table,
    target: usize,
    config: &'a PruneConfig,
    weights: Vec<f64>,
    index: Vec<usize>,
}

impl<'a> TablePruner<'a> {
    fn new(table: &'a Table, target: usize, config: &'a PruneConfig) -> Result<Self, DTreeError> {
        let mut index = Vec::new();
        index.try_reserve(table.len()).map_err(|_| DTreeError::OutOfMemory)?;
        index.extend((0..table.len()).filter(|i| !table.get(*i, target).is_missing()));
        let mut weights = Vec::new();
        weights.try_reserve(table.len()).map_err(|_| DTreeError::OutOfMemory)?;
        weights.extend_from_slice(table.weights());
        Ok(TablePruner {
            table,
            target,
            config,
            weights,
            index,
        })
    }

    /// Weighted loss of predicting `summary` for the given tuples.
    fn leaf_error(&self, summary: &Summary, index: &[usize]) -> f64 {
        index
            .iter()
            .map(|&i| self.weights[i] * summary.loss(self.table.get(i, self.target)).unwrap_or(0.0))
            .sum()
    }

    /// Error of the subtree at `id` on the tuples in `index`. With `prune`
    /// set the subtree is pruned on the way up and the error of the result is
    /// returned; otherwise the tree is only evaluated.
    fn descend(
        &mut self,
        tree: &mut Tree,
        id: usize,
        index: &mut [usize],
        level: usize,
        prune: bool,
    ) -> Result<f64, DTreeError> {
        let leaf = self.leaf_error(&tree.nodes[id].summary, index);
        let split = match &tree.nodes[id].split {
            None => return Ok(leaf),
            Some(split) => split.clone(),
        };
        if prune && forced_leaf(tree, id, level, self.config) {
            tree.collapse(id);
            return Ok(self.leaf_error(&tree.nodes[id].summary, index));
        }

        let table = self.table;
        let attribute = split.attribute;
        let m = pivot_missing(index, table, attribute);
        // known values without a child are scored by this node
        let routed = pivot(&mut index[m..], |i| {
            split.slot_for(table.get(i, attribute)).and_then(|s| split.child(s)).is_some()
        });
        let mut subtree = self.leaf_error(&tree.nodes[id].summary, &index[m + routed..]);

        let mut saved = Vec::new();
        saved.try_reserve(m).map_err(|_| DTreeError::OutOfMemory)?;
        saved.extend(index[..m].iter().map(|i| (*i, self.weights[*i])));
        let total: f64 = split.children().map(|c| tree.nodes[c].weight()).sum();

        let mut largest: Option<(usize, f64)> = None;
        let mut end = m + routed;
        for owner in split.owning_slots() {
            let child = match split.child(owner) {
                Some(c) => c,
                None => continue,
            };
            let p = pivot(&mut index[m..end], |i| {
                split.slot_for(table.get(i, attribute)).and_then(|s| split.owner(s)) == Some(owner)
            });
            let frac = if total > EPSILON { tree.nodes[child].weight() / total } else { 0.0 };
            for (i, w) in saved.iter() {
                self.weights[*i] = w * frac;
            }
            let reached: f64 = index[..m + p].iter().map(|i| self.weights[*i]).sum();
            if reached > largest.map_or(0.0, |(_, w)| w) {
                largest = Some((child, reached));
            }
            subtree += self.descend(tree, child, &mut index[..m + p], level + 1, prune)?;
            for (i, w) in saved.iter() {
                self.weights[*i] = *w;
            }
            pivot_missing(&mut index[..m + p], table, attribute);
            index[m..end].rotate_left(p);
            end -= p;
        }
        if !prune {
            return Ok(subtree);
        }

        if self.config.check_largest {
            if let Some((child, _)) = largest {
                let branch = self.descend(tree, child, index, level, false)?;
                let tolerance = 1.0 + REL_TOLERANCE;
                if branch <= leaf * tolerance && branch <= subtree * tolerance {
                    debug!(
                        "Level {}: replaced subtree by its largest branch, error {} against {}.",
                        level, branch, subtree
                    );
                    let weight = tree.nodes[id].weight();
                    let child_weight = tree.nodes[child].weight();
                    if child_weight > EPSILON {
                        scale_subtree(tree, child, weight / child_weight);
                    }
                    tree.nodes[id] = tree.nodes[child].clone();
                    return self.descend(tree, id, index, level, true);
                }
            }
        }
        if leaf <= subtree * (1.0 + REL_TOLERANCE) {
            debug!("Level {}: collapsed subtree, error {} against {}.", level, leaf, subtree);
            tree.collapse(id);
            return Ok(self.leaf_error(&tree.nodes[id].summary, index));
        }
        Ok(subtree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GrowConfig;
    use crate::data::fixtures::synthetic;
    use crate::data::{Attribute, AttributeSet, Value};
    use crate::grower::grow;
    use crate::measure::Measure;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn assert_mass_conserved(tree: &Tree) {
        for node in tree.nodes.iter() {
            if let Some(split) = &node.split {
                let sum: f64 = split.children().map(|c| tree.nodes[c].weight()).sum();
                assert!((sum - node.weight()).abs() <= 1e-9 * node.weight().max(1.0));
            }
        }
    }

    fn holdout(seed: u64, missing: f64) -> (Table, Table) {
        let table = synthetic(seed, 600, missing);
        let mut rng = StdRng::seed_from_u64(seed);
        table.split(0.6, &mut rng).unwrap()
    }

    #[test]
    fn test_added_errors() {
        // one case, no error: 1 - cf
        assert!((added_errors(1.0, 0.0, 0.25) - 0.75).abs() < 1e-12);
        assert_eq!(0.0, added_errors(0.0, 0.0, 0.25));
        // all wrong already
        assert_eq!(0.5, added_errors(10.0, 9.5, 0.25));
        let mut last = 0.0;
        for e in [0.0, 0.5, 1.0, 2.0, 4.0] {
            let add = added_errors(20.0, e, 0.25);
            assert!(add > 0.0);
            assert!(e + add > last);
            last = e + add;
        }
        // a smaller confidence factor is more pessimistic
        assert!(added_errors(20.0, 3.0, 0.1) > added_errors(20.0, 3.0, 0.25));
    }

    #[test]
    fn test_estimates_exceed_errors() {
        let conf = PruneConfig::default();
        let pess = PruneConfig::default().set_method(PruneMethod::Pessimistic).set_param(0.5);
        let nominal = Summary::nominal(vec![6.0, 2.0]);
        assert!(estimate(&nominal, &conf) > 2.0);
        assert_eq!(2.5, estimate(&nominal, &pess));
        let full = Summary::nominal(vec![1.0, 1.0]);
        assert_eq!(2.0, estimate(&full, &pess.clone().set_param(5.0)));
        let metric = Summary::metric(10.0, 20.0, 60.0);
        assert!(estimate(&metric, &conf) > metric.error());
        assert_eq!(21.0, estimate(&metric, &pess));
        assert!(chi2_lower(1.0, 0.25) > 0.0);
    }

    #[test]
    fn test_zero_increment_keeps_tree() {
        for (target, measure) in [(4, Measure::InfoGain), (5, Measure::SseReduction)] {
            let table = synthetic(2, 300, 0.1);
            let mut grown = grow(&table, target, &GrowConfig::default().set_measure(measure)).unwrap();
            grown.compact().unwrap();
            let mut pruned = grown.clone();
            let config = PruneConfig::default().set_method(PruneMethod::Pessimistic).set_param(0.0);
            prune(&mut pruned, &config, None).unwrap();
            assert_eq!(grown.size, pruned.size);
            assert_eq!(grown.nodes, pruned.nodes);
        }
    }

    #[test]
    fn test_zero_increment_keeps_untrimmed_tree() {
        let table = synthetic(3, 300, 0.1);
        let config = GrowConfig::default().set_min_branch(1.0).set_prune_trivial(false);
        let grown = grow(&table, 4, &config).unwrap();
        assert!(grown.size > 1);
        let mut pruned = grown.clone();
        let config = PruneConfig::default().set_method(PruneMethod::Pessimistic).set_param(0.0);
        prune(&mut pruned, &config, None).unwrap();
        assert_eq!(grown.size, pruned.size);
        assert_eq!(grown.leaves, pruned.leaves);
    }

    #[test]
    fn test_large_increment_collapses_all() {
        let table = synthetic(4, 300, 0.0);
        let mut tree = grow(&table, 4, &GrowConfig::default()).unwrap();
        let root = tree.root().summary.clone();
        let config = PruneConfig::default().set_method(PruneMethod::Pessimistic).set_param(1e9);
        prune(&mut tree, &config, None).unwrap();
        assert_eq!(1, tree.size);
        assert_eq!(1, tree.height);
        assert_eq!(root.frqs(), tree.root().summary.frqs());
    }

    #[test]
    fn test_max_height() {
        let table = synthetic(6, 400, 0.1);
        let grown = grow(&table, 4, &GrowConfig::default().set_prune_trivial(false)).unwrap();
        for h in 1..=3 {
            let mut tree = grown.clone();
            let config = PruneConfig::default().set_max_height(h);
            prune(&mut tree, &config, None).unwrap();
            assert!(tree.height <= h);
            assert!(tree.check().is_ok());
            assert_mass_conserved(&tree);
        }
    }

    #[test]
    fn test_confidence_pruning_simplifies() {
        for seed in 0..3 {
            let table = synthetic(seed, 400, 0.1);
            for (target, measure) in [(4, Measure::Gini), (5, Measure::VarianceReduction)] {
                let config = GrowConfig::default()
                    .set_measure(measure)
                    .set_min_branch(1.0)
                    .set_prune_trivial(false);
                let grown = grow(&table, target, &config).unwrap();
                let mut tree = grown.clone();
                prune(&mut tree, &PruneConfig::default(), None).unwrap();
                assert!(tree.size <= grown.size);
                assert!(tree.check().is_ok());
                assert_mass_conserved(&tree);
                assert!((tree.root().weight() - grown.root().weight()).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_min_weight_collapses_light_nodes() {
        let table = synthetic(8, 400, 0.0);
        let mut tree = grow(&table, 4, &GrowConfig::default().set_min_branch(1.0)).unwrap();
        let config = PruneConfig::default()
            .set_method(PruneMethod::Pessimistic)
            .set_param(0.0)
            .set_min_weight(50.0);
        prune(&mut tree, &config, None).unwrap();
        for node in tree.nodes.iter() {
            if !node.is_leaf() {
                assert!(node.weight() >= 50.0);
            }
        }
    }

    #[test]
    fn test_table_pruning_reduces_holdout_error() {
        for check_largest in [false, true] {
            let (train, test) = holdout(10, 0.0);
            let grown = grow(&train, 4, &GrowConfig::default().set_min_branch(1.0)).unwrap();
            let mut tree = grown.clone();
            let config = PruneConfig::default().set_check_largest(check_largest);
            prune(&mut tree, &config, Some(&test)).unwrap();
            assert!(tree.size <= grown.size);
            assert!(tree.check().is_ok());
            assert_mass_conserved(&tree);
            let before = grown.error_on(&test, 1.0).unwrap();
            let after = tree.error_on(&test, 1.0).unwrap();
            assert!(after <= before * (1.0 + 1e-4) + 1e-9, "{} > {}", after, before);
        }
    }

    #[test]
    fn test_table_pruning_with_missing_values() {
        let (train, test) = holdout(12, 0.2);
        for (target, measure) in [(4, Measure::InfoGainRatio), (5, Measure::SseReduction)] {
            let grown = grow(&train, target, &GrowConfig::default().set_measure(measure)).unwrap();
            let mut tree = grown.clone();
            let config = PruneConfig::default().set_check_largest(true).set_max_height(4);
            prune(&mut tree, &config, Some(&test)).unwrap();
            assert!(tree.height <= 4);
            assert!(tree.check().is_ok());
            assert_mass_conserved(&tree);
        }
    }

    #[test]
    fn test_largest_branch_adopted() {
        // the split on `noise` is useless on the hold-out data, its first
        // branch carries the split on `signal`
        let atts = Arc::new(
            AttributeSet::from_attributes(vec![
                Attribute::nominal("noise", &["n0", "n1"]),
                Attribute::nominal("signal", &["s0", "s1"]),
                Attribute::nominal("class", &["yes", "no"]),
            ])
            .unwrap(),
        );
        let mut tree = Tree::new(Arc::clone(&atts), 2, Summary::nominal(vec![6.0, 6.0])).unwrap();
        let left = tree.push(crate::node::Node::leaf(Summary::nominal(vec![4.0, 4.0]))).unwrap();
        let right = tree.push(crate::node::Node::leaf(Summary::nominal(vec![2.0, 2.0]))).unwrap();
        let yes = tree.push(crate::node::Node::leaf(Summary::nominal(vec![4.0, 0.0]))).unwrap();
        let no = tree.push(crate::node::Node::leaf(Summary::nominal(vec![0.0, 4.0]))).unwrap();
        let mut inner = crate::node::Split::new(1, None, 2);
        inner.slots = vec![crate::node::Slot::Owned(yes), crate::node::Slot::Owned(no)];
        tree.nodes[left].split = Some(inner);
        let mut outer = crate::node::Split::new(0, None, 2);
        outer.slots = vec![crate::node::Slot::Owned(left), crate::node::Slot::Owned(right)];
        tree.nodes[0].split = Some(outer);
        tree.update_stats();
        assert!(tree.check().is_ok());

        let mut test = Table::new(atts);
        for (n, s, c) in [(0, 0, 0), (0, 1, 1), (0, 0, 0), (1, 0, 0), (1, 1, 1), (1, 1, 1)] {
            test.push(vec![Value::Nominal(n), Value::Nominal(s), Value::Nominal(c)]).unwrap();
        }
        let mut plain = tree.clone();
        prune(&mut plain, &PruneConfig::default(), Some(&test)).unwrap();
        assert_eq!(Some(0), plain.root().split.as_ref().map(|s| s.attribute));

        let config = PruneConfig::default().set_check_largest(true);
        prune(&mut tree, &config, Some(&test)).unwrap();
        assert_eq!(3, tree.size);
        assert_eq!(Some(1), tree.root().split.as_ref().map(|s| s.attribute));
        assert_eq!(12.0, tree.root().weight());
        assert_mass_conserved(&tree);
        assert_eq!(0.0, tree.error_on(&test, 1.0).unwrap());
    }

    #[test]
    fn test_failures_leave_tree_untouched() {
        let table = synthetic(1, 100, 0.0);
        let mut tree = grow(&table, 4, &GrowConfig::default()).unwrap();
        let copy = tree.clone();
        assert!(prune(&mut tree, &PruneConfig::default().set_param(1.5), None).is_err());
        let other = Arc::new(AttributeSet::from_attributes(vec![Attribute::continuous("z")]).unwrap());
        let result = prune(&mut tree, &PruneConfig::default(), Some(&Table::new(other)));
        assert!(matches!(result, Err(DTreeError::IncompatibleTable(_))));
        assert_eq!(copy.nodes, tree.nodes);
    }

    #[test]
    fn test_inconsistent_tree_refused() {
        let table = synthetic(1, 100, 0.0);
        let mut tree = grow(&table, 4, &GrowConfig::default()).unwrap();
        let last = tree.nodes.len();
        if let Some(split) = tree.nodes[0].split.as_mut() {
            split.slots[0] = crate::node::Slot::Owned(last + 3);
        } else {
            tree.nodes[0].split = Some(crate::node::Split::new(2, None, 2));
        }
        let copy = tree.clone();
        for table in [None, Some(&table)] {
            let result = prune(&mut tree, &PruneConfig::default(), table);
            assert!(matches!(result, Err(DTreeError::InconsistentTree(_))));
            assert_eq!(copy.nodes, tree.nodes);
        }
    }
}
