//! Grower
//!
//! Top-down induction of a decision or regression tree. Every call works on
//! an exclusive slice of one tuple index vector and on a working copy of the
//! tuple weights, which are scaled down for tuples with a missing test value
//! while they take part in a child and restored afterwards.
use crate::aggregate::{AggTable, FreqTable, VarTable};
use crate::config::GrowConfig;
use crate::constants::{EPSILON, REL_TOLERANCE, WORTHLESS};
use crate::data::{AttributeKind, AttributeSet, Table};
use crate::errors::DTreeError;
use crate::node::{Node, Slot, Split, Summary};
use crate::partition::{pivot, pivot_missing, sort_by_value};
use crate::tree::Tree;
use log::{debug, info, trace, warn};
use std::sync::Arc;

/// Grow a tree predicting column `target` of `table`.
///
/// The measure must fit the target: class measures for nominal targets,
/// variance measures for integer or continuous ones. Tuples with a missing
/// target are ignored.
pub fn grow(table: &Table, target: usize, config: &GrowConfig) -> Result<Tree, DTreeError> {
    config.validate()?;
    let att = table
        .attributes()
        .get(target)
        .ok_or_else(|| DTreeError::UnknownAttribute(target.to_string()))?;
    if att.is_metric() != config.measure.is_metric() {
        return Err(DTreeError::InvalidTarget(format!(
            "measure {} does not apply to target {}",
            config.measure, att.name
        )));
    }
    let mut config = config.clone();
    if config.one_vs_rest && (config.subset || config.binary) {
        warn!("One-vs-rest splits take precedence over subset search.");
        config.subset = false;
        config.binary = false;
    }
    if config.binary && !config.subset {
        warn!("Binary splits need subset search, enabling it.");
        config.subset = true;
    }
    if config.eval_only && (config.max_height == 0 || config.max_height > 2) {
        config.max_height = 2;
    }
    let attributes = if config.dup_attributes {
        Arc::new(AttributeSet::clone(table.attributes()))
    } else {
        Arc::clone(table.attributes())
    };
    let tree = match &att.kind {
        AttributeKind::Nominal(values) => Grower::<FreqTable>::new(table, target, &config, values.len(), attributes)?.run()?,
        _ => Grower::<VarTable>::new(table, target, &config, 0, attributes)?.run()?,
    };
    info!(
        "Grown tree for {}: {} nodes, {} leaves, height {}.",
        att.name, tree.size, tree.leaves, tree.height
    );
    Ok(tree)
}

/// Best split found so far at a node.
struct Candidate {
    attribute: usize,
    score: f64,
    cut: Option<f64>,
}

struct Grower<'a, T: AggTable> {
    table: &'a Table,
    target: usize,
    config: &'a GrowConfig,
    ycnt: usize,
    weights: Vec<f64>,
    /// Nominal attributes already tested with a single value on the current path.
    used: Vec<bool>,
    curr: T,
    cand: T,
    best: T,
    scores: Option<Vec<Option<f64>>>,
    index: Vec<usize>,
    tree: Tree,
}

impl<'a, T: AggTable> Grower<'a, T> {
    fn new(
        table: &'a Table,
        target: usize,
        config: &'a GrowConfig,
        ycnt: usize,
        attributes: Arc<AttributeSet>,
    ) -> Result<Self, DTreeError> {
        let mut index = Vec::new();
        index.try_reserve(table.len()).map_err(|_| DTreeError::OutOfMemory)?;
        index.extend((0..table.len()).filter(|i| !table.get(*i, target).is_missing()));
        let mut weights = Vec::new();
        weights.try_reserve(table.len()).map_err(|_| DTreeError::OutOfMemory)?;
        weights.extend_from_slice(table.weights());
        let natts = attributes.len();
        let mut grower = Grower {
            table,
            target,
            config,
            ycnt,
            weights,
            used: vec![false; natts],
            curr: T::default(),
            cand: T::default(),
            best: T::default(),
            scores: if config.eval_only { Some(vec![None; natts]) } else { None },
            index: Vec::new(),
            tree: Tree::new(attributes, target, Summary::nominal(Vec::new()))?,
        };
        let root = grower.summarize(&index);
        grower.tree.nodes[0] = Node::leaf(root);
        grower.index = index;
        Ok(grower)
    }

    fn run(mut self) -> Result<Tree, DTreeError> {
        let mut index = std::mem::take(&mut self.index);
        self.grow_node(0, &mut index, 1)?;
        self.tree.attribute_scores = self.scores.take();
        self.tree.update_stats();
        Ok(self.tree)
    }

    /// Target statistics of a set of tuples under the current weights.
    fn summarize(&mut self, index: &[usize]) -> Summary {
        self.curr.init(1, self.ycnt);
        for &i in index {
            self.curr
                .add(Some(0), T::target(self.table.get(i, self.target)), self.weights[i]);
        }
        self.curr.marginalize();
        self.curr.summary()
    }

    fn is_terminal(&self, weight: f64, error: f64, level: usize) -> bool {
        weight < 2.0 * self.config.min_branch
            || error <= EPSILON
            || (self.config.max_height > 0 && level >= self.config.max_height)
    }

    fn grow_node(&mut self, id: usize, index: &mut [usize], level: usize) -> Result<(), DTreeError> {
        let weight = self.tree.nodes[id].weight();
        let error = self.tree.nodes[id].error();
        let terminal = self.is_terminal(weight, error, level);
        let evaluate_all = level == 1 && self.scores.is_some();
        if terminal && !evaluate_all {
            return Ok(());
        }

        let table = self.table;
        let mut chosen: Option<Candidate> = None;
        for (attribute, att) in table.attributes().iter().enumerate() {
            if attribute == self.target || self.used[attribute] {
                continue;
            }
            let (score, cut) = match &att.kind {
                AttributeKind::Nominal(values) => (self.eval_nominal(attribute, values.len(), index), None),
                _ => self.eval_cut(attribute, index),
            };
            trace!("Level {}, attribute {}: {}", level, att.name, score);
            if evaluate_all {
                if let Some(scores) = self.scores.as_mut() {
                    scores[attribute] = if score > WORTHLESS { Some(score) } else { None };
                }
            }
            let best_score = chosen.as_ref().map_or(WORTHLESS, |c| c.score);
            if score > best_score && score >= self.config.min_measure {
                chosen = Some(Candidate { attribute, score, cut });
                std::mem::swap(&mut self.cand, &mut self.best);
            }
        }
        let chosen = match chosen {
            Some(c) if !terminal => c,
            _ => return Ok(()),
        };

        let attribute = chosen.attribute;
        let nslots = match chosen.cut {
            Some(_) => 2,
            None => self.best.xcnt(),
        };
        // representative slot of every slot and the weight of each group
        let groups: Vec<usize> = (0..nslots).map(|v| self.best.destination(v)).collect();
        let group_weights: Vec<f64> = (0..nslots)
            .map(|g| if groups[g] == g { self.best.frq_x(g) } else { 0.0 })
            .collect();
        let known = self.best.known();
        debug!(
            "Level {}: split on {} (score {}), {} branches.",
            level,
            table.attributes().get(attribute).map_or("", |a| a.name.as_str()),
            chosen.score,
            group_weights.iter().filter(|w| **w > 0.0).count()
        );

        let m = pivot_missing(index, table, attribute);
        let mut saved = Vec::new();
        saved.try_reserve(m).map_err(|_| DTreeError::OutOfMemory)?;
        saved.extend(index[..m].iter().map(|i| (*i, self.weights[*i])));

        let mark = self.tree.nodes.len();
        let mut split = Split::new(attribute, chosen.cut, nslots);
        let mut end = index.len();
        for rep in 0..nslots {
            if groups[rep] != rep || group_weights[rep] <= 0.0 {
                continue;
            }
            let frac = group_weights[rep] / known;
            let p = pivot(&mut index[m..end], |i| {
                split.slot_for(table.get(i, attribute)).map(|s| groups.get(s) == Some(&rep)) == Some(true)
            });
            for (i, w) in saved.iter() {
                self.weights[*i] = w * frac;
            }
            let summary = self.summarize(&index[..m + p]);
            let child = self.tree.push(Node::leaf(summary))?;
            split.slots[rep] = Slot::Owned(child);
            let mut members = 0;
            for v in 0..nslots {
                if groups[v] == rep {
                    members += 1;
                    if v != rep {
                        split.slots[v] = Slot::Alias(rep);
                    }
                }
            }
            let was_used = self.used[attribute];
            if chosen.cut.is_none() && members == 1 {
                self.used[attribute] = true;
            }
            self.grow_node(child, &mut index[..m + p], level + 1)?;
            self.used[attribute] = was_used;
            for (i, w) in saved.iter() {
                self.weights[*i] = *w;
            }
            // missing tuples back to the front, the finished group behind the open ones
            pivot_missing(&mut index[..m + p], table, attribute);
            index[m..end].rotate_left(p);
            end -= p;
        }
        self.tree.nodes[id].split = Some(split);

        if self.config.prune_trivial {
            let subtree = self.tree.subtree_error(id);
            if error <= subtree * (1.0 + REL_TOLERANCE) {
                debug!("Level {}: subtree is no better than a leaf, discarded.", level);
                self.tree.nodes[id].split = None;
                self.tree.nodes.truncate(mark);
            }
        }
        Ok(())
    }

    /// Evaluate a nominal attribute, leaving the chosen grouping in `cand`.
    fn eval_nominal(&mut self, attribute: usize, xcnt: usize, index: &[usize]) -> f64 {
        self.cand.init(xcnt, self.ycnt);
        for &i in index {
            self.cand.add(
                self.table.get(i, attribute).as_nominal(),
                T::target(self.table.get(i, self.target)),
                self.weights[i],
            );
        }
        self.cand.marginalize();
        if self.config.one_vs_rest {
            one_vs_rest(&mut self.cand, &mut self.curr, self.config)
        } else if self.config.subset {
            merge_subsets(&mut self.cand, self.config)
        } else {
            rate(&self.cand, self.config)
        }
    }

    /// Search the best cut of an integer or continuous attribute by sweeping
    /// the sorted tuples through a two-column table. The table of the best
    /// cut is left in `cand`.
    fn eval_cut(&mut self, attribute: usize, index: &mut [usize]) -> (f64, Option<f64>) {
        let table = self.table;
        let m = pivot_missing(index, table, attribute);
        sort_by_value(&mut index[m..], table, attribute);
        self.curr.init(2, self.ycnt);
        for (k, &i) in index.iter().enumerate() {
            let x = if k < m { None } else { Some(1) };
            self.curr.add(x, T::target(table.get(i, self.target)), self.weights[i]);
        }
        self.curr.marginalize();
        let min = self.config.min_branch;
        let mut best = WORTHLESS;
        let mut cut = None;
        for k in m..index.len().saturating_sub(1) {
            let i = index[k];
            let y = T::target(table.get(i, self.target));
            self.curr.add(Some(1), y, -self.weights[i]);
            self.curr.add(Some(0), y, self.weights[i]);
            let v = table.get(i, attribute).as_f64().unwrap_or(f64::NEG_INFINITY);
            let next = table.get(index[k + 1], attribute).as_f64().unwrap_or(f64::NEG_INFINITY);
            if v >= next {
                continue;
            }
            self.curr.marginalize();
            if self.curr.frq_x(0) < min || self.curr.frq_x(1) < min {
                continue;
            }
            let score = self.curr.eval(self.config.measure, self.config.weighted, &self.config.params);
            if score > best {
                best = score;
                let mid = v + (next - v) / 2.0;
                cut = Some(if mid < next { mid } else { v });
                self.cand.copy_from(&self.curr);
            }
        }
        match cut {
            Some(_) => (best, cut),
            None => (WORTHLESS, None),
        }
    }
}

/// Score a table, requiring at least two branches with the minimum weight.
fn rate<T: AggTable>(t: &T, config: &GrowConfig) -> f64 {
    if t.branch_count(config.min_branch) < 2 {
        return WORTHLESS;
    }
    t.eval(config.measure, config.weighted, &config.params)
}

/// Try every value against the rest, leaving the best grouping in `t`.
fn one_vs_rest<T: AggTable>(t: &mut T, scratch: &mut T, config: &GrowConfig) -> f64 {
    let xcnt = t.xcnt();
    let mut best = WORTHLESS;
    for v in 0..xcnt {
        if t.frq_x(v) <= 0.0 {
            continue;
        }
        let rest = match (0..xcnt).find(|x| *x != v) {
            Some(r) => r,
            None => break,
        };
        for x in 0..xcnt {
            if x != v && x != rest {
                t.combine(x, rest);
            }
        }
        t.marginalize();
        let score = rate(t, config);
        if score > best {
            best = score;
            scratch.copy_from(t);
        }
        for x in 0..xcnt {
            if x != v && x != rest {
                t.uncombine(x);
            }
        }
        t.marginalize();
    }
    if best > WORTHLESS {
        std::mem::swap(t, scratch);
    }
    best
}

/// Greedily merge pairs of value groups, each into the lower index. Without
/// the binary flag a merge is kept while the score does not drop, with it
/// merging goes on until two groups remain. Once only one group reaches the
/// minimum branch weight, that (heaviest) group is left out of the merging.
fn merge_subsets<T: AggTable>(t: &mut T, config: &GrowConfig) -> f64 {
    let params = &config.params;
    let mut score = t.eval(config.measure, config.weighted, params);
    loop {
        let groups: Vec<usize> = (0..t.xcnt())
            .filter(|x| t.is_active(*x) && t.frq_x(*x) > 0.0)
            .collect();
        if groups.len() <= 2 {
            break;
        }
        let nontrivial = groups.iter().filter(|g| t.frq_x(**g) >= config.min_branch).count();
        let exempt = if nontrivial <= 1 {
            groups
                .iter()
                .copied()
                .max_by(|a, b| t.frq_x(*a).total_cmp(&t.frq_x(*b)))
        } else {
            None
        };
        let mut best_pair = None;
        let mut best_score = WORTHLESS;
        for (k, &dst) in groups.iter().enumerate() {
            for &src in &groups[k + 1..] {
                if exempt == Some(dst) || exempt == Some(src) {
                    continue;
                }
                if !t.combine(src, dst) {
                    continue;
                }
                t.marginalize();
                let s = t.eval(config.measure, config.weighted, params);
                t.uncombine(src);
                t.marginalize();
                if best_pair.is_none() || s > best_score {
                    best_score = s;
                    best_pair = Some((src, dst));
                }
            }
        }
        let (src, dst) = match best_pair {
            Some(pair) => pair,
            None => break,
        };
        if !config.binary && best_score < score {
            break;
        }
        t.combine(src, dst);
        t.marginalize();
        score = best_score;
    }
    rate(t, config)
}
