use super::tree::Tree;
use crate::constants::EPSILON;
use crate::data::{Table, Value};
use crate::errors::DTreeError;
use crate::node::Summary;
use crate::utils::argmax;

/// Predicted target value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Predicted {
    Class(usize),
    Value(f64),
}

/// Result of executing a tree on one record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub value: Predicted,
    /// Total training weight of the leaves reached. A missing value sends the
    /// record down every child, so it reaches their whole weight. A node used
    /// for a value without a child counts with its weight times `fallback`.
    pub support: f64,
    /// Relative frequency of the predicted class, or standard deviation of
    /// the predicted value for metric targets.
    pub confidence: f64,
}

impl Prediction {
    pub fn class(&self) -> Option<usize> {
        match self.value {
            Predicted::Class(c) => Some(c),
            Predicted::Value(_) => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self.value {
            Predicted::Class(c) => c as f64,
            Predicted::Value(v) => v,
        }
    }
}

/// Running totals of the leaves a record reaches.
struct Accumulator {
    frqs: Vec<f64>,
    weight: f64,
    sum: f64,
    sqr: f64,
    support: f64,
}

impl Accumulator {
    fn new(ncls: usize) -> Self {
        Accumulator {
            frqs: vec![0.0; ncls],
            weight: 0.0,
            sum: 0.0,
            sqr: 0.0,
            support: 0.0,
        }
    }

    /// Add a summary as a distribution with mass `wgt`. Its training weight
    /// counts towards the support discounted by `reach`.
    fn add(&mut self, summary: &Summary, wgt: f64, reach: f64) {
        let n = summary.weight();
        if n < EPSILON || wgt <= 0.0 {
            return;
        }
        self.support += reach * n;
        self.weight += wgt;
        match summary {
            Summary::Nominal { frqs, .. } => {
                for (a, f) in self.frqs.iter_mut().zip(frqs.iter()) {
                    *a += wgt * f / n;
                }
            }
            Summary::Metric { mean, sse, .. } => {
                self.sum += wgt * mean;
                self.sqr += wgt * (sse / n + mean * mean);
            }
        }
    }

    fn finish(&self, nominal: bool) -> Prediction {
        if nominal {
            let class = argmax(&self.frqs);
            let total: f64 = self.frqs.iter().sum();
            Prediction {
                value: Predicted::Class(class),
                support: self.support,
                confidence: if total > EPSILON { self.frqs[class] / total } else { 0.0 },
            }
        } else {
            let mean = self.sum / self.weight;
            let var = (self.sqr / self.weight - mean * mean).max(0.0);
            Prediction {
                value: Predicted::Value(mean),
                support: self.support,
                confidence: var.sqrt(),
            }
        }
    }
}

impl Tree {
    /// Execute the tree on one record.
    ///
    /// A missing test value sends the record down every child, each share
    /// proportional to the child's training weight. A known value without a
    /// child uses the test node's own statistics, discounted by `fallback`.
    /// A tree that fails [`Tree::check`] is refused.
    pub fn classify(&self, record: &[Value], fallback: f64) -> Result<Prediction, DTreeError> {
        self.check()?;
        self.classify_checked(record, fallback)
    }

    fn classify_checked(&self, record: &[Value], fallback: f64) -> Result<Prediction, DTreeError> {
        if record.len() != self.attributes.len() {
            return Err(DTreeError::IncompatibleTable(format!(
                "record has {} values, tree expects {}",
                record.len(),
                self.attributes.len()
            )));
        }
        let root = &self.root().summary;
        let mut acc = Accumulator::new(root.frqs().len());
        self.descend(0, record, 1.0, 1.0, fallback, &mut acc);
        if acc.weight <= EPSILON {
            acc = Accumulator::new(root.frqs().len());
            acc.add(root, 1.0, 1.0);
            if acc.weight <= EPSILON {
                // an empty tree predicts the first class or zero
                acc.weight = 1.0;
            }
        }
        Ok(acc.finish(self.is_nominal()))
    }

    fn descend(&self, id: usize, record: &[Value], wgt: f64, reach: f64, fallback: f64, acc: &mut Accumulator) {
        let node = &self.nodes[id];
        let split = match &node.split {
            None => {
                acc.add(&node.summary, wgt, reach);
                return;
            }
            Some(split) => split,
        };
        match split.slot_for(&record[split.attribute]) {
            None => {
                let total: f64 = split.children().map(|c| self.nodes[c].weight()).sum();
                if total < EPSILON {
                    acc.add(&node.summary, wgt, reach);
                    return;
                }
                for c in split.children() {
                    let share = self.nodes[c].weight() / total;
                    if share > 0.0 {
                        self.descend(c, record, wgt * share, reach, fallback, acc);
                    }
                }
            }
            Some(slot) => match split.child(slot) {
                Some(c) => self.descend(c, record, wgt, reach, fallback, acc),
                None => acc.add(&node.summary, wgt * fallback, reach * fallback),
            },
        }
    }

    /// Execute the tree on every tuple of a table over the same attributes.
    pub fn predict(&self, table: &Table, fallback: f64) -> Result<Vec<Prediction>, DTreeError> {
        if **table.attributes() != *self.attributes {
            return Err(DTreeError::IncompatibleTable(
                "attribute sets differ".to_string(),
            ));
        }
        self.check()?;
        (0..table.len()).map(|i| self.classify_checked(table.row(i), fallback)).collect()
    }

    /// Weighted training-style error of the tree on a table: misclassified
    /// weight for nominal targets, sum of squared errors for metric ones.
    /// Tuples with a missing target are skipped.
    pub fn error_on(&self, table: &Table, fallback: f64) -> Result<f64, DTreeError> {
        let preds = self.predict(table, fallback)?;
        let mut err = 0.0;
        for (i, p) in preds.iter().enumerate() {
            let y = table.get(i, self.target);
            let loss = match (p.value, y.as_nominal(), y.as_f64()) {
                (Predicted::Class(c), Some(t), _) => {
                    if c == t {
                        0.0
                    } else {
                        1.0
                    }
                }
                (Predicted::Value(v), _, Some(t)) => (v - t) * (v - t),
                _ => continue,
            };
            err += table.weight(i) * loss;
        }
        Ok(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Attribute, AttributeSet};
    use crate::node::{Node, Slot, Split};
    use std::sync::Arc;

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

    /// color: red -> yes (3:1), green -> no (0:4), blue empty
    fn class_tree() -> Tree {
        let mut tree = Tree::new(attributes(), 2, Summary::nominal(vec![3.0, 5.0])).unwrap();
        let a = tree.push(Node::leaf(Summary::nominal(vec![3.0, 1.0]))).unwrap();
        let b = tree.push(Node::leaf(Summary::nominal(vec![0.0, 4.0]))).unwrap();
        let mut split = Split::new(0, None, 3);
        split.slots = vec![Slot::Owned(a), Slot::Owned(b), Slot::Empty];
        tree.nodes[0].split = Some(split);
        tree.update_stats();
        tree
    }

    fn record(color: Value) -> Vec<Value> {
        vec![color, Value::Real(1.0), Value::Missing]
    }

    #[test]
    fn test_known_value() {
        let tree = class_tree();
        let p = tree.classify(&record(Value::Nominal(0)), 1.0).unwrap();
        assert_eq!(Some(0), p.class());
        assert_eq!(0.75, p.confidence);
        assert_eq!(4.0, p.support);
    }

    #[test]
    fn test_missing_value_mixes_children() {
        let tree = class_tree();
        let p = tree.classify(&record(Value::Missing), 1.0).unwrap();
        // 0.5 * (0.75, 0.25) + 0.5 * (0, 1)
        assert_eq!(Some(1), p.class());
        assert_eq!(0.625, p.confidence);
        assert_eq!(8.0, p.support);
    }

    #[test]
    fn test_absent_child_uses_node() {
        let tree = class_tree();
        let p = tree.classify(&record(Value::Nominal(2)), 0.5).unwrap();
        assert_eq!(Some(1), p.class());
        assert_eq!(0.625, p.confidence);
        assert_eq!(4.0, p.support);
        // nothing reached: fall back to the root
        let p = tree.classify(&record(Value::Nominal(2)), 0.0).unwrap();
        assert_eq!(Some(1), p.class());
        assert_eq!(0.625, p.confidence);
    }

    #[test]
    fn test_metric_mixture() {
        let atts = Arc::new(
            AttributeSet::from_attributes(vec![Attribute::continuous("x"), Attribute::continuous("y")]).unwrap(),
        );
        // left {1, 3}, right {10, 10, 10, 10}
        let mut tree = Tree::new(atts, 1, Summary::metric(6.0, 44.0, 410.0)).unwrap();
        let a = tree.push(Node::leaf(Summary::metric(2.0, 4.0, 10.0))).unwrap();
        let b = tree.push(Node::leaf(Summary::metric(4.0, 40.0, 400.0))).unwrap();
        let mut split = Split::new(0, Some(0.0), 2);
        split.slots = vec![Slot::Owned(a), Slot::Owned(b)];
        tree.nodes[0].split = Some(split);

        let p = tree.classify(&[Value::Real(-1.0), Value::Missing], 1.0).unwrap();
        assert_eq!(Predicted::Value(2.0), p.value);
        assert_eq!(1.0, p.confidence);

        let p = tree.classify(&[Value::Missing, Value::Missing], 1.0).unwrap();
        let mixture = 2.0 / 6.0 * 2.0 + 4.0 / 6.0 * 10.0;
        assert!((p.as_f64() - mixture).abs() < 1e-12);
        assert!((p.as_f64() - tree.root().summary.mean()).abs() < 1e-12);
        assert!((p.support - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_support_keeps_mass_below_missing_values() {
        // a missing value above an absent child: half of the inner node's 8, all of the other leaf's 8
        let mut tree = class_tree();
        let inner = tree.nodes.len();
        let mut outer = Split::new(1, Some(0.0), 2);
        tree.nodes.push(tree.nodes[0].clone());
        tree.nodes[inner].split.as_mut().unwrap().slots = vec![Slot::Owned(1), Slot::Owned(2), Slot::Empty];
        tree.nodes[0] = Node::leaf(Summary::nominal(vec![6.0, 10.0]));
        let other = tree.push(Node::leaf(Summary::nominal(vec![3.0, 5.0]))).unwrap();
        outer.slots = vec![Slot::Owned(inner), Slot::Owned(other)];
        tree.nodes[0].split = Some(outer);
        tree.update_stats();
        assert!(tree.check().is_ok());

        let p = tree.classify(&[Value::Nominal(2), Value::Missing, Value::Missing], 0.5).unwrap();
        assert_eq!(12.0, p.support);
        let p = tree.classify(&[Value::Missing, Value::Missing, Value::Missing], 1.0).unwrap();
        assert_eq!(16.0, p.support);
    }

    #[test]
    fn test_inconsistent_tree_refused() {
        let mut tree = Tree::new(attributes(), 2, Summary::nominal(vec![3.0, 5.0])).unwrap();
        let mut split = Split::new(0, None, 3);
        split.slots = vec![Slot::Owned(7), Slot::Empty, Slot::Empty];
        tree.nodes[0].split = Some(split);
        assert!(tree.check().is_err());
        let result = tree.classify(&record(Value::Nominal(0)), 1.0);
        assert!(matches!(result, Err(DTreeError::InconsistentTree(_))));

        let mut table = Table::new(attributes());
        table.push(record(Value::Missing)).unwrap();
        assert!(matches!(tree.predict(&table, 1.0), Err(DTreeError::InconsistentTree(_))));

        // a split on a metric attribute without a cut
        let mut tree = class_tree();
        tree.nodes[0].split.as_mut().unwrap().attribute = 1;
        assert!(matches!(
            tree.classify(&record(Value::Missing), 1.0),
            Err(DTreeError::InconsistentTree(_))
        ));
    }

    #[test]
    fn test_record_length_checked() {
        let tree = class_tree();
        assert!(tree.classify(&[Value::Missing], 1.0).is_err());
    }
}
