use crate::aggregate::var::sse;
use crate::constants::EPSILON;
use crate::data::Value;
use crate::utils::argmax;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Target statistics carried by every node.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub enum Summary {
    /// Class frequencies of a nominal target.
    Nominal { weight: f64, frqs: Vec<f64>, class: usize },
    /// Weight, mean and sum of squared errors of a metric target.
    Metric { weight: f64, mean: f64, sse: f64 },
}

impl Summary {
    pub fn nominal(frqs: Vec<f64>) -> Self {
        let weight = frqs.iter().sum();
        let class = argmax(&frqs);
        Summary::Nominal { weight, frqs, class }
    }

    /// Metric statistics from weight, weighted sum and weighted sum of squares.
    pub fn metric(weight: f64, sum: f64, sqr: f64) -> Self {
        let mean = if weight < EPSILON { 0.0 } else { sum / weight };
        Summary::Metric {
            weight,
            mean,
            sse: sse(weight, sum, sqr),
        }
    }

    /// A summary of the same kind without any weight.
    pub fn empty_like(&self) -> Self {
        match self {
            Summary::Nominal { frqs, .. } => Summary::nominal(vec![0.0; frqs.len()]),
            Summary::Metric { .. } => Summary::Metric {
                weight: 0.0,
                mean: 0.0,
                sse: 0.0,
            },
        }
    }

    pub fn is_nominal(&self) -> bool {
        matches!(self, Summary::Nominal { .. })
    }

    pub fn weight(&self) -> f64 {
        match self {
            Summary::Nominal { weight, .. } | Summary::Metric { weight, .. } => *weight,
        }
    }

    /// Training error: misclassified weight for nominal targets,
    /// sum of squared errors for metric targets.
    pub fn error(&self) -> f64 {
        match self {
            Summary::Nominal { weight, frqs, class } => (weight - frqs.get(*class).copied().unwrap_or(0.0)).max(0.0),
            Summary::Metric { sse, .. } => *sse,
        }
    }

    /// Majority class of a nominal summary.
    pub fn class(&self) -> Option<usize> {
        match self {
            Summary::Nominal { class, .. } => Some(*class),
            Summary::Metric { .. } => None,
        }
    }

    pub fn mean(&self) -> f64 {
        match self {
            Summary::Nominal { class, .. } => *class as f64,
            Summary::Metric { mean, .. } => *mean,
        }
    }

    pub fn frqs(&self) -> &[f64] {
        match self {
            Summary::Nominal { frqs, .. } => frqs,
            Summary::Metric { .. } => &[],
        }
    }

    /// Loss of predicting this summary for a case with the given target value,
    /// `None` if the target is missing or of the wrong kind.
    pub fn loss(&self, target: &Value) -> Option<f64> {
        match self {
            Summary::Nominal { class, .. } => target.as_nominal().map(|y| if y == *class { 0.0 } else { 1.0 }),
            Summary::Metric { mean, .. } => match target {
                Value::Nominal(_) => None,
                _ => target.as_f64().map(|y| (y - mean) * (y - mean)),
            },
        }
    }

    /// Multiply the weight by `factor`, keeping the distribution.
    pub fn scale(&mut self, factor: f64) {
        match self {
            Summary::Nominal { weight, frqs, .. } => {
                frqs.iter_mut().for_each(|f| *f *= factor);
                *weight *= factor;
            }
            Summary::Metric { weight, sse, .. } => {
                *weight *= factor;
                *sse *= factor;
            }
        }
    }

    /// Add the statistics of `other` (of the same kind) to this summary.
    pub fn merge(&mut self, other: &Summary) {
        match (self, other) {
            (
                Summary::Nominal { weight, frqs, class },
                Summary::Nominal { frqs: other_frqs, .. },
            ) => {
                if frqs.len() < other_frqs.len() {
                    frqs.resize(other_frqs.len(), 0.0);
                }
                for (a, b) in frqs.iter_mut().zip(other_frqs.iter()) {
                    *a += b;
                }
                *weight = frqs.iter().sum();
                *class = argmax(frqs);
            }
            (
                Summary::Metric { weight, mean, sse },
                Summary::Metric {
                    weight: w2,
                    mean: m2,
                    sse: s2,
                },
            ) => {
                let w = *weight + w2;
                if w < EPSILON {
                    return;
                }
                let d = *m2 - *mean;
                *sse += s2 + *weight * w2 / w * d * d;
                *mean += w2 / w * d;
                *weight = w;
            }
            _ => {}
        }
    }
}

/// A child slot of a test node.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    /// No cases had this value while growing.
    Empty,
    /// The slot owns the child node with this arena index.
    Owned(usize),
    /// The value shares the child of another slot of the same node.
    Alias(usize),
}

/// The test of an inner node.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Split {
    pub attribute: usize,
    /// Cut value of a metric attribute. Slot 0 takes values `<= cut`, slot 1 the rest.
    pub cut: Option<f64>,
    pub slots: Vec<Slot>,
}

impl Split {
    pub fn new(attribute: usize, cut: Option<f64>, nslots: usize) -> Self {
        Split {
            attribute,
            cut,
            slots: vec![Slot::Empty; nslots],
        }
    }

    /// Follow alias slots to the slot that owns the child (or is empty).
    /// `None` if the chain is broken or cyclic.
    pub fn owner(&self, slot: usize) -> Option<usize> {
        let mut s = slot;
        for _ in 0..=self.slots.len() {
            match self.slots.get(s)? {
                Slot::Alias(t) => s = *t,
                _ => return Some(s),
            }
        }
        None
    }

    /// Arena index of the child reached through `slot`.
    pub fn child(&self, slot: usize) -> Option<usize> {
        match self.slots.get(self.owner(slot)?)? {
            Slot::Owned(c) => Some(*c),
            _ => None,
        }
    }

    /// Slot a value is routed to, `None` for a missing value. The slot may
    /// be out of range for nominal codes the tree never saw.
    pub fn slot_for(&self, value: &Value) -> Option<usize> {
        if value.is_missing() {
            return None;
        }
        match self.cut {
            Some(cut) => value.as_f64().map(|v| if v <= cut { 0 } else { 1 }),
            None => value.as_nominal(),
        }
    }

    /// Arena indices of all owned children, in slot order.
    pub fn children(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots.iter().filter_map(|s| match s {
            Slot::Owned(c) => Some(*c),
            _ => None,
        })
    }

    /// Slot indices that own a child, in slot order.
    pub fn owning_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, Slot::Owned(_)))
            .map(|(i, _)| i)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Node {
    pub summary: Summary,
    pub split: Option<Split>,
}

impl Node {
    pub fn leaf(summary: Summary) -> Self {
        Node { summary, split: None }
    }

    pub fn is_leaf(&self) -> bool {
        self.split.is_none()
    }

    pub fn weight(&self) -> f64 {
        self.summary.weight()
    }

    pub fn error(&self) -> f64 {
        self.summary.error()
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.split {
            None => write!(f, "leaf,weight={},error={}", self.weight(), self.error()),
            Some(split) => match split.cut {
                Some(cut) => write!(f, "{}<={},weight={}", split.attribute, cut, self.weight()),
                None => write!(
                    f,
                    "{} in {} slots,weight={}",
                    split.attribute,
                    split.slots.len(),
                    self.weight()
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nominal_summary() {
        let s = Summary::nominal(vec![1.0, 3.0, 3.0]);
        assert_eq!(7.0, s.weight());
        assert_eq!(Some(1), s.class());
        assert_eq!(4.0, s.error());
        assert_eq!(Some(0.0), s.loss(&Value::Nominal(1)));
        assert_eq!(Some(1.0), s.loss(&Value::Nominal(2)));
        assert_eq!(None, s.loss(&Value::Missing));
    }

    #[test]
    fn test_metric_merge_matches_pooled() {
        // {1, 3} and {10, 10}
        let mut a = Summary::metric(2.0, 4.0, 10.0);
        let b = Summary::metric(2.0, 20.0, 200.0);
        a.merge(&b);
        let pooled = Summary::metric(4.0, 24.0, 210.0);
        assert!((a.weight() - pooled.weight()).abs() < 1e-12);
        assert!((a.mean() - pooled.mean()).abs() < 1e-12);
        assert!((a.error() - pooled.error()).abs() < 1e-9);
        assert_eq!(Some(25.0), a.loss(&Value::Real(1.0)));
    }

    #[test]
    fn test_nominal_merge() {
        let mut a = Summary::nominal(vec![2.0, 0.0]);
        a.merge(&Summary::nominal(vec![0.0, 3.0]));
        assert_eq!(Some(1), a.class());
        assert_eq!(5.0, a.weight());
        let mut e = a.empty_like();
        assert_eq!(0.0, e.weight());
        e.merge(&a);
        assert_eq!(a, e);
    }

    #[test]
    fn test_scale() {
        let mut a = Summary::nominal(vec![1.0, 3.0]);
        a.scale(2.0);
        assert_eq!(Summary::nominal(vec![2.0, 6.0]), a);
        let mut m = Summary::metric(2.0, 4.0, 10.0);
        m.scale(0.5);
        assert_eq!(1.0, m.weight());
        assert_eq!(2.0, m.mean());
        assert_eq!(1.0, m.error());
    }

    #[test]
    fn test_split_slots() {
        let mut split = Split::new(0, None, 4);
        split.slots[1] = Slot::Owned(5);
        split.slots[0] = Slot::Alias(3);
        split.slots[3] = Slot::Alias(1);
        assert_eq!(Some(1), split.owner(0));
        assert_eq!(Some(5), split.child(0));
        assert_eq!(None, split.child(2));
        assert_eq!(None, split.child(7));
        assert_eq!(vec![5], split.children().collect::<Vec<_>>());
        assert_eq!(Some(2), split.slot_for(&Value::Nominal(2)));
        assert_eq!(None, split.slot_for(&Value::Missing));
        split.slots[1] = Slot::Alias(0);
        assert_eq!(None, split.owner(0));
    }

    #[test]
    fn test_cut_routing() {
        let split = Split::new(2, Some(2.5), 2);
        assert_eq!(Some(0), split.slot_for(&Value::Real(2.5)));
        assert_eq!(Some(1), split.slot_for(&Value::Integer(3)));
        assert_eq!(None, split.slot_for(&Value::Real(f64::NAN)));
    }
}
