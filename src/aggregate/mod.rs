//! Aggregation tables
//!
//! Sufficient statistics of a candidate split: one column per group of split
//! attribute values (x), aggregated target statistics per column (y). Columns
//! can be merged into each other and unmerged again, which is what subset
//! search over nominal values runs on.
use crate::data::Value;
use crate::measure::{Measure, MeasureParams};
use crate::node::Summary;

pub mod freq;
pub mod var;

pub use freq::FreqTable;
pub use var::VarTable;

/// Common interface of frequency and variation tables.
///
/// Column indices passed in are always attribute value groups `0..xcnt`;
/// `None` stands for an unknown split value (or target value in `add`).
pub trait AggTable: Clone + Default {
    /// Target value type counted in the y dimension.
    type Target: Copy;

    /// Extract the target from a tuple cell.
    fn target(value: &Value) -> Option<Self::Target>;

    /// Clear all cells and destination pointers and resize to `xcnt` columns.
    /// `ycnt` is the number of target classes; variation tables ignore it.
    fn init(&mut self, xcnt: usize, ycnt: usize);

    /// Accumulate a weighted observation. Negative weights remove it again.
    fn add(&mut self, x: Option<usize>, y: Option<Self::Target>, weight: f64);

    /// Recompute marginals and totals from the joint cells,
    /// skipping columns that were merged into others.
    fn marginalize(&mut self);

    /// Merge column `src` into `dst`. Returns `false` (and leaves the table
    /// untouched) if the merge would create a cycle or `src` is already merged.
    fn combine(&mut self, src: usize, dst: usize) -> bool;

    /// Undo the merge of `src`. Returns `false` if `src` was not merged.
    fn uncombine(&mut self, src: usize) -> bool;

    /// The column `x` was directly merged into, if any.
    fn merged_into(&self, x: usize) -> Option<usize>;

    fn xcnt(&self) -> usize;

    /// Weight in column `x` (including merged columns), known targets only.
    fn frq_x(&self, x: usize) -> f64;

    /// Weight with unknown split value and known target.
    fn unknown_x(&self) -> f64;

    /// Weight with known split value and known target.
    fn known(&self) -> f64;

    /// Weight with known target, split value known or not.
    fn total(&self) -> f64;

    /// All weight that was added, including unknown targets.
    fn grand(&self) -> f64;

    /// Score the table with a measure. Returns `WORTHLESS` if the measure
    /// does not apply to this kind of table or the table is degenerate.
    fn eval(&self, measure: Measure, weighted: bool, params: &MeasureParams) -> f64;

    /// Overwrite this table with the contents of `other`, reusing buffers.
    fn copy_from(&mut self, other: &Self);

    /// Target statistics of all known-target cases in active columns.
    fn summary(&self) -> Summary;

    /// Follow destination pointers to the column a value group ends up in.
    fn destination(&self, x: usize) -> usize {
        let mut x = x;
        let mut steps = 0;
        while let Some(d) = self.merged_into(x) {
            x = d;
            steps += 1;
            if steps > self.xcnt() {
                break;
            }
        }
        x
    }

    fn is_active(&self, x: usize) -> bool {
        self.merged_into(x).is_none()
    }

    /// Number of active columns that carry weight.
    fn active_count(&self) -> usize {
        (0..self.xcnt())
            .filter(|x| self.is_active(*x) && self.frq_x(*x) > 0.0)
            .count()
    }

    /// Number of active columns with at least `min` weight.
    fn branch_count(&self, min: f64) -> usize {
        (0..self.xcnt())
            .filter(|x| self.is_active(*x) && self.frq_x(*x) > 0.0 && self.frq_x(*x) >= min)
            .count()
    }
}

/// Shared destination-pointer bookkeeping for `combine`.
pub(crate) fn can_combine(dsts: &[Option<usize>], src: usize, dst: usize) -> bool {
    if src == dst || src >= dsts.len() || dst >= dsts.len() || dsts[src].is_some() {
        return false;
    }
    // refuse if src is reachable from dst
    let mut d = Some(dst);
    let mut steps = 0;
    while let Some(x) = d {
        if x == src || steps > dsts.len() {
            return false;
        }
        d = dsts[x];
        steps += 1;
    }
    true
}
