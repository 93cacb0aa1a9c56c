use super::{can_combine, AggTable};
use crate::constants::{EPSILON, WORTHLESS};
use crate::data::Value;
use crate::measure::{self, Measure, MeasureParams};
use crate::node::Summary;

/// Joint class frequencies for a nominal target.
///
/// Cells are stored row-major with one extra row for an unknown split value
/// (row 0) and one extra column for an unknown class (column 0), so value
/// group `x` lives in row `x + 1` and class `y` in column `y + 1`.
#[derive(Debug, Clone, Default)]
pub struct FreqTable {
    xcnt: usize,
    ycnt: usize,
    xy: Vec<f64>,
    frq_x: Vec<f64>,
    frq_y: Vec<f64>,
    known: f64,
    total: f64,
    grand: f64,
    dsts: Vec<Option<usize>>,
}

impl FreqTable {
    pub fn new(xcnt: usize, ycnt: usize) -> Self {
        let mut t = FreqTable::default();
        t.init(xcnt, ycnt);
        t
    }

    #[inline]
    fn cell(&self, row: usize, col: usize) -> usize {
        row * (self.ycnt + 1) + col
    }

    pub fn ycnt(&self) -> usize {
        self.ycnt
    }

    /// Joint frequency of value group `x` and class `y`.
    #[inline]
    pub fn frq_xy(&self, x: usize, y: usize) -> f64 {
        self.xy[self.cell(x + 1, y + 1)]
    }

    /// Class frequency over all active columns with a known value.
    #[inline]
    pub fn frq_y(&self, y: usize) -> f64 {
        self.frq_y[y + 1]
    }

    /// Class frequencies of cases with an unknown split value.
    pub fn frq_unknown_xy(&self, y: usize) -> f64 {
        self.xy[self.cell(0, y + 1)]
    }

    /// Add the cells of row `from` into row `to` with a sign.
    fn shift(&mut self, from: usize, to: usize, sign: f64) {
        for y in 0..=self.ycnt {
            let v = self.xy[self.cell(from + 1, y)];
            let c = self.cell(to + 1, y);
            self.xy[c] += sign * v;
        }
        self.frq_x[to + 1] += sign * self.frq_x[from + 1];
    }
}

impl AggTable for FreqTable {
    type Target = usize;

    fn target(value: &Value) -> Option<usize> {
        value.as_nominal()
    }

    fn init(&mut self, xcnt: usize, ycnt: usize) {
        self.xcnt = xcnt;
        self.ycnt = ycnt;
        self.xy.clear();
        self.xy.resize((xcnt + 1) * (ycnt + 1), 0.0);
        self.frq_x.clear();
        self.frq_x.resize(xcnt + 1, 0.0);
        self.frq_y.clear();
        self.frq_y.resize(ycnt + 1, 0.0);
        self.dsts.clear();
        self.dsts.resize(xcnt, None);
        self.known = 0.0;
        self.total = 0.0;
        self.grand = 0.0;
    }

    #[inline]
    fn add(&mut self, x: Option<usize>, y: Option<usize>, weight: f64) {
        let row = x.map_or(0, |x| x + 1);
        let col = y.map_or(0, |y| y + 1);
        let c = self.cell(row, col);
        self.xy[c] += weight;
    }

    fn marginalize(&mut self) {
        self.frq_x.iter_mut().for_each(|v| *v = 0.0);
        self.frq_y.iter_mut().for_each(|v| *v = 0.0);
        self.grand = 0.0;
        for row in 0..=self.xcnt {
            let active = row == 0 || self.dsts[row - 1].is_none();
            for col in 0..=self.ycnt {
                let v = self.xy[self.cell(row, col)];
                if col > 0 {
                    self.frq_x[row] += v;
                }
                if row > 0 && active {
                    self.frq_y[col] += v;
                }
                if active {
                    self.grand += v;
                }
            }
        }
        self.known = self.frq_y[1..].iter().sum();
        self.total = self.known + self.frq_x[0];
        // unknown classes in the unknown row belong to the grand total
        // only; they were already added above
    }

    fn combine(&mut self, src: usize, dst: usize) -> bool {
        if !can_combine(&self.dsts, src, dst) {
            return false;
        }
        let mut d = Some(dst);
        while let Some(x) = d {
            self.shift(src, x, 1.0);
            d = self.dsts[x];
        }
        self.dsts[src] = Some(dst);
        true
    }

    fn uncombine(&mut self, src: usize) -> bool {
        let mut d = match self.dsts.get(src).copied().flatten() {
            Some(d) => Some(d),
            None => return false,
        };
        while let Some(x) = d {
            self.shift(src, x, -1.0);
            d = self.dsts[x];
        }
        self.dsts[src] = None;
        true
    }

    #[inline]
    fn merged_into(&self, x: usize) -> Option<usize> {
        self.dsts[x]
    }

    fn xcnt(&self) -> usize {
        self.xcnt
    }

    #[inline]
    fn frq_x(&self, x: usize) -> f64 {
        self.frq_x[x + 1]
    }

    fn unknown_x(&self) -> f64 {
        self.frq_x[0]
    }

    fn known(&self) -> f64 {
        self.known
    }

    fn total(&self) -> f64 {
        self.total
    }

    fn grand(&self) -> f64 {
        self.grand
    }

    fn eval(&self, measure: Measure, weighted: bool, params: &MeasureParams) -> f64 {
        if self.known < EPSILON || measure.is_metric() {
            return WORTHLESS;
        }
        let score = measure::freq::evaluate(self, measure, params);
        if score == WORTHLESS || !score.is_finite() {
            return WORTHLESS;
        }
        if weighted {
            score * self.known / self.total
        } else {
            score
        }
    }

    fn copy_from(&mut self, other: &Self) {
        self.xcnt = other.xcnt;
        self.ycnt = other.ycnt;
        self.xy.clone_from(&other.xy);
        self.frq_x.clone_from(&other.frq_x);
        self.frq_y.clone_from(&other.frq_y);
        self.dsts.clone_from(&other.dsts);
        self.known = other.known;
        self.total = other.total;
        self.grand = other.grand;
    }

    fn summary(&self) -> Summary {
        Summary::nominal(self.frq_y[1..].to_vec())
    }
}
