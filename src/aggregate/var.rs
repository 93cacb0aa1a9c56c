use super::{can_combine, AggTable};
use crate::constants::{EPSILON, WORTHLESS};
use crate::data::Value;
use crate::measure::{self, Measure, MeasureParams};
use crate::node::Summary;

/// Weight, sum and sum of squares of a metric target per value group.
///
/// Slot 0 of every vector holds the cases with an unknown split value,
/// value group `x` lives in slot `x + 1`.
#[derive(Debug, Clone, Default)]
pub struct VarTable {
    xcnt: usize,
    cnt: Vec<f64>,
    sum: Vec<f64>,
    sqr: Vec<f64>,
    lost: Vec<f64>,
    known_cnt: f64,
    known_sum: f64,
    known_sqr: f64,
    total: f64,
    grand: f64,
    dsts: Vec<Option<usize>>,
}

/// Sum of squared errors of a group from its weight, sum and sum of squares.
#[inline]
pub fn sse(cnt: f64, sum: f64, sqr: f64) -> f64 {
    if cnt < EPSILON {
        0.0
    } else {
        (sqr - sum * sum / cnt).max(0.0)
    }
}

impl VarTable {
    pub fn new(xcnt: usize) -> Self {
        let mut t = VarTable::default();
        t.init(xcnt, 0);
        t
    }

    /// Weight, sum and sum of squares of value group `x`.
    #[inline]
    pub fn stats(&self, x: usize) -> (f64, f64, f64) {
        (self.cnt[x + 1], self.sum[x + 1], self.sqr[x + 1])
    }

    /// Weight, sum and sum of squares over all active groups with a known value.
    #[inline]
    pub fn known_stats(&self) -> (f64, f64, f64) {
        (self.known_cnt, self.known_sum, self.known_sqr)
    }

    pub fn sse_x(&self, x: usize) -> f64 {
        let (c, s, q) = self.stats(x);
        sse(c, s, q)
    }

    pub fn sse_known(&self) -> f64 {
        sse(self.known_cnt, self.known_sum, self.known_sqr)
    }

    fn shift(&mut self, from: usize, to: usize, sign: f64) {
        self.cnt[to + 1] += sign * self.cnt[from + 1];
        self.sum[to + 1] += sign * self.sum[from + 1];
        self.sqr[to + 1] += sign * self.sqr[from + 1];
        self.lost[to + 1] += sign * self.lost[from + 1];
    }
}

impl AggTable for VarTable {
    type Target = f64;

    fn target(value: &Value) -> Option<f64> {
        value.as_f64()
    }

    fn init(&mut self, xcnt: usize, _ycnt: usize) {
        self.xcnt = xcnt;
        for v in [&mut self.cnt, &mut self.sum, &mut self.sqr, &mut self.lost] {
            v.clear();
            v.resize(xcnt + 1, 0.0);
        }
        self.dsts.clear();
        self.dsts.resize(xcnt, None);
        self.known_cnt = 0.0;
        self.known_sum = 0.0;
        self.known_sqr = 0.0;
        self.total = 0.0;
        self.grand = 0.0;
    }

    #[inline]
    fn add(&mut self, x: Option<usize>, y: Option<f64>, weight: f64) {
        let i = x.map_or(0, |x| x + 1);
        match y {
            Some(y) => {
                self.cnt[i] += weight;
                self.sum[i] += weight * y;
                self.sqr[i] += weight * y * y;
            }
            None => self.lost[i] += weight,
        }
    }

    fn marginalize(&mut self) {
        self.known_cnt = 0.0;
        self.known_sum = 0.0;
        self.known_sqr = 0.0;
        self.grand = self.cnt[0] + self.lost[0];
        for x in 0..self.xcnt {
            if self.dsts[x].is_some() {
                continue;
            }
            self.known_cnt += self.cnt[x + 1];
            self.known_sum += self.sum[x + 1];
            self.known_sqr += self.sqr[x + 1];
            self.grand += self.cnt[x + 1] + self.lost[x + 1];
        }
        self.total = self.known_cnt + self.cnt[0];
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
        self.cnt[x + 1]
    }

    fn unknown_x(&self) -> f64 {
        self.cnt[0]
    }

    fn known(&self) -> f64 {
        self.known_cnt
    }

    fn total(&self) -> f64 {
        self.total
    }

    fn grand(&self) -> f64 {
        self.grand
    }

    fn eval(&self, measure: Measure, weighted: bool, params: &MeasureParams) -> f64 {
        if self.known_cnt < EPSILON || !measure.is_metric() {
            return WORTHLESS;
        }
        let score = measure::var::evaluate(self, measure, params);
        if score == WORTHLESS || !score.is_finite() {
            return WORTHLESS;
        }
        if weighted {
            score * self.known_cnt / self.total
        } else {
            score
        }
    }

    fn copy_from(&mut self, other: &Self) {
        self.xcnt = other.xcnt;
        self.cnt.clone_from(&other.cnt);
        self.sum.clone_from(&other.sum);
        self.sqr.clone_from(&other.sqr);
        self.lost.clone_from(&other.lost);
        self.dsts.clone_from(&other.dsts);
        self.known_cnt = other.known_cnt;
        self.known_sum = other.known_sum;
        self.known_sqr = other.known_sqr;
        self.total = other.total;
        self.grand = other.grand;
    }

    fn summary(&self) -> Summary {
        Summary::metric(self.known_cnt, self.known_sum, self.known_sqr)
    }
}
