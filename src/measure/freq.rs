//! Measures over class frequency tables.
//!
//! `n` is the known weight, `N_x`, `N_y` and `N_xy` are the column, class and
//! joint frequencies over the active (not merged away) columns.
use super::{Measure, MeasureParams};
use crate::aggregate::{AggTable, FreqTable};
use crate::constants::{EPSILON, ODDS_CLAMP, WORTHLESS};
use crate::utils::{log_gamma, xlog2x};
use std::f64::consts::{LN_2, PI};

/// Score a frequency table. Metric measures yield `WORTHLESS`.
pub fn evaluate(t: &FreqTable, measure: Measure, params: &MeasureParams) -> f64 {
    match measure {
        Measure::InfoGain
        | Measure::InfoGainBalanced
        | Measure::InfoGainRatio
        | Measure::InfoSymRatio1
        | Measure::InfoSymRatio2 => shannon(t, measure),
        Measure::QuadGain
        | Measure::QuadGainBalanced
        | Measure::QuadGainRatio
        | Measure::QuadSymRatio1
        | Measure::QuadSymRatio2 => quadratic(t, measure),
        Measure::Gini => gini(t),
        Measure::GiniSymmetric => gini_symmetric(t),
        Measure::GiniModified => gini_modified(t),
        Measure::Relief => relief(t),
        Measure::WeightedDifference => weighted_difference(t),
        Measure::Chi2 => chi2(t),
        Measure::Chi2Normalized => chi2_normalized(t),
        Measure::WeightOfEvidence => weight_of_evidence(t),
        Measure::Relevance => relevance(t, false),
        Measure::RelevanceModified => relevance(t, true),
        Measure::BayesDirichlet => bayes_dirichlet(t, params),
        Measure::BayesDirichletModified => bayes_dirichlet_modified(t, params),
        Measure::RdlRelative => description_length(t, relative_length),
        Measure::RdlAbsolute => description_length(t, absolute_length),
        Measure::StochasticComplexity => description_length(t, stochastic_complexity),
        Measure::SpecGain
        | Measure::SpecGainBalanced
        | Measure::SpecGainRatio
        | Measure::SpecSymRatio1
        | Measure::SpecSymRatio2 => specificity(t, measure),
        Measure::SseReduction
        | Measure::MseReduction
        | Measure::RmseReduction
        | Measure::VarianceReduction
        | Measure::SdevReduction => WORTHLESS,
    }
}

/// Active columns that carry weight.
#[inline]
fn cols(t: &FreqTable) -> impl Iterator<Item = usize> + '_ {
    (0..t.xcnt()).filter(move |x| t.is_active(*x) && t.frq_x(*x) > EPSILON)
}

/// Classes that occur.
#[inline]
fn classes(t: &FreqTable) -> impl Iterator<Item = usize> + '_ {
    (0..t.ycnt()).filter(move |y| t.frq_y(*y) > EPSILON)
}

#[inline]
fn ratio(a: f64, b: f64) -> f64 {
    if b < EPSILON {
        WORTHLESS
    } else {
        a / b
    }
}

#[inline]
fn balanced(a: f64, k: usize) -> f64 {
    if k < 2 {
        WORTHLESS
    } else {
        a / (k as f64).log2()
    }
}

/// Entropy in bits of a frequency distribution with total `n`.
fn entropy<I: Iterator<Item = f64>>(n: f64, frqs: I) -> f64 {
    let s: f64 = frqs.map(xlog2x).sum();
    (n.log2() - s / n).max(0.0)
}

fn shannon(t: &FreqTable, measure: Measure) -> f64 {
    let n = t.known();
    let hy = entropy(n, (0..t.ycnt()).map(|y| t.frq_y(y)));
    let hx = entropy(n, cols(t).map(|x| t.frq_x(x)));
    let hxy = entropy(n, cols(t).flat_map(|x| (0..t.ycnt()).map(move |y| t.frq_xy(x, y))));
    let gain = (hx + hy - hxy).max(0.0);
    match measure {
        Measure::InfoGainBalanced => balanced(gain, cols(t).count()),
        Measure::InfoGainRatio => ratio(gain, hx),
        Measure::InfoSymRatio1 => ratio(gain, hxy),
        Measure::InfoSymRatio2 => ratio(gain, hx + hy),
        _ => gain,
    }
}

/// Sums of squared relative frequencies used by the quadratic measures.
struct Squares {
    /// sum_y (N_y / n)^2
    y: f64,
    /// sum_x (N_x / n)^2
    x: f64,
    /// sum_xy (N_xy / n)^2
    xy: f64,
    /// sum_x sum_y N_xy^2 / (N_x n)
    y_given_x: f64,
}

fn squares(t: &FreqTable) -> Squares {
    let n = t.known();
    let mut sq = Squares {
        y: classes(t).map(|y| (t.frq_y(y) / n).powi(2)).sum(),
        x: 0.0,
        xy: 0.0,
        y_given_x: 0.0,
    };
    for x in cols(t) {
        let nx = t.frq_x(x);
        sq.x += (nx / n).powi(2);
        let s: f64 = (0..t.ycnt()).map(|y| t.frq_xy(x, y).powi(2)).sum();
        sq.xy += s / (n * n);
        sq.y_given_x += s / (nx * n);
    }
    sq
}

fn quadratic(t: &FreqTable, measure: Measure) -> f64 {
    let sq = squares(t);
    let hy = 2.0 * (1.0 - sq.y);
    let hx = 2.0 * (1.0 - sq.x);
    let hxy = 2.0 * (1.0 - sq.xy);
    let gain = 2.0 * (sq.y_given_x - sq.y);
    match measure {
        Measure::QuadGainBalanced => balanced(gain, cols(t).count()),
        Measure::QuadGainRatio => ratio(gain, hx),
        Measure::QuadSymRatio1 => ratio(gain, hxy),
        Measure::QuadSymRatio2 => ratio(gain, hx + hy),
        _ => gain,
    }
}

fn gini(t: &FreqTable) -> f64 {
    let sq = squares(t);
    sq.y_given_x - sq.y
}

fn gini_symmetric(t: &FreqTable) -> f64 {
    let n = t.known();
    let sq = squares(t);
    let mut x_given_y = 0.0;
    for y in classes(t) {
        let ny = t.frq_y(y);
        let s: f64 = cols(t).map(|x| t.frq_xy(x, y).powi(2)).sum();
        x_given_y += s / (ny * n);
    }
    ratio(sq.y_given_x - sq.y + x_given_y - sq.x, 2.0 - sq.x - sq.y)
}

/// Modified Gini index, columns weighted by their squared frequencies.
/// Returns the index and `sum_x N_x^2`.
fn gini_modified_parts(t: &FreqTable) -> (f64, f64) {
    let sq = squares(t);
    let mut sx = 0.0;
    let mut sxy = 0.0;
    for x in cols(t) {
        sx += t.frq_x(x).powi(2);
        sxy += (0..t.ycnt()).map(|y| t.frq_xy(x, y).powi(2)).sum::<f64>();
    }
    if sx < EPSILON {
        return (WORTHLESS, sx);
    }
    (sxy / sx - sq.y, sx)
}

fn gini_modified(t: &FreqTable) -> f64 {
    gini_modified_parts(t).0
}

fn relief(t: &FreqTable) -> f64 {
    let n = t.known();
    let (g, sx) = gini_modified_parts(t);
    if g == WORTHLESS {
        return WORTHLESS;
    }
    let sy: f64 = classes(t).map(|y| (t.frq_y(y) / n).powi(2)).sum();
    ratio(sx / (n * n) * g, sy * (1.0 - sy))
}

fn weighted_difference(t: &FreqTable) -> f64 {
    let n = t.known();
    let mut s = 0.0;
    for x in cols(t) {
        let nx = t.frq_x(x);
        for y in 0..t.ycnt() {
            s += (t.frq_xy(x, y) - nx * t.frq_y(y) / n).abs();
        }
    }
    s / n
}

fn chi2(t: &FreqTable) -> f64 {
    let n = t.known();
    let mut s = 0.0;
    for x in cols(t) {
        let nx = t.frq_x(x);
        for y in classes(t) {
            let e = nx * t.frq_y(y) / n;
            if e > EPSILON {
                s += (t.frq_xy(x, y) - e).powi(2) / e;
            }
        }
    }
    s
}

fn chi2_normalized(t: &FreqTable) -> f64 {
    let kx = cols(t).count();
    let ky = classes(t).count();
    if kx < 2 || ky < 2 {
        return WORTHLESS;
    }
    chi2(t) / ((kx - 1) * (ky - 1)) as f64
}

#[inline]
fn odds(p: f64) -> f64 {
    let p = p.clamp(ODDS_CLAMP, 1.0 - ODDS_CLAMP);
    p / (1.0 - p)
}

fn weight_of_evidence(t: &FreqTable) -> f64 {
    let n = t.known();
    let mut s = 0.0;
    for y in classes(t) {
        let py = t.frq_y(y) / n;
        let oy = odds(py);
        let mut inner = 0.0;
        for x in cols(t) {
            let nx = t.frq_x(x);
            inner += nx / n * (odds(t.frq_xy(x, y) / nx) / oy).log2().abs();
        }
        s += py * inner;
    }
    s
}

fn relevance(t: &FreqTable, modified: bool) -> f64 {
    let ky = classes(t).count();
    if ky < 2 {
        return WORTHLESS;
    }
    let mut s = 0.0;
    for x in cols(t) {
        let key = |y: usize| {
            if modified {
                t.frq_xy(x, y)
            } else {
                t.frq_xy(x, y) / t.frq_y(y)
            }
        };
        let mut best = None;
        for y in classes(t) {
            match best {
                Some(b) if key(y) <= key(b) => {}
                _ => best = Some(y),
            }
        }
        s += classes(t)
            .filter(|y| Some(*y) != best)
            .map(|y| t.frq_xy(x, y) / t.frq_y(y))
            .sum::<f64>();
    }
    1.0 - s / (ky - 1) as f64
}

fn bayes_dirichlet(t: &FreqTable, params: &MeasureParams) -> f64 {
    let n = t.known();
    let s = params.sensitivity;
    let ky = t.ycnt() as f64;
    let kx = cols(t).count() as f64;
    let (cell, class) = if params.prior > 0.0 {
        (params.prior, params.prior)
    } else if params.prior < 0.0 {
        (-params.prior / (kx * ky), -params.prior / ky)
    } else {
        (1.0, 1.0)
    };
    let mut with = 0.0;
    for x in cols(t) {
        with += log_gamma(ky * cell) - log_gamma(ky * cell + s * t.frq_x(x));
        for y in 0..t.ycnt() {
            with += log_gamma(cell + s * t.frq_xy(x, y)) - log_gamma(cell);
        }
    }
    let mut without = log_gamma(ky * class) - log_gamma(ky * class + s * n);
    for y in 0..t.ycnt() {
        without += log_gamma(class + s * t.frq_y(y)) - log_gamma(class);
    }
    (with - without) / (n * LN_2)
}

fn bayes_dirichlet_modified(t: &FreqTable, params: &MeasureParams) -> f64 {
    let n = t.known();
    let s = params.sensitivity;
    let ess = if params.prior != 0.0 { params.prior.abs() } else { 1.0 };
    let mut with = 0.0;
    for x in cols(t) {
        with += log_gamma(ess) - log_gamma(ess + s * t.frq_x(x));
        for y in classes(t) {
            let a = ess * t.frq_y(y) / n;
            with += log_gamma(a + s * t.frq_xy(x, y)) - log_gamma(a);
        }
    }
    let mut without = log_gamma(ess) - log_gamma(ess + s * n);
    for y in classes(t) {
        let a = ess * t.frq_y(y) / n;
        without += log_gamma(a + s * t.frq_y(y)) - log_gamma(a);
    }
    (with - without) / (n * LN_2)
}

/// `n log2 n - sum c log2 c`, the number of bits to code a sequence of `n`
/// symbols with their empirical distribution.
fn coded_bits(n: f64, frqs: &[f64]) -> f64 {
    (xlog2x(n) - frqs.iter().map(|c| xlog2x(*c)).sum::<f64>()).max(0.0)
}

fn log2_factorial(n: f64) -> f64 {
    log_gamma(n + 1.0) / LN_2
}

fn relative_length(n: f64, frqs: &[f64]) -> f64 {
    let k = frqs.len() as f64;
    coded_bits(n, frqs) + 0.5 * (k - 1.0) * n.max(1.0).log2()
}

fn absolute_length(n: f64, frqs: &[f64]) -> f64 {
    let k = frqs.len() as f64;
    let counts = log2_factorial(n + k - 1.0) - log2_factorial(k - 1.0) - log2_factorial(n);
    let sequence = log2_factorial(n) - frqs.iter().map(|c| log2_factorial(*c)).sum::<f64>();
    counts + sequence
}

fn stochastic_complexity(n: f64, frqs: &[f64]) -> f64 {
    let k = frqs.len() as f64;
    coded_bits(n, frqs) + 0.5 * (k - 1.0) * (n / (2.0 * PI)).log2() + (0.5 * k * PI.ln() - log_gamma(0.5 * k)) / LN_2
}

/// Reduction of the description length of the class column by the split,
/// in bits per case.
fn description_length(t: &FreqTable, length: fn(f64, &[f64]) -> f64) -> f64 {
    let n = t.known();
    let mut frqs: Vec<f64> = (0..t.ycnt()).map(|y| t.frq_y(y)).collect();
    let before = length(n, &frqs);
    let mut after = 0.0;
    for x in cols(t) {
        for (y, f) in frqs.iter_mut().enumerate() {
            *f = t.frq_xy(x, y);
        }
        after += length(t.frq_x(x), &frqs);
    }
    (before - after) / n
}

/// Nonspecificity (U-uncertainty) of the possibility distribution obtained
/// by normalizing the frequencies to a maximum of one.
fn nonspecificity(mut frqs: Vec<f64>) -> f64 {
    frqs.retain(|f| *f > EPSILON);
    if frqs.is_empty() {
        return 0.0;
    }
    frqs.sort_by(|a, b| b.total_cmp(a));
    let max = frqs[0];
    let mut u = 0.0;
    for i in 0..frqs.len() {
        let next = frqs.get(i + 1).copied().unwrap_or(0.0);
        u += (frqs[i] - next) / max * ((i + 1) as f64).log2();
    }
    u
}

fn specificity(t: &FreqTable, measure: Measure) -> f64 {
    let ux = nonspecificity(cols(t).map(|x| t.frq_x(x)).collect());
    let uy = nonspecificity((0..t.ycnt()).map(|y| t.frq_y(y)).collect());
    let uxy = nonspecificity(
        cols(t)
            .flat_map(|x| (0..t.ycnt()).map(move |y| t.frq_xy(x, y)))
            .collect(),
    );
    let gain = ux + uy - uxy;
    match measure {
        Measure::SpecGainBalanced => balanced(gain, cols(t).count()),
        Measure::SpecGainRatio => ratio(gain, ux),
        Measure::SpecSymRatio1 => ratio(gain, uxy),
        Measure::SpecSymRatio2 => ratio(gain, ux + uy),
        _ => gain,
    }
}
