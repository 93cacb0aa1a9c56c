//! Measures over variation tables (metric targets).
use super::{Measure, MeasureParams};
use crate::aggregate::{AggTable, VarTable};
use crate::constants::{EPSILON, WORTHLESS};

/// Score a variation table. Nominal measures yield `WORTHLESS`.
pub fn evaluate(t: &VarTable, measure: Measure, _params: &MeasureParams) -> f64 {
    let n = t.known();
    let groups = || (0..t.xcnt()).filter(move |x| t.is_active(*x) && t.frq_x(*x) > EPSILON);
    let sse_total = t.sse_known();
    let sse_split: f64 = groups().map(|x| t.sse_x(x)).sum();
    match measure {
        Measure::SseReduction => sse_total - sse_split,
        Measure::MseReduction => (sse_total - sse_split) / n,
        Measure::RmseReduction => (sse_total / n).sqrt() - (sse_split / n).sqrt(),
        Measure::VarianceReduction => {
            let within: f64 = groups()
                .map(|x| t.frq_x(x) / n * variance(t.frq_x(x), t.sse_x(x)))
                .sum();
            variance(n, sse_total) - within
        }
        Measure::SdevReduction => {
            let within: f64 = groups()
                .map(|x| t.frq_x(x) / n * variance(t.frq_x(x), t.sse_x(x)).sqrt())
                .sum();
            variance(n, sse_total).sqrt() - within
        }
        _ => WORTHLESS,
    }
}

/// Unbiased variance estimate, zero for groups of at most one case.
#[inline]
fn variance(cnt: f64, sse: f64) -> f64 {
    if cnt <= 1.0 {
        0.0
    } else {
        sse / (cnt - 1.0)
    }
}
