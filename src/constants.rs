/// Denominators and weights below this are treated as zero.
pub const EPSILON: f64 = 1e-12;
/// Score returned by a measure when a split cannot be evaluated.
pub const WORTHLESS: f64 = f64::MIN;
/// Relative tolerance used when comparing leaf and subtree errors.
pub const REL_TOLERANCE: f64 = 1e-6;
/// Probability clamp for measures that take log-odds.
pub const ODDS_CLAMP: f64 = 1e-6;
pub const DEFAULT_MIN_BRANCH: f64 = 2.0;
/// Default confidence factor of confidence-level pruning.
pub const DEFAULT_CONFIDENCE: f64 = 0.25;
