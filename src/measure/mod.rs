//! Split evaluation measures
//!
//! Every measure is a pure function of an aggregation table's public
//! accessors, higher values are better. Measures for nominal targets score a
//! [`FreqTable`](crate::aggregate::FreqTable), measures for metric targets a
//! [`VarTable`](crate::aggregate::VarTable).
use crate::errors::DTreeError;
use crate::utils::items_to_strings;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

pub mod freq;
pub mod var;

/// Closed enumeration of split evaluation measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Measure {
    /// Information gain (mutual information).
    InfoGain,
    /// Information gain divided by log2 of the number of branches.
    InfoGainBalanced,
    /// Information gain divided by the split information.
    InfoGainRatio,
    /// Information gain divided by the joint entropy.
    InfoSymRatio1,
    /// Information gain divided by the sum of the marginal entropies.
    InfoSymRatio2,
    QuadGain,
    QuadGainBalanced,
    QuadGainRatio,
    QuadSymRatio1,
    QuadSymRatio2,
    Gini,
    GiniSymmetric,
    GiniModified,
    Relief,
    /// Sum of weighted absolute differences from independence.
    WeightedDifference,
    Chi2,
    /// Chi-square divided by its degrees of freedom.
    Chi2Normalized,
    WeightOfEvidence,
    Relevance,
    RelevanceModified,
    /// Bayesian-Dirichlet (K2) metric, uses sensitivity and prior.
    BayesDirichlet,
    /// Bayesian-Dirichlet metric with a class-proportional prior.
    BayesDirichletModified,
    /// Reduction of description length, relative frequency coding.
    RdlRelative,
    /// Reduction of description length, absolute frequency coding.
    RdlAbsolute,
    StochasticComplexity,
    SpecGain,
    SpecGainBalanced,
    SpecGainRatio,
    SpecSymRatio1,
    SpecSymRatio2,
    /// Reduction of the sum of squared errors.
    SseReduction,
    MseReduction,
    RmseReduction,
    VarianceReduction,
    SdevReduction,
}

const MEASURE_CODES: [(Measure, &str); 35] = [
    (Measure::InfoGain, "infgain"),
    (Measure::InfoGainBalanced, "infgbal"),
    (Measure::InfoGainRatio, "infgr"),
    (Measure::InfoSymRatio1, "infsgr1"),
    (Measure::InfoSymRatio2, "infsgr2"),
    (Measure::QuadGain, "qigain"),
    (Measure::QuadGainBalanced, "qigbal"),
    (Measure::QuadGainRatio, "qigr"),
    (Measure::QuadSymRatio1, "qisgr1"),
    (Measure::QuadSymRatio2, "qisgr2"),
    (Measure::Gini, "gini"),
    (Measure::GiniSymmetric, "ginisym"),
    (Measure::GiniModified, "ginimod"),
    (Measure::Relief, "relief"),
    (Measure::WeightedDifference, "wdiff"),
    (Measure::Chi2, "chi2"),
    (Measure::Chi2Normalized, "chi2nrm"),
    (Measure::WeightOfEvidence, "wevid"),
    (Measure::Relevance, "relev"),
    (Measure::RelevanceModified, "relevmod"),
    (Measure::BayesDirichlet, "bdm"),
    (Measure::BayesDirichletModified, "bdmod"),
    (Measure::RdlRelative, "rdlrel"),
    (Measure::RdlAbsolute, "rdlabs"),
    (Measure::StochasticComplexity, "stoco"),
    (Measure::SpecGain, "spcgain"),
    (Measure::SpecGainBalanced, "spcgbal"),
    (Measure::SpecGainRatio, "spcgr"),
    (Measure::SpecSymRatio1, "spcsgr1"),
    (Measure::SpecSymRatio2, "spcsgr2"),
    (Measure::SseReduction, "sse"),
    (Measure::MseReduction, "mse"),
    (Measure::RmseReduction, "rmse"),
    (Measure::VarianceReduction, "var"),
    (Measure::SdevReduction, "sdev"),
];

impl Measure {
    /// Whether the measure scores variation tables (metric targets).
    pub fn is_metric(&self) -> bool {
        matches!(
            self,
            Measure::SseReduction
                | Measure::MseReduction
                | Measure::RmseReduction
                | Measure::VarianceReduction
                | Measure::SdevReduction
        )
    }

    /// Short code used in configuration files.
    pub fn code(&self) -> &'static str {
        MEASURE_CODES
            .iter()
            .find(|(m, _)| m == self)
            .map(|(_, c)| *c)
            .unwrap_or("none")
    }

    /// All measures applicable to a nominal (`false`) or metric (`true`) target.
    pub fn all(metric: bool) -> Vec<Measure> {
        MEASURE_CODES
            .iter()
            .map(|(m, _)| *m)
            .filter(|m| m.is_metric() == metric)
            .collect()
    }
}

impl Default for Measure {
    fn default() -> Self {
        Measure::InfoGain
    }
}

impl Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Measure {
    type Err = DTreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MEASURE_CODES
            .iter()
            .find(|(_, c)| *c == s)
            .map(|(m, _)| *m)
            .ok_or_else(|| {
                DTreeError::ParseString(
                    s.to_string(),
                    "Measure".to_string(),
                    items_to_strings(MEASURE_CODES.iter().map(|(_, c)| *c).collect()),
                )
            })
    }
}

fn default_sensitivity() -> f64 {
    1.0
}

/// Parameters of the Bayesian-Dirichlet measures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasureParams {
    /// Factor applied to the observed frequencies.
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,
    /// Prior per cell if positive, equivalent sample size (divided by the
    /// number of cells) if negative, K2 uniform prior of 1 if zero.
    #[serde(default)]
    pub prior: f64,
}

impl Default for MeasureParams {
    fn default() -> Self {
        MeasureParams {
            sensitivity: 1.0,
            prior: 0.0,
        }
    }
}
