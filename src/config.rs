//! Configuration
//!
//! Parameters of tree growing and pruning, with JSON persistence.
use crate::constants::{DEFAULT_CONFIDENCE, DEFAULT_MIN_BRANCH};
use crate::errors::DTreeError;
use crate::measure::{Measure, MeasureParams};
use crate::utils::{items_to_strings, validate_float_parameter, validate_open_interval, validate_positive_float_parameter};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::{self, Display};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Error estimator used by statistics-only pruning.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum PruneMethod {
    /// Add a fixed increment to the observed error of a leaf.
    Pessimistic,
    /// Upper bound of the error at a confidence level.
    #[default]
    Confidence,
}

impl PruneMethod {
    pub fn code(&self) -> &'static str {
        match self {
            PruneMethod::Pessimistic => "pess",
            PruneMethod::Confidence => "conf",
        }
    }
}

impl Display for PruneMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for PruneMethod {
    type Err = DTreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pess" => Ok(PruneMethod::Pessimistic),
            "conf" => Ok(PruneMethod::Confidence),
            _ => Err(DTreeError::ParseString(
                s.to_string(),
                "PruneMethod".to_string(),
                items_to_strings(vec!["pess", "conf"]),
            )),
        }
    }
}

fn default_min_branch() -> f64 {
    DEFAULT_MIN_BRANCH
}
fn default_prune_trivial() -> bool {
    true
}
fn default_prune_param() -> f64 {
    DEFAULT_CONFIDENCE
}

/// Parameters of tree growing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GrowConfig {
    /// Split evaluation measure.
    #[serde(default)]
    pub measure: Measure,
    /// Scale the measure by the fraction of cases with a known split value.
    #[serde(default)]
    pub weighted: bool,
    #[serde(default)]
    pub params: MeasureParams,
    /// Minimum measure value a split needs.
    #[serde(default)]
    pub min_measure: f64,
    /// Maximum number of levels, 0 for no limit.
    #[serde(default)]
    pub max_height: usize,
    /// Minimum weight in at least two branches of a split.
    #[serde(default = "default_min_branch")]
    pub min_branch: f64,
    /// Form subsets of nominal values.
    #[serde(default)]
    pub subset: bool,
    /// Force binary splits (implies subset search).
    #[serde(default)]
    pub binary: bool,
    /// Split nominal attributes into one value against the rest.
    #[serde(default)]
    pub one_vs_rest: bool,
    /// Give the grown tree its own copy of the attribute set.
    #[serde(default)]
    pub dup_attributes: bool,
    /// Only evaluate the attributes at the root (tree of at most two levels).
    #[serde(default)]
    pub eval_only: bool,
    /// Replace subtrees that are no better than a leaf while growing.
    #[serde(default = "default_prune_trivial")]
    pub prune_trivial: bool,
}

impl Default for GrowConfig {
    fn default() -> Self {
        GrowConfig {
            measure: Measure::InfoGain,
            weighted: false,
            params: MeasureParams::default(),
            min_measure: 0.0,
            max_height: 0,
            min_branch: DEFAULT_MIN_BRANCH,
            subset: false,
            binary: false,
            one_vs_rest: false,
            dup_attributes: false,
            eval_only: false,
            prune_trivial: true,
        }
    }
}

impl GrowConfig {
    pub fn validate(&self) -> Result<(), DTreeError> {
        validate_positive_float_parameter(self.min_branch, "min_branch")?;
        validate_float_parameter(self.min_measure, f64::MIN, f64::MAX, "min_measure")?;
        validate_open_interval(self.params.sensitivity, 0.0, f64::INFINITY, "sensitivity")?;
        validate_float_parameter(self.params.prior, f64::MIN, f64::MAX, "prior")?;
        Ok(())
    }

    pub fn set_measure(mut self, measure: Measure) -> Self {
        self.measure = measure;
        self
    }

    pub fn set_weighted(mut self, weighted: bool) -> Self {
        self.weighted = weighted;
        self
    }

    /// Set the Bayesian-Dirichlet parameters.
    /// * `sensitivity` - Factor applied to the frequencies.
    /// * `prior` - Cell prior, or equivalent sample size if negative.
    pub fn set_params(mut self, sensitivity: f64, prior: f64) -> Self {
        self.params = MeasureParams { sensitivity, prior };
        self
    }

    pub fn set_min_measure(mut self, min_measure: f64) -> Self {
        self.min_measure = min_measure;
        self
    }

    pub fn set_max_height(mut self, max_height: usize) -> Self {
        self.max_height = max_height;
        self
    }

    pub fn set_min_branch(mut self, min_branch: f64) -> Self {
        self.min_branch = min_branch;
        self
    }

    pub fn set_subset(mut self, subset: bool) -> Self {
        self.subset = subset;
        self
    }

    pub fn set_binary(mut self, binary: bool) -> Self {
        self.binary = binary;
        self
    }

    pub fn set_one_vs_rest(mut self, one_vs_rest: bool) -> Self {
        self.one_vs_rest = one_vs_rest;
        self
    }

    pub fn set_dup_attributes(mut self, dup_attributes: bool) -> Self {
        self.dup_attributes = dup_attributes;
        self
    }

    pub fn set_eval_only(mut self, eval_only: bool) -> Self {
        self.eval_only = eval_only;
        self
    }

    pub fn set_prune_trivial(mut self, prune_trivial: bool) -> Self {
        self.prune_trivial = prune_trivial;
        self
    }
}

/// Parameters of tree pruning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PruneConfig {
    #[serde(default)]
    pub method: PruneMethod,
    /// Confidence level of the error bound, or the pessimistic increment.
    #[serde(default = "default_prune_param")]
    pub param: f64,
    /// Maximum number of levels, 0 for no limit.
    #[serde(default)]
    pub max_height: usize,
    /// Compare subtrees against their largest branch (table-driven pruning).
    #[serde(default)]
    pub check_largest: bool,
    /// Nodes with less weight are always collapsed.
    #[serde(default)]
    pub min_weight: f64,
}

impl Default for PruneConfig {
    fn default() -> Self {
        PruneConfig {
            method: PruneMethod::Confidence,
            param: DEFAULT_CONFIDENCE,
            max_height: 0,
            check_largest: false,
            min_weight: 0.0,
        }
    }
}

impl PruneConfig {
    pub fn validate(&self) -> Result<(), DTreeError> {
        match self.method {
            PruneMethod::Confidence => validate_open_interval(self.param, 0.0, 1.0, "param")?,
            PruneMethod::Pessimistic => validate_positive_float_parameter(self.param, "param")?,
        }
        validate_positive_float_parameter(self.min_weight, "min_weight")?;
        Ok(())
    }

    pub fn set_method(mut self, method: PruneMethod) -> Self {
        self.method = method;
        self
    }

    pub fn set_param(mut self, param: f64) -> Self {
        self.param = param;
        self
    }

    pub fn set_max_height(mut self, max_height: usize) -> Self {
        self.max_height = max_height;
        self
    }

    pub fn set_check_largest(mut self, check_largest: bool) -> Self {
        self.check_largest = check_largest;
        self
    }

    pub fn set_min_weight(mut self, min_weight: f64) -> Self {
        self.min_weight = min_weight;
        self
    }
}

/// IO
pub trait ConfigIO: Serialize + DeserializeOwned + Sized {
    /// Save as a json object to a file.
    ///
    /// * `path` - Path to save to.
    fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), DTreeError> {
        fs::write(path, self.json_dump()?).map_err(|e| DTreeError::UnableToWrite(e.to_string()))
    }

    /// Dump as a json object
    fn json_dump(&self) -> Result<String, DTreeError> {
        serde_json::to_string(self).map_err(|e| DTreeError::UnableToWrite(e.to_string()))
    }

    /// Load from Json string
    ///
    /// * `json_str` - String object, which can be serialized to json.
    fn from_json(json_str: &str) -> Result<Self, DTreeError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| DTreeError::UnableToRead(e.to_string()))
    }

    /// Load from a path to a json object.
    ///
    /// * `path` - Path to load from.
    fn load<P: AsRef<Path>>(path: P) -> Result<Self, DTreeError> {
        let json_str = fs::read_to_string(path).map_err(|e| DTreeError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

impl ConfigIO for GrowConfig {}
impl ConfigIO for PruneConfig {}
