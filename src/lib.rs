// Modules
pub mod aggregate;
pub mod config;
pub mod constants;
pub mod data;
pub mod errors;
pub mod grower;
pub mod measure;
pub mod node;
pub mod partition;
pub mod prune;
pub mod tree;
pub mod utils;

// Individual classes, and functions
pub use config::{ConfigIO, GrowConfig, PruneConfig, PruneMethod};
pub use data::{Attribute, AttributeKind, AttributeSet, Table, Value};
pub use errors::DTreeError;
pub use grower::grow;
pub use measure::Measure;
pub use prune::prune;
pub use tree::{Predicted, Prediction, Tree};
