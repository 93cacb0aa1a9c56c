pub mod predict;
pub mod text;
pub mod tree;

pub use predict::{Predicted, Prediction};
pub use tree::Tree;
