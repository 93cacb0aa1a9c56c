//! Errors
//!
//! Custom error types used throughout the `dtree` crate.
use thiserror::Error;

/// Errors that can occur while growing, pruning, executing or reading trees.
#[derive(Debug, Error)]
pub enum DTreeError {
    /// An allocation for the node arena or the tuple index failed.
    #[error("Out of memory while building the tree.")]
    OutOfMemory,
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// Invalid value parsing.
    #[error("Invalid value {0} passed for {1}, expected one of {2}.")]
    ParseString(String, String, String),
    /// Lookup of an attribute (or attribute value) by name failed.
    #[error("Unknown attribute or value: {0}")]
    UnknownAttribute(String),
    /// The target attribute cannot be used with the requested operation.
    #[error("Invalid target attribute: {0}")]
    InvalidTarget(String),
    /// A value does not fit the type of its attribute.
    #[error("Value {value} does not fit attribute {attribute}.")]
    InvalidValue { attribute: String, value: String },
    /// The node shapes of a tree do not match its attribute set.
    #[error("Inconsistent tree: {0}")]
    InconsistentTree(String),
    /// Syntax error in the tree text format.
    #[error("Parse error in line {line}: {message}")]
    Parse { line: usize, message: String },
    /// A table was bound to an attribute set that does not match the tree.
    #[error("Table does not match the tree: {0}")]
    IncompatibleTable(String),
    /// Unable to write model to file.
    #[error("Unable to write model to file: {0}")]
    UnableToWrite(String),
    /// Unable to read model from file.
    #[error("Unable to read model from a file {0}")]
    UnableToRead(String),
}
