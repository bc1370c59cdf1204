//! Network-specific error types.

use thiserror::Error;

pub type NetworkResult<T> = Result<T, NetworkError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    /// A link references a node id that does not exist in the snapshot.
    #[error("Link '{link}' references undefined node '{node}'")]
    MissingComponent { link: String, node: String },

    /// Two elements of the same category share an id.
    #[error("Duplicate {category} id '{id}'")]
    DuplicateId { category: &'static str, id: String },

    /// A junction references a pattern id that does not exist.
    #[error("Junction '{junction}' references undefined pattern '{pattern}'")]
    MissingPattern { junction: String, pattern: String },

    /// A numeric parameter is out of its physical range.
    #[error("Invalid parameter for '{element}': {what}")]
    InvalidParameter { element: String, what: &'static str },

    /// Time options are inconsistent (zero step, start beyond duration).
    #[error("Invalid time options: {what}")]
    InvalidTimeOptions { what: &'static str },
}
