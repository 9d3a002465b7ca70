/// Error categories and the classification result type.
pub mod categories;
/// Ordered decision list assigning the primary category and flags.
pub mod error_classifier;

pub use categories::{Classification, ErrorCategory};
pub use error_classifier::{ErrorClassifier, Evidence};
