/// Set precision/recall/F1 and per-dimension structure comparison.
pub mod component;
/// Row normalization, result-set F1 and execution accuracy.
pub mod results;

pub use component::{
    compute_component_f1, compute_set_scores, ComponentScores, Dimension, DimensionScore,
    SetScores,
};
pub use results::{compare_results, ResultComparison, ResultSet};
