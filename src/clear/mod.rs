//! Clear-text reference evaluation of the linkage decision.

mod evaluator;
mod score;

pub use evaluator::{evaluate, evaluate_counts, score_rows, ClearCounts, ClearResult};
pub use score::{quotient_beats, ScoreUnit};
