/// Parse-result memoization keyed by language and exact text.
pub mod cache;
/// Evaluation entry point and batch pool.
pub mod evaluator;
/// The execution capability, cancellation and the timeout runner.
pub mod executor;
/// Reference executor over a SQLite database file.
pub mod sqlite;
/// Tasks, per-task scores and persisted records.
pub mod task;

pub use cache::ParseCache;
pub use evaluator::{EvaluationError, Evaluator, TaskOutcome};
pub use executor::{
    execute_with_timeout, CancelFlag, ExecutionError, QueryExecutor, RecordedExecutor,
};
pub use sqlite::SqliteExecutor;
pub use task::{load_tasks, ScoreVector, Task, TaskRecord, TaskResult};
