use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::parser::names::collapse_whitespace;
use crate::scoring::ResultSet;

/// Why a query produced no rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The store rejected or failed the query.
    #[error("query failed: {0}")]
    Query(String),
    /// The query ran longer than the configured timeout.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
    /// The query observed its cancel flag and stopped.
    #[error("query was cancelled")]
    Cancelled,
    /// The execution resource (connection, file) could not be acquired.
    #[error("could not acquire execution resource: {0}")]
    Connection(String),
    /// The executor panicked.
    #[error("executor panicked: {0}")]
    Panicked(String),
}

type CancelHook = Box<dyn FnOnce() + Send>;

/// Per-call cancellation signal shared between the caller and the executor.
///
/// Executors either poll [`CancelFlag::is_cancelled`] or register a hook that
/// interrupts their in-flight work. Hooks registered after cancellation run
/// immediately.
#[derive(Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
    hooks: Arc<Mutex<Vec<CancelHook>>>,
}

impl fmt::Debug for CancelFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelFlag")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl CancelFlag {
    /// A fresh, un-raised flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and run every registered hook once.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let hooks = std::mem::take(&mut *self.hooks.lock());
        for hook in hooks {
            hook();
        }
    }

    /// True once [`CancelFlag::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run `hook` on cancellation, or right away if already cancelled.
    pub fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        let mut hooks = self.hooks.lock();
        if self.is_cancelled() {
            drop(hooks);
            hook();
        } else {
            hooks.push(Box::new(hook));
        }
    }
}

/// The execution capability the evaluator consumes.
///
/// Implementations acquire whatever resource they need inside `execute` and
/// release it on every return path, including cancellation. A failure must be
/// an `Err`, never a partial result.
pub trait QueryExecutor: Send + Sync {
    /// Run `query` and return all of its rows.
    fn execute(&self, query: &str, cancel: &CancelFlag) -> Result<ResultSet, ExecutionError>;
}

impl<F> QueryExecutor for F
where
    F: Fn(&str, &CancelFlag) -> Result<ResultSet, ExecutionError> + Send + Sync,
{
    fn execute(&self, query: &str, cancel: &CancelFlag) -> Result<ResultSet, ExecutionError> {
        self(query, cancel)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Run `query` on a dedicated worker thread, giving up after `timeout`.
///
/// On timeout the call's [`CancelFlag`] is raised and the worker gets `grace`
/// to release its resources before the call returns
/// [`ExecutionError::Timeout`]. A worker that ignores cancellation is detached
/// with a warning. Executor panics become [`ExecutionError::Panicked`].
pub fn execute_with_timeout<E>(
    executor: Arc<E>,
    query: &str,
    timeout: Duration,
    grace: Duration,
) -> Result<ResultSet, ExecutionError>
where
    E: QueryExecutor + ?Sized + 'static,
{
    let cancel = CancelFlag::new();
    let worker_cancel = cancel.clone();
    let owned_query = query.to_string();
    let (sender, receiver) = mpsc::channel();

    let worker = thread::Builder::new()
        .name("querylens-exec".to_string())
        .spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                executor.execute(&owned_query, &worker_cancel)
            }))
            .unwrap_or_else(|payload| Err(ExecutionError::Panicked(panic_message(&*payload))));
            let _ = sender.send(outcome);
        })
        .map_err(|err| ExecutionError::Connection(format!("cannot spawn worker: {err}")))?;

    match receiver.recv_timeout(timeout) {
        Ok(outcome) => {
            let _ = worker.join();
            outcome
        }
        Err(RecvTimeoutError::Timeout) => {
            cancel.cancel();
            match receiver.recv_timeout(grace) {
                Ok(_) | Err(RecvTimeoutError::Disconnected) => {
                    let _ = worker.join();
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        timeout_ms = timeout.as_millis() as u64,
                        grace_ms = grace.as_millis() as u64,
                        "execution worker ignored cancellation; detaching it"
                    );
                }
            }
            Err(ExecutionError::Timeout(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => {
            let _ = worker.join();
            Err(ExecutionError::Panicked(
                "worker exited without a result".to_string(),
            ))
        }
    }
}

/// Serves rows recorded earlier, keyed by whitespace-normalized query text.
#[derive(Debug, Clone, Default)]
pub struct RecordedExecutor {
    results: HashMap<String, ResultSet>,
}

impl RecordedExecutor {
    /// Executor over an in-memory `query -> rows` map.
    pub fn new(results: impl IntoIterator<Item = (String, ResultSet)>) -> Self {
        Self {
            results: results
                .into_iter()
                .map(|(query, rows)| (collapse_whitespace(&query), rows))
                .collect(),
        }
    }

    /// Load a JSON object mapping query text to an array of rows.
    pub fn from_path(path: &Path) -> Result<Self, ExecutionError> {
        let json = std::fs::read_to_string(path).map_err(|err| {
            ExecutionError::Connection(format!("{}: {err}", path.display()))
        })?;
        let recorded: HashMap<String, ResultSet> = serde_json::from_str(&json).map_err(|err| {
            ExecutionError::Connection(format!("{}: {err}", path.display()))
        })?;
        Ok(Self::new(recorded))
    }

    /// Number of recorded queries.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// True when nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl QueryExecutor for RecordedExecutor {
    fn execute(&self, query: &str, _cancel: &CancelFlag) -> Result<ResultSet, ExecutionError> {
        self.results
            .get(&collapse_whitespace(query))
            .cloned()
            .ok_or_else(|| ExecutionError::Query("no recorded result for query".to_string()))
    }
}

/// Parse a recorded result stored as JSON text (an array of rows).
pub fn parse_recorded_rows(json: &str) -> Result<ResultSet, ExecutionError> {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Array(rows)) => Ok(rows),
        Ok(other) => Err(ExecutionError::Query(format!(
            "recorded result is not an array: {other}"
        ))),
        Err(err) => Err(ExecutionError::Query(format!(
            "recorded result is not valid JSON: {err}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[test]
    fn closures_are_executors() {
        let executor = Arc::new(
            |query: &str, _cancel: &CancelFlag| -> Result<ResultSet, ExecutionError> {
                Ok(vec![json!([query.len()])])
            },
        );
        let rows = execute_with_timeout(
            executor,
            "abc",
            Duration::from_secs(5),
            Duration::from_millis(100),
        )
        .unwrap();
        assert_eq!(rows, vec![json!([3])]);
    }

    #[test]
    fn errors_pass_through() {
        let executor = Arc::new(|_: &str, _: &CancelFlag| -> Result<ResultSet, ExecutionError> {
            Err(ExecutionError::Query("no such table: pilots".to_string()))
        });
        let err = execute_with_timeout(
            executor,
            "SELECT * FROM pilots",
            Duration::from_secs(5),
            Duration::from_millis(100),
        )
        .unwrap_err();
        assert_eq!(err, ExecutionError::Query("no such table: pilots".to_string()));
    }

    #[test]
    fn panics_become_errors() {
        let executor = Arc::new(|_: &str, _: &CancelFlag| -> Result<ResultSet, ExecutionError> {
            panic!("driver crashed")
        });
        let err = execute_with_timeout(
            executor,
            "q",
            Duration::from_secs(5),
            Duration::from_millis(100),
        )
        .unwrap_err();
        assert_eq!(err, ExecutionError::Panicked("driver crashed".to_string()));
    }

    #[test]
    fn timeout_cancels_and_releases_resource() {
        let open = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&open);
        let executor = Arc::new(move |_: &str, cancel: &CancelFlag| -> Result<ResultSet, ExecutionError> {
            struct Connection(Arc<AtomicUsize>);
            impl Drop for Connection {
                fn drop(&mut self) {
                    self.0.fetch_sub(1, Ordering::SeqCst);
                }
            }
            counter.fetch_add(1, Ordering::SeqCst);
            let _connection = Connection(Arc::clone(&counter));
            while !cancel.is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
            Err(ExecutionError::Cancelled)
        });

        let started = Instant::now();
        let err = execute_with_timeout(
            executor,
            "MATCH (a)-[*]-(b) RETURN count(*)",
            Duration::from_millis(50),
            Duration::from_secs(2),
        )
        .unwrap_err();
        assert_eq!(err, ExecutionError::Timeout(Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(open.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancel_hooks_run_once_and_late_hooks_run_immediately() {
        let flag = CancelFlag::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let early = Arc::clone(&calls);
        flag.on_cancel(move || {
            early.fetch_add(1, Ordering::SeqCst);
        });
        flag.cancel();
        flag.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let late = Arc::clone(&calls);
        flag.on_cancel(move || {
            late.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(flag.is_cancelled());
    }

    #[test]
    fn recorded_executor_matches_normalized_text() {
        let executor = RecordedExecutor::new([(
            "MATCH (d:Driver)\n  RETURN d.name".to_string(),
            vec![json!({"d.name": "Max"})],
        )]);
        let rows = executor
            .execute("MATCH (d:Driver) RETURN d.name", &CancelFlag::new())
            .unwrap();
        assert_eq!(rows, vec![json!({"d.name": "Max"})]);
        assert!(executor
            .execute("MATCH (t:Team) RETURN t", &CancelFlag::new())
            .is_err());
    }

    #[test]
    fn recorded_rows_must_be_an_array() {
        assert_eq!(parse_recorded_rows("[[1]]").unwrap(), vec![json!([1])]);
        assert!(parse_recorded_rows("{\"a\": 1}").is_err());
        assert!(parse_recorded_rows("not json").is_err());
    }
}
