use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::evaluation::TaskRecord;
use crate::output::report;

/// Errors writing or reading result files.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The output name is empty or would escape the output directory.
    #[error("Invalid output name '{name}': {reason}")]
    InvalidName {
        /// Rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// A file or directory operation failed.
    #[error("Failed to {action} {}: {source}", path.display())]
    Io {
        /// What was being done.
        action: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// A result file is not a JSON array of records.
    #[error("Invalid result file {}: {source}", path.display())]
    Json {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },
}

/// Paths written by [`write_output`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFiles {
    /// `<name>.json`: the records.
    pub records: PathBuf,
    /// `<name>_report.md`: the aggregate summary.
    pub report: PathBuf,
}

/// Write `records` as `<name>.json` and their summary as `<name>_report.md`.
pub fn write_output(
    output_dir: &Path,
    name: &str,
    records: &[TaskRecord],
) -> Result<WrittenFiles, OutputError> {
    validate_output_name(name)?;

    std::fs::create_dir_all(output_dir).map_err(|source| OutputError::Io {
        action: "create output directory",
        path: output_dir.to_path_buf(),
        source,
    })?;

    let records_path = output_dir.join(format!("{name}.json"));
    let mut json = serde_json::to_string_pretty(records).map_err(|source| OutputError::Json {
        path: records_path.clone(),
        source,
    })?;
    json.push('\n');
    write_file(&records_path, &json)?;

    let report_path = output_dir.join(format!("{name}_report.md"));
    let summary = report::Summary::from_records(records);
    write_file(&report_path, &report::build_report(name, &summary))?;

    Ok(WrittenFiles {
        records: records_path,
        report: report_path,
    })
}

/// Read a result file written by [`write_output`].
pub fn read_records(path: &Path) -> Result<Vec<TaskRecord>, OutputError> {
    let json = std::fs::read_to_string(path).map_err(|source| OutputError::Io {
        action: "read",
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| OutputError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: &str) -> Result<(), OutputError> {
    std::fs::write(path, contents).map_err(|source| OutputError::Io {
        action: "write",
        path: path.to_path_buf(),
        source,
    })
}

fn validate_output_name(name: &str) -> Result<(), OutputError> {
    let invalid = |reason| {
        Err(OutputError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };
    if name.trim().is_empty() {
        return invalid("must not be empty");
    }
    let candidate = Path::new(name);
    if candidate.is_absolute() {
        return invalid("absolute paths are not allowed");
    }
    if candidate.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    }) {
        return invalid("traversal segments are not allowed");
    }
    if name.contains('/') || name.contains('\\') {
        return invalid("path separators are not allowed");
    }
    Ok(())
}
