use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "xtask", about = "Developer gates for querylens")]
struct Xtask {
    #[command(subcommand)]
    command: Task,
}

#[derive(Subcommand)]
enum Task {
    /// Formatting, lints and tests
    Precommit {
        /// Pass --locked to cargo
        #[arg(long)]
        locked: bool,
    },
    /// Precommit gates plus doc tests and rustdoc
    Ci {
        /// Pass --locked to cargo
        #[arg(long)]
        locked: bool,
    },
    /// Validate a commit message file
    CommitMsg {
        /// Path to the commit message file
        path: PathBuf,
    },
}

const COMMIT_TYPES: [&str; 11] = [
    "build", "chore", "ci", "docs", "feat", "fix", "perf", "refactor", "revert", "style", "test",
];

const MAX_SUBJECT_LEN: usize = 72;

fn run_cargo(args: &[&str], locked: bool, tool_args: &[&str]) -> Result<(), String> {
    let mut full: Vec<&str> = args.to_vec();
    if locked {
        full.push("--locked");
    }
    if !tool_args.is_empty() {
        full.push("--");
        full.extend_from_slice(tool_args);
    }

    eprintln!("+ cargo {}", full.join(" "));
    let status = Command::new("cargo")
        .args(&full)
        .status()
        .map_err(|error| format!("Failed to run cargo: {error}"))?;

    if status.success() {
        Ok(())
    } else {
        Err(format!(
            "`cargo {}` exited with status {status}",
            full.join(" ")
        ))
    }
}

fn run_precommit(locked: bool) -> Result<(), String> {
    run_cargo(&["fmt", "--all"], false, &["--check"])?;
    run_cargo(&["clippy", "--all-targets"], locked, &["-D", "warnings"])?;
    run_cargo(&["test", "--lib", "--tests", "--bins"], locked, &[])
}

fn run_ci(locked: bool) -> Result<(), String> {
    run_precommit(locked)?;
    run_cargo(&["test", "--doc"], locked, &[])?;
    run_cargo(&["doc", "--no-deps"], locked, &[])
}

fn commit_subject(raw: &str) -> Option<&str> {
    raw.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
}

fn validate_subject(subject: &str) -> Result<(), String> {
    if ["Merge ", "Revert \"", "fixup! ", "squash! "]
        .iter()
        .any(|prefix| subject.starts_with(prefix))
    {
        return Ok(());
    }

    let length = subject.chars().count();
    if length > MAX_SUBJECT_LEN {
        return Err(format!(
            "Commit subject is {length} chars (max {MAX_SUBJECT_LEN}): `{subject}`"
        ));
    }
    if subject.ends_with('.') {
        return Err("Commit subject must not end with a period.".to_string());
    }

    let Some((header, description)) = subject.split_once(": ") else {
        return Err(
            "Commit subject must follow Conventional Commits, e.g. `fix(scoring): handle empty sets`."
                .to_string(),
        );
    };
    if description.trim().is_empty() {
        return Err("Commit description after `: ` must not be empty.".to_string());
    }

    let header = header.strip_suffix('!').unwrap_or(header);
    let commit_type = match header.split_once('(') {
        Some((kind, scope)) => {
            let Some(scope) = scope.strip_suffix(')') else {
                return Err("Invalid commit header: unclosed scope parenthesis.".to_string());
            };
            if scope.is_empty() {
                return Err("Commit scope must not be empty.".to_string());
            }
            kind
        }
        None => header,
    };

    if COMMIT_TYPES.contains(&commit_type) {
        Ok(())
    } else {
        Err(format!(
            "Invalid commit type `{commit_type}`. Allowed: {}",
            COMMIT_TYPES.join(", ")
        ))
    }
}

fn validate_commit_message(path: &Path) -> Result<(), String> {
    let raw = std::fs::read_to_string(path).map_err(|error| {
        format!(
            "Failed to read commit message file {}: {error}",
            path.display()
        )
    })?;
    let subject = commit_subject(&raw).ok_or("Commit message subject is empty.")?;
    validate_subject(subject)
}

fn main() -> ExitCode {
    let result = match Xtask::parse().command {
        Task::Precommit { locked } => run_precommit(locked),
        Task::Ci { locked } => run_ci(locked),
        Task::CommitMsg { path } => validate_commit_message(&path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::from(1)
        }
    }
}
