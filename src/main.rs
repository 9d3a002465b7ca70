//! CLI entry point for `querylens`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use querylens::analyzer::{self, Language};
use querylens::config::EvaluationConfig;
use querylens::evaluation::{
    execute_with_timeout, load_tasks, Evaluator, QueryExecutor, RecordedExecutor, SqliteExecutor,
    Task, TaskRecord,
};
use querylens::output::formatter;
use querylens::output::report::Summary;

#[derive(Parser)]
#[command(
    name = "querylens",
    about = "Score generated SQL and Cypher queries against reference queries"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the extracted structure of one query as JSON
    Analyze {
        /// Query language (sql or cypher)
        #[arg(long)]
        language: Language,
        /// Query text
        query: String,
    },
    /// Evaluate generated queries against a task file
    Evaluate(EvaluateArgs),
    /// Re-evaluate an existing result file
    Rescore(RescoreArgs),
    /// Execute every reference query and report broken tasks
    ValidateTasks(ValidateArgs),
    /// Print the aggregate summary of a result file as JSON
    Summarize {
        /// Result file written by `evaluate` or `rescore`
        #[arg(long)]
        results: PathBuf,
    },
}

#[derive(Args)]
struct ExecutorArgs {
    /// SQLite database to run queries against
    #[arg(long, conflicts_with = "recorded", required_unless_present = "recorded")]
    sqlite: Option<PathBuf>,

    /// JSON file mapping query text to recorded rows
    #[arg(long)]
    recorded: Option<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    /// JSON evaluation config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Per-query timeout, overriding the config
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Batch worker threads, overriding the config
    #[arg(long)]
    workers: Option<usize>,

    /// Output directory
    #[arg(long, default_value = "querylens-output")]
    output_dir: PathBuf,

    /// Output file name, without extension
    #[arg(long)]
    name: Option<String>,
}

#[derive(Args)]
struct EvaluateArgs {
    /// JSON array of tasks
    #[arg(long)]
    tasks: PathBuf,

    /// JSON object mapping each question to its generated query
    #[arg(long)]
    responses: PathBuf,

    /// Language of the generated queries (sql or cypher)
    #[arg(long)]
    language: Language,

    #[command(flatten)]
    executor: ExecutorArgs,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args)]
struct RescoreArgs {
    /// Result file to re-evaluate
    #[arg(long)]
    results: PathBuf,

    /// Language of the recorded queries (sql or cypher)
    #[arg(long)]
    language: Language,

    #[command(flatten)]
    executor: ExecutorArgs,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args)]
struct ValidateArgs {
    /// JSON array of tasks
    #[arg(long)]
    tasks: PathBuf,

    /// Language of the reference queries to check (sql or cypher)
    #[arg(long)]
    language: Language,

    #[command(flatten)]
    executor: ExecutorArgs,

    /// JSON evaluation config
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Serialize)]
struct InvalidTask {
    question: String,
    reason: String,
}

#[derive(Serialize)]
struct ValidationReport {
    total: usize,
    invalid: Vec<InvalidTask>,
    duplicate_questions: Vec<String>,
}

fn main() -> ExitCode {
    init_tracing();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "command failed");
            for cause in err.chain().skip(1) {
                error!(cause = %cause, "caused by");
            }
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Analyze { language, query } => {
            let structure = analyzer::extract(language, &query);
            println!("{}", serde_json::to_string_pretty(&structure)?);
        }
        Command::Evaluate(args) => evaluate(args)?,
        Command::Rescore(args) => rescore(args)?,
        Command::ValidateTasks(args) => return validate_tasks(args),
        Command::Summarize { results } => {
            let records = formatter::read_records(&results)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&Summary::from_records(&records))?
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EvaluationConfig> {
    match path {
        Some(path) => Ok(EvaluationConfig::from_path(path)?),
        None => Ok(EvaluationConfig::default()),
    }
}

fn run_config(args: &RunArgs) -> Result<EvaluationConfig> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(timeout_ms) = args.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.validate()?;
    Ok(config)
}

fn open_executor(args: &ExecutorArgs) -> Result<Arc<dyn QueryExecutor>> {
    match (&args.sqlite, &args.recorded) {
        (Some(path), _) => Ok(Arc::new(
            SqliteExecutor::open(path).context("cannot open SQLite database")?,
        )),
        (None, Some(path)) => Ok(Arc::new(
            RecordedExecutor::from_path(path).context("cannot load recorded results")?,
        )),
        (None, None) => bail!("one of --sqlite or --recorded is required"),
    }
}

fn evaluate(args: EvaluateArgs) -> Result<()> {
    let config = run_config(&args.run)?;
    let tasks = load_tasks(&args.tasks)?;
    let responses: HashMap<String, String> = serde_json::from_str(
        &std::fs::read_to_string(&args.responses)
            .with_context(|| format!("cannot read {}", args.responses.display()))?,
    )
    .with_context(|| format!("{} is not a question -> query object", args.responses.display()))?;

    let items: Vec<(Task, String)> = tasks
        .into_iter()
        .map(|task| {
            let generated = responses.get(&task.question).cloned().unwrap_or_else(|| {
                warn!(question = %task.question, "no generated query; scoring empty text");
                String::new()
            });
            (task, generated)
        })
        .collect();

    let name = args.run.name.clone().unwrap_or_else(|| stem(&args.responses));
    run_batch(&args.executor, &args.run, config, &items, args.language, &name)
}

fn rescore(args: RescoreArgs) -> Result<()> {
    let config = run_config(&args.run)?;
    let records = formatter::read_records(&args.results)?;
    let items: Vec<(Task, String)> = records
        .into_iter()
        .map(|record| (task_from_record(&record, args.language), record.generated_script))
        .collect();

    let name = args
        .run
        .name
        .clone()
        .unwrap_or_else(|| format!("{}_rescored", stem(&args.results)));
    run_batch(&args.executor, &args.run, config, &items, args.language, &name)
}

fn run_batch(
    executor_args: &ExecutorArgs,
    run_args: &RunArgs,
    config: EvaluationConfig,
    items: &[(Task, String)],
    language: Language,
    name: &str,
) -> Result<()> {
    let evaluator = Evaluator::from_shared(open_executor(executor_args)?, config);
    let outcomes = evaluator.evaluate_batch(items, language)?;

    let mut records = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            Ok(result) => records.push(result.to_record()),
            Err(err) => warn!(error = %err, "task skipped"),
        }
    }

    let written = formatter::write_output(&run_args.output_dir, name, &records)?;
    let summary = Summary::from_records(&records);
    info!(
        tasks = summary.total,
        skipped = items.len() - records.len(),
        syntax_rate = summary.syntax_rate,
        execution_accuracy = summary.execution_accuracy_rate,
        mean_result_f1 = summary.mean_result_f1,
        output = %written.records.display(),
        "evaluation finished"
    );
    Ok(())
}

fn task_from_record(record: &TaskRecord, language: Language) -> Task {
    match language {
        Language::Sql => Task::new(record.question.clone(), record.expected_script.clone(), ""),
        Language::Cypher => Task::new(record.question.clone(), "", record.expected_script.clone()),
    }
}

fn validate_tasks(args: ValidateArgs) -> Result<ExitCode> {
    let config = load_config(args.config.as_deref())?;
    let tasks = load_tasks(&args.tasks)?;
    let executor = open_executor(&args.executor)?;

    let mut seen = HashSet::new();
    let mut duplicate_questions = Vec::new();
    let mut invalid = Vec::new();
    for task in &tasks {
        if !seen.insert(task) {
            duplicate_questions.push(task.question.clone());
            continue;
        }
        let reference = task.reference_query(args.language);
        let reason = if reference.trim().is_empty() {
            Some(format!("no {} reference query", args.language))
        } else {
            match execute_with_timeout(
                Arc::clone(&executor),
                reference,
                config.timeout(),
                config.cancel_grace(),
            ) {
                Ok(rows) if rows.is_empty() => Some("reference query returned no rows".to_string()),
                Ok(_) => None,
                Err(err) => Some(err.to_string()),
            }
        };
        if let Some(reason) = reason {
            invalid.push(InvalidTask {
                question: task.question.clone(),
                reason,
            });
        }
    }

    let report = ValidationReport {
        total: tasks.len(),
        invalid,
        duplicate_questions,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.invalid.is_empty() && report.duplicate_questions.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(
            invalid = report.invalid.len(),
            duplicates = report.duplicate_questions.len(),
            "task file has problems"
        );
        Ok(ExitCode::from(1))
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("results")
        .to_string()
}
