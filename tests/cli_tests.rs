mod support;

use std::path::Path;
use std::process::{Command, Output};

use serde_json::{json, Value};

use support::{f1_database, write_json};

fn querylens(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_querylens"))
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("should run querylens binary")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout should be JSON ({e}):\n{}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

#[test]
fn analyze_prints_structure_json() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let output = querylens(
        &[
            "analyze",
            "--language",
            "cypher",
            "MATCH (a:driver)<-[:drove]-(b:team) RETURN a.name",
        ],
        dir.path(),
    );
    assert!(output.status.success(), "{output:?}");

    let structure = stdout_json(&output);
    assert_eq!(structure["parse_success"], true);
    assert_eq!(structure["relations"][0]["source"], "team");
    assert_eq!(structure["relations"][0]["target"], "driver");
}

#[test]
fn analyze_reports_unparsable_text_without_failing() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let output = querylens(&["analyze", "--language", "sql", "SELEC * FORM x"], dir.path());
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout_json(&output)["parse_success"], false);
}

#[test]
fn unknown_language_is_rejected() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let output = querylens(&["analyze", "--language", "sparql", "SELECT 1"], dir.path());
    assert_eq!(output.status.code(), Some(2), "{output:?}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid language: sparql"), "{stderr}");
}

#[test]
fn evaluate_writes_records_and_summarize_reads_them() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let db = f1_database(dir.path());
    let tasks = dir.path().join("tasks.json");
    let responses = dir.path().join("responses.json");
    write_json(
        &tasks,
        &json!([
            {"question": "How many drivers?", "sql": "SELECT COUNT(*) FROM drivers"},
            {"question": "How many British drivers?", "sql": "SELECT COUNT(*) FROM drivers WHERE nationality = 'British'"},
            {"question": "Which teams exist?", "sql": "SELECT name FROM teams"}
        ]),
    );
    write_json(
        &responses,
        &json!({
            "How many drivers?": "SELECT COUNT(*) FROM drivers",
            "How many British drivers?": "SELECT COUNT(*) FROM drivers"
        }),
    );

    let output = querylens(
        &[
            "evaluate",
            "--tasks",
            tasks.to_str().unwrap(),
            "--responses",
            responses.to_str().unwrap(),
            "--language",
            "SQL",
            "--sqlite",
            db.to_str().unwrap(),
            "--output-dir",
            "out",
            "--name",
            "run",
            "--workers",
            "2",
        ],
        dir.path(),
    );
    assert!(output.status.success(), "{output:?}");

    let results = dir.path().join("out").join("run.json");
    let records: Value =
        serde_json::from_str(&std::fs::read_to_string(&results).expect("results should exist"))
            .expect("results should be JSON");
    let categories: Vec<&str> = records
        .as_array()
        .expect("results should be an array")
        .iter()
        .map(|record| record["error_category"].as_str().unwrap())
        .collect();
    assert_eq!(categories, vec!["CORRECT", "WRONG_FILTER", "SYNTAX_ERROR"]);
    assert!(dir.path().join("out").join("run_report.md").exists());

    let output = querylens(&["summarize", "--results", results.to_str().unwrap()], dir.path());
    assert!(output.status.success(), "{output:?}");
    let summary = stdout_json(&output);
    assert_eq!(summary["total"], 3);
    assert_eq!(summary["categories"]["WRONG_FILTER"], 1);
}

#[test]
fn rescore_reevaluates_an_existing_result_file() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let db = f1_database(dir.path());
    let tasks = dir.path().join("tasks.json");
    let responses = dir.path().join("responses.json");
    write_json(
        &tasks,
        &json!([{"question": "How many drivers?", "sql": "SELECT COUNT(*) FROM drivers"}]),
    );
    write_json(
        &responses,
        &json!({"How many drivers?": "SELECT COUNT(*) FROM drivers"}),
    );
    let db = db.to_str().unwrap();
    let evaluate = querylens(
        &[
            "evaluate",
            "--tasks",
            tasks.to_str().unwrap(),
            "--responses",
            responses.to_str().unwrap(),
            "--language",
            "sql",
            "--sqlite",
            db,
            "--output-dir",
            ".",
            "--name",
            "run",
        ],
        dir.path(),
    );
    assert!(evaluate.status.success(), "{evaluate:?}");

    let rescore = querylens(
        &[
            "rescore",
            "--results",
            "run.json",
            "--language",
            "sql",
            "--sqlite",
            db,
            "--output-dir",
            ".",
        ],
        dir.path(),
    );
    assert!(rescore.status.success(), "{rescore:?}");

    let rescored: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("run_rescored.json"))
            .expect("rescored results should exist"),
    )
    .expect("rescored results should be JSON");
    assert_eq!(rescored[0]["error_category"], "CORRECT");
    assert_eq!(rescored[0]["question"], "How many drivers?");
}

#[test]
fn validate_tasks_flags_broken_and_duplicate_tasks() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let db = f1_database(dir.path());
    let tasks = dir.path().join("tasks.json");
    write_json(
        &tasks,
        &json!([
            {"question": "How many drivers?", "sql": "SELECT COUNT(*) FROM drivers"},
            {"question": "How many drivers?", "sql": "SELECT COUNT(driverId) FROM drivers"},
            {"question": "Which pilots?", "sql": "SELECT * FROM pilots"},
            {"question": "Which Italians?", "sql": "SELECT name FROM drivers WHERE nationality = 'Italian'"}
        ]),
    );

    let output = querylens(
        &[
            "validate-tasks",
            "--tasks",
            tasks.to_str().unwrap(),
            "--language",
            "sql",
            "--sqlite",
            db.to_str().unwrap(),
        ],
        dir.path(),
    );
    assert_eq!(output.status.code(), Some(1), "{output:?}");

    let report = stdout_json(&output);
    assert_eq!(report["total"], 4);
    assert_eq!(report["duplicate_questions"], json!(["How many drivers?"]));
    let invalid: Vec<&str> = report["invalid"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["question"].as_str().unwrap())
        .collect();
    assert_eq!(invalid, vec!["Which pilots?", "Which Italians?"]);
}

#[test]
fn evaluate_requires_an_executor() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let output = querylens(
        &[
            "evaluate",
            "--tasks",
            "tasks.json",
            "--responses",
            "responses.json",
            "--language",
            "sql",
        ],
        dir.path(),
    );
    assert_eq!(output.status.code(), Some(2), "{output:?}");
}

#[test]
fn missing_task_file_exits_one() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let db = f1_database(dir.path());
    let output = querylens(
        &[
            "validate-tasks",
            "--tasks",
            "absent.json",
            "--language",
            "sql",
            "--sqlite",
            db.to_str().unwrap(),
        ],
        dir.path(),
    );
    assert_eq!(output.status.code(), Some(1), "{output:?}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("absent.json"), "{stderr}");
}
