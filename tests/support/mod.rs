#![allow(dead_code)]

use std::path::{Path, PathBuf};

use querylens::evaluation::Task;
use rusqlite::Connection;

/// Small Formula 1 database shared by the execution tests.
pub(crate) const F1_SCHEMA: &str = "
    CREATE TABLE teams (teamId INTEGER PRIMARY KEY, name TEXT, nationality TEXT);
    CREATE TABLE drivers (
        driverId INTEGER PRIMARY KEY,
        name TEXT,
        nationality TEXT,
        teamId INTEGER REFERENCES teams(teamId)
    );
    INSERT INTO teams VALUES (1, 'Mercedes', 'German'), (2, 'Red Bull', 'Austrian'), (3, 'McLaren', 'British');
    INSERT INTO drivers VALUES
        (1, 'Hamilton', 'British', 1),
        (2, 'Russell', 'British', 1),
        (3, 'Verstappen', 'Dutch', 2),
        (4, 'Norris', 'British', 3),
        (5, 'Piastri', 'Australian', 3);
";

/// Create the F1 database in `dir` and return its path.
pub(crate) fn f1_database(dir: &Path) -> PathBuf {
    let path = dir.join("f1.sqlite");
    let connection = Connection::open(&path).expect("should create fixture database");
    connection
        .execute_batch(F1_SCHEMA)
        .expect("fixture schema should apply");
    path
}

pub(crate) fn sql_task(question: &str, sql: &str) -> Task {
    Task::new(question, sql, "")
}

pub(crate) fn cypher_task(question: &str, cypher: &str) -> Task {
    Task::new(question, "", cypher)
}

pub(crate) fn write_json(path: &Path, value: &serde_json::Value) {
    std::fs::write(path, serde_json::to_string_pretty(value).expect("value should serialize"))
        .expect("should write JSON fixture");
}
