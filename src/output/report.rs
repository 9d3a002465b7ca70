use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::classifier::ErrorCategory;
use crate::evaluation::TaskRecord;

/// Aggregate view over a set of task records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of records.
    pub total: usize,
    /// Share of generated queries that parsed.
    pub syntax_rate: f64,
    /// Share where both queries executed.
    pub execution_success_rate: f64,
    /// Share with identical raw results.
    pub execution_accuracy_rate: f64,
    /// Mean entity F1.
    pub mean_entity_f1: f64,
    /// Mean attribute F1.
    pub mean_attribute_f1: f64,
    /// Mean relation F1 over records that carry one; `None` if none do.
    pub mean_relation_f1: Option<f64>,
    /// Mean filter F1.
    pub mean_filter_f1: f64,
    /// Mean aggregation F1.
    pub mean_aggregation_f1: f64,
    /// Mean return-column F1.
    pub mean_return_column_f1: f64,
    /// Mean result F1.
    pub mean_result_f1: f64,
    /// Records per primary category.
    pub categories: BTreeMap<ErrorCategory, usize>,
    /// Records carrying each flag.
    pub flags: BTreeMap<ErrorCategory, usize>,
}

impl Summary {
    /// Summarize `records`. An empty slice yields all-zero rates.
    pub fn from_records(records: &[TaskRecord]) -> Self {
        let mut categories = BTreeMap::new();
        let mut flags = BTreeMap::new();
        for record in records {
            *categories.entry(record.error_category).or_insert(0) += 1;
            for flag in &record.error_flags {
                *flags.entry(*flag).or_insert(0) += 1;
            }
        }

        Self {
            total: records.len(),
            syntax_rate: rate(records, |r| r.syntaxically_correct),
            execution_success_rate: rate(records, TaskRecord::execution_success),
            execution_accuracy_rate: rate(records, |r| r.execution_accuracy),
            mean_entity_f1: mean(records.iter().map(|r| r.entity_f1)).unwrap_or(0.0),
            mean_attribute_f1: mean(records.iter().map(|r| r.attribute_f1)).unwrap_or(0.0),
            mean_relation_f1: mean(records.iter().filter_map(|r| r.relation_f1)),
            mean_filter_f1: mean(records.iter().map(|r| r.filter_f1)).unwrap_or(0.0),
            mean_aggregation_f1: mean(records.iter().map(|r| r.aggregation_f1)).unwrap_or(0.0),
            mean_return_column_f1: mean(records.iter().map(|r| r.return_column_f1))
                .unwrap_or(0.0),
            mean_result_f1: mean(records.iter().map(|r| r.result_f1)).unwrap_or(0.0),
            categories,
            flags,
        }
    }
}

fn rate(records: &[TaskRecord], predicate: impl Fn(&TaskRecord) -> bool) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().filter(|r| predicate(r)).count() as f64 / records.len() as f64
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Build a markdown report from a summary.
pub fn build_report(name: &str, summary: &Summary) -> String {
    let mut report = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(report, "# querylens Evaluation Report: {name}");
    let _ = writeln!(report);
    let _ = writeln!(report, "Tasks evaluated: {}", summary.total);
    let _ = writeln!(report);

    let _ = writeln!(report, "## Scores");
    let _ = writeln!(report);
    let _ = writeln!(report, "| Metric | Value |");
    let _ = writeln!(report, "|--------|-------|");
    let relation = summary
        .mean_relation_f1
        .map_or_else(|| "N/A".to_string(), |f1| format!("{f1:.3}"));
    for (metric, value) in [
        ("Syntax rate", format!("{:.3}", summary.syntax_rate)),
        ("Execution success rate", format!("{:.3}", summary.execution_success_rate)),
        ("Execution accuracy", format!("{:.3}", summary.execution_accuracy_rate)),
        ("Entity F1", format!("{:.3}", summary.mean_entity_f1)),
        ("Attribute F1", format!("{:.3}", summary.mean_attribute_f1)),
        ("Relation F1", relation),
        ("Filter F1", format!("{:.3}", summary.mean_filter_f1)),
        ("Aggregation F1", format!("{:.3}", summary.mean_aggregation_f1)),
        ("Return column F1", format!("{:.3}", summary.mean_return_column_f1)),
        ("Result F1", format!("{:.3}", summary.mean_result_f1)),
    ] {
        let _ = writeln!(report, "| {metric} | {value} |");
    }

    let _ = writeln!(report);
    let _ = writeln!(report, "## Error Categories");
    let _ = writeln!(report);
    let _ = writeln!(report, "| Category | Primary | Flagged |");
    let _ = writeln!(report, "|----------|---------|---------|");
    for category in ErrorCategory::ALL {
        let primary = summary.categories.get(&category).copied().unwrap_or(0);
        let flagged = summary.flags.get(&category).copied().unwrap_or(0);
        if primary > 0 || flagged > 0 {
            let _ = writeln!(report, "| {category} | {primary} | {flagged} |");
        }
    }

    report
}
