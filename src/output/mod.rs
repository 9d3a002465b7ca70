/// Writes result records and the summary report to disk.
pub mod formatter;
/// Aggregate summary of result records and its markdown rendering.
pub mod report;
