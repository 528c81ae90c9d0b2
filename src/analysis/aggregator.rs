//! Program aggregation and ranking.
//!
//! This module groups award rows by federal program and ranks programs by
//! how often they appear, along with findings and dollars expended.

use crate::models::{AwardRecord, MergedRecord, ProgramKey, ProgramSummary};
use indexmap::IndexMap;
use tracing::{debug, warn};

/// Number of programs kept in the ranked summary.
pub const DEFAULT_TOP_N: usize = 500;

/// A row that can be attributed to a federal program.
pub trait ProgramRow {
    /// Grouping triple; all-`None` when the row has no award data.
    fn program_key(&self) -> ProgramKey;
    /// Dollars expended, absent counted as zero.
    fn amount_expended(&self) -> f64;
    /// Whether `findings_count > 0`.
    fn has_findings(&self) -> bool;
}

impl ProgramRow for AwardRecord {
    fn program_key(&self) -> ProgramKey {
        AwardRecord::program_key(self)
    }

    fn amount_expended(&self) -> f64 {
        self.amount_expended.unwrap_or(0.0)
    }

    fn has_findings(&self) -> bool {
        AwardRecord::has_findings(self)
    }
}

impl ProgramRow for MergedRecord<'_> {
    fn program_key(&self) -> ProgramKey {
        self.award.map(AwardRecord::program_key).unwrap_or_default()
    }

    fn amount_expended(&self) -> f64 {
        self.award.and_then(|a| a.amount_expended).unwrap_or(0.0)
    }

    fn has_findings(&self) -> bool {
        self.award.is_some_and(AwardRecord::has_findings)
    }
}

#[derive(Debug, Default)]
struct ProgramStats {
    total_entries: u64,
    findings_entries: u64,
    total_amount_expended: f64,
}

/// Summarize rows into the default top 500 programs.
#[allow(dead_code)] // The binary passes the configured limit to summarize_top
pub fn summarize<R: ProgramRow>(rows: &[R]) -> Vec<ProgramSummary> {
    summarize_top(rows, DEFAULT_TOP_N)
}

/// Group rows by program, rank by entry count and keep the first `top_n`.
///
/// Ties on `total_entries` keep the order in which each program first
/// appeared in `rows`. Rows without program data form their own group.
pub fn summarize_top<R: ProgramRow>(rows: &[R], top_n: usize) -> Vec<ProgramSummary> {
    if rows.is_empty() {
        warn!("No data to summarize.");
        return Vec::new();
    }

    let mut groups: IndexMap<ProgramKey, ProgramStats> = IndexMap::new();

    for row in rows {
        let stats = groups.entry(row.program_key()).or_default();
        stats.total_entries += 1;
        if row.has_findings() {
            stats.findings_entries += 1;
        }
        stats.total_amount_expended += row.amount_expended();
    }

    let group_count = groups.len();
    let mut ranked: Vec<(ProgramKey, ProgramStats)> = groups.into_iter().collect();
    // Stable: equal counts stay in first-appearance order.
    ranked.sort_by_key(|(_, stats)| std::cmp::Reverse(stats.total_entries));
    ranked.truncate(top_n);

    debug!(
        "Summarized {} rows into {} programs, keeping {}",
        rows.len(),
        group_count,
        ranked.len()
    );

    ranked
        .into_iter()
        .map(|(key, stats)| ProgramSummary {
            federal_program_name: key.federal_program_name,
            federal_agency_prefix: key.federal_agency_prefix,
            federal_award_extension: key.federal_award_extension,
            total_entries: stats.total_entries,
            findings_entries: stats.findings_entries,
            total_amount_expended: stats.total_amount_expended,
        })
        .collect()
}

/// Totals across a ranked summary: entries, entries with findings, dollars.
pub fn summary_totals(summaries: &[ProgramSummary]) -> (u64, u64, f64) {
    summaries.iter().fold((0, 0, 0.0), |(entries, findings, amount), s| {
        (
            entries + s.total_entries,
            findings + s.findings_entries,
            amount + s.total_amount_expended,
        )
    })
}

/// Generate a text table of the first `n` programs.
pub fn generate_summary_text(summaries: &[ProgramSummary], n: usize) -> String {
    let mut lines = Vec::new();

    lines.push(format!(
        "{:>4}  {:>8}  {:>8}  {:>18}  Program",
        "#", "Entries", "Findings", "Expended ($)"
    ));

    for (rank, summary) in summaries.iter().take(n).enumerate() {
        lines.push(format!(
            "{:>4}  {:>8}  {:>8}  {:>18.2}  {}",
            rank + 1,
            summary.total_entries,
            summary.findings_entries,
            summary.total_amount_expended,
            summary.program()
        ));
    }

    if summaries.len() > n {
        lines.push(format!("      ... and {} more", summaries.len() - n));
    }

    lines.join("\n")
}
