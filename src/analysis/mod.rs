//! Analysis modules.
//!
//! The merger joins general records with award lines; the aggregator ranks
//! the joined rows by federal program.

pub mod aggregator;
pub mod merge;

pub use aggregator::*;
pub use merge::{dataset_table, duplicate_report_ids, merge, Table};
