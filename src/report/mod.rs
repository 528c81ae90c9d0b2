//! Output files.
//!
//! This module writes the merged dataset (JSON/CSV) and the ranked
//! program summary (CSV).

pub mod export;

pub use export::*;
