//! Data models for FAC audit data.
//!
//! This module contains the record types returned by the FAC API
//! (`general` and `federal_awards` endpoints), the borrowed join row
//! produced by the merger, and the ranked program summary.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Name of the column both datasets are joined on.
pub const JOIN_KEY: &str = "report_id";

/// Largest magnitude below which every whole `f64` is an exact integer (2^53).
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Identifier of one audit submission.
///
/// The live API returns strings (`2022-12-GSAFAC-0000012345`) but older
/// exports and fixtures use integers. The JSON type is kept as-is so a
/// snapshot written back is identical to the one read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportId {
    Number(i64),
    Text(String),
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportId::Number(n) => write!(f, "{}", n),
            ReportId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for ReportId {
    fn from(n: i64) -> Self {
        ReportId::Number(n)
    }
}

impl From<&str> for ReportId {
    fn from(s: &str) -> Self {
        ReportId::Text(s.to_string())
    }
}

/// A record that can be laid out as one flat table row.
pub trait FlatRecord: Serialize {
    /// Columns every record of this type carries, in output order.
    const FIXED_FIELDS: &'static [&'static str];

    /// Upstream fields the pipeline does not interpret.
    fn extra(&self) -> &Map<String, Value>;

    /// Column names of this record: fixed fields first, then extras.
    fn column_names(&self) -> impl Iterator<Item = &str> {
        Self::FIXED_FIELDS
            .iter()
            .copied()
            .chain(self.extra().keys().map(String::as_str))
    }

    /// Serialize into a flat JSON object.
    fn to_flat(&self) -> serde_json::Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(serde_json::Error::custom(format!(
                "record serialized to a non-object value: {}",
                other
            ))),
        }
    }
}

/// One row of the `general` endpoint: a single audit submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralRecord {
    /// Unique id of the submission.
    pub report_id: ReportId,
    /// EIN of the audit firm.
    #[serde(
        default,
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub auditor_ein: Option<String>,
    /// Every other column, untouched and in document order.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FlatRecord for GeneralRecord {
    const FIXED_FIELDS: &'static [&'static str] = &["report_id", "auditor_ein"];

    fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

/// One row of the `federal_awards` endpoint: a single award line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardRecord {
    /// Submission this award belongs to. Not unique.
    pub report_id: ReportId,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub federal_program_name: Option<String>,
    /// Two-digit agency prefix of the assistance listing (e.g. `10`).
    #[serde(
        default,
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub federal_agency_prefix: Option<String>,
    /// Assistance listing extension (e.g. `001`, `U01`).
    #[serde(
        default,
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub federal_award_extension: Option<String>,
    /// Dollars expended on the award.
    #[serde(
        default,
        deserialize_with = "deserialize_optional_f64",
        serialize_with = "serialize_optional_amount",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount_expended: Option<f64>,
    /// Number of findings recorded against the award.
    #[serde(
        default,
        deserialize_with = "deserialize_optional_u64",
        skip_serializing_if = "Option::is_none"
    )]
    pub findings_count: Option<u64>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub audit_year: Option<String>,
    /// `Y` for major programs. Only used as a server-side filter.
    #[serde(
        default,
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_major: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FlatRecord for AwardRecord {
    const FIXED_FIELDS: &'static [&'static str] = &[
        "report_id",
        "federal_program_name",
        "federal_agency_prefix",
        "federal_award_extension",
        "amount_expended",
        "findings_count",
        "audit_year",
        "is_major",
    ];

    fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

impl AwardRecord {
    /// Whether any findings were recorded against this award.
    pub fn has_findings(&self) -> bool {
        self.findings_count.unwrap_or(0) > 0
    }

    /// The grouping triple used for program ranking.
    pub fn program_key(&self) -> ProgramKey {
        ProgramKey {
            federal_program_name: self.federal_program_name.clone(),
            federal_agency_prefix: self.federal_agency_prefix.clone(),
            federal_award_extension: self.federal_award_extension.clone(),
        }
    }
}

/// A general record joined with at most one of its awards.
///
/// Borrowed from the datasets it was built from; `award` is `None` when the
/// report has no matching award line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergedRecord<'a> {
    pub general: &'a GeneralRecord,
    pub award: Option<&'a AwardRecord>,
}

/// Identity of a federal program. `None` components group together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    pub federal_program_name: Option<String>,
    pub federal_agency_prefix: Option<String>,
    pub federal_award_extension: Option<String>,
}

impl ProgramKey {
    /// Assistance listing number (`10.001`), when both parts are known.
    pub fn assistance_listing(&self) -> Option<String> {
        match (&self.federal_agency_prefix, &self.federal_award_extension) {
            (Some(prefix), Some(ext)) => Some(format!("{}.{}", prefix, ext)),
            _ => None,
        }
    }
}

impl fmt::Display for ProgramKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.federal_program_name.as_deref().unwrap_or("(no program)");
        match self.assistance_listing() {
            Some(listing) => write!(f, "{} [{}]", name, listing),
            None => write!(f, "{}", name),
        }
    }
}

/// Statistics for one federal program, one row of the ranked summary.
///
/// Fields are spelled out rather than flattened from [`ProgramKey`] so the
/// struct maps one-to-one onto a CSV record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramSummary {
    pub federal_program_name: Option<String>,
    pub federal_agency_prefix: Option<String>,
    pub federal_award_extension: Option<String>,
    /// Number of rows in the group.
    pub total_entries: u64,
    /// Rows with at least one finding.
    pub findings_entries: u64,
    /// Sum of `amount_expended`, absent amounts counted as zero.
    pub total_amount_expended: f64,
}

impl ProgramSummary {
    /// Column order of the summary CSV.
    pub const COLUMNS: [&'static str; 6] = [
        "federal_program_name",
        "federal_agency_prefix",
        "federal_award_extension",
        "total_entries",
        "findings_entries",
        "total_amount_expended",
    ];

    /// The grouping triple this row summarizes.
    pub fn program(&self) -> ProgramKey {
        ProgramKey {
            federal_program_name: self.federal_program_name.clone(),
            federal_agency_prefix: self.federal_agency_prefix.clone(),
            federal_award_extension: self.federal_award_extension.clone(),
        }
    }

    /// Share of entries with findings, in percent.
    pub fn findings_rate(&self) -> f64 {
        if self.total_entries == 0 {
            0.0
        } else {
            self.findings_entries as f64 / self.total_entries as f64 * 100.0
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextInput {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FloatInput {
    Number(f64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CountInput {
    Number(u64),
    Text(String),
}

fn deserialize_optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<TextInput>::deserialize(deserializer)?;
    Ok(value.map(|input| match input {
        TextInput::Text(text) => text,
        TextInput::Integer(number) => number.to_string(),
        TextInput::Float(number) => number.to_string(),
        TextInput::Flag(flag) => flag.to_string(),
    }))
}

fn deserialize_optional_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<FloatInput>::deserialize(deserializer)? {
        None => Ok(None),
        Some(FloatInput::Number(number)) => Ok(Some(number)),
        Some(FloatInput::Text(text)) => parse_optional(&text),
    }
}

/// Whole-dollar amounts are written as integers, as the API sends them.
fn serialize_optional_amount<S>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match *value {
        Some(amount) if amount.fract() == 0.0 && amount.abs() < MAX_EXACT_INTEGER => {
            serializer.serialize_i64(amount as i64)
        }
        Some(amount) => serializer.serialize_f64(amount),
        None => serializer.serialize_none(),
    }
}

fn deserialize_optional_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<CountInput>::deserialize(deserializer)? {
        None => Ok(None),
        Some(CountInput::Number(number)) => Ok(Some(number)),
        Some(CountInput::Text(text)) => parse_optional(&text),
    }
}

fn parse_optional<T, E>(text: &str) -> Result<Option<T>, E>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
    E: DeError,
{
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<T>().map(Some).map_err(E::custom)
}
