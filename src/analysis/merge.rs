//! Left-outer join of general records with their award lines.
//!
//! Rows borrow from the two input datasets. Flattening into a table is a
//! separate step ([`Merged::to_table`]) so aggregation never pays for it.

use crate::models::{AwardRecord, FlatRecord, GeneralRecord, MergedRecord, ReportId, JOIN_KEY};
use indexmap::IndexSet;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::hash::Hash;
use tracing::debug;

/// Suffix for general-side columns that also exist on the award side.
pub const GENERAL_SUFFIX: &str = "_gen";
/// Suffix for award-side columns that also exist on the general side.
pub const AWARD_SUFFIX: &str = "_awd";

/// Result of a join: the rows plus the inputs needed to lay them out.
#[derive(Debug, Clone)]
pub struct Merged<'a> {
    pub rows: Vec<MergedRecord<'a>>,
    general: &'a [GeneralRecord],
    awards: &'a [AwardRecord],
}

/// A flat, column-ordered table ready for export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Join `general` with `awards` on `report_id`.
pub fn merge<'a>(general: &'a [GeneralRecord], awards: &'a [AwardRecord]) -> Merged<'a> {
    merge_by(general, awards, |g| &g.report_id, |a| &a.report_id)
}

/// Left-outer join with caller-supplied key extractors.
///
/// General-row order is preserved. Each general row yields one output row per
/// matching award (in award order), or a single row with no award.
pub fn merge_by<'a, K, FG, FA>(
    general: &'a [GeneralRecord],
    awards: &'a [AwardRecord],
    general_key: FG,
    award_key: FA,
) -> Merged<'a>
where
    K: Eq + Hash + 'a,
    FG: Fn(&'a GeneralRecord) -> K,
    FA: Fn(&'a AwardRecord) -> K,
{
    let mut by_key: HashMap<K, Vec<&'a AwardRecord>> = HashMap::new();
    for award in awards {
        by_key.entry(award_key(award)).or_default().push(award);
    }

    let mut rows = Vec::with_capacity(general.len().max(awards.len()));
    let mut unmatched = 0usize;

    for record in general {
        match by_key.get(&general_key(record)) {
            Some(matches) => rows.extend(matches.iter().map(|award| MergedRecord {
                general: record,
                award: Some(*award),
            })),
            None => {
                unmatched += 1;
                rows.push(MergedRecord {
                    general: record,
                    award: None,
                });
            }
        }
    }

    debug!(
        "Merged {} general and {} award records into {} rows ({} reports without awards)",
        general.len(),
        awards.len(),
        rows.len(),
        unmatched
    );

    Merged {
        rows,
        general,
        awards,
    }
}

/// Report ids that occur more than once in the general dataset.
pub fn duplicate_report_ids(general: &[GeneralRecord]) -> Vec<&ReportId> {
    let mut seen = std::collections::HashSet::new();
    let mut duplicates = Vec::new();
    for record in general {
        if !seen.insert(&record.report_id) && !duplicates.contains(&&record.report_id) {
            duplicates.push(&record.report_id);
        }
    }
    duplicates
}

impl<'a> Merged<'a> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows that carry an award.
    pub fn matched(&self) -> usize {
        self.rows.iter().filter(|row| row.award.is_some()).count()
    }

    /// Column names present in both inputs, other than the join key.
    pub fn collisions(&self) -> IndexSet<String> {
        let general_columns = columns_of(self.general);
        let award_columns = columns_of(self.awards);
        general_columns
            .intersection(&award_columns)
            .filter(|name| name.as_str() != JOIN_KEY)
            .cloned()
            .collect()
    }

    /// Flatten into one object per row.
    ///
    /// General columns come first, then award columns without the join key.
    /// Colliding names get `_gen`/`_awd` suffixes; rows without an award
    /// carry `null` in every award column.
    pub fn to_table(&self) -> serde_json::Result<Table> {
        let general_columns = columns_of(self.general);
        let award_columns: IndexSet<String> = columns_of(self.awards)
            .into_iter()
            .filter(|name| name != JOIN_KEY)
            .collect();
        let collisions = self.collisions();

        let general_name = |name: &str| -> String {
            if collisions.contains(name) {
                format!("{}{}", name, GENERAL_SUFFIX)
            } else {
                name.to_string()
            }
        };
        let award_name = |name: &str| -> String {
            if collisions.contains(name) {
                format!("{}{}", name, AWARD_SUFFIX)
            } else {
                name.to_string()
            }
        };

        if !collisions.is_empty() {
            debug!("Disambiguating colliding columns: {:?}", collisions);
        }

        let columns: Vec<String> = general_columns
            .iter()
            .map(|name| general_name(name))
            .chain(award_columns.iter().map(|name| award_name(name)))
            .collect();

        let mut rows = Vec::with_capacity(self.rows.len());
        for merged in &self.rows {
            let general_flat = merged.general.to_flat()?;
            let award_flat = merged.award.map(|award| award.to_flat()).transpose()?;
            let mut row = Map::with_capacity(columns.len());

            for name in &general_columns {
                let value = general_flat.get(name).cloned().unwrap_or(Value::Null);
                row.insert(general_name(name), value);
            }
            for name in &award_columns {
                let value = award_flat
                    .as_ref()
                    .and_then(|flat| flat.get(name))
                    .cloned()
                    .unwrap_or(Value::Null);
                row.insert(award_name(name), value);
            }

            rows.push(row);
        }

        Ok(Table { columns, rows })
    }
}

/// Lay out one dataset on its own as a flat table.
///
/// Columns are the fixed fields followed by every extra field in order of
/// first appearance. Fields a record lacks are `null`.
pub fn dataset_table<T: FlatRecord>(records: &[T]) -> serde_json::Result<Table> {
    let columns = columns_of(records);

    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let flat = record.to_flat()?;
        let row: Map<String, Value> = columns
            .iter()
            .map(|name| (name.clone(), flat.get(name).cloned().unwrap_or(Value::Null)))
            .collect();
        rows.push(row);
    }

    Ok(Table {
        columns: columns.into_iter().collect(),
        rows,
    })
}

/// Ordered union of column names across a dataset.
fn columns_of<T: FlatRecord>(records: &[T]) -> IndexSet<String> {
    let mut columns: IndexSet<String> = T::FIXED_FIELDS.iter().map(|s| s.to_string()).collect();
    for record in records {
        for name in record.column_names() {
            if !columns.contains(name) {
                columns.insert(name.to_string());
            }
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn general(id: i64, ein: &str) -> GeneralRecord {
        serde_json::from_value(json!({ "report_id": id, "auditor_ein": ein })).unwrap()
    }

    fn award(id: i64, program: &str, amount: f64, findings: u64) -> AwardRecord {
        serde_json::from_value(json!({
            "report_id": id,
            "federal_program_name": program,
            "federal_agency_prefix": "10",
            "federal_award_extension": "001",
            "amount_expended": amount,
            "findings_count": findings
        }))
        .unwrap()
    }

    #[test]
    fn test_merge_one_report_many_awards() {
        let general = vec![general(1, "A")];
        let awards = vec![award(1, "P", 100.0, 0), award(1, "P", 50.0, 2)];

        let merged = merge(&general, &awards);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.matched(), 2);
        assert_eq!(merged.rows[0].award.unwrap().amount_expended, Some(100.0));
        assert_eq!(merged.rows[1].award.unwrap().amount_expended, Some(50.0));
    }

    #[test]
    fn test_merge_keeps_unmatched_general_rows() {
        let general = vec![general(1, "A"), general(2, "B"), general(3, "C")];
        let awards = vec![award(3, "Q", 1.0, 0), award(1, "P", 2.0, 0), award(3, "R", 3.0, 1)];

        let merged = merge(&general, &awards);

        // max(1, matches) per report: 1 + 1 + 2
        assert_eq!(merged.len(), 4);
        let ids: Vec<_> = merged.rows.iter().map(|r| r.general.report_id.clone()).collect();
        assert_eq!(
            ids,
            vec![
                ReportId::Number(1),
                ReportId::Number(2),
                ReportId::Number(3),
                ReportId::Number(3)
            ]
        );
        assert!(merged.rows[1].award.is_none());

        let programs: Vec<_> = merged.rows[2..]
            .iter()
            .map(|r| r.award.unwrap().federal_program_name.clone().unwrap())
            .collect();
        assert_eq!(programs, vec!["Q", "R"]);
    }

    #[test]
    fn test_merge_ignores_awards_without_report() {
        let general = vec![general(1, "A")];
        let awards = vec![award(9, "P", 1.0, 0)];

        let merged = merge(&general, &awards);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged.matched(), 0);
    }

    #[test]
    fn test_merge_empty_inputs() {
        let merged = merge(&[], &[]);
        assert!(merged.is_empty());
        let table = merged.to_table().unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns[0], "report_id");
    }

    #[test]
    fn test_merge_does_not_match_across_id_types() {
        let general: Vec<GeneralRecord> =
            vec![serde_json::from_value(json!({ "report_id": "1" })).unwrap()];
        let awards = vec![award(1, "P", 1.0, 0)];

        let merged = merge(&general, &awards);
        assert_eq!(merged.matched(), 0);
    }

    #[test]
    fn test_merge_by_custom_key() {
        let general = vec![general(1, "EIN-1"), general(2, "EIN-2")];
        let awards: Vec<AwardRecord> = vec![serde_json::from_value(json!({
            "report_id": 5,
            "auditor_ein": "EIN-2"
        }))
        .unwrap()];

        let merged = merge_by(
            &general,
            &awards,
            |g| g.auditor_ein.clone(),
            |a| a.extra.get("auditor_ein").and_then(|v| v.as_str()).map(String::from),
        );

        assert_eq!(merged.len(), 2);
        assert!(merged.rows[0].award.is_none());
        assert!(merged.rows[1].award.is_some());
    }

    #[test]
    fn test_to_table_suffixes_colliding_columns() {
        let general: Vec<GeneralRecord> = vec![
            serde_json::from_value(json!({
                "report_id": "R1",
                "auditor_ein": "A",
                "audit_year": "2022",
                "auditee_name": "Town"
            }))
            .unwrap(),
            serde_json::from_value(json!({ "report_id": "R2", "audit_year": "2023" })).unwrap(),
        ];
        let awards: Vec<AwardRecord> = vec![serde_json::from_value(json!({
            "report_id": "R1",
            "federal_program_name": "P",
            "audit_year": "2022",
            "auditee_name": "Town"
        }))
        .unwrap()];

        let merged = merge(&general, &awards);
        let collisions: Vec<_> = merged.collisions().into_iter().collect();
        assert_eq!(collisions, vec!["audit_year", "auditee_name"]);

        let table = merged.to_table().unwrap();
        assert_eq!(
            table.columns,
            vec![
                "report_id",
                "auditor_ein",
                "audit_year_gen",
                "auditee_name_gen",
                "federal_program_name",
                "federal_agency_prefix",
                "federal_award_extension",
                "amount_expended",
                "findings_count",
                "audit_year_awd",
                "is_major",
                "auditee_name_awd",
            ]
        );
        assert_eq!(table.columns.iter().filter(|c| *c == "report_id").count(), 1);

        let first = &table.rows[0];
        assert_eq!(first["audit_year_gen"], json!("2022"));
        assert_eq!(first["audit_year_awd"], json!("2022"));
        assert_eq!(first["federal_program_name"], json!("P"));

        let second = &table.rows[1];
        assert_eq!(second["report_id"], json!("R2"));
        assert_eq!(second["auditee_name_gen"], Value::Null);
        assert_eq!(second["federal_program_name"], Value::Null);
        assert_eq!(second["audit_year_awd"], Value::Null);

        for row in &table.rows {
            let keys: Vec<_> = row.keys().cloned().collect();
            assert_eq!(keys, table.columns);
        }
    }

    #[test]
    fn test_duplicate_report_ids() {
        let general = vec![general(1, "A"), general(2, "B"), general(1, "C"), general(1, "D")];
        assert_eq!(duplicate_report_ids(&general), vec![&ReportId::Number(1)]);
    }

    #[test]
    fn test_dataset_table_unions_columns_in_first_appearance_order() {
        let general: Vec<GeneralRecord> = serde_json::from_value(json!([
            { "report_id": "R1", "auditee_name": "Town" },
            { "report_id": "R2", "auditor_ein": "222", "audit_year": "2023" }
        ]))
        .unwrap();

        let table = dataset_table(&general).unwrap();

        assert_eq!(
            table.columns,
            vec!["report_id", "auditor_ein", "auditee_name", "audit_year"]
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0]["auditor_ein"], Value::Null);
        assert_eq!(table.rows[0]["audit_year"], Value::Null);
        assert_eq!(table.rows[1]["auditee_name"], Value::Null);
        assert_eq!(table.rows[1]["audit_year"], json!("2023"));
    }

    #[test]
    fn test_dataset_table_of_empty_dataset_keeps_fixed_columns() {
        let table = dataset_table::<AwardRecord>(&[]).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns.len(), AwardRecord::FIXED_FIELDS.len());
    }
}
