//! ASIL / Security decision table.
//!
//! A test case validates one or more requirements; every requirement row in
//! the batch carries the requirement's DOORS ASIL and category. The table
//! resolves each test case to a single classification: the most severe ASIL
//! among its requirements, and "Security Relevant" as soon as one of them is
//! a security requirement.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sheet::columns::{
    DOORS_ASIL, DOORS_CATEGORY, PREVIOUS_ASIL, PREVIOUS_CATEGORY, TEST_CASE_ID, TEST_CASE_STATE,
    UPDATED_ASIL, UPDATED_SECURITY,
};
use crate::sheet::{read_xlsx, SheetError, Table};

pub const SECURITY_RELEVANT: &str = "Security Relevant";
pub const NOT_SECURITY_RELEVANT: &str = "Not Security Relevant";

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Spreadsheet error: {0}")]
    Sheet(#[from] SheetError),
}

/// The decision table. Loaded once; never mutated during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleTable {
    /// ASIL values from least to most severe.
    pub asil_order: Vec<String>,
    /// Requirement categories that make a test case security relevant.
    pub security_categories: Vec<String>,
    pub security_relevant: String,
    pub not_security_relevant: String,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self {
            asil_order: ["-", "QM", "A", "B", "C", "D"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            security_categories: vec!["Security".into(), SECURITY_RELEVANT.into()],
            security_relevant: SECURITY_RELEVANT.into(),
            not_security_relevant: NOT_SECURITY_RELEVANT.into(),
        }
    }
}

/// Derived classification for one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub asil: String,
    pub security: String,
}

impl RuleTable {
    /// Severity rank of an ASIL value; `None` when the value is not in the table.
    pub fn asil_rank(&self, value: &str) -> Option<usize> {
        let value = value.trim();
        self.asil_order
            .iter()
            .position(|a| a.eq_ignore_ascii_case(value))
    }

    pub fn is_security(&self, category: &str) -> bool {
        let category = category.trim();
        self.security_categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(category))
    }

    /// Resolve the `(ASIL, category)` pairs of one test case.
    ///
    /// Unknown ASIL values do not take part in the maximum. When none is
    /// known the first value passes through unchanged. Unknown categories
    /// count as not security relevant.
    pub fn resolve<'a, I>(&self, links: I) -> Classification
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut best: Option<usize> = None;
        let mut first: Option<&str> = None;
        let mut security = false;

        for (asil, category) in links {
            first.get_or_insert(asil);
            if let Some(rank) = self.asil_rank(asil) {
                if best.map_or(true, |b| rank > b) {
                    best = Some(rank);
                }
            }
            security |= self.is_security(category);
        }

        let asil = match best {
            Some(rank) => self.asil_order[rank].clone(),
            None => first.unwrap_or_default().trim().to_string(),
        };
        let security = if security {
            self.security_relevant.clone()
        } else {
            self.not_security_relevant.clone()
        };

        Classification { asil, security }
    }
}

/// Add the updated ASIL and Security columns to every row of `table`.
///
/// Rows sharing a `TestCaseID` receive the same classification.
pub fn apply_rules(table: &mut Table, rules: &RuleTable) -> Result<(), RuleError> {
    for required in [TEST_CASE_ID, DOORS_ASIL, DOORS_CATEGORY, TEST_CASE_STATE] {
        if !table.has_column(required) {
            return Err(RuleError::MissingColumn(required.to_string()));
        }
    }

    let (updated_asil, updated_security) = {
        let ids = table.column(TEST_CASE_ID)?;
        let asils = table.column(DOORS_ASIL)?;
        let categories = table.column(DOORS_CATEGORY)?;

        let mut groups: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
        for ((id, asil), category) in ids.iter().zip(&asils).zip(&categories) {
            groups.entry(id.trim()).or_default().push((*asil, *category));
        }

        let resolved: HashMap<&str, Classification> = groups
            .into_iter()
            .map(|(id, links)| (id, rules.resolve(links)))
            .collect();

        let mut updated_asil = Vec::with_capacity(ids.len());
        let mut updated_security = Vec::with_capacity(ids.len());
        for id in &ids {
            // every id was inserted above
            if let Some(c) = resolved.get(id.trim()) {
                updated_asil.push(c.asil.clone());
                updated_security.push(c.security.clone());
            }
        }
        (updated_asil, updated_security)
    };

    table.set_column(UPDATED_ASIL, updated_asil)?;
    table.set_column(UPDATED_SECURITY, updated_security)?;

    tracing::info!(rows = table.len(), "Decision table applied");
    Ok(())
}

/// Whether the derived classification of `row` differs from the one the QM
/// server currently holds. Case and surrounding whitespace are ignored.
pub fn needs_update(table: &Table, row: usize) -> Result<bool, RuleError> {
    for required in [PREVIOUS_ASIL, PREVIOUS_CATEGORY, UPDATED_ASIL, UPDATED_SECURITY] {
        if !table.has_column(required) {
            return Err(RuleError::MissingColumn(required.to_string()));
        }
    }

    let cell = |column: &str| table.cell(row, column).unwrap_or_default().trim();
    Ok(!cell(PREVIOUS_ASIL).eq_ignore_ascii_case(cell(UPDATED_ASIL))
        || !cell(PREVIOUS_CATEGORY).eq_ignore_ascii_case(cell(UPDATED_SECURITY)))
}

/// Read a test-case spreadsheet and apply the decision table to it.
pub fn update_excel_wrt_rules(path: &Path, rules: &RuleTable) -> Result<Table, RuleError> {
    let mut table = read_xlsx(path)?;
    apply_rules(&mut table, rules)?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::write_xlsx;

    fn batch(rows: &[(&str, &str, &str, &str, &str, &str)]) -> Table {
        let mut table = Table::with_columns(&[
            TEST_CASE_ID,
            DOORS_ASIL,
            DOORS_CATEGORY,
            PREVIOUS_ASIL,
            PREVIOUS_CATEGORY,
            TEST_CASE_STATE,
        ]);
        for (id, asil, cat, prev_asil, prev_cat, state) in rows {
            table
                .push_row(
                    [id, asil, cat, prev_asil, prev_cat, state]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                )
                .unwrap();
        }
        table
    }

    fn scenario_one() -> Table {
        batch(&[
            ("1", "A", "Security", "QM", "Not Security Relevant", "approved"),
            ("1", "B", "Not Security Relevant", "-", "Security Relevant", "not approved"),
            ("2", "C", "General", "B", "General", "approved"),
        ])
    }

    fn scenario_two() -> Table {
        batch(&[
            ("1", "-", "General", "QM", "Not Security Relevant", "approved"),
            ("1", "-", "Not Security Relevant", "-", "Security Relevant", "not approved"),
            ("1", "-", "General", "B", "General", "approved"),
        ])
    }

    #[test]
    fn adds_both_derived_columns() {
        let mut table = scenario_one();
        apply_rules(&mut table, &RuleTable::default()).unwrap();
        assert!(table.has_column(UPDATED_ASIL));
        assert!(table.has_column(UPDATED_SECURITY));
        assert!(table.rows().iter().all(|r| r.len() == table.columns().len()));
    }

    #[test]
    fn security_requirement_raises_asil_and_relevance() {
        let mut table = scenario_one();
        apply_rules(&mut table, &RuleTable::default()).unwrap();

        assert_eq!(table.cell(0, UPDATED_ASIL), Some("B"));
        assert_eq!(table.cell(0, UPDATED_SECURITY), Some("Security Relevant"));
        assert_eq!(table.cell(1, UPDATED_ASIL), Some("B"));
        assert_eq!(table.cell(1, UPDATED_SECURITY), Some("Security Relevant"));
    }

    #[test]
    fn general_category_is_not_security_relevant() {
        let mut table = scenario_one();
        apply_rules(&mut table, &RuleTable::default()).unwrap();

        assert_eq!(table.cell(2, UPDATED_ASIL), Some("C"));
        assert_eq!(table.cell(2, UPDATED_SECURITY), Some("Not Security Relevant"));
    }

    #[test]
    fn dash_asil_passes_through() {
        let mut table = scenario_two();
        apply_rules(&mut table, &RuleTable::default()).unwrap();

        assert_eq!(table.column(UPDATED_ASIL).unwrap(), vec!["-", "-", "-"]);
        assert_eq!(table.cell(0, UPDATED_SECURITY), Some("Not Security Relevant"));
    }

    #[test]
    fn unknown_asil_passes_current_value_through() {
        let mut table = batch(&[("7", "TBD", "Whatever", "", "", "draft")]);
        apply_rules(&mut table, &RuleTable::default()).unwrap();

        assert_eq!(table.cell(0, UPDATED_ASIL), Some("TBD"));
        assert_eq!(table.cell(0, UPDATED_SECURITY), Some("Not Security Relevant"));
    }

    #[test]
    fn unknown_asil_does_not_beat_known_one() {
        let rules = RuleTable::default();
        let c = rules.resolve([("TBD", "General"), ("QM", "General")]);
        assert_eq!(c.asil, "QM");
    }

    #[test]
    fn asil_match_ignores_case_and_whitespace() {
        let rules = RuleTable::default();
        let c = rules.resolve([(" qm ", "security"), ("a", "General")]);
        assert_eq!(c.asil, "A");
        assert_eq!(c.security, SECURITY_RELEVANT);
    }

    #[test]
    fn missing_column_fails_fast() {
        let mut table = Table::with_columns(&[TEST_CASE_ID, DOORS_ASIL, TEST_CASE_STATE]);
        table
            .push_row(vec!["1".into(), "A".into(), "approved".into()])
            .unwrap();

        let err = apply_rules(&mut table, &RuleTable::default()).unwrap_err();
        assert!(matches!(err, RuleError::MissingColumn(ref c) if c == DOORS_CATEGORY));
        assert!(!table.has_column(UPDATED_ASIL));
    }

    #[test]
    fn configured_table_changes_resolution() {
        let rules = RuleTable {
            security_categories: vec!["Cyber".into()],
            ..RuleTable::default()
        };
        assert_eq!(rules.resolve([("A", "Security")]).security, NOT_SECURITY_RELEVANT);
        assert_eq!(rules.resolve([("A", "Cyber")]).security, SECURITY_RELEVANT);
    }

    #[test]
    fn rule_table_deserializes_with_defaults() {
        let rules: RuleTable =
            serde_json::from_str(r#"{"security_categories": ["Security"]}"#).unwrap();
        assert_eq!(rules.asil_order, RuleTable::default().asil_order);
        assert_eq!(rules.security_categories, vec!["Security".to_string()]);
    }

    #[test]
    fn update_excel_reads_and_applies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_input.xlsx");
        write_xlsx(&scenario_one(), &path).unwrap();

        let table = update_excel_wrt_rules(&path, &RuleTable::default()).unwrap();
        assert_eq!(table.cell(0, UPDATED_ASIL), Some("B"));
        assert_eq!(table.cell(2, UPDATED_SECURITY), Some("Not Security Relevant"));
    }

    #[test]
    fn needs_update_compares_with_previous_values() {
        let mut table = scenario_one();
        apply_rules(&mut table, &RuleTable::default()).unwrap();

        // QM / Not Security Relevant -> B / Security Relevant
        assert!(needs_update(&table, 0).unwrap());
        // B / General -> C / Not Security Relevant
        assert!(needs_update(&table, 2).unwrap());

        let mut same = batch(&[("9", "b", "General", "B", "not security relevant", "approved")]);
        apply_rules(&mut same, &RuleTable::default()).unwrap();
        assert!(!needs_update(&same, 0).unwrap());
    }

    #[test]
    fn needs_update_requires_derived_columns() {
        let err = needs_update(&scenario_one(), 0).unwrap_err();
        assert!(matches!(err, RuleError::MissingColumn(ref c) if c == UPDATED_ASIL));
    }
}
