use std::collections::HashMap;

use csv::StringRecord;

use crate::error::{ImportError, Result};
use crate::pipeline::processing::aggregate::NA;

/// Header lookup for delimited exports. Columns are addressed by name, never by position.
#[derive(Debug)]
pub struct ColumnIndex {
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    /// Fails with a schema error naming every required column the header lacks
    pub fn new(source_name: &str, headers: &StringRecord, required: &[&str]) -> Result<Self> {
        let positions: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_string(), i))
            .collect();

        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|name| !positions.contains_key(*name))
            .collect();
        if !missing.is_empty() {
            return Err(ImportError::schema(
                source_name,
                format!("missing column(s): {}", missing.join(", ")),
            ));
        }

        Ok(Self { positions })
    }

    /// Raw trimmed value, `None` when the column is absent from the header or the row is short
    pub fn raw<'r>(&self, record: &'r StringRecord, name: &str) -> Option<&'r str> {
        self.positions
            .get(name)
            .and_then(|&i| record.get(i))
            .map(str::trim)
    }

    /// Value with explicit placeholders (`-`, empty) replaced by `NA`. Meant for required columns.
    pub fn value(&self, record: &StringRecord, name: &str) -> String {
        placeholder_to_na(self.raw(record, name).unwrap_or_default())
    }
}

pub fn placeholder_to_na(raw: &str) -> String {
    match raw.trim() {
        "" | "-" => NA.to_string(),
        value => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_required_columns_are_named() {
        let headers = StringRecord::from(vec!["Name", "Gene(s)"]);
        let err = ColumnIndex::new("ClinVar", &headers, &["Name", "Clinical significance (Last reviewed)"])
            .unwrap_err();
        match err {
            ImportError::Schema { source_name, message } => {
                assert_eq!(source_name, "ClinVar");
                assert!(message.contains("Clinical significance"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_placeholders_become_na() {
        let headers = StringRecord::from(vec!["SIFT", "Condel"]);
        let index = ColumnIndex::new("VEP", &headers, &["SIFT", "Condel"]).unwrap();
        let row = StringRecord::from(vec!["-", " deleterious(0.01) "]);

        assert_eq!(index.value(&row, "SIFT"), "NA");
        assert_eq!(index.value(&row, "Condel"), "deleterious(0.01)");
        // a short row reads as a placeholder
        assert_eq!(index.value(&StringRecord::from(vec!["tolerated(0.2)"]), "Condel"), "NA");
    }
}
