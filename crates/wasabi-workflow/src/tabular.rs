use std::collections::BTreeSet;

use crate::error::{Result, WorkflowError};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Distinct non-empty values of `column` in header-first CSV `data`,
/// sorted. Short rows are tolerated; a missing header column is not.
pub fn distinct_column_values(data: &[u8], column: &str) -> Result<BTreeSet<String>> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let index = reader
        .headers()?
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| WorkflowError::MissingColumn {
            column: column.to_string(),
        })?;

    let mut values = BTreeSet::new();
    for record in reader.records() {
        let record = record?;
        if let Some(value) = record.get(index).filter(|v| !v.is_empty()) {
            values.insert(value.to_string());
        }
    }
    Ok(values)
}
