// src/process/codes.rs
//
// Distinct area references of the fact source. This set, not the fact rows,
// drives enrichment: one lookup per distinct code.

use arrow::{array::StringArray, record_batch::RecordBatch};
use serde::Serialize;
use std::{collections::BTreeSet, fmt, io::Write};
use tracing::warn;

use crate::error::PipelineError;
use crate::process::utils::{pad_code, strip_marker};
use crate::schema::catalog::{AREA_CODE_COLUMN, AREA_LABEL_COLUMN, CODE_MARKER};

/// A three-digit, zero-padded M49 area code such as `004`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct EntityCode(String);

impl EntityCode {
    /// Parse a raw identifier, tolerating the leading text marker.
    pub fn parse(raw: &str) -> Option<Self> {
        pad_code(strip_marker(raw.trim(), CODE_MARKER)).map(EntityCode)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One (identifier, label) pair as found in the fact source, marker stripped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AreaRef {
    pub code: String,
    pub label: String,
}

/// Sorted, de-duplicated set of area references.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AreaRefs(BTreeSet<AreaRef>);

impl AreaRefs {
    pub fn merge(&mut self, other: AreaRefs) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AreaRef> {
        self.0.iter()
    }

    /// Distinct entity codes. A code seen with several labels appears once;
    /// identifiers that are not numeric are dropped.
    pub fn entity_codes(&self) -> BTreeSet<EntityCode> {
        self.0
            .iter()
            .filter_map(|r| {
                let code = EntityCode::parse(&r.code);
                if code.is_none() {
                    warn!(code = %r.code, label = %r.label, "ignoring non-numeric area code");
                }
                code
            })
            .collect()
    }

    /// Write the set as `Area,Area Code (M49)` CSV.
    pub fn write_csv<W: Write>(&self, writer: W) -> csv::Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record([AREA_LABEL_COLUMN, AREA_CODE_COLUMN])?;
        for r in &self.0 {
            wtr.write_record([r.label.as_str(), r.code.as_str()])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl FromIterator<AreaRef> for AreaRefs {
    fn from_iter<I: IntoIterator<Item = AreaRef>>(iter: I) -> Self {
        AreaRefs(iter.into_iter().collect())
    }
}

fn text_column<'a>(
    table: &str,
    batch: &'a RecordBatch,
    column: &str,
) -> Result<&'a StringArray, PipelineError> {
    let mismatch = || PipelineError::SchemaMismatch {
        table: table.to_string(),
        column: column.to_string(),
    };
    let idx = batch.schema().index_of(column).map_err(|_| mismatch())?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(mismatch)
}

/// Collect the distinct (identifier, label) pairs of `batch`.
///
/// Rows without an identifier are skipped; a missing label becomes empty.
pub fn extract_area_refs(
    table: &str,
    batch: &RecordBatch,
    id_column: &str,
    label_column: &str,
) -> Result<AreaRefs, PipelineError> {
    let ids = text_column(table, batch, id_column)?;
    let labels = text_column(table, batch, label_column)?;

    Ok(ids
        .iter()
        .zip(labels.iter())
        .filter_map(|(id, label)| {
            let code = strip_marker(id?.trim(), CODE_MARKER);
            if code.is_empty() {
                return None;
            }
            Some(AreaRef {
                code: code.to_string(),
                label: label.unwrap_or_default().to_string(),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::build_text_schema;
    use std::sync::Arc;

    fn fact_batch(rows: &[(&str, &str)]) -> RecordBatch {
        let schema = build_text_schema(&[AREA_CODE_COLUMN, AREA_LABEL_COLUMN, "Value"]);
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(
                    rows.iter().map(|(c, _)| *c).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    rows.iter().map(|(_, l)| *l).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(vec!["1"; rows.len()])),
            ],
        )
        .unwrap()
    }

    const ROWS: [(&str, &str); 6] = [
        ("'004", "Afghanistan"),
        ("'008", "Albania"),
        ("'004", "Afghanistan"),
        ("'156", "China"),
        ("'008", "Albania"),
        ("'004", "Afghanistan"),
    ];

    #[test]
    fn distinct_pairs_with_marker_stripped() {
        let refs =
            extract_area_refs("WorldData.csv", &fact_batch(&ROWS), AREA_CODE_COLUMN, AREA_LABEL_COLUMN)
                .unwrap();
        let codes: Vec<_> = refs.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["004", "008", "156"]);
    }

    #[test]
    fn shuffled_rows_give_the_same_set() {
        let mut shuffled = ROWS.to_vec();
        shuffled.reverse();
        shuffled.swap(0, 3);

        let a = extract_area_refs("w", &fact_batch(&ROWS), AREA_CODE_COLUMN, AREA_LABEL_COLUMN)
            .unwrap();
        let b = extract_area_refs("w", &fact_batch(&shuffled), AREA_CODE_COLUMN, AREA_LABEL_COLUMN)
            .unwrap();
        assert_eq!(a, b);

        // merging a set into itself changes nothing
        let mut again = a.clone();
        again.merge(b);
        assert_eq!(again, a);
    }

    #[test]
    fn entity_codes_collapse_labels_and_skip_invalid() {
        let refs: AreaRefs = [
            AreaRef { code: "4".into(), label: "Afghanistan".into() },
            AreaRef { code: "004".into(), label: "Afghanistan (old)".into() },
            AreaRef { code: "X1".into(), label: "Nowhere".into() },
        ]
        .into_iter()
        .collect();

        let codes: Vec<_> = refs.entity_codes().into_iter().map(|c| c.to_string()).collect();
        assert_eq!(codes, vec!["004"]);
    }

    #[test]
    fn writes_hand_off_csv() {
        let refs =
            extract_area_refs("w", &fact_batch(&ROWS[..2]), AREA_CODE_COLUMN, AREA_LABEL_COLUMN)
                .unwrap();
        let mut out = Vec::new();
        refs.write_csv(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Area,Area Code (M49)\nAfghanistan,004\nAlbania,008\n"
        );
    }

    #[test]
    fn missing_label_column_is_schema_mismatch() {
        let batch = fact_batch(&ROWS);
        assert!(matches!(
            extract_area_refs("w", &batch, AREA_CODE_COLUMN, "Country"),
            Err(PipelineError::SchemaMismatch { .. })
        ));
    }
}
