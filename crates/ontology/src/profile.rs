//! Column profiles: the deterministic, LLM-free snapshot built in phase 1.
//!
//! A profile is computed once per run from stored statistics and never
//! mutated afterwards; every later phase reads it by column id.

use serde::{Deserialize, Serialize};

use crate::patterns::{detect_patterns, DetectedPattern, PatternKind};
use crate::routing::{route, ClassificationPath};
use crate::{ColumnId, SchemaColumn, SchemaTable, TableId};

/// Statistical and pattern snapshot of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub column_id: ColumnId,
    pub table_id: TableId,
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub is_nullable: bool,
    pub row_count: u64,
    pub distinct_count: u64,
    pub null_count: u64,
    /// `null_count / row_count`; zero when the table is empty.
    pub null_rate: f64,
    /// `distinct_count / row_count`; zero when the table is empty.
    pub cardinality: f64,
    pub sample_values: Vec<String>,
    pub detected_patterns: Vec<DetectedPattern>,
    pub classification_path: ClassificationPath,
}

impl ColumnProfile {
    /// Builds the profile for `column` of `table` and routes it.
    pub fn build(table: &SchemaTable, column: &SchemaColumn) -> Self {
        let row_count = column.row_count.or(table.row_count).unwrap_or(0);
        let null_count = match (column.null_count, column.non_null_count) {
            (Some(explicit), _) => explicit,
            (None, Some(non_null)) => row_count.saturating_sub(non_null),
            (None, None) => 0,
        };
        let distinct_count = column.distinct_count.unwrap_or(0);

        let (null_rate, cardinality) = if row_count == 0 {
            (0.0, 0.0)
        } else {
            (
                null_count as f64 / row_count as f64,
                distinct_count as f64 / row_count as f64,
            )
        };

        let mut profile = Self {
            column_id: column.id,
            table_id: table.id,
            table_name: table.table_name.clone(),
            column_name: column.column_name.clone(),
            data_type: column.data_type.clone(),
            is_primary_key: column.is_primary_key,
            is_unique: column.is_unique,
            is_nullable: column.is_nullable,
            row_count,
            distinct_count,
            null_count,
            null_rate,
            cardinality,
            sample_values: column.sample_values.clone(),
            detected_patterns: detect_patterns(&column.sample_values),
            classification_path: ClassificationPath::Unknown,
        };
        profile.classification_path = route(&profile);
        tracing::trace!(
            column = %profile.qualified_name(),
            path = %profile.classification_path,
            patterns = profile.detected_patterns.len(),
            "profiled column"
        );
        profile
    }

    /// The detected pattern of `kind`, if any sample matched it.
    pub fn pattern(&self, kind: PatternKind) -> Option<&DetectedPattern> {
        self.detected_patterns.iter().find(|p| p.kind == kind)
    }

    /// `"table.column"`, used in prompts and log fields.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.table_name, self.column_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DatasourceId;

    fn table(row_count: Option<u64>) -> SchemaTable {
        SchemaTable {
            id: TableId::new_random(),
            datasource_id: DatasourceId::new_random(),
            schema_name: "public".into(),
            table_name: "orders".into(),
            is_selected: true,
            row_count,
            columns: Vec::new(),
        }
    }

    fn column(table_id: TableId) -> SchemaColumn {
        SchemaColumn {
            id: ColumnId::new_random(),
            table_id,
            column_name: "created".into(),
            data_type: "bigint".into(),
            is_nullable: true,
            is_primary_key: false,
            is_unique: false,
            is_selected: true,
            ordinal_position: 1,
            row_count: None,
            non_null_count: None,
            null_count: None,
            distinct_count: None,
            sample_values: Vec::new(),
        }
    }

    #[test]
    fn test_explicit_null_count_preferred() {
        let t = table(Some(100));
        let mut c = column(t.id);
        c.null_count = Some(10);
        c.non_null_count = Some(50);
        let p = ColumnProfile::build(&t, &c);
        assert_eq!(p.null_count, 10);
        assert!((p.null_rate - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_null_count_derived_from_non_null() {
        let t = table(Some(100));
        let mut c = column(t.id);
        c.non_null_count = Some(75);
        let p = ColumnProfile::build(&t, &c);
        assert_eq!(p.null_count, 25);
        assert!((p.null_rate - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_empty_table_leaves_rates_at_zero() {
        let t = table(Some(0));
        let mut c = column(t.id);
        c.null_count = Some(0);
        c.distinct_count = Some(0);
        let p = ColumnProfile::build(&t, &c);
        assert_eq!(p.null_rate, 0.0);
        assert_eq!(p.cardinality, 0.0);
    }

    #[test]
    fn test_epoch_samples_detected_without_declared_timestamp() {
        let t = table(Some(3));
        let mut c = column(t.id);
        c.distinct_count = Some(3);
        c.sample_values = vec!["1704067200".into(), "1735689600".into(), "1609459200".into()];
        let p = ColumnProfile::build(&t, &c);
        assert_eq!(p.pattern(PatternKind::UnixSeconds).unwrap().match_rate, 1.0);
        assert_eq!(p.classification_path, ClassificationPath::Timestamp);
    }
}
