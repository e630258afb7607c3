//! Stored schema and statistics, as handed over by the schema source.
//!
//! These records are snapshots taken when the datasource was last introspected.
//! Selection is opt-in at both levels: a column participates in profiling only
//! when both it and its table are selected.

use serde::{Deserialize, Serialize};

use crate::{ColumnId, DatasourceId, TableId};

/// One table in a datasource's stored schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaTable {
    pub id: TableId,
    pub datasource_id: DatasourceId,
    #[serde(default)]
    pub schema_name: String,
    pub table_name: String,
    #[serde(default)]
    pub is_selected: bool,
    /// Row count captured at introspection time.
    #[serde(default)]
    pub row_count: Option<u64>,
    #[serde(default)]
    pub columns: Vec<SchemaColumn>,
}

impl SchemaTable {
    /// Selected columns of this table; empty when the table itself is not selected.
    pub fn selected_columns(&self) -> impl Iterator<Item = &SchemaColumn> {
        let table_selected = self.is_selected;
        self.columns
            .iter()
            .filter(move |c| table_selected && c.is_selected)
    }
}

/// One column of a [`SchemaTable`] with its stored statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub id: ColumnId,
    pub table_id: TableId,
    pub column_name: String,
    /// Declared type as reported by the datasource (e.g. `"timestamptz"`).
    pub data_type: String,
    #[serde(default)]
    pub is_nullable: bool,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_selected: bool,
    #[serde(default)]
    pub ordinal_position: u32,
    /// Column-level row count; falls back to the table's when absent.
    #[serde(default)]
    pub row_count: Option<u64>,
    #[serde(default)]
    pub non_null_count: Option<u64>,
    /// Explicit null count; preferred over `row_count - non_null_count`.
    #[serde(default)]
    pub null_count: Option<u64>,
    #[serde(default)]
    pub distinct_count: Option<u64>,
    #[serde(default)]
    pub sample_values: Vec<String>,
}
