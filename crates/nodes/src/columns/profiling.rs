//! Phase 1: build profiles for selected columns. No LLM involved.

use std::collections::HashMap;

use ontology::{ColumnId, ColumnProfile, DatasourceId, ProjectId, SchemaTable, TableId};
use tracing::info;

use super::{ColumnPipeline, PipelineError, PipelinePhase};

/// Selected tables and the profiles of their selected columns.
#[derive(Debug, Clone, Default)]
pub struct ProfiledSchema {
    /// Selected tables only, with every stored column.
    pub tables: Vec<SchemaTable>,
    pub profiles: Vec<ColumnProfile>,
    index: HashMap<ColumnId, usize>,
}

impl ProfiledSchema {
    /// Profiles every selected column of every selected table.
    pub fn from_tables(tables: Vec<SchemaTable>) -> Self {
        let tables: Vec<SchemaTable> = tables.into_iter().filter(|t| t.is_selected).collect();
        let profiles: Vec<ColumnProfile> = tables
            .iter()
            .flat_map(|table| {
                table
                    .selected_columns()
                    .map(move |column| ColumnProfile::build(table, column))
            })
            .collect();
        let index = profiles
            .iter()
            .enumerate()
            .map(|(i, p)| (p.column_id, i))
            .collect();
        Self {
            tables,
            profiles,
            index,
        }
    }

    pub fn profile(&self, column: ColumnId) -> Option<&ColumnProfile> {
        self.index.get(&column).map(|&i| &self.profiles[i])
    }

    pub fn table(&self, table: TableId) -> Option<&SchemaTable> {
        self.tables.iter().find(|t| t.id == table)
    }

    /// Profiles belonging to `table`, in column order.
    pub fn profiles_of(&self, table: TableId) -> impl Iterator<Item = &ColumnProfile> {
        self.profiles.iter().filter(move |p| p.table_id == table)
    }
}

impl ColumnPipeline {
    /// Phase 1.
    pub async fn profile(
        &self,
        project: ProjectId,
        datasource: DatasourceId,
    ) -> Result<ProfiledSchema, PipelineError> {
        let tables = self.ports.schema.list_tables(project, datasource).await?;
        let stored = tables.len();
        let schema = ProfiledSchema::from_tables(tables);
        let total = schema.profiles.len();
        self.report(PipelinePhase::Profiling, total, total);
        info!(
            stored_tables = stored,
            selected_tables = schema.tables.len(),
            columns = total,
            "profiling complete"
        );
        Ok(schema)
    }
}
