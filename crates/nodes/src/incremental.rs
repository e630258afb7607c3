//! Incremental enrichment: classify the columns touched by one approved
//! schema change without re-running the whole pipeline.
//!
//! Only phase-2 classification is applied. Follow-up flags stay set on the
//! stored record and are picked up by the next full extraction.

use std::sync::Arc;

use ontology::ports::{ColumnMetadataStore, LlmClientFactory, SchemaSource};
use ontology::{
    ColumnFeatures, ColumnProfile, DatasourceId, ProjectId, RepositoryError, SchemaTable,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::classifiers::{classify_column, ClassifierRegistry};
use crate::columns::{PipelineError, PipelinePhase};

/// A schema change a reviewer accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovedChange {
    NewColumn { table: String, column: String },
    ModifiedColumn { table: String, column: String },
    NewTable { table: String },
}

impl ApprovedChange {
    pub fn table(&self) -> &str {
        match self {
            ApprovedChange::NewColumn { table, .. }
            | ApprovedChange::ModifiedColumn { table, .. }
            | ApprovedChange::NewTable { table } => table,
        }
    }
}

pub struct IncrementalEnrichmentService {
    schema: Arc<dyn SchemaSource>,
    llm: Arc<dyn LlmClientFactory>,
    metadata: Arc<dyn ColumnMetadataStore>,
    registry: Arc<ClassifierRegistry>,
    temperature: f32,
}

impl IncrementalEnrichmentService {
    pub fn new(
        schema: Arc<dyn SchemaSource>,
        llm: Arc<dyn LlmClientFactory>,
        metadata: Arc<dyn ColumnMetadataStore>,
        registry: Arc<ClassifierRegistry>,
    ) -> Self {
        Self {
            schema,
            llm,
            metadata,
            registry,
            temperature: 0.1,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Profiles, classifies and stores every column affected by `change`.
    #[instrument(skip(self), fields(project = %project, datasource = %datasource))]
    pub async fn apply(
        &self,
        project: ProjectId,
        datasource: DatasourceId,
        change: &ApprovedChange,
    ) -> Result<Vec<ColumnFeatures>, PipelineError> {
        let tables = self.schema.list_tables(project, datasource).await?;
        let table = tables
            .iter()
            .find(|t| t.table_name.eq_ignore_ascii_case(change.table()))
            .ok_or_else(|| RepositoryError::not_found("table", change.table()))?;
        let profiles = affected_profiles(table, change)?;

        let llm = self
            .llm
            .client_for(project)
            .await
            .map_err(|source| PipelineError::LlmUnavailable { project, source })?;

        let mut enriched = Vec::with_capacity(profiles.len());
        for profile in &profiles {
            let classifier = self.registry.get(profile.classification_path);
            let features = classify_column(classifier.as_ref(), profile, llm.as_ref(), self.temperature)
                .await
                .map_err(|source| PipelineError::Classification {
                    phase: PipelinePhase::Classification,
                    item: profile.qualified_name(),
                    source,
                })?;
            self.metadata.upsert_column_features(project, &features).await?;
            enriched.push(features);
        }
        info!(table = %table.table_name, columns = enriched.len(), "incremental enrichment applied");
        Ok(enriched)
    }
}

fn affected_profiles(
    table: &SchemaTable,
    change: &ApprovedChange,
) -> Result<Vec<ColumnProfile>, RepositoryError> {
    match change {
        ApprovedChange::NewTable { .. } => Ok(table
            .columns
            .iter()
            .map(|c| ColumnProfile::build(table, c))
            .collect()),
        ApprovedChange::NewColumn { column, .. } | ApprovedChange::ModifiedColumn { column, .. } => {
            let found = table
                .columns
                .iter()
                .find(|c| c.column_name.eq_ignore_ascii_case(column))
                .ok_or_else(|| {
                    RepositoryError::not_found("column", format!("{}.{column}", table.table_name))
                })?;
            Ok(vec![ColumnProfile::build(table, found)])
        }
    }
}
