//! Phase 6: upsert merged feature records.

use ontology::{ProjectId, RepositoryError};
use tracing::{info, warn};

use super::{ColumnPipeline, FeatureSet, PipelineError, PipelinePhase};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub persisted: usize,
    pub failed: usize,
}

impl ColumnPipeline {
    /// Upserts every record. A failing column is logged and skipped; the
    /// phase fails only when every column fails.
    pub async fn persist(
        &self,
        project: ProjectId,
        features: &FeatureSet,
    ) -> Result<PersistReport, PipelineError> {
        let total = features.len();
        let mut report = PersistReport::default();
        let mut last_error: Option<RepositoryError> = None;

        for (i, record) in features.iter().enumerate() {
            match self.ports.metadata.upsert_column_features(project, record).await {
                Ok(()) => report.persisted += 1,
                Err(err) => {
                    warn!(
                        column = %format_args!("{}.{}", record.table_name, record.column_name),
                        error = %err,
                        "failed to persist column features; continuing"
                    );
                    report.failed += 1;
                    last_error = Some(err);
                }
            }
            self.report(PipelinePhase::Persistence, i + 1, total);
        }

        if report.persisted == 0 {
            if let Some(source) = last_error {
                return Err(PipelineError::PersistenceFailed {
                    count: report.failed,
                    source,
                });
            }
        }
        info!(persisted = report.persisted, failed = report.failed, "column features persisted");
        Ok(report)
    }
}
