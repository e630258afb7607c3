//! Node executors provided by this crate.
//!
//! Only column feature extraction is implemented here; the remaining nodes of
//! the extraction DAG are registered by the embedding service.

use std::sync::Arc;

use async_trait::async_trait;
use ontology::ports::{NodeContext, NodeExecutor};
use ontology::{NodeError, RetryPolicy};
use tracing::info;

use crate::columns::{ColumnPipeline, PipelineError};

/// Runs the six-phase column pipeline for the run's datasource.
pub struct ColumnFeatureExtractionExecutor {
    pipeline: Arc<ColumnPipeline>,
}

impl ColumnFeatureExtractionExecutor {
    pub fn new(pipeline: Arc<ColumnPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl NodeExecutor for ColumnFeatureExtractionExecutor {
    async fn execute(&self, ctx: &NodeContext<'_>) -> Result<(), NodeError> {
        let summary = self
            .pipeline
            .run(ctx.project_id, ctx.datasource_id)
            .await
            .map_err(node_error)?;
        info!(
            run_id = %ctx.run_id,
            columns = summary.columns_classified,
            questions = summary.questions_created,
            "column features extracted"
        );
        Ok(())
    }
}

/// Maps a pipeline failure onto the retry classification of the node engine.
pub fn node_error(err: PipelineError) -> NodeError {
    match err {
        PipelineError::LlmUnavailable { .. } => NodeError::Configuration {
            message: err.to_string(),
        },
        PipelineError::Classification { source, .. } => match source {
            crate::classifiers::ClassifyError::Llm(llm) => NodeError::Llm(llm),
            parse @ crate::classifiers::ClassifyError::Parse(_) => NodeError::Fatal {
                message: parse.to_string(),
            },
        },
        PipelineError::PersistenceFailed { source, .. } | PipelineError::Repository(source) => {
            match source.retry_policy() {
                RetryPolicy::Retryable { .. } => NodeError::Repository(source),
                RetryPolicy::NonRetryable => NodeError::Fatal {
                    message: source.to_string(),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifiers::{ClassifyError, PathResponse};
    use crate::columns::PipelinePhase;
    use ontology::{LlmError, ProjectId, RepositoryError};
    use std::time::Duration;

    #[test]
    fn test_llm_timeouts_stay_retryable() {
        let err = node_error(PipelineError::Classification {
            phase: PipelinePhase::Classification,
            item: "orders.status".into(),
            source: ClassifyError::Llm(LlmError::Timeout {
                elapsed: Duration::from_secs(30),
            }),
        });
        assert!(err.retry_policy().is_retryable());
    }

    #[test]
    fn test_missing_llm_is_not_retried() {
        let project = ProjectId::new_random();
        let err = node_error(PipelineError::LlmUnavailable {
            project,
            source: LlmError::NotConfigured { project },
        });
        assert!(matches!(err, NodeError::Configuration { .. }));
        assert!(!err.retry_policy().is_retryable());
    }

    #[test]
    fn test_parse_failures_are_fatal() {
        let parse = PathResponse::parse(ontology::ClassificationPath::Enum, "{}").unwrap_err();
        let err = node_error(PipelineError::Classification {
            phase: PipelinePhase::Classification,
            item: "orders.status".into(),
            source: parse,
        });
        assert!(matches!(err, NodeError::Fatal { .. }));

        let err = node_error(PipelineError::Repository(RepositoryError::storage("pool closed")));
        assert!(err.retry_policy().is_retryable());
    }
}
