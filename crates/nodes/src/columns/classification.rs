//! Phase 2: one classifier call per column through the worker pool.

use std::sync::Arc;

use ontology::ports::LlmClient;
use ontology::{ColumnFeatures, ColumnProfile};
use tracing::info;

use super::{split_outcome, ColumnPipeline, PhaseFailure, PipelinePhase};
use crate::classifiers::classify_column;
use crate::worker_pool::WorkItem;

impl ColumnPipeline {
    /// Classifies every profile with its path's cached classifier.
    ///
    /// Fail-fast: the first failing column aborts the phase, but features of
    /// columns that completed are returned in [`PhaseFailure::partial`].
    pub async fn classify(
        &self,
        llm: &Arc<dyn LlmClient>,
        profiles: &[ColumnProfile],
    ) -> Result<Vec<ColumnFeatures>, PhaseFailure<ColumnFeatures>> {
        let items = profiles
            .iter()
            .map(|profile| {
                let id = profile.qualified_name();
                let classifier = self.registry.get(profile.classification_path);
                let llm = Arc::clone(llm);
                let profile = profile.clone();
                let temperature = self.temperature;
                WorkItem::new(id, async move {
                    classify_column(classifier.as_ref(), &profile, llm.as_ref(), temperature).await
                })
            })
            .collect();

        let outcome = self
            .pool
            .process(items, |done, total| {
                self.report(PipelinePhase::Classification, done, total)
            })
            .await;
        let (features, error) = split_outcome(PipelinePhase::Classification, outcome);

        match error {
            Some(error) => Err(PhaseFailure {
                partial: features,
                error,
            }),
            None => {
                let flagged = features.iter().filter(|f| f.needs_clarification).count();
                info!(columns = features.len(), flagged, "classification complete");
                Ok(features)
            }
        }
    }
}
