//! Phase 3: value semantics for enum columns.

use std::sync::Arc;

use ontology::ports::{LlmClient, LlmRequest};
use ontology::routing::ENUM_MAX_DISTINCT;
use ontology::{ColumnId, ColumnProfile, Confidence, EnumValue};
use tracing::{debug, info};

use super::{split_outcome, ColumnPipeline, FeatureSet, PhaseFailure, PipelinePhase, ProfiledSchema};
use crate::classifiers::prompt::{describe_profile, JSON_ONLY};
use crate::classifiers::response::{parse_json, EnumAnalysisResponse};
use crate::classifiers::ClassifyError;
use crate::worker_pool::WorkItem;

const SYSTEM_MESSAGE: &str =
    "You are a database analyst explaining the values of categorical columns.";

fn enum_request(profile: &ColumnProfile, temperature: f32) -> LlmRequest {
    let values: Vec<&str> = profile
        .sample_values
        .iter()
        .take(ENUM_MAX_DISTINCT as usize)
        .map(String::as_str)
        .collect();
    let prompt = format!(
        "{profile}\nObserved values: {values}\n\
         Decide whether the values form an ordered lifecycle (a state machine, e.g. \
         pending -> shipped -> delivered) or a flat set of categories.\n\
         Fields: \"is_state_machine\", \"confidence\" (0.0-1.0), \"values\": a list of \
         {{\"value\", \"label\", \"category\"}} where category is one of initial, \
         in_progress, terminal or error and is only given for state machines.\n{JSON_ONLY}",
        profile = describe_profile(profile),
        values = values.join(", "),
    );
    LlmRequest {
        prompt,
        system_message: SYSTEM_MESSAGE.to_string(),
        temperature,
    }
}

impl ColumnPipeline {
    /// Merges enum semantics into every queued column. Returns the number of
    /// columns merged.
    ///
    /// Queue entries without a profile are skipped. On failure, results that
    /// arrived before the phase stopped are still merged.
    pub async fn analyze_enums(
        &self,
        llm: &Arc<dyn LlmClient>,
        schema: &ProfiledSchema,
        features: &mut FeatureSet,
        queue: &[ColumnId],
    ) -> Result<usize, PhaseFailure<ColumnId>> {
        let items: Vec<_> = queue
            .iter()
            .filter_map(|&column| {
                let Some(profile) = schema.profile(column) else {
                    debug!(%column, "queued enum column has no profile; skipping");
                    return None;
                };
                let request = enum_request(profile, self.temperature);
                let llm = Arc::clone(llm);
                Some(WorkItem::new(profile.qualified_name(), async move {
                    let response = llm.generate(&request).await?;
                    let parsed: EnumAnalysisResponse = parse_json(&response.content)?;
                    Ok::<_, ClassifyError>((column, parsed))
                }))
            })
            .collect();

        let outcome = self
            .pool
            .process(items, |done, total| {
                self.report(PipelinePhase::EnumAnalysis, done, total)
            })
            .await;
        let (results, error) = split_outcome(PipelinePhase::EnumAnalysis, outcome);

        let mut merged = Vec::with_capacity(results.len());
        for (column, analysis) in results {
            let Some(record) = features.get_mut(column) else {
                continue;
            };
            let is_state_machine = analysis.is_state_machine;
            let values = analysis
                .values
                .into_iter()
                .map(|v| EnumValue {
                    value: v.value,
                    label: v.label,
                    category: if is_state_machine { v.category } else { None },
                })
                .collect();
            record.merge_enum_analysis(
                is_state_machine,
                values,
                Confidence::clamped(analysis.confidence),
            );
            merged.push(column);
        }

        match error {
            Some(error) => Err(PhaseFailure {
                partial: merged,
                error,
            }),
            None => {
                info!(columns = merged.len(), "enum analysis complete");
                Ok(merged.len())
            }
        }
    }
}
