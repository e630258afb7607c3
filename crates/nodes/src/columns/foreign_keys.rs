//! Phase 4: foreign-key target resolution.
//!
//! With a live datasource the candidates are ranked by value overlap and the
//! model picks among them; a pick outside the candidate list falls back to
//! the highest-overlap candidate. Without a datasource the model resolves
//! from names alone. Columns are processed one at a time, and a column that
//! fails is logged and left as it was.

use std::fmt::Write as _;
use std::sync::Arc;

use ontology::ports::{ColumnRef, DatasourceProbe, LlmClient, LlmRequest};
use ontology::{ColumnId, ColumnProfile, Confidence, DatasourceId, ProjectId};
use tracing::{debug, info, warn};

use super::{ColumnPipeline, FeatureSet, PipelinePhase, ProfiledSchema};
use crate::classifiers::prompt::{describe_profile, JSON_ONLY};
use crate::classifiers::response::{parse_json, FkResolutionResponse};
use crate::classifiers::ClassifyError;

const SYSTEM_MESSAGE: &str =
    "You are a database analyst resolving which column a foreign key references.";

/// A resolved `table.column` target.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FkTarget {
    pub target: ColumnRef,
    pub confidence: Confidence,
}

#[derive(Debug, Clone)]
struct RankedCandidate {
    target: ColumnRef,
    overlap: f64,
}

/// Key-like columns of selected tables, excluding `source` itself.
fn candidate_targets(schema: &ProfiledSchema, source: &ColumnProfile) -> Vec<ColumnRef> {
    schema
        .tables
        .iter()
        .flat_map(|table| {
            table
                .columns
                .iter()
                .filter(|c| (c.is_primary_key || c.is_unique) && c.id != source.column_id)
                .map(|c| ColumnRef {
                    table: table.table_name.clone(),
                    column: c.column_name.clone(),
                })
        })
        .collect()
}

fn source_ref(profile: &ColumnProfile) -> ColumnRef {
    ColumnRef {
        table: profile.table_name.clone(),
        column: profile.column_name.clone(),
    }
}

fn same_target(a: &ColumnRef, table: &str, column: &str) -> bool {
    a.table.eq_ignore_ascii_case(table.trim()) && a.column.eq_ignore_ascii_case(column.trim())
}

fn fk_request(profile: &ColumnProfile, candidates: &str, temperature: f32) -> LlmRequest {
    LlmRequest {
        prompt: format!(
            "{profile}\nThis column is believed to reference another table.\n\
             Candidate targets:\n{candidates}\
             Fields: \"target_table\", \"target_column\", \"confidence\" (0.0-1.0). \
             Use empty strings when no candidate fits.\n{JSON_ONLY}",
            profile = describe_profile(profile),
        ),
        system_message: SYSTEM_MESSAGE.to_string(),
        temperature,
    }
}

impl ColumnPipeline {
    /// Resolves every queued column. Returns the number that gained a target.
    pub async fn resolve_foreign_keys(
        &self,
        project: ProjectId,
        datasource: DatasourceId,
        llm: &Arc<dyn LlmClient>,
        schema: &ProfiledSchema,
        features: &mut FeatureSet,
        queue: &[ColumnId],
    ) -> usize {
        if queue.is_empty() {
            return 0;
        }
        let probe = match &self.probes {
            Some(factory) => match factory.probe_for(project, datasource).await {
                Ok(probe) => probe,
                Err(err) => {
                    warn!(error = %err, "datasource probe unavailable; resolving by name only");
                    None
                }
            },
            None => None,
        };

        let total = queue.len();
        let mut resolved = 0;
        for (i, &column) in queue.iter().enumerate() {
            let Some(profile) = schema.profile(column) else {
                continue;
            };
            let outcome = self
                .resolve_target(llm.as_ref(), probe.as_deref(), schema, profile)
                .await;
            match (outcome, features.get_mut(column)) {
                (Ok(Some(found)), Some(record)) => {
                    if record.apply_fk_resolution(
                        &found.target.table,
                        &found.target.column,
                        found.confidence,
                    ) {
                        debug!(column = %profile.qualified_name(), target = %found.target, "foreign key resolved");
                        resolved += 1;
                    }
                }
                (Ok(None), Some(record)) => {
                    record.apply_fk_resolution("", "", Confidence::default());
                }
                (Err(err), _) => {
                    warn!(column = %profile.qualified_name(), error = %err, "foreign key resolution failed; skipping column");
                }
                (Ok(_), None) => {}
            }
            self.report(PipelinePhase::ForeignKeys, i + 1, total);
        }
        info!(queued = total, resolved, "foreign key resolution complete");
        resolved
    }

    async fn resolve_target(
        &self,
        llm: &dyn LlmClient,
        probe: Option<&dyn DatasourceProbe>,
        schema: &ProfiledSchema,
        profile: &ColumnProfile,
    ) -> Result<Option<FkTarget>, ClassifyError> {
        let candidates = candidate_targets(schema, profile);
        if candidates.is_empty() {
            return Ok(None);
        }
        match probe {
            Some(probe) => self.resolve_by_overlap(llm, probe, profile, candidates).await,
            None => self.resolve_by_name(llm, profile, &candidates).await,
        }
    }

    async fn resolve_by_overlap(
        &self,
        llm: &dyn LlmClient,
        probe: &dyn DatasourceProbe,
        profile: &ColumnProfile,
        candidates: Vec<ColumnRef>,
    ) -> Result<Option<FkTarget>, ClassifyError> {
        let source = source_ref(profile);
        let mut ranked = Vec::new();
        for target in candidates {
            match probe.value_overlap(&source, &target).await {
                Ok(overlap) if overlap > 0.0 => ranked.push(RankedCandidate { target, overlap }),
                Ok(_) => {}
                Err(err) => {
                    debug!(source = %source, target = %target, error = %err, "overlap probe failed");
                }
            }
        }
        if ranked.is_empty() {
            return Ok(None);
        }
        ranked.sort_by(|a, b| b.overlap.total_cmp(&a.overlap));

        let mut listing = String::new();
        for c in &ranked {
            let _ = writeln!(listing, "- {} (value overlap {:.0}%)", c.target, c.overlap * 100.0);
        }
        let request = fk_request(profile, &listing, self.temperature);
        let response = llm.generate(&request).await?;
        let parsed: FkResolutionResponse = parse_json(&response.content)?;

        let chosen = ranked
            .iter()
            .find(|c| same_target(&c.target, &parsed.target_table, &parsed.target_column));
        Ok(Some(match chosen {
            Some(c) => FkTarget {
                target: c.target.clone(),
                confidence: Confidence::clamped(parsed.confidence),
            },
            None => {
                let best = &ranked[0];
                debug!(
                    source = %source,
                    fallback = %best.target,
                    overlap = best.overlap,
                    "model target not among candidates; using highest overlap"
                );
                FkTarget {
                    target: best.target.clone(),
                    confidence: Confidence::clamped(best.overlap),
                }
            }
        }))
    }

    async fn resolve_by_name(
        &self,
        llm: &dyn LlmClient,
        profile: &ColumnProfile,
        candidates: &[ColumnRef],
    ) -> Result<Option<FkTarget>, ClassifyError> {
        let mut listing = String::new();
        for c in candidates {
            let _ = writeln!(listing, "- {c}");
        }
        let request = fk_request(profile, &listing, self.temperature);
        let response = llm.generate(&request).await?;
        let parsed: FkResolutionResponse = parse_json(&response.content)?;
        Ok(Some(FkTarget {
            target: ColumnRef {
                table: parsed.target_table,
                column: parsed.target_column,
            },
            confidence: Confidence::clamped(parsed.confidence),
        }))
    }
}
