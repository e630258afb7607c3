//! Phase 5: table-level validation of monetary and soft-delete hypotheses.
//!
//! One call per table covers every flagged column of that table. Merges never
//! lower confidence, but a soft-delete hypothesis may be rejected.

use std::fmt::Write as _;
use std::sync::Arc;

use ontology::ports::{LlmClient, LlmRequest};
use ontology::{ColumnFeatures, Confidence, TableId};
use tracing::{debug, info};

use super::{split_outcome, ColumnPipeline, FeatureSet, PhaseFailure, PipelinePhase, ProfiledSchema};
use crate::classifiers::prompt::JSON_ONLY;
use crate::classifiers::response::{parse_json, CrossColumnResponse};
use crate::classifiers::ClassifyError;
use crate::worker_pool::WorkItem;

const SYSTEM_MESSAGE: &str =
    "You are a database analyst validating how the columns of one table relate to each other.";

fn cross_column_request(
    table_name: &str,
    schema: &ProfiledSchema,
    table: TableId,
    features: &FeatureSet,
    temperature: f32,
) -> LlmRequest {
    let mut columns = String::new();
    for profile in schema.profiles_of(table) {
        let _ = writeln!(columns, "- {} ({})", profile.column_name, profile.data_type);
    }
    let mut amounts = String::new();
    let mut soft_deletes = String::new();
    for record in features
        .iter()
        .filter(|f| f.table_id == table && f.needs_cross_column_check)
    {
        if record.is_monetary() {
            let unit = record
                .monetary
                .as_ref()
                .and_then(|m| m.amount_unit.as_deref())
                .unwrap_or("unknown unit");
            let _ = writeln!(amounts, "- {} ({unit})", record.column_name);
        }
        if record.is_soft_delete_candidate() {
            let _ = writeln!(soft_deletes, "- {}", record.column_name);
        }
    }
    if amounts.is_empty() {
        amounts.push_str("(none)\n");
    }
    if soft_deletes.is_empty() {
        soft_deletes.push_str("(none)\n");
    }

    LlmRequest {
        prompt: format!(
            "Table: {table_name}\nColumns:\n{columns}\
             Monetary amount columns:\n{amounts}\
             Suspected soft-delete columns:\n{soft_deletes}\
             For each amount column, name the column holding its currency, or a fixed \
             ISO-4217 code when there is none. For each suspected soft-delete column, \
             confirm or reject that a non-null value marks the row as deleted.\n\
             Fields: \"monetary_pairings\": list of {{\"amount_column\", \"currency_column\", \
             \"currency_code\", \"amount_unit\", \"confidence\"}}; \"soft_delete_verdicts\": \
             list of {{\"column\", \"is_soft_delete\", \"confidence\"}}.\n{JSON_ONLY}"
        ),
        system_message: SYSTEM_MESSAGE.to_string(),
        temperature,
    }
}

fn merge_table_verdicts(features: &mut FeatureSet, table: TableId, response: CrossColumnResponse) {
    let in_table = |f: &ColumnFeatures, name: &str| {
        f.table_id == table && f.column_name.eq_ignore_ascii_case(name.trim())
    };

    for pairing in response.monetary_pairings {
        let target = features
            .iter_mut()
            .find(|f| in_table(f, &pairing.amount_column) && f.is_monetary());
        if let Some(record) = target {
            record.merge_monetary_pairing(
                pairing.currency_column,
                pairing.currency_code,
                pairing.amount_unit,
                Confidence::clamped(pairing.confidence),
            );
        }
    }
    for verdict in response.soft_delete_verdicts {
        let target = features
            .iter_mut()
            .find(|f| in_table(f, &verdict.column) && f.timestamp.is_some());
        if let Some(record) = target {
            if record.is_soft_delete_candidate() && !verdict.is_soft_delete {
                debug!(column = %record.column_name, "soft-delete hypothesis rejected");
            }
            record.merge_soft_delete_verdict(
                verdict.is_soft_delete,
                Confidence::clamped(verdict.confidence),
            );
        }
    }
    for record in features.iter_mut().filter(|f| f.table_id == table) {
        record.needs_cross_column_check = false;
    }
}

impl ColumnPipeline {
    /// Validates every queued table. Returns the number of tables merged.
    pub async fn validate_cross_column(
        &self,
        llm: &Arc<dyn LlmClient>,
        schema: &ProfiledSchema,
        features: &mut FeatureSet,
        queue: &[TableId],
    ) -> Result<usize, PhaseFailure<TableId>> {
        let items: Vec<_> = queue
            .iter()
            .map(|&table| {
                let table_name = schema
                    .table(table)
                    .map(|t| t.table_name.clone())
                    .unwrap_or_else(|| table.to_string());
                let request =
                    cross_column_request(&table_name, schema, table, features, self.temperature);
                let llm = Arc::clone(llm);
                WorkItem::new(table_name, async move {
                    let response = llm.generate(&request).await?;
                    let parsed: CrossColumnResponse = parse_json(&response.content)?;
                    Ok::<_, ClassifyError>((table, parsed))
                })
            })
            .collect();

        let outcome = self
            .pool
            .process(items, |done, total| {
                self.report(PipelinePhase::CrossColumn, done, total)
            })
            .await;
        let (results, error) = split_outcome(PipelinePhase::CrossColumn, outcome);

        let mut merged = Vec::with_capacity(results.len());
        for (table, response) in results {
            merge_table_verdicts(features, table, response);
            merged.push(table);
        }

        match error {
            Some(error) => Err(PhaseFailure {
                partial: merged,
                error,
            }),
            None => {
                info!(tables = merged.len(), "cross-column validation complete");
                Ok(merged.len())
            }
        }
    }
}
