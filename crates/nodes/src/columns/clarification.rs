//! Turns low-confidence columns into review questions.
//!
//! Nothing here can fail the pipeline: a missing active ontology or a store
//! failure is logged and the affected question is dropped.

use ontology::{ColumnFeatures, NewQuestion, OntologyQuestion, ProjectId};
use tracing::{debug, info, warn};

use super::{ColumnPipeline, FeatureSet};

pub(crate) const QUESTION_CATEGORY: &str = "column_semantics";
pub(crate) const QUESTION_PRIORITY: u8 = 3;

fn is_duplicate(open: &[OntologyQuestion], record: &ColumnFeatures, text: &str) -> bool {
    open.iter()
        .any(|q| q.duplicates(&record.column_name, text))
}

impl ColumnPipeline {
    /// Posts one question per flagged column unless an equivalent question is
    /// already open. Returns the number created.
    pub async fn escalate(&self, project: ProjectId, features: &FeatureSet) -> usize {
        let flagged: Vec<(&ColumnFeatures, &str)> = features
            .iter()
            .filter(|f| f.needs_clarification)
            .filter_map(|f| f.clarification_question.as_deref().map(|q| (f, q)))
            .collect();
        if flagged.is_empty() {
            return 0;
        }

        let ontology = match self.ports.ontologies.get_active(project).await {
            Ok(Some(ontology)) => ontology,
            Ok(None) => {
                info!(flagged = flagged.len(), "no active ontology; clarification questions not posted");
                return 0;
            }
            Err(err) => {
                warn!(error = %err, "could not load active ontology; clarification questions not posted");
                return 0;
            }
        };
        let mut open = match self.ports.questions.list_open(ontology.id).await {
            Ok(open) => open,
            Err(err) => {
                warn!(error = %err, "could not list open questions; clarification questions not posted");
                return 0;
            }
        };

        let mut created = 0;
        for (record, text) in flagged {
            if is_duplicate(&open, record, text) {
                debug!(column = %record.column_name, "equivalent question already open");
                continue;
            }
            let question = NewQuestion {
                project_id: project,
                ontology_id: ontology.id,
                text: text.to_string(),
                affected_column: Some(record.column_name.clone()),
                affected_table: Some(record.table_name.clone()),
                source_column_id: Some(record.column_id),
                category: QUESTION_CATEGORY.to_string(),
                priority: QUESTION_PRIORITY,
            };
            match self.ports.questions.create(question).await {
                Ok(stored) => {
                    created += 1;
                    open.push(stored);
                }
                Err(err) => {
                    warn!(column = %record.column_name, error = %err, "failed to post clarification question");
                }
            }
        }
        info!(created, "clarification questions posted");
        created
    }
}
