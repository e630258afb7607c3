//! Review questions raised against an ontology, and their duplicate detection.
//!
//! Two questions are duplicates when they mention the same column and ask
//! with the same intent (what / why / how / when / does).

use serde::{Deserialize, Serialize};

use crate::{ColumnId, OntologyId, ProjectId, QuestionId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Pending,
    Answered,
    Skipped,
}

/// A stored review question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntologyQuestion {
    pub id: QuestionId,
    pub project_id: ProjectId,
    pub ontology_id: OntologyId,
    pub text: String,
    /// Column the question is about, when it targets a single column.
    pub affected_column: Option<String>,
    pub affected_table: Option<String>,
    pub category: String,
    /// 1 (highest) to 5.
    pub priority: u8,
    pub status: QuestionStatus,
    pub created_at: Timestamp,
}

/// Payload for creating a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQuestion {
    pub project_id: ProjectId,
    pub ontology_id: OntologyId,
    pub text: String,
    pub affected_column: Option<String>,
    pub affected_table: Option<String>,
    pub source_column_id: Option<ColumnId>,
    pub category: String,
    pub priority: u8,
}

/// The interrogative a question opens with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionIntent {
    What,
    Why,
    How,
    When,
    Does,
    Other,
}

impl QuestionIntent {
    /// Reads the intent from the first interrogative word in `text`.
    pub fn of(text: &str) -> Self {
        for word in text.split(|c: char| !c.is_alphanumeric()) {
            match word.to_ascii_lowercase().as_str() {
                "what" | "which" => return QuestionIntent::What,
                "why" => return QuestionIntent::Why,
                "how" => return QuestionIntent::How,
                "when" => return QuestionIntent::When,
                "does" | "do" | "is" | "are" => return QuestionIntent::Does,
                _ => {}
            }
        }
        QuestionIntent::Other
    }
}

impl OntologyQuestion {
    /// Whether this question refers to `column_name`, either through its
    /// affected column or by naming it in the text.
    pub fn mentions_column(&self, column_name: &str) -> bool {
        let needle = column_name.to_ascii_lowercase();
        if needle.is_empty() {
            return false;
        }
        if self
            .affected_column
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(column_name))
        {
            return true;
        }
        self.text
            .to_ascii_lowercase()
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .any(|w| w == needle)
    }

    /// Whether asking `text` about `column_name` would duplicate this question.
    pub fn duplicates(&self, column_name: &str, text: &str) -> bool {
        self.status == QuestionStatus::Pending
            && self.mentions_column(column_name)
            && QuestionIntent::of(&self.text) == QuestionIntent::of(text)
    }
}
