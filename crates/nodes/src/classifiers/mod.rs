//! Path-specific column classifiers.
//!
//! A classifier turns one [`ColumnProfile`] into a prompt, and the model's
//! answer into a [`ColumnFeatures`] record. Classifiers are pure (no I/O);
//! [`classify_column`] performs the LLM call around them. Each classifier
//! decides from its own response which follow-up phases the column needs.

mod boolean;
mod descriptive;
mod enumeration;
mod identifier;
mod numeric;
pub mod prompt;
mod registry;
pub mod response;
mod timestamp;

pub use boolean::BooleanClassifier;
pub use descriptive::DescriptiveClassifier;
pub use enumeration::EnumClassifier;
pub use identifier::IdentifierClassifier;
pub use numeric::NumericClassifier;
pub use registry::ClassifierRegistry;
pub use response::PathResponse;
pub use timestamp::TimestampClassifier;

use ontology::ports::{LlmClient, LlmRequest};
use ontology::{ClassificationPath, ColumnFeatures, ColumnProfile, ColumnRole, Confidence, LlmError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("unusable LLM response: {0}")]
    Parse(String),
}

/// Classification logic for one [`ClassificationPath`].
pub trait ColumnClassifier: Send + Sync {
    fn path(&self) -> ClassificationPath;

    fn system_message(&self) -> &'static str;

    fn build_prompt(&self, profile: &ColumnProfile) -> String;

    /// Builds the feature record from a response parsed for [`Self::path`].
    fn apply(
        &self,
        profile: &ColumnProfile,
        response: PathResponse,
    ) -> Result<ColumnFeatures, ClassifyError>;
}

/// Runs one phase-2 classification call for `profile`.
pub async fn classify_column(
    classifier: &dyn ColumnClassifier,
    profile: &ColumnProfile,
    llm: &dyn LlmClient,
    temperature: f32,
) -> Result<ColumnFeatures, ClassifyError> {
    let request = LlmRequest {
        prompt: classifier.build_prompt(profile),
        system_message: classifier.system_message().to_string(),
        temperature,
    };
    let response = llm.generate(&request).await?;
    debug!(
        column = %profile.qualified_name(),
        path = %classifier.path(),
        model = %response.model,
        completion_tokens = response.completion_tokens,
        "classification response received"
    );
    let parsed = PathResponse::parse(classifier.path(), &response.content)?;
    classifier.apply(profile, parsed)
}

/// Parses a role name from a model response.
pub(crate) fn parse_role(role: Option<&str>) -> Option<ColumnRole> {
    match role?.trim().to_ascii_lowercase().as_str() {
        "primary_key" => Some(ColumnRole::PrimaryKey),
        "foreign_key" => Some(ColumnRole::ForeignKey),
        "identifier" => Some(ColumnRole::Identifier),
        "dimension" => Some(ColumnRole::Dimension),
        "measure" => Some(ColumnRole::Measure),
        "attribute" => Some(ColumnRole::Attribute),
        _ => None,
    }
}

/// Common fields every classifier sets.
pub(crate) fn base_features(
    profile: &ColumnProfile,
    semantic_type: impl Into<String>,
    description: impl Into<String>,
    confidence: f64,
) -> ColumnFeatures {
    let mut features = ColumnFeatures::for_profile(profile);
    features.semantic_type = semantic_type.into();
    features.description = description.into();
    features.confidence = Confidence::clamped(confidence);
    features
}

fn unexpected(path: ClassificationPath, response: &PathResponse) -> ClassifyError {
    ClassifyError::Parse(format!("{path} classifier received {response:?}"))
}

#[cfg(test)]
pub(crate) mod test_support {
    use ontology::{detect_patterns, route, ColumnId, ColumnProfile, TableId};

    pub fn profile(column: &str, data_type: &str, samples: &[&str], rows: u64, distinct: u64) -> ColumnProfile {
        let sample_values: Vec<String> = samples.iter().map(|s| s.to_string()).collect();
        let mut profile = ColumnProfile {
            column_id: ColumnId::new_random(),
            table_id: TableId::new_random(),
            table_name: "orders".into(),
            column_name: column.into(),
            data_type: data_type.into(),
            is_primary_key: false,
            is_unique: false,
            is_nullable: true,
            row_count: rows,
            distinct_count: distinct,
            null_count: 0,
            null_rate: 0.0,
            cardinality: if rows == 0 { 0.0 } else { distinct as f64 / rows as f64 },
            detected_patterns: detect_patterns(&sample_values),
            sample_values,
            classification_path: ontology::ClassificationPath::Unknown,
        };
        profile.classification_path = route(&profile);
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role_accepts_known_names_only() {
        assert_eq!(parse_role(Some("Measure")), Some(ColumnRole::Measure));
        assert_eq!(parse_role(Some(" foreign_key ")), Some(ColumnRole::ForeignKey));
        assert_eq!(parse_role(Some("metric")), None);
        assert_eq!(parse_role(None), None);
    }
}
