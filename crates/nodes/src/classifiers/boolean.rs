use ontology::{BooleanFeatures, ClassificationPath, ColumnFeatures, ColumnProfile, ColumnRole};

use super::prompt::{clarification_hint, describe_profile, JSON_ONLY};
use super::{base_features, unexpected, ClassifyError, ColumnClassifier, PathResponse};

/// Declared booleans and two-valued flag columns.
pub struct BooleanClassifier;

impl ColumnClassifier for BooleanClassifier {
    fn path(&self) -> ClassificationPath {
        ClassificationPath::Boolean
    }

    fn system_message(&self) -> &'static str {
        "You are a database analyst explaining what the two states of a flag column mean."
    }

    fn build_prompt(&self, profile: &ColumnProfile) -> String {
        format!(
            "{profile}\n\
             The column holds two states. Explain both.\n\
             Fields: \"true_meaning\", \"false_meaning\", \"description\", \"confidence\" (0.0-1.0), \
             \"boolean_type\" (flag, status, permission, preference or other).\n\
             {hint}\n{JSON_ONLY}",
            profile = describe_profile(profile),
            hint = clarification_hint(),
        )
    }

    fn apply(
        &self,
        profile: &ColumnProfile,
        response: PathResponse,
    ) -> Result<ColumnFeatures, ClassifyError> {
        let PathResponse::Boolean(r) = response else {
            return Err(unexpected(self.path(), &response));
        };
        let boolean_type = r.boolean_type.unwrap_or_else(|| "flag".to_string());
        let mut features = base_features(profile, "boolean", r.description, r.confidence);
        features.purpose = boolean_type.clone();
        if features.role == ColumnRole::Attribute {
            features.role = ColumnRole::Dimension;
        }
        features.boolean = Some(BooleanFeatures {
            true_meaning: r.true_meaning,
            false_meaning: r.false_meaning,
            boolean_type,
        });
        features.request_clarification(r.clarification_question);
        Ok(features)
    }
}
