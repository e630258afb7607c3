use ontology::{ClassificationPath, ColumnFeatures, ColumnProfile, ColumnRole};

use super::prompt::{clarification_hint, describe_profile, JSON_ONLY};
use super::{base_features, unexpected, ClassifyError, ColumnClassifier, PathResponse};

/// Low-cardinality category columns.
///
/// Phase 2 only describes the column; per-value semantics are left to the
/// enum phase, so every enum column is queued for it.
pub struct EnumClassifier;

impl ColumnClassifier for EnumClassifier {
    fn path(&self) -> ClassificationPath {
        ClassificationPath::Enum
    }

    fn system_message(&self) -> &'static str {
        "You are a database analyst describing categorical columns."
    }

    fn build_prompt(&self, profile: &ColumnProfile) -> String {
        format!(
            "{profile}\n\
             The column holds a small fixed set of values. Describe what it categorizes.\n\
             Fields: \"description\", \"confidence\" (0.0-1.0), \"semantic_type\" \
             (status, type, category, currency, country or other).\n\
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
        let PathResponse::Enum(r) = response else {
            return Err(unexpected(self.path(), &response));
        };
        let semantic_type = r.semantic_type.unwrap_or_else(|| "category".to_string());
        let mut features = base_features(profile, semantic_type, r.description, r.confidence);
        if features.role == ColumnRole::Attribute {
            features.role = ColumnRole::Dimension;
        }
        features.needs_enum_analysis = true;
        features.request_clarification(r.clarification_question);
        Ok(features)
    }
}
