use ontology::{ClassificationPath, ColumnFeatures, ColumnProfile, PatternKind, TimestampFeatures};

use super::prompt::{clarification_hint, describe_profile, JSON_ONLY};
use super::{base_features, unexpected, ClassifyError, ColumnClassifier, PathResponse};

/// Dates, datetimes and integer epochs.
pub struct TimestampClassifier;

impl TimestampClassifier {
    fn epoch_scale(profile: &ColumnProfile) -> Option<String> {
        let scale = profile
            .detected_patterns
            .iter()
            .find(|p| p.kind.is_epoch())
            .map(|p| match p.kind {
                PatternKind::UnixMillis => "millis",
                PatternKind::UnixNanos => "nanos",
                _ => "seconds",
            })?;
        Some(scale.to_string())
    }
}

impl ColumnClassifier for TimestampClassifier {
    fn path(&self) -> ClassificationPath {
        ClassificationPath::Timestamp
    }

    fn system_message(&self) -> &'static str {
        "You are a database analyst classifying timestamp columns by business purpose."
    }

    fn build_prompt(&self, profile: &ColumnProfile) -> String {
        format!(
            "{profile}\n\
             Decide what moment this column records.\n\
             Fields: \"purpose\" (created, updated, deleted, event, scheduled, expires or other), \
             \"description\", \"confidence\" (0.0-1.0), \"semantic_type\", \
             \"is_soft_delete\" (true when a non-null value marks the row as deleted), \
             \"is_audit_field\" (true for bookkeeping columns such as created_at/updated_at).\n\
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
        let PathResponse::Timestamp(r) = response else {
            return Err(unexpected(self.path(), &response));
        };
        let semantic_type = r.semantic_type.unwrap_or_else(|| "timestamp".to_string());
        let mut features = base_features(profile, semantic_type, r.description, r.confidence);
        features.purpose = r.purpose.clone();
        features.timestamp = Some(TimestampFeatures {
            purpose: r.purpose,
            is_soft_delete: r.is_soft_delete,
            is_audit_field: r.is_audit_field,
            epoch_scale: Self::epoch_scale(profile),
        });
        // A soft-delete reading is only a hypothesis until the table is seen as a whole.
        features.needs_cross_column_check = r.is_soft_delete;
        features.request_clarification(r.clarification_question);
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifiers::test_support::profile;

    #[test]
    fn test_soft_delete_hypothesis_queues_cross_column_check() {
        let profile = profile("deleted_at", "timestamptz", &[], 100, 4);
        let response = PathResponse::parse(
            ClassificationPath::Timestamp,
            r#"{"purpose":"deleted","description":"Deletion time","confidence":0.8,"is_soft_delete":true}"#,
        )
        .unwrap();
        let features = TimestampClassifier.apply(&profile, response).unwrap();
        assert!(features.needs_cross_column_check);
        assert!(features.is_soft_delete_candidate());
        assert_eq!(features.purpose, "deleted");
    }

    #[test]
    fn test_epoch_scale_taken_from_detected_pattern() {
        let profile = profile(
            "created",
            "bigint",
            &["1704067200000", "1735689600000"],
            100,
            100,
        );
        assert_eq!(profile.classification_path, ClassificationPath::Timestamp);
        let response = PathResponse::parse(
            ClassificationPath::Timestamp,
            r#"{"purpose":"created","description":"Creation time","confidence":0.9}"#,
        )
        .unwrap();
        let features = TimestampClassifier.apply(&profile, response).unwrap();
        let ts = features.timestamp.unwrap();
        assert_eq!(ts.epoch_scale.as_deref(), Some("millis"));
        assert!(!features.needs_cross_column_check);
    }
}
