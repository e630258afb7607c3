use ontology::{ClassificationPath, ColumnFeatures, ColumnProfile, ColumnRole, MonetaryFeatures};

use super::prompt::{clarification_hint, describe_profile, JSON_ONLY};
use super::{base_features, parse_role, unexpected, ClassifyError, ColumnClassifier, PathResponse};

/// Integer and decimal measures, counts and amounts.
pub struct NumericClassifier;

impl ColumnClassifier for NumericClassifier {
    fn path(&self) -> ClassificationPath {
        ClassificationPath::Numeric
    }

    fn system_message(&self) -> &'static str {
        "You are a database analyst classifying numeric columns."
    }

    fn build_prompt(&self, profile: &ColumnProfile) -> String {
        format!(
            "{profile}\n\
             Decide what this number measures.\n\
             Fields: \"semantic_type\" (amount, count, quantity, percentage, score, \
             measurement, identifier or other), \"description\", \"confidence\" (0.0-1.0), \
             \"role\" (measure, dimension, identifier or attribute), \
             \"is_foreign_key\" (true when the value is the key of a row in another table), \
             \"is_monetary\" (true for money amounts), \
             \"amount_unit\" (for money: cents or dollars).\n\
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
        let PathResponse::Numeric(r) = response else {
            return Err(unexpected(self.path(), &response));
        };
        let mut features = base_features(profile, r.semantic_type, r.description, r.confidence);
        if !profile.is_primary_key {
            features.role = parse_role(r.role.as_deref()).unwrap_or(ColumnRole::Measure);
            if r.is_foreign_key {
                features.role = ColumnRole::Identifier;
                features.needs_fk_resolution = true;
            }
        }
        if r.is_monetary {
            features.monetary = Some(MonetaryFeatures {
                is_monetary: true,
                amount_unit: r.amount_unit,
                ..MonetaryFeatures::default()
            });
            // The currency column, if any, lives elsewhere in the table.
            features.needs_cross_column_check = true;
        }
        features.request_clarification(r.clarification_question);
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifiers::test_support::profile;

    #[test]
    fn test_monetary_amount_queues_cross_column_check() {
        let profile = profile("total_cents", "bigint", &["1999", "4500"], 100, 80);
        let response = PathResponse::parse(
            ClassificationPath::Numeric,
            r#"{"semantic_type":"amount","description":"Order total","confidence":0.9,
                "is_monetary":true,"amount_unit":"cents"}"#,
        )
        .unwrap();
        let features = NumericClassifier.apply(&profile, response).unwrap();
        assert!(features.is_monetary());
        assert!(features.needs_cross_column_check);
        assert_eq!(features.role, ColumnRole::Measure);
    }

    #[test]
    fn test_declared_role_is_respected() {
        let profile = profile("region_code", "integer", &["3", "7"], 100, 12);
        let response = PathResponse::parse(
            ClassificationPath::Numeric,
            r#"{"semantic_type":"code","description":"Region","confidence":0.8,"role":"dimension"}"#,
        )
        .unwrap();
        let features = NumericClassifier.apply(&profile, response).unwrap();
        assert_eq!(features.role, ColumnRole::Dimension);
        assert!(!features.needs_cross_column_check);
        assert!(!features.needs_fk_resolution);
    }

    #[test]
    fn test_integer_foreign_key_queues_resolution() {
        let profile = profile("customer_id", "bigint", &["17", "42", "99"], 10_000, 3_000);
        assert_eq!(profile.classification_path, ClassificationPath::Numeric);
        let response = PathResponse::parse(
            ClassificationPath::Numeric,
            r#"{"semantic_type":"identifier","description":"Ordering customer","confidence":0.85,
                "role":"identifier","is_foreign_key":true}"#,
        )
        .unwrap();
        let features = NumericClassifier.apply(&profile, response).unwrap();
        assert_eq!(features.role, ColumnRole::Identifier);
        assert!(features.needs_fk_resolution);
    }

    #[test]
    fn test_primary_key_never_queues_resolution() {
        let mut profile = profile("id", "bigint", &["1", "2"], 100, 100);
        profile.is_primary_key = true;
        let response = PathResponse::parse(
            ClassificationPath::Numeric,
            r#"{"semantic_type":"identifier","description":"Row id","confidence":0.9,"is_foreign_key":true}"#,
        )
        .unwrap();
        let features = NumericClassifier.apply(&profile, response).unwrap();
        assert_eq!(features.role, ColumnRole::PrimaryKey);
        assert!(!features.needs_fk_resolution);
    }
}
