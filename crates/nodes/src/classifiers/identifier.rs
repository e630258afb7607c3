use ontology::{
    ClassificationPath, ColumnFeatures, ColumnProfile, ColumnRole, IdentifierFeatures, PatternKind,
};

use super::prompt::{clarification_hint, describe_profile, JSON_ONLY};
use super::{base_features, unexpected, ClassifyError, ColumnClassifier, PathResponse};

/// UUID columns and ids issued by external services.
pub struct IdentifierClassifier {
    path: ClassificationPath,
}

impl IdentifierClassifier {
    pub fn new(path: ClassificationPath) -> Self {
        Self { path }
    }

    fn detected_service(profile: &ColumnProfile) -> Option<String> {
        profile.detected_patterns.iter().find_map(|p| match p.kind {
            PatternKind::StripeId => Some("stripe".to_string()),
            PatternKind::TwilioSid => Some("twilio".to_string()),
            _ => None,
        })
    }
}

impl ColumnClassifier for IdentifierClassifier {
    fn path(&self) -> ClassificationPath {
        self.path
    }

    fn system_message(&self) -> &'static str {
        "You are a database analyst identifying what an identifier column refers to."
    }

    fn build_prompt(&self, profile: &ColumnProfile) -> String {
        format!(
            "{profile}\n\
             Decide what kind of identifier this is.\n\
             Fields: \"identifier_type\" (primary_key, foreign_key, external, natural_key or other), \
             \"description\", \"confidence\" (0.0-1.0), \
             \"is_foreign_key\" (true when it references a row of another table in this database), \
             \"external_service\" (issuing service for external ids, e.g. stripe), \"semantic_type\".\n\
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
        let PathResponse::Identifier(r) = response else {
            return Err(unexpected(self.path, &response));
        };
        let semantic_type = r.semantic_type.unwrap_or_else(|| "identifier".to_string());
        let mut features = base_features(profile, semantic_type, r.description, r.confidence);
        features.purpose = r.identifier_type.clone();
        features.identifier = Some(IdentifierFeatures {
            identifier_type: r.identifier_type,
            external_service: r.external_service.or_else(|| Self::detected_service(profile)),
            ..IdentifierFeatures::default()
        });
        if !profile.is_primary_key {
            features.role = ColumnRole::Identifier;
            features.needs_fk_resolution = r.is_foreign_key;
        }
        features.request_clarification(r.clarification_question);
        Ok(features)
    }
}
