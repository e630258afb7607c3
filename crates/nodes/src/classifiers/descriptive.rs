use ontology::{ClassificationPath, ColumnFeatures, ColumnProfile, ColumnRole};

use super::prompt::{clarification_hint, describe_profile, JSON_ONLY};
use super::{base_features, parse_role, unexpected, ClassifyError, ColumnClassifier, PathResponse};

/// Free text, JSON documents and columns no other path claims.
pub struct DescriptiveClassifier {
    path: ClassificationPath,
}

impl DescriptiveClassifier {
    pub fn new(path: ClassificationPath) -> Self {
        Self { path }
    }

    fn focus(&self) -> &'static str {
        match self.path {
            ClassificationPath::Json => "The column stores JSON documents. Describe what they contain.",
            ClassificationPath::Text => "The column stores free-form text. Describe its content.",
            _ => "The column's type gives no strong hint. Infer its meaning from name and samples.",
        }
    }
}

impl ColumnClassifier for DescriptiveClassifier {
    fn path(&self) -> ClassificationPath {
        self.path
    }

    fn system_message(&self) -> &'static str {
        "You are a database analyst describing the business meaning of columns."
    }

    fn build_prompt(&self, profile: &ColumnProfile) -> String {
        format!(
            "{profile}\n{focus}\n\
             Fields: \"semantic_type\" (e.g. name, email, url, address, note, payload, code), \
             \"description\", \"confidence\" (0.0-1.0), \
             \"role\" (attribute, dimension, identifier or measure), \
             \"is_foreign_key\" (true for a natural key that references a row of another table).\n\
             {hint}\n{JSON_ONLY}",
            profile = describe_profile(profile),
            focus = self.focus(),
            hint = clarification_hint(),
        )
    }

    fn apply(
        &self,
        profile: &ColumnProfile,
        response: PathResponse,
    ) -> Result<ColumnFeatures, ClassifyError> {
        let PathResponse::Descriptive(r) = response else {
            return Err(unexpected(self.path, &response));
        };
        let mut features = base_features(profile, r.semantic_type, r.description, r.confidence);
        if !profile.is_primary_key {
            if let Some(role) = parse_role(r.role.as_deref()) {
                features.role = role;
            }
            if r.is_foreign_key {
                features.role = ColumnRole::Identifier;
                features.needs_fk_resolution = true;
            }
        }
        features.request_clarification(r.clarification_question);
        Ok(features)
    }
}
