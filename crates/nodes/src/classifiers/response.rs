//! Typed LLM response schemas.
//!
//! Each classification path has its own schema, collected in the tagged union
//! [`PathResponse`]. Follow-up phases (enum semantics, FK resolution,
//! cross-column validation) have their own schemas. Unknown fields are
//! ignored; a missing required field is a parse error.

use ontology::ClassificationPath;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::ClassifyError;

/// Locates the JSON object in a completion, tolerating code fences and prose
/// around it.
pub fn extract_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

/// Parses the JSON object in `content` as `T`.
pub fn parse_json<T: DeserializeOwned>(content: &str) -> Result<T, ClassifyError> {
    let json = extract_json(content)
        .ok_or_else(|| ClassifyError::Parse("response contains no JSON object".to_string()))?;
    serde_json::from_str(json).map_err(|e| ClassifyError::Parse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Phase 2: per-path schemas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimestampResponse {
    pub purpose: String,
    pub description: String,
    pub confidence: f64,
    #[serde(default)]
    pub semantic_type: Option<String>,
    #[serde(default)]
    pub is_soft_delete: bool,
    #[serde(default)]
    pub is_audit_field: bool,
    #[serde(default)]
    pub clarification_question: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BooleanResponse {
    pub true_meaning: String,
    pub false_meaning: String,
    pub description: String,
    pub confidence: f64,
    #[serde(default)]
    pub boolean_type: Option<String>,
    #[serde(default)]
    pub clarification_question: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IdentifierResponse {
    pub identifier_type: String,
    pub description: String,
    pub confidence: f64,
    #[serde(default)]
    pub is_foreign_key: bool,
    #[serde(default)]
    pub external_service: Option<String>,
    #[serde(default)]
    pub semantic_type: Option<String>,
    #[serde(default)]
    pub clarification_question: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NumericResponse {
    pub semantic_type: String,
    pub description: String,
    pub confidence: f64,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_foreign_key: bool,
    #[serde(default)]
    pub is_monetary: bool,
    #[serde(default)]
    pub amount_unit: Option<String>,
    #[serde(default)]
    pub clarification_question: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnumResponse {
    pub description: String,
    pub confidence: f64,
    #[serde(default)]
    pub semantic_type: Option<String>,
    #[serde(default)]
    pub clarification_question: Option<String>,
}

/// Shared by the text, json and unknown paths.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DescriptiveResponse {
    pub semantic_type: String,
    pub description: String,
    pub confidence: f64,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_foreign_key: bool,
    #[serde(default)]
    pub clarification_question: Option<String>,
}

/// A phase-2 response, validated against the schema of its path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathResponse {
    Timestamp(TimestampResponse),
    Boolean(BooleanResponse),
    Identifier(IdentifierResponse),
    Numeric(NumericResponse),
    Enum(EnumResponse),
    Descriptive(DescriptiveResponse),
}

impl PathResponse {
    /// Parses `content` with the schema that belongs to `path`.
    pub fn parse(path: ClassificationPath, content: &str) -> Result<Self, ClassifyError> {
        Ok(match path {
            ClassificationPath::Timestamp => PathResponse::Timestamp(parse_json(content)?),
            ClassificationPath::Boolean => PathResponse::Boolean(parse_json(content)?),
            ClassificationPath::Uuid | ClassificationPath::ExternalId => {
                PathResponse::Identifier(parse_json(content)?)
            }
            ClassificationPath::Numeric => PathResponse::Numeric(parse_json(content)?),
            ClassificationPath::Enum => PathResponse::Enum(parse_json(content)?),
            ClassificationPath::Text | ClassificationPath::Json | ClassificationPath::Unknown => {
                PathResponse::Descriptive(parse_json(content)?)
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Phase 3: enum semantics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnumValueResponse {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnumAnalysisResponse {
    pub is_state_machine: bool,
    pub values: Vec<EnumValueResponse>,
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// Phase 4: foreign-key resolution
// ---------------------------------------------------------------------------

/// Empty strings mean the model could not pick a target.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FkResolutionResponse {
    #[serde(default)]
    pub target_table: String,
    #[serde(default)]
    pub target_column: String,
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// Phase 5: cross-column validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MonetaryPairing {
    pub amount_column: String,
    #[serde(default)]
    pub currency_column: Option<String>,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub amount_unit: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SoftDeleteVerdict {
    pub column: String,
    pub is_soft_delete: bool,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct CrossColumnResponse {
    #[serde(default)]
    pub monetary_pairings: Vec<MonetaryPairing>,
    #[serde(default)]
    pub soft_delete_verdicts: Vec<SoftDeleteVerdict>,
}
