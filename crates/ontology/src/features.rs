//! Per-column feature records and the merge rules between pipeline phases.
//!
//! A [`ColumnFeatures`] is created by the phase-2 classifier for its column and
//! then refined by later phases. Two rules hold for every merge:
//!
//! - confidence never decreases ([`Confidence::raise_to`]);
//! - a semantic hypothesis (e.g. soft delete) may still be overturned,
//!   independently of confidence.
//!
//! Each `needs_*` flag is set by the phase that wants follow-up work and
//! cleared by the phase that performs it.

use serde::{Deserialize, Serialize};

use crate::routing::ClassificationPath;
use crate::{ColumnId, ColumnProfile, Confidence, TableId, Timestamp};

/// Confidence below which a classifier may ask for human clarification.
pub const CLARIFICATION_THRESHOLD: f64 = 0.7;

/// Business role a column plays in its table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    PrimaryKey,
    ForeignKey,
    Identifier,
    Dimension,
    Measure,
    #[default]
    Attribute,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimestampFeatures {
    /// e.g. `"created"`, `"updated"`, `"deleted"`, `"event"`, `"scheduled"`.
    pub purpose: String,
    pub is_soft_delete: bool,
    pub is_audit_field: bool,
    /// Storage scale for integer epochs: `"seconds"`, `"millis"`, `"nanos"`.
    pub epoch_scale: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BooleanFeatures {
    pub true_meaning: String,
    pub false_meaning: String,
    /// e.g. `"flag"`, `"status"`, `"permission"`.
    pub boolean_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumValue {
    pub value: String,
    pub label: String,
    /// Lifecycle category for state-machine values (e.g. `"initial"`, `"terminal"`).
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnumFeatures {
    /// Whether the values form an ordered lifecycle rather than a flat set.
    pub is_state_machine: bool,
    pub values: Vec<EnumValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentifierFeatures {
    /// e.g. `"primary_key"`, `"foreign_key"`, `"external"`, `"natural_key"`.
    pub identifier_type: String,
    /// Issuing service for external ids (e.g. `"stripe"`).
    pub external_service: Option<String>,
    pub fk_target_table: Option<String>,
    pub fk_target_column: Option<String>,
    pub fk_confidence: Option<Confidence>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonetaryFeatures {
    pub is_monetary: bool,
    /// e.g. `"cents"`, `"dollars"`.
    pub amount_unit: Option<String>,
    pub currency_column: Option<String>,
    /// Fixed currency when no currency column exists (ISO-4217).
    pub currency_code: Option<String>,
}

/// Mutable, progressively merged semantic record for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFeatures {
    pub column_id: ColumnId,
    pub table_id: TableId,
    pub table_name: String,
    pub column_name: String,
    pub classification_path: ClassificationPath,
    pub purpose: String,
    pub role: ColumnRole,
    pub confidence: Confidence,
    pub semantic_type: String,
    pub description: String,

    pub timestamp: Option<TimestampFeatures>,
    pub boolean: Option<BooleanFeatures>,
    #[serde(rename = "enum")]
    pub enumeration: Option<EnumFeatures>,
    pub identifier: Option<IdentifierFeatures>,
    pub monetary: Option<MonetaryFeatures>,

    pub needs_enum_analysis: bool,
    pub needs_fk_resolution: bool,
    pub needs_cross_column_check: bool,
    pub needs_clarification: bool,
    pub clarification_question: Option<String>,

    pub analyzed_at: Timestamp,
}

impl ColumnFeatures {
    /// An empty record for `profile`, carrying its identity and path.
    pub fn for_profile(profile: &ColumnProfile) -> Self {
        Self {
            column_id: profile.column_id,
            table_id: profile.table_id,
            table_name: profile.table_name.clone(),
            column_name: profile.column_name.clone(),
            classification_path: profile.classification_path,
            purpose: String::new(),
            role: if profile.is_primary_key {
                ColumnRole::PrimaryKey
            } else {
                ColumnRole::default()
            },
            confidence: Confidence::default(),
            semantic_type: String::new(),
            description: String::new(),
            timestamp: None,
            boolean: None,
            enumeration: None,
            identifier: None,
            monetary: None,
            needs_enum_analysis: false,
            needs_fk_resolution: false,
            needs_cross_column_check: false,
            needs_clarification: false,
            clarification_question: None,
            analyzed_at: Timestamp::now(),
        }
    }

    /// Records a clarification request when confidence is low and the
    /// classifier produced a question. Returns whether the flag was set.
    pub fn request_clarification(&mut self, question: Option<String>) -> bool {
        let question = question
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());
        match question {
            Some(q) if self.confidence.as_f64() < CLARIFICATION_THRESHOLD => {
                self.needs_clarification = true;
                self.clarification_question = Some(q);
                true
            }
            _ => false,
        }
    }

    /// Merges phase-3 enum semantics and clears the enum flag.
    pub fn merge_enum_analysis(
        &mut self,
        is_state_machine: bool,
        values: Vec<EnumValue>,
        confidence: Confidence,
    ) {
        self.enumeration = Some(EnumFeatures {
            is_state_machine,
            values,
        });
        self.confidence.raise_to(confidence);
        self.needs_enum_analysis = false;
        self.analyzed_at = Timestamp::now();
    }

    /// Applies a phase-4 foreign-key resolution.
    ///
    /// The role becomes [`ColumnRole::ForeignKey`] only when both target table
    /// and column are non-empty; otherwise the prior role is kept. The FK flag
    /// is cleared either way. Returns whether a target was recorded.
    pub fn apply_fk_resolution(
        &mut self,
        target_table: &str,
        target_column: &str,
        confidence: Confidence,
    ) -> bool {
        self.needs_fk_resolution = false;
        let (table, column) = (target_table.trim(), target_column.trim());
        if table.is_empty() || column.is_empty() {
            return false;
        }
        let identifier = self.identifier.get_or_insert_with(IdentifierFeatures::default);
        identifier.identifier_type = "foreign_key".to_string();
        identifier.fk_target_table = Some(table.to_string());
        identifier.fk_target_column = Some(column.to_string());
        identifier.fk_confidence = Some(confidence);
        self.role = ColumnRole::ForeignKey;
        self.confidence.raise_to(confidence);
        self.analyzed_at = Timestamp::now();
        true
    }

    /// Applies a phase-5 amount↔currency pairing verdict.
    pub fn merge_monetary_pairing(
        &mut self,
        currency_column: Option<String>,
        currency_code: Option<String>,
        amount_unit: Option<String>,
        confidence: Confidence,
    ) {
        let monetary = self.monetary.get_or_insert_with(MonetaryFeatures::default);
        monetary.is_monetary = true;
        if currency_column.is_some() {
            monetary.currency_column = currency_column;
        }
        if currency_code.is_some() {
            monetary.currency_code = currency_code;
        }
        if amount_unit.is_some() {
            monetary.amount_unit = amount_unit;
        }
        self.confidence.raise_to(confidence);
        self.analyzed_at = Timestamp::now();
    }

    /// Applies a phase-5 soft-delete verdict.
    ///
    /// The boolean follows the verdict even when it rejects the upstream
    /// hypothesis; confidence is only raised.
    pub fn merge_soft_delete_verdict(&mut self, is_soft_delete: bool, confidence: Confidence) {
        let timestamp = self.timestamp.get_or_insert_with(TimestampFeatures::default);
        timestamp.is_soft_delete = is_soft_delete;
        if !is_soft_delete && timestamp.purpose == "deleted" {
            timestamp.purpose = "event".to_string();
        }
        self.confidence.raise_to(confidence);
        self.analyzed_at = Timestamp::now();
    }

    /// Whether this column looks like the soft-delete marker of its table.
    pub fn is_soft_delete_candidate(&self) -> bool {
        self.timestamp.as_ref().is_some_and(|t| t.is_soft_delete)
    }

    /// Whether this column holds a monetary amount.
    pub fn is_monetary(&self) -> bool {
        self.monetary.as_ref().is_some_and(|m| m.is_monetary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::detect_patterns;

    fn features(confidence: f64) -> ColumnFeatures {
        let profile = ColumnProfile {
            column_id: ColumnId::new_random(),
            table_id: TableId::new_random(),
            table_name: "orders".into(),
            column_name: "status".into(),
            data_type: "text".into(),
            is_primary_key: false,
            is_unique: false,
            is_nullable: false,
            row_count: 100,
            distinct_count: 3,
            null_count: 0,
            null_rate: 0.0,
            cardinality: 0.03,
            sample_values: vec![],
            detected_patterns: detect_patterns(&[]),
            classification_path: ClassificationPath::Enum,
        };
        let mut f = ColumnFeatures::for_profile(&profile);
        f.confidence = Confidence::clamped(confidence);
        f
    }

    #[test]
    fn test_enum_merge_keeps_higher_confidence() {
        let mut f = features(0.95);
        f.needs_enum_analysis = true;
        f.merge_enum_analysis(
            true,
            vec![EnumValue {
                value: "pending".into(),
                label: "Pending".into(),
                category: Some("initial".into()),
            }],
            Confidence::clamped(0.7),
        );
        assert_eq!(f.confidence.as_f64(), 0.95);
        assert!(!f.needs_enum_analysis);
        assert!(f.enumeration.as_ref().unwrap().is_state_machine);
    }

    #[test]
    fn test_empty_fk_target_leaves_role_untouched() {
        let mut f = features(0.8);
        f.role = ColumnRole::Identifier;
        f.needs_fk_resolution = true;
        assert!(!f.apply_fk_resolution("users", "  ", Confidence::clamped(0.9)));
        assert_eq!(f.role, ColumnRole::Identifier);
        assert!(!f.needs_fk_resolution);

        assert!(f.apply_fk_resolution("users", "id", Confidence::clamped(0.9)));
        assert_eq!(f.role, ColumnRole::ForeignKey);
        assert_eq!(
            f.identifier.as_ref().unwrap().fk_target_table.as_deref(),
            Some("users")
        );
    }

    #[test]
    fn test_soft_delete_can_flip_without_lowering_confidence() {
        let mut f = features(0.9);
        f.timestamp = Some(TimestampFeatures {
            purpose: "deleted".into(),
            is_soft_delete: true,
            ..Default::default()
        });
        f.merge_soft_delete_verdict(false, Confidence::clamped(0.6));
        assert!(!f.is_soft_delete_candidate());
        assert_eq!(f.confidence.as_f64(), 0.9);
    }

    #[test]
    fn test_clarification_requires_low_confidence_and_question() {
        let mut f = features(0.55);
        assert!(!f.request_clarification(Some("   ".into())));
        assert!(f.request_clarification(Some("What does status 3 mean?".into())));
        assert!(f.needs_clarification);

        let mut f = features(0.85);
        assert!(!f.request_clarification(Some("What is this?".into())));
        assert!(!f.needs_clarification);
    }
}
