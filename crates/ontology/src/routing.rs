//! Classification-path routing.
//!
//! Precedence: declared type family, then dominant detected pattern, then
//! cardinality heuristics, then [`ClassificationPath::Unknown`]. The enum
//! heuristic applies to integer, text and unrecognised types alike.

use serde::{Deserialize, Serialize};

use crate::patterns::PatternKind;
use crate::ColumnProfile;

/// Minimum match rate for a detected pattern to decide the path.
pub const DOMINANT_PATTERN_RATE: f64 = 0.8;

/// Largest distinct count still considered an enumeration.
pub const ENUM_MAX_DISTINCT: u64 = 50;

/// Largest distinct-to-row ratio still considered an enumeration.
pub const ENUM_MAX_CARDINALITY: f64 = 0.05;

/// Largest distinct-to-row ratio for a two-valued integer to count as boolean.
pub const BOOLEAN_MAX_CARDINALITY: f64 = 0.01;

/// Routing tag selecting a column's phase-2 classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationPath {
    Timestamp,
    Boolean,
    Uuid,
    Json,
    Numeric,
    Text,
    Enum,
    ExternalId,
    Unknown,
}

impl ClassificationPath {
    pub const ALL: [ClassificationPath; 9] = [
        ClassificationPath::Timestamp,
        ClassificationPath::Boolean,
        ClassificationPath::Uuid,
        ClassificationPath::Json,
        ClassificationPath::Numeric,
        ClassificationPath::Text,
        ClassificationPath::Enum,
        ClassificationPath::ExternalId,
        ClassificationPath::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ClassificationPath::Timestamp => "timestamp",
            ClassificationPath::Boolean => "boolean",
            ClassificationPath::Uuid => "uuid",
            ClassificationPath::Json => "json",
            ClassificationPath::Numeric => "numeric",
            ClassificationPath::Text => "text",
            ClassificationPath::Enum => "enum",
            ClassificationPath::ExternalId => "external_id",
            ClassificationPath::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ClassificationPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse family of a declared SQL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Timestamp,
    Boolean,
    Uuid,
    Json,
    Integer,
    Decimal,
    Text,
    Other,
}

impl TypeFamily {
    /// Classifies a declared type name, ignoring case, length/precision
    /// modifiers and array suffixes.
    pub fn of(data_type: &str) -> Self {
        let lowered = data_type.trim().to_ascii_lowercase();
        let base = lowered
            .split('(')
            .next()
            .unwrap_or_default()
            .trim_end_matches("[]")
            .trim();

        if base.starts_with("timestamp")
            || base.starts_with("datetime")
            || base == "date"
            || base.starts_with("time")
        {
            return TypeFamily::Timestamp;
        }
        match base {
            "bool" | "boolean" => TypeFamily::Boolean,
            "uuid" | "uniqueidentifier" => TypeFamily::Uuid,
            "json" | "jsonb" => TypeFamily::Json,
            "int" | "integer" | "int2" | "int4" | "int8" | "smallint" | "bigint" | "tinyint"
            | "mediumint" | "serial" | "smallserial" | "bigserial" => TypeFamily::Integer,
            "numeric" | "decimal" | "real" | "float" | "float4" | "float8" | "double"
            | "double precision" | "money" => TypeFamily::Decimal,
            "text" | "varchar" | "character varying" | "char" | "character" | "bpchar"
            | "nvarchar" | "nchar" | "citext" | "string" => TypeFamily::Text,
            _ => TypeFamily::Other,
        }
    }
}

/// Routes a profile to exactly one classification path.
pub fn route(profile: &ColumnProfile) -> ClassificationPath {
    let family = TypeFamily::of(&profile.data_type);
    match family {
        TypeFamily::Timestamp => return ClassificationPath::Timestamp,
        TypeFamily::Boolean => return ClassificationPath::Boolean,
        TypeFamily::Uuid => return ClassificationPath::Uuid,
        TypeFamily::Json => return ClassificationPath::Json,
        _ => {}
    }

    if let Some(path) = path_from_patterns(profile) {
        return path;
    }

    match family {
        TypeFamily::Integer => {
            if profile.distinct_count == 2 && profile.cardinality <= BOOLEAN_MAX_CARDINALITY {
                ClassificationPath::Boolean
            } else if is_enum_like(profile) {
                ClassificationPath::Enum
            } else {
                ClassificationPath::Numeric
            }
        }
        TypeFamily::Decimal => ClassificationPath::Numeric,
        TypeFamily::Text => {
            if profile.distinct_count == 2 && samples_are_boolean_like(&profile.sample_values) {
                ClassificationPath::Boolean
            } else if is_enum_like(profile) {
                ClassificationPath::Enum
            } else {
                ClassificationPath::Text
            }
        }
        // Database-native enum types land here.
        _ if is_enum_like(profile) => ClassificationPath::Enum,
        _ => ClassificationPath::Unknown,
    }
}

fn path_from_patterns(profile: &ColumnProfile) -> Option<ClassificationPath> {
    let dominant = profile
        .detected_patterns
        .iter()
        .find(|p| p.match_rate >= DOMINANT_PATTERN_RATE)?;
    let path = match dominant.kind {
        PatternKind::Uuid => ClassificationPath::Uuid,
        PatternKind::UnixSeconds | PatternKind::UnixMillis | PatternKind::UnixNanos => {
            ClassificationPath::Timestamp
        }
        PatternKind::StripeId | PatternKind::TwilioSid => ClassificationPath::ExternalId,
        PatternKind::Iso4217Currency => ClassificationPath::Enum,
        PatternKind::Email | PatternKind::Url => ClassificationPath::Text,
    };
    Some(path)
}

fn is_enum_like(profile: &ColumnProfile) -> bool {
    profile.distinct_count > 0
        && profile.distinct_count <= ENUM_MAX_DISTINCT
        && profile.cardinality <= ENUM_MAX_CARDINALITY
}

fn samples_are_boolean_like(samples: &[String]) -> bool {
    const PAIRS: [(&str, &str); 5] = [
        ("true", "false"),
        ("t", "f"),
        ("yes", "no"),
        ("y", "n"),
        ("1", "0"),
    ];
    let mut values: Vec<String> = samples
        .iter()
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    values.sort();
    values.dedup();
    if values.is_empty() {
        return false;
    }
    PAIRS
        .iter()
        .any(|(a, b)| values.iter().all(|v| v == a || v == b))
}
