//! Prompt fragments shared by every classifier.

use std::fmt::Write as _;

use ontology::ColumnProfile;

/// Sample values shown to the model per column.
pub const MAX_PROMPT_SAMPLES: usize = 10;

pub const JSON_ONLY: &str =
    "Respond with a single JSON object and nothing else. Do not wrap it in markdown.";

/// Renders the statistics and evidence of `profile` as a prompt section.
pub fn describe_profile(profile: &ColumnProfile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Table: {}", profile.table_name);
    let _ = writeln!(out, "Column: {}", profile.column_name);
    let _ = writeln!(out, "Declared type: {}", profile.data_type);
    let mut flags = Vec::new();
    if profile.is_primary_key {
        flags.push("primary key");
    }
    if profile.is_unique {
        flags.push("unique");
    }
    if profile.is_nullable {
        flags.push("nullable");
    }
    if !flags.is_empty() {
        let _ = writeln!(out, "Constraints: {}", flags.join(", "));
    }
    let _ = writeln!(
        out,
        "Rows: {}, distinct: {}, nulls: {} ({:.1}%), cardinality: {:.4}",
        profile.row_count,
        profile.distinct_count,
        profile.null_count,
        profile.null_rate * 100.0,
        profile.cardinality
    );
    if !profile.detected_patterns.is_empty() {
        let patterns: Vec<String> = profile
            .detected_patterns
            .iter()
            .map(|p| format!("{} ({:.0}%)", p.kind.as_str(), p.match_rate * 100.0))
            .collect();
        let _ = writeln!(out, "Detected patterns: {}", patterns.join(", "));
    }
    if !profile.sample_values.is_empty() {
        let samples: Vec<&str> = profile
            .sample_values
            .iter()
            .take(MAX_PROMPT_SAMPLES)
            .map(String::as_str)
            .collect();
        let _ = writeln!(out, "Sample values: {}", samples.join(", "));
    }
    out
}

/// Closing instruction common to phase-2 prompts.
pub fn clarification_hint() -> &'static str {
    "If your confidence is below 0.7, add \"clarification_question\": a short question \
     a domain expert could answer to resolve the ambiguity."
}
