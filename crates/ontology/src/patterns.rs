//! Format-pattern detection over column sample values.
//!
//! Each detector is a regular expression, optionally followed by a semantic
//! check. Epoch detectors decode the value and reject instants outside the
//! plausible window `[1970-01-01, 2100-01-01)`; a value that fails the check
//! does not count as a match.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Upper bound on the matched-value evidence kept per pattern.
pub const MAX_PATTERN_EVIDENCE: usize = 5;

/// First calendar year outside the plausible epoch window.
const EPOCH_WINDOW_END_YEAR: i32 = 2100;

/// Format recognised in sample values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Uuid,
    Email,
    Url,
    /// Stripe object ids such as `cus_Nf8...` or `pi_3M...`.
    StripeId,
    /// Twilio SIDs such as `AC` followed by 32 hex digits.
    TwilioSid,
    /// ISO-4217 currency codes.
    Iso4217Currency,
    UnixSeconds,
    UnixMillis,
    UnixNanos,
}

impl PatternKind {
    pub const ALL: [PatternKind; 9] = [
        PatternKind::Uuid,
        PatternKind::Email,
        PatternKind::Url,
        PatternKind::StripeId,
        PatternKind::TwilioSid,
        PatternKind::Iso4217Currency,
        PatternKind::UnixSeconds,
        PatternKind::UnixMillis,
        PatternKind::UnixNanos,
    ];

    /// Returns `true` for the Unix-epoch patterns.
    pub fn is_epoch(self) -> bool {
        matches!(
            self,
            PatternKind::UnixSeconds | PatternKind::UnixMillis | PatternKind::UnixNanos
        )
    }

    /// Returns `true` when `value` is a valid instance of this pattern.
    pub fn matches(self, value: &str) -> bool {
        match self {
            PatternKind::Uuid => UUID_RE.is_match(value),
            PatternKind::Email => EMAIL_RE.is_match(value),
            PatternKind::Url => URL_RE.is_match(value),
            PatternKind::StripeId => STRIPE_RE.is_match(value),
            PatternKind::TwilioSid => TWILIO_RE.is_match(value),
            PatternKind::Iso4217Currency => {
                CURRENCY_RE.is_match(value) && ISO_4217_CODES.contains(&value)
            }
            PatternKind::UnixSeconds => {
                SECONDS_RE.is_match(value) && epoch_in_window(value, 1)
            }
            PatternKind::UnixMillis => {
                MILLIS_RE.is_match(value) && epoch_in_window(value, 1_000)
            }
            PatternKind::UnixNanos => {
                NANOS_RE.is_match(value) && epoch_in_window(value, 1_000_000_000)
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::Uuid => "uuid",
            PatternKind::Email => "email",
            PatternKind::Url => "url",
            PatternKind::StripeId => "stripe_id",
            PatternKind::TwilioSid => "twilio_sid",
            PatternKind::Iso4217Currency => "iso4217_currency",
            PatternKind::UnixSeconds => "unix_seconds",
            PatternKind::UnixMillis => "unix_millis",
            PatternKind::UnixNanos => "unix_nanos",
        }
    }
}

/// A pattern observed in a column's samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPattern {
    pub kind: PatternKind,
    /// Fraction of non-empty samples that matched, in `(0.0, 1.0]`.
    pub match_rate: f64,
    /// Up to [`MAX_PATTERN_EVIDENCE`] matching samples.
    pub matched_values: Vec<String>,
}

/// Runs every detector over `samples`.
///
/// Blank samples are ignored. Patterns with no match are omitted; the result
/// is ordered by descending match rate.
pub fn detect_patterns(samples: &[String]) -> Vec<DetectedPattern> {
    let values: Vec<&str> = samples
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if values.is_empty() {
        return Vec::new();
    }

    let mut detected: Vec<DetectedPattern> = PatternKind::ALL
        .iter()
        .filter_map(|kind| {
            let matched: Vec<&str> = values.iter().copied().filter(|v| kind.matches(v)).collect();
            if matched.is_empty() {
                return None;
            }
            Some(DetectedPattern {
                kind: *kind,
                match_rate: matched.len() as f64 / values.len() as f64,
                matched_values: matched
                    .iter()
                    .take(MAX_PATTERN_EVIDENCE)
                    .map(|v| v.to_string())
                    .collect(),
            })
        })
        .collect();

    detected.sort_by(|a, b| b.match_rate.total_cmp(&a.match_rate));
    detected
}

fn epoch_in_window(value: &str, units_per_second: i64) -> bool {
    let Ok(raw) = value.parse::<i64>() else {
        return false;
    };
    let secs = raw.div_euclid(units_per_second);
    match DateTime::from_timestamp(secs, 0) {
        Some(dt) => secs >= 0 && dt.year() < EPOCH_WINDOW_END_YEAR,
        None => false,
    }
}

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("static regex")
});
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("static regex")
});
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("static regex"));
static STRIPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(cus|ch|pi|pm|sub|in|ii|prod|price|acct|txn|re|evt|seti|src|card|ba|py|po|tr|cs|si)_[A-Za-z0-9]{8,}$",
    )
    .expect("static regex")
});
static TWILIO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(AC|SM|MM|CA|PN|SK|MG|RE|CF|IS|US)[0-9a-f]{32}$").expect("static regex")
});
static CURRENCY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{3}$").expect("static regex"));
static SECONDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{9,10}$").expect("static regex"));
static MILLIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{12,13}$").expect("static regex"));
static NANOS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{18,19}$").expect("static regex"));

const ISO_4217_CODES: &[&str] = &[
    "AED", "ARS", "AUD", "BGN", "BRL", "CAD", "CHF", "CLP", "CNY", "COP", "CZK", "DKK", "EGP",
    "EUR", "GBP", "HKD", "HUF", "IDR", "ILS", "INR", "ISK", "JPY", "KES", "KRW", "MAD", "MXN",
    "MYR", "NGN", "NOK", "NZD", "PEN", "PHP", "PKR", "PLN", "QAR", "RON", "RUB", "SAR", "SEK",
    "SGD", "THB", "TRY", "TWD", "UAH", "USD", "VND", "ZAR",
];
