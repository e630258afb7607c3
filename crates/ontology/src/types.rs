//! Shared value types for the SchemaSense domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (e.g. confidence is in `[0.0, 1.0]`) and
//! participate in domain computations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OntologyId, ProjectId};

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

/// A classification confidence in the range `[0.0, 1.0]`.
///
/// Merges across pipeline phases only ever move a confidence upwards; see
/// [`Confidence::raise_to`].
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    /// Creates a [`Confidence`], returning `None` if `value` is outside the
    /// valid range `[0.0, 1.0]`.
    #[must_use]
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Creates a [`Confidence`] from model output, clamping into `[0.0, 1.0]`.
    ///
    /// NaN becomes zero.
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    /// Returns the confidence as an `f64` in `[0.0, 1.0]`.
    pub fn as_f64(self) -> f64 {
        self.0
    }

    /// Replaces `self` with `other` only when `other` is higher.
    pub fn raise_to(&mut self, other: Confidence) {
        if other.0 > self.0 {
            self.0 = other.0;
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Ontology
// ---------------------------------------------------------------------------

/// A versioned ontology owned by a project. At most one is active at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ontology {
    /// Ontology identifier.
    pub id: OntologyId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Monotonic version number within the project.
    pub version: u32,
    /// Whether this is the project's active ontology.
    pub is_active: bool,
    /// Creation time.
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_rejects_out_of_range() {
        assert!(Confidence::new(1.2).is_none());
        assert!(Confidence::new(-0.1).is_none());
        assert!(Confidence::new(f64::NAN).is_none());
        assert_eq!(Confidence::new(0.4).unwrap().as_f64(), 0.4);
    }

    #[test]
    fn test_confidence_clamps_model_output() {
        assert_eq!(Confidence::clamped(7.0).as_f64(), 1.0);
        assert_eq!(Confidence::clamped(-2.0).as_f64(), 0.0);
        assert_eq!(Confidence::clamped(f64::NAN).as_f64(), 0.0);
    }

    #[test]
    fn test_raise_to_never_lowers() {
        let mut c = Confidence::clamped(0.95);
        c.raise_to(Confidence::clamped(0.7));
        assert_eq!(c.as_f64(), 0.95);
        c.raise_to(Confidence::clamped(0.99));
        assert_eq!(c.as_f64(), 0.99);
    }
}
