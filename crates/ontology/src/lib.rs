//! Core domain for SchemaSense.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type and cross-cutting error type used by the extraction engine, plus the
//! deterministic (LLM-free) parts of column classification: profiling, pattern
//! detection, routing and feature merge rules. Infrastructure crates implement
//! the traits in [`ports`]; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RunId`, `ColumnId`, `InstanceId`, etc.) |
//! | [`types`] | Shared value types (`Confidence`, `Timestamp`, `Ontology`) |
//! | [`errors`] | Repository, LLM and node errors; retry policy |
//! | [`run`] | Run/node records, lifecycle rules, failure attribution |
//! | [`schema`] | Stored schema and statistics |
//! | [`patterns`] | Sample-value format detectors |
//! | [`profile`] | Column profiles |
//! | [`routing`] | Classification paths and routing |
//! | [`features`] | Column feature records and merge rules |
//! | [`questions`] | Review questions and duplicate detection |
//! | [`ports`] | Port traits implemented by infrastructure |

pub mod errors;
pub mod features;
pub mod identifiers;
pub mod patterns;
pub mod ports;
pub mod profile;
pub mod questions;
pub mod routing;
pub mod run;
pub mod schema;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{LlmError, NodeError, RepositoryError, RetryPolicy};
pub use features::{
    BooleanFeatures, ColumnFeatures, ColumnRole, EnumFeatures, EnumValue, IdentifierFeatures,
    MonetaryFeatures, TimestampFeatures, CLARIFICATION_THRESHOLD,
};
pub use identifiers::{
    ColumnId, DatasourceId, InstanceId, NodeId, OntologyId, ProjectId, QuestionId, RunId, TableId,
};
pub use patterns::{detect_patterns, DetectedPattern, PatternKind};
pub use profile::ColumnProfile;
pub use questions::{NewQuestion, OntologyQuestion, QuestionIntent, QuestionStatus};
pub use routing::{route, ClassificationPath, TypeFamily};
pub use run::{DagNode, ExtractionRun, NodeName, NodeStatus, RunStatus, RunWithNodes};
pub use schema::{SchemaColumn, SchemaTable};
pub use types::{Confidence, Ontology, Timestamp};
