//! SchemaSense orchestration: the extraction DAG engine and the column
//! classification pipeline.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** This crate sequences calls between the domain
//! rules in [`ontology`] and the infrastructure behind [`ontology::ports`]. It
//! owns concurrency (worker pool, background runs, heartbeats), retry and
//! cancellation, but defines no storage or transport of its own.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`dag`] | `DagOrchestrator`: start, resume, status, cancel, delete, shutdown |
//! | [`columns`] | `ColumnPipeline`: the six classification phases and clarification questions |
//! | [`classifiers`] | Per-path classifiers, their registry, typed LLM responses |
//! | [`executors`] | Node executors backed by this crate |
//! | [`incremental`] | Single-change enrichment outside a run |
//! | [`worker_pool`] | Bounded fan-out/fan-in with fail-fast |
//! | [`retry`] | Bounded exponential back-off driven by `RetryPolicy` |
//! | [`config`] | `EngineConfig` |

pub mod classifiers;
pub mod columns;
pub mod config;
pub mod dag;
pub mod executors;
pub mod incremental;
pub mod retry;
pub mod worker_pool;

pub use classifiers::{ClassifierRegistry, ColumnClassifier};
pub use columns::{ColumnPipeline, PipelineError, PipelinePhase, PipelinePorts, PipelineSummary};
pub use config::EngineConfig;
pub use dag::{DagError, DagOrchestrator, DagPorts, ExecutorRegistry};
pub use executors::ColumnFeatureExtractionExecutor;
pub use incremental::{ApprovedChange, IncrementalEnrichmentService};
pub use retry::{with_retry, RetryConfig, Retryable};
pub use worker_pool::WorkerPool;
