//! Six-phase column classification pipeline.
//!
//! | Phase | Work | Concurrency | Failure policy |
//! |-------|------|-------------|----------------|
//! | 1 Profiling | statistics, patterns, routing | none (no LLM) | repository errors abort |
//! | 2 Classification | one LLM call per column | worker pool | fail-fast, partial results kept |
//! | 3 Enum semantics | one LLM call per enum column | worker pool | fail-fast, partial results kept |
//! | 4 FK resolution | overlap probing + LLM | sequential | per-column failures skipped |
//! | 5 Cross-column | one LLM call per table | worker pool | fail-fast, partial results kept |
//! | 6 Persistence | upsert per column | sequential | fails only if every column fails |
//!
//! After phase 6, columns flagged for clarification become review questions.
//!
//! Merging into [`ColumnFeatures`] happens on the pipeline task after each
//! phase's fan-in, never inside worker items.

mod clarification;
mod classification;
mod cross_column;
mod enums;
mod foreign_keys;
mod persistence;
mod profiling;

pub use persistence::PersistReport;
pub use profiling::ProfiledSchema;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ontology::ports::{
    ColumnMetadataStore, DatasourceProbeFactory, LlmClient, LlmClientFactory, OntologyRepository,
    QuestionStore, SchemaSource,
};
use ontology::{
    ColumnFeatures, ColumnId, DatasourceId, LlmError, ProjectId, RepositoryError, TableId,
};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::classifiers::{ClassifierRegistry, ClassifyError};
use crate::worker_pool::{BatchOutcome, WorkerPool};

// ---------------------------------------------------------------------------
// Phases, progress, errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelinePhase {
    Profiling,
    Classification,
    EnumAnalysis,
    ForeignKeys,
    CrossColumn,
    Persistence,
}

impl PipelinePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelinePhase::Profiling => "profiling",
            PipelinePhase::Classification => "classification",
            PipelinePhase::EnumAnalysis => "enum_analysis",
            PipelinePhase::ForeignKeys => "foreign_keys",
            PipelinePhase::CrossColumn => "cross_column",
            PipelinePhase::Persistence => "persistence",
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress callback: `(phase, completed, total)`.
pub type ProgressFn = Arc<dyn Fn(PipelinePhase, usize, usize) + Send + Sync>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no LLM access point configured for project {project}")]
    LlmUnavailable {
        project: ProjectId,
        #[source]
        source: LlmError,
    },

    #[error("{phase} failed for {item}")]
    Classification {
        phase: PipelinePhase,
        item: String,
        #[source]
        source: ClassifyError,
    },

    #[error("persisting column features failed for all {count} columns")]
    PersistenceFailed {
        count: usize,
        #[source]
        source: RepositoryError,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// A failed fail-fast phase: the first error plus every result produced
/// before the phase stopped.
#[derive(Debug)]
pub struct PhaseFailure<T> {
    pub partial: Vec<T>,
    pub error: PipelineError,
}

impl<T> fmt::Display for PhaseFailure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} partial results kept)", self.error, self.partial.len())
    }
}

impl<T: fmt::Debug> std::error::Error for PhaseFailure<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

// ---------------------------------------------------------------------------
// Feature set
// ---------------------------------------------------------------------------

/// Feature records in classification order, addressable by column.
#[derive(Debug, Default, Clone)]
pub struct FeatureSet {
    records: Vec<ColumnFeatures>,
    index: HashMap<ColumnId, usize>,
}

impl FeatureSet {
    pub fn from_records(records: impl IntoIterator<Item = ColumnFeatures>) -> Self {
        let mut set = Self::default();
        for record in records {
            set.insert(record);
        }
        set
    }

    /// Inserts or replaces the record for its column.
    pub fn insert(&mut self, record: ColumnFeatures) {
        match self.index.get(&record.column_id) {
            Some(&i) => self.records[i] = record,
            None => {
                self.index.insert(record.column_id, self.records.len());
                self.records.push(record);
            }
        }
    }

    pub fn get(&self, column: ColumnId) -> Option<&ColumnFeatures> {
        self.index.get(&column).map(|&i| &self.records[i])
    }

    pub fn get_mut(&mut self, column: ColumnId) -> Option<&mut ColumnFeatures> {
        self.index.get(&column).map(|&i| &mut self.records[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnFeatures> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ColumnFeatures> {
        self.records.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<ColumnFeatures> {
        self.records
    }

    /// Phase-3 queue.
    pub fn enum_queue(&self) -> Vec<ColumnId> {
        self.queue(|f| f.needs_enum_analysis)
    }

    /// Phase-4 queue.
    pub fn fk_queue(&self) -> Vec<ColumnId> {
        self.queue(|f| f.needs_fk_resolution)
    }

    /// Phase-5 queue: tables with at least one flagged column, each once.
    pub fn cross_column_queue(&self) -> Vec<TableId> {
        let mut tables = Vec::new();
        for record in self.records.iter().filter(|f| f.needs_cross_column_check) {
            if !tables.contains(&record.table_id) {
                tables.push(record.table_id);
            }
        }
        tables
    }

    fn queue(&self, flagged: impl Fn(&ColumnFeatures) -> bool) -> Vec<ColumnId> {
        self.records
            .iter()
            .filter(|f| flagged(f))
            .map(|f| f.column_id)
            .collect()
    }
}

/// Counters for one pipeline execution.
#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub columns_profiled: usize,
    pub columns_classified: usize,
    pub enums_analyzed: usize,
    pub foreign_keys_resolved: usize,
    pub tables_validated: usize,
    pub persisted: PersistReport,
    pub questions_created: usize,
    pub features: Vec<ColumnFeatures>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Ports the pipeline reads from and writes to.
#[derive(Clone)]
pub struct PipelinePorts {
    pub schema: Arc<dyn SchemaSource>,
    pub llm: Arc<dyn LlmClientFactory>,
    pub metadata: Arc<dyn ColumnMetadataStore>,
    pub ontologies: Arc<dyn OntologyRepository>,
    pub questions: Arc<dyn QuestionStore>,
}

pub struct ColumnPipeline {
    ports: PipelinePorts,
    probes: Option<Arc<dyn DatasourceProbeFactory>>,
    registry: Arc<ClassifierRegistry>,
    pool: Arc<WorkerPool>,
    temperature: f32,
    progress: Option<ProgressFn>,
}

impl ColumnPipeline {
    pub fn new(ports: PipelinePorts, registry: Arc<ClassifierRegistry>, pool: Arc<WorkerPool>) -> Self {
        Self {
            ports,
            probes: None,
            registry,
            pool,
            temperature: 0.1,
            progress: None,
        }
    }

    /// Enables overlap-based candidate discovery in phase 4.
    pub fn with_probes(mut self, probes: Arc<dyn DatasourceProbeFactory>) -> Self {
        self.probes = Some(probes);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn registry(&self) -> &Arc<ClassifierRegistry> {
        &self.registry
    }

    pub(crate) fn report(&self, phase: PipelinePhase, completed: usize, total: usize) {
        if let Some(progress) = &self.progress {
            progress(phase, completed, total);
        }
    }

    /// The project's LLM client; its absence fails the classification phase.
    pub async fn llm_client(&self, project: ProjectId) -> Result<Arc<dyn LlmClient>, PipelineError> {
        self.ports
            .llm
            .client_for(project)
            .await
            .map_err(|source| PipelineError::LlmUnavailable { project, source })
    }

    /// Runs every phase for the selected columns of `datasource`.
    #[instrument(skip(self), fields(project = %project, datasource = %datasource))]
    pub async fn run(
        &self,
        project: ProjectId,
        datasource: DatasourceId,
    ) -> Result<PipelineSummary, PipelineError> {
        let schema = self.profile(project, datasource).await?;
        let mut summary = PipelineSummary {
            columns_profiled: schema.profiles.len(),
            ..PipelineSummary::default()
        };

        let llm = self.llm_client(project).await?;

        let classified = self
            .classify(&llm, &schema.profiles)
            .await
            .map_err(|failure| phase_aborted(PipelinePhase::Classification, failure))?;
        summary.columns_classified = classified.len();
        let mut features = FeatureSet::from_records(classified);

        let enum_queue = features.enum_queue();
        summary.enums_analyzed = self
            .analyze_enums(&llm, &schema, &mut features, &enum_queue)
            .await
            .map_err(|failure| phase_aborted(PipelinePhase::EnumAnalysis, failure))?;

        let fk_queue = features.fk_queue();
        summary.foreign_keys_resolved = self
            .resolve_foreign_keys(project, datasource, &llm, &schema, &mut features, &fk_queue)
            .await;

        let table_queue = features.cross_column_queue();
        summary.tables_validated = self
            .validate_cross_column(&llm, &schema, &mut features, &table_queue)
            .await
            .map_err(|failure| phase_aborted(PipelinePhase::CrossColumn, failure))?;

        summary.persisted = self.persist(project, &features).await?;
        summary.questions_created = self.escalate(project, &features).await;
        summary.features = features.into_records();

        info!(
            profiled = summary.columns_profiled,
            classified = summary.columns_classified,
            enums = summary.enums_analyzed,
            foreign_keys = summary.foreign_keys_resolved,
            tables = summary.tables_validated,
            persisted = summary.persisted.persisted,
            questions = summary.questions_created,
            "column classification pipeline finished"
        );
        Ok(summary)
    }
}

/// Splits a worker-pool outcome into its results and the phase error, if any.
fn split_outcome<T>(
    phase: PipelinePhase,
    outcome: BatchOutcome<T, ClassifyError>,
) -> (Vec<T>, Option<PipelineError>) {
    if outcome.skipped > 0 {
        warn!(%phase, skipped = outcome.skipped, "items skipped after first failure");
    }
    let results = outcome.results.into_iter().map(|r| r.value).collect();
    let error = outcome.first_error.map(|failure| PipelineError::Classification {
        phase,
        item: failure.id,
        source: failure.error,
    });
    (results, error)
}

fn phase_aborted<T>(phase: PipelinePhase, failure: PhaseFailure<T>) -> PipelineError {
    warn!(
        %phase,
        partial = failure.partial.len(),
        error = %failure.error,
        "phase aborted; completed items kept"
    );
    failure.error
}
