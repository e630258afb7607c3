//! Port traits: everything the orchestration layer needs from the outside world.
//!
//! Infrastructure crates (`memstore`, `llm`, a relational backend) implement
//! these; the `nodes` crate depends only on the traits. All methods are async
//! and every trait is object-safe so implementations can be shared as
//! `Arc<dyn Trait>`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    ColumnFeatures, DagNode, DatasourceId, ExtractionRun, InstanceId, LlmError, NewQuestion,
    NodeError, NodeId, NodeName, NodeStatus, Ontology, OntologyId, OntologyQuestion, ProjectId,
    RepositoryError, RunId, RunStatus, RunWithNodes, SchemaTable,
};

// ---------------------------------------------------------------------------
// Runs and nodes
// ---------------------------------------------------------------------------

/// Durable storage for runs, nodes and the ownership table.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Inserts a new run.
    ///
    /// Fails with [`RepositoryError::Conflict`] when the datasource already has
    /// a non-terminal run.
    async fn create_run(&self, run: &ExtractionRun) -> Result<(), RepositoryError>;

    async fn create_nodes(&self, nodes: &[DagNode]) -> Result<(), RepositoryError>;

    /// Sets the run status, stamping completion time for terminal statuses.
    async fn update_run_status(
        &self,
        run_id: RunId,
        status: RunStatus,
        error: Option<String>,
    ) -> Result<(), RepositoryError>;

    async fn set_current_node(&self, run_id: RunId, node: NodeName)
        -> Result<(), RepositoryError>;

    async fn update_node_status(
        &self,
        node_id: NodeId,
        status: NodeStatus,
        error: Option<String>,
    ) -> Result<(), RepositoryError>;

    /// The non-terminal run for `datasource`, if any.
    async fn get_active_by_datasource(
        &self,
        datasource: DatasourceId,
    ) -> Result<Option<RunWithNodes>, RepositoryError>;

    /// The most recently started run for `datasource`, in any status.
    async fn get_latest_by_datasource(
        &self,
        datasource: DatasourceId,
    ) -> Result<Option<RunWithNodes>, RepositoryError>;

    async fn get_with_nodes(&self, run_id: RunId) -> Result<Option<RunWithNodes>, RepositoryError>;

    /// Whether any run of `project` currently has status `running`.
    async fn has_running_for_project(&self, project: ProjectId) -> Result<bool, RepositoryError>;

    /// Atomically records `instance` as the run's owner if it has none.
    ///
    /// Returns `false` when a different instance already owns the run.
    async fn claim_ownership(
        &self,
        run_id: RunId,
        instance: InstanceId,
    ) -> Result<bool, RepositoryError>;

    /// Clears the owner if it is still `instance`.
    async fn release_ownership(
        &self,
        run_id: RunId,
        instance: InstanceId,
    ) -> Result<(), RepositoryError>;

    /// Refreshes the liveness timestamp if `instance` still owns the run.
    async fn update_heartbeat(
        &self,
        run_id: RunId,
        instance: InstanceId,
    ) -> Result<(), RepositoryError>;
}

// ---------------------------------------------------------------------------
// Ontology records
// ---------------------------------------------------------------------------

#[async_trait]
pub trait OntologyRepository: Send + Sync {
    async fn get_or_create_active(&self, project: ProjectId) -> Result<Ontology, RepositoryError>;

    async fn get_active(&self, project: ProjectId) -> Result<Option<Ontology>, RepositoryError>;
}

#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// Deletes entities derived by earlier discovery passes. Returns the count.
    async fn delete_inferred_for_ontology(
        &self,
        ontology: OntologyId,
    ) -> Result<u64, RepositoryError>;
}

/// One dependent-row group removed by a project purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeStep {
    /// Runs; their nodes cascade.
    Runs,
    Relationships,
    /// Entities; their aliases cascade.
    Entities,
    Questions,
    ChatHistory,
    Knowledge,
    Ontologies,
}

impl PurgeStep {
    /// Foreign-key-safe deletion order.
    pub const ORDER: [PurgeStep; 7] = [
        PurgeStep::Runs,
        PurgeStep::Relationships,
        PurgeStep::Entities,
        PurgeStep::Questions,
        PurgeStep::ChatHistory,
        PurgeStep::Knowledge,
        PurgeStep::Ontologies,
    ];
}

/// Begins transactional, project-scoped deletes.
#[async_trait]
pub trait ProjectPurge: Send + Sync {
    async fn begin(&self, project: ProjectId) -> Result<Box<dyn PurgeTransaction>, RepositoryError>;
}

/// An open purge transaction. Nothing is visible until [`commit`](Self::commit).
#[async_trait]
pub trait PurgeTransaction: Send {
    /// Deletes one row group for the transaction's project. Returns the count.
    async fn delete(&mut self, step: PurgeStep) -> Result<u64, RepositoryError>;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}

// ---------------------------------------------------------------------------
// Tenant scope
// ---------------------------------------------------------------------------

/// A tenant-scoped working context (e.g. a pooled connection with the
/// project's row-level-security settings applied).
///
/// Released exactly once when dropped, including during unwinding.
pub struct TenantContext {
    project_id: ProjectId,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl TenantContext {
    /// Creates a context whose `release` callback runs on drop.
    pub fn new(project_id: ProjectId, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            project_id,
            release: Some(Box::new(release)),
        }
    }

    /// A context with nothing to release.
    pub fn detached(project_id: ProjectId) -> Self {
        Self {
            project_id,
            release: None,
        }
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }
}

impl Drop for TenantContext {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for TenantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantContext")
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait TenantScope: Send + Sync {
    async fn acquire(&self, project: ProjectId) -> Result<TenantContext, RepositoryError>;
}

// ---------------------------------------------------------------------------
// Node executors
// ---------------------------------------------------------------------------

/// Everything a node executor receives for one invocation.
#[derive(Debug)]
pub struct NodeContext<'a> {
    pub run_id: RunId,
    pub project_id: ProjectId,
    pub datasource_id: DatasourceId,
    pub ontology_id: OntologyId,
    pub node: NodeName,
    pub tenant: &'a TenantContext,
}

/// Business logic for one [`NodeName`].
///
/// Implementations must tolerate being invoked more than once for the same
/// run: the engine retries retryable failures and re-enters interrupted runs.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, ctx: &NodeContext<'_>) -> Result<(), NodeError>;
}

// ---------------------------------------------------------------------------
// LLM access
// ---------------------------------------------------------------------------

/// A single prompt + system message + temperature call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub prompt: String,
    pub system_message: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Raw completion text, expected to contain a JSON document.
    pub content: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;
}

/// Hands out clients scoped to a project's LLM configuration.
#[async_trait]
pub trait LlmClientFactory: Send + Sync {
    /// Fails with [`LlmError::NotConfigured`] when the project has no access point.
    async fn client_for(&self, project: ProjectId) -> Result<Arc<dyn LlmClient>, LlmError>;
}

// ---------------------------------------------------------------------------
// Schema and datasource
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Every stored table of `datasource`, with columns and statistics.
    /// Selection flags are applied by the caller.
    async fn list_tables(
        &self,
        project: ProjectId,
        datasource: DatasourceId,
    ) -> Result<Vec<SchemaTable>, RepositoryError>;
}

/// A `table.column` reference inside one datasource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Live queries against the customer datasource.
#[async_trait]
pub trait DatasourceProbe: Send + Sync {
    /// Fraction of distinct non-null `source` values that also occur in `target`.
    async fn value_overlap(
        &self,
        source: &ColumnRef,
        target: &ColumnRef,
    ) -> Result<f64, RepositoryError>;
}

#[async_trait]
pub trait DatasourceProbeFactory: Send + Sync {
    /// A probe for `datasource`, or `None` when no live connection is available.
    async fn probe_for(
        &self,
        project: ProjectId,
        datasource: DatasourceId,
    ) -> Result<Option<Arc<dyn DatasourceProbe>>, RepositoryError>;
}

// ---------------------------------------------------------------------------
// Metadata and questions
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ColumnMetadataStore: Send + Sync {
    /// Inserts or replaces the features stored for `features.column_id`.
    async fn upsert_column_features(
        &self,
        project: ProjectId,
        features: &ColumnFeatures,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Questions of `ontology` still awaiting an answer.
    async fn list_open(&self, ontology: OntologyId) -> Result<Vec<OntologyQuestion>, RepositoryError>;

    async fn create(&self, question: NewQuestion) -> Result<OntologyQuestion, RepositoryError>;
}
