//! Shared doubles for the integration tests: a scripted LLM, node executors
//! with observable behaviour, and schema fixtures.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use memstore::InMemoryStore;
use nodes::{
    ClassifierRegistry, ColumnPipeline, DagOrchestrator, DagPorts, EngineConfig, ExecutorRegistry,
    PipelinePorts, RetryConfig, WorkerPool,
};
use ontology::ports::{
    ColumnMetadataStore, LlmClient, LlmClientFactory, LlmRequest, LlmResponse, NodeContext,
    NodeExecutor, RunRepository,
};
use ontology::{
    ColumnFeatures, ColumnId, DagNode, DatasourceId, ExtractionRun, InstanceId, LlmError,
    NodeError, NodeId, NodeName, NodeStatus, ProjectId, RepositoryError, RunId, RunStatus,
    RunWithNodes, SchemaColumn, SchemaTable, TableId,
};
use parking_lot::Mutex;
use tokio::sync::watch;

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

/// Parses as every phase-2 and follow-up response type.
pub const GENERIC_REPLY: &str = r#"{
    "purpose": "general",
    "description": "A descriptive attribute.",
    "confidence": 0.92,
    "semantic_type": "free_text",
    "is_soft_delete": false,
    "is_audit_field": false,
    "true_meaning": "yes",
    "false_meaning": "no",
    "identifier_type": "internal",
    "is_foreign_key": false,
    "is_monetary": false,
    "is_state_machine": false,
    "values": [],
    "target_table": "",
    "target_column": "",
    "monetary_pairings": [],
    "soft_delete_verdicts": []
}"#;

#[derive(Clone)]
enum Reply {
    Content(String),
    Fail(LlmError),
}

#[derive(Clone)]
struct Rule {
    needle: String,
    reply: Reply,
    delay: Duration,
}

/// Answers by the first rule whose needle occurs in the prompt, falling back
/// to [`GENERIC_REPLY`].
#[derive(Default)]
pub struct ScriptedLlm {
    rules: Vec<Rule>,
    calls: AtomicUsize,
}

/// The prompt line naming `column`.
pub fn column_line(column: &str) -> String {
    format!("Column: {column}\n")
}

/// The opening of the table-level validation prompt for `table`.
pub fn table_header(table: &str) -> String {
    format!("Table: {table}\nColumns:\n")
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_to_column(mut self, column: &str, content: &str) -> Self {
        self.rules.push(Rule {
            needle: column_line(column),
            reply: Reply::Content(content.to_string()),
            delay: Duration::ZERO,
        });
        self
    }

    pub fn fail_column_after(mut self, column: &str, error: LlmError, delay: Duration) -> Self {
        self.rules.push(Rule {
            needle: column_line(column),
            reply: Reply::Fail(error),
            delay,
        });
        self
    }

    /// Answers the phase-5 prompt for `table`.
    pub fn reply_to_table(mut self, table: &str, content: &str) -> Self {
        self.rules.push(Rule {
            needle: table_header(table),
            reply: Reply::Content(content.to_string()),
            delay: Duration::ZERO,
        });
        self
    }

    pub fn fail_table_after(mut self, table: &str, error: LlmError, delay: Duration) -> Self {
        self.rules.push(Rule {
            needle: table_header(table),
            reply: Reply::Fail(error),
            delay,
        });
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let rule = self
            .rules
            .iter()
            .find(|r| request.prompt.contains(&r.needle))
            .cloned();
        let (reply, delay) = match rule {
            Some(rule) => (rule.reply, rule.delay),
            None => (Reply::Content(GENERIC_REPLY.to_string()), Duration::ZERO),
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match reply {
            Reply::Content(content) => Ok(LlmResponse {
                content,
                model: "scripted".into(),
                prompt_tokens: 0,
                completion_tokens: 0,
            }),
            Reply::Fail(error) => Err(error),
        }
    }
}

/// Hands out the same scripted client to every project, or refuses when
/// built with [`ScriptedFactory::unconfigured`].
pub struct ScriptedFactory {
    client: Option<Arc<ScriptedLlm>>,
}

impl ScriptedFactory {
    pub fn new(client: Arc<ScriptedLlm>) -> Self {
        Self {
            client: Some(client),
        }
    }

    pub fn unconfigured() -> Self {
        Self { client: None }
    }
}

#[async_trait]
impl LlmClientFactory for ScriptedFactory {
    async fn client_for(&self, project: ProjectId) -> Result<Arc<dyn LlmClient>, LlmError> {
        match &self.client {
            Some(client) => Ok(client.clone()),
            None => Err(LlmError::NotConfigured { project }),
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata store
// ---------------------------------------------------------------------------

/// Delegates to the in-memory store but fails upserts for chosen columns.
pub struct FlakyMetadataStore {
    inner: InMemoryStore,
    failing: HashSet<String>,
}

impl FlakyMetadataStore {
    pub fn new(inner: InMemoryStore, failing: &[&str]) -> Self {
        Self {
            inner,
            failing: failing.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[async_trait]
impl ColumnMetadataStore for FlakyMetadataStore {
    async fn upsert_column_features(
        &self,
        project: ProjectId,
        features: &ColumnFeatures,
    ) -> Result<(), RepositoryError> {
        if self.failing.contains(&features.column_name) {
            return Err(RepositoryError::storage(format!(
                "write rejected for {}",
                features.column_name
            )));
        }
        self.inner.upsert_column_features(project, features).await
    }
}

// ---------------------------------------------------------------------------
// Run repository
// ---------------------------------------------------------------------------

/// Delegates to the in-memory store and logs every status write as
/// `run:<status>` or `node:<status>`.
#[derive(Clone)]
pub struct StatusLog {
    inner: InMemoryStore,
    pub writes: Arc<Mutex<Vec<String>>>,
}

impl StatusLog {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            writes: Arc::default(),
        }
    }
}

#[async_trait]
impl RunRepository for StatusLog {
    async fn create_run(&self, run: &ExtractionRun) -> Result<(), RepositoryError> {
        self.inner.create_run(run).await
    }

    async fn create_nodes(&self, nodes: &[DagNode]) -> Result<(), RepositoryError> {
        self.inner.create_nodes(nodes).await
    }

    async fn update_run_status(
        &self,
        run_id: RunId,
        status: RunStatus,
        error: Option<String>,
    ) -> Result<(), RepositoryError> {
        self.writes.lock().push(format!("run:{status}"));
        self.inner.update_run_status(run_id, status, error).await
    }

    async fn set_current_node(&self, run_id: RunId, node: NodeName) -> Result<(), RepositoryError> {
        self.inner.set_current_node(run_id, node).await
    }

    async fn update_node_status(
        &self,
        node_id: NodeId,
        status: NodeStatus,
        error: Option<String>,
    ) -> Result<(), RepositoryError> {
        self.writes.lock().push(format!("node:{status}"));
        self.inner.update_node_status(node_id, status, error).await
    }

    async fn get_active_by_datasource(
        &self,
        datasource: DatasourceId,
    ) -> Result<Option<RunWithNodes>, RepositoryError> {
        self.inner.get_active_by_datasource(datasource).await
    }

    async fn get_latest_by_datasource(
        &self,
        datasource: DatasourceId,
    ) -> Result<Option<RunWithNodes>, RepositoryError> {
        self.inner.get_latest_by_datasource(datasource).await
    }

    async fn get_with_nodes(&self, run_id: RunId) -> Result<Option<RunWithNodes>, RepositoryError> {
        self.inner.get_with_nodes(run_id).await
    }

    async fn has_running_for_project(&self, project: ProjectId) -> Result<bool, RepositoryError> {
        self.inner.has_running_for_project(project).await
    }

    async fn claim_ownership(
        &self,
        run_id: RunId,
        instance: InstanceId,
    ) -> Result<bool, RepositoryError> {
        self.inner.claim_ownership(run_id, instance).await
    }

    async fn release_ownership(
        &self,
        run_id: RunId,
        instance: InstanceId,
    ) -> Result<(), RepositoryError> {
        self.inner.release_ownership(run_id, instance).await
    }

    async fn update_heartbeat(
        &self,
        run_id: RunId,
        instance: InstanceId,
    ) -> Result<(), RepositoryError> {
        self.inner.update_heartbeat(run_id, instance).await
    }
}

// ---------------------------------------------------------------------------
// Schema fixtures
// ---------------------------------------------------------------------------

/// A selected free-text column that routes to the text classifier.
pub fn text_column(table: TableId, name: &str, ordinal: u32) -> SchemaColumn {
    SchemaColumn {
        id: ColumnId::new_random(),
        table_id: table,
        column_name: name.to_string(),
        data_type: "text".into(),
        is_nullable: true,
        is_primary_key: false,
        is_unique: false,
        is_selected: true,
        ordinal_position: ordinal,
        row_count: Some(1_000),
        non_null_count: Some(1_000),
        null_count: Some(0),
        distinct_count: Some(950),
        sample_values: vec![
            format!("first {name} entry"),
            format!("second {name} entry"),
        ],
    }
}

/// A selected table whose columns are all free text.
pub fn text_table(datasource: DatasourceId, name: &str, columns: &[&str]) -> SchemaTable {
    let id = TableId::new_random();
    SchemaTable {
        id,
        datasource_id: datasource,
        schema_name: "public".into(),
        table_name: name.to_string(),
        is_selected: true,
        row_count: Some(1_000),
        columns: columns
            .iter()
            .enumerate()
            .map(|(i, c)| text_column(id, c, i as u32 + 1))
            .collect(),
    }
}

pub struct PipelineFixture {
    pub store: InMemoryStore,
    pub project: ProjectId,
    pub datasource: DatasourceId,
}

impl PipelineFixture {
    /// A store holding one `notes` table with the given text columns.
    pub fn with_columns(columns: &[&str]) -> Self {
        let store = InMemoryStore::new();
        let project = ProjectId::new_random();
        let datasource = DatasourceId::new_random();
        store.load_schema(project, datasource, vec![text_table(datasource, "notes", columns)]);
        Self {
            store,
            project,
            datasource,
        }
    }

    pub fn ports(&self, llm: Arc<dyn LlmClientFactory>) -> PipelinePorts {
        let store = Arc::new(self.store.clone());
        PipelinePorts {
            schema: store.clone(),
            llm,
            metadata: store.clone(),
            ontologies: store.clone(),
            questions: store,
        }
    }

    pub fn pipeline(&self, llm: Arc<dyn LlmClientFactory>) -> ColumnPipeline {
        ColumnPipeline::new(
            self.ports(llm),
            Arc::new(ClassifierRegistry::preloaded()),
            Arc::new(WorkerPool::new(4)),
        )
    }
}

// ---------------------------------------------------------------------------
// Node executors
// ---------------------------------------------------------------------------

/// Records every node it is invoked for.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    pub calls: Arc<Mutex<Vec<NodeName>>>,
}

#[async_trait]
impl NodeExecutor for RecordingExecutor {
    async fn execute(&self, ctx: &NodeContext<'_>) -> Result<(), NodeError> {
        self.calls.lock().push(ctx.node);
        Ok(())
    }
}

/// Captures the status of every node of the run at the moment each node
/// body runs.
#[derive(Clone)]
pub struct ObservingExecutor {
    pub store: InMemoryStore,
    pub seen: Arc<Mutex<Vec<(NodeName, Vec<NodeStatus>)>>>,
}

#[async_trait]
impl NodeExecutor for ObservingExecutor {
    async fn execute(&self, ctx: &NodeContext<'_>) -> Result<(), NodeError> {
        let snapshot = self
            .store
            .run(ctx.run_id)
            .ok_or_else(|| NodeError::Fatal {
                message: "run vanished".into(),
            })?;
        let statuses = snapshot.nodes.iter().map(|n| n.status).collect();
        self.seen.lock().push((ctx.node, statuses));
        Ok(())
    }
}

/// Blocks every node body until the gate opens.
#[derive(Clone)]
pub struct GatedExecutor {
    open: watch::Receiver<bool>,
    pub entered: Arc<AtomicUsize>,
}

pub struct Gate {
    open: watch::Sender<bool>,
}

impl Gate {
    pub fn release(&self) {
        let _ = self.open.send(true);
    }
}

pub fn gated() -> (Gate, GatedExecutor) {
    let (tx, rx) = watch::channel(false);
    (
        Gate { open: tx },
        GatedExecutor {
            open: rx,
            entered: Arc::new(AtomicUsize::new(0)),
        },
    )
}

#[async_trait]
impl NodeExecutor for GatedExecutor {
    async fn execute(&self, _ctx: &NodeContext<'_>) -> Result<(), NodeError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.clone();
        open.wait_for(|v| *v).await.map_err(|_| NodeError::Fatal {
            message: "gate dropped".into(),
        })?;
        Ok(())
    }
}

pub struct PanickingExecutor;

#[async_trait]
impl NodeExecutor for PanickingExecutor {
    async fn execute(&self, _ctx: &NodeContext<'_>) -> Result<(), NodeError> {
        panic!("executor exploded");
    }
}

/// Registers `executor` for every canonical node.
pub fn all_nodes(executor: Arc<dyn NodeExecutor>) -> ExecutorRegistry {
    NodeName::ALL
        .into_iter()
        .fold(ExecutorRegistry::new(), |registry, node| {
            registry.with(node, executor.clone())
        })
}

pub fn dag_ports(store: &InMemoryStore) -> DagPorts {
    let store = Arc::new(store.clone());
    DagPorts {
        runs: store.clone(),
        ontologies: store.clone(),
        entities: store.clone(),
        purge: store.clone(),
        tenants: store,
    }
}

/// Engine settings for tests: no retries, fast heartbeat.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        heartbeat_interval_secs: 1,
        node_retry: RetryConfig {
            max_attempts: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
            multiplier: 1.0,
        },
        ..EngineConfig::default()
    }
}

pub fn orchestrator(store: &InMemoryStore, executors: ExecutorRegistry) -> DagOrchestrator {
    DagOrchestrator::new(dag_ports(store), executors, test_config())
}

/// Polls `condition` until it holds, panicking after two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
