//! DAG orchestrator for ontology-extraction runs.
//!
//! A run walks the canonical [`NodeName`] sequence. The orchestrator owns the
//! run lifecycle: creation, ownership, execution in the background,
//! cancellation, and the project purge. Node bodies are supplied through the
//! [`ExecutorRegistry`].
//!
//! Execution of one run is structured as:
//!
//! ```text
//! supervisor task
//!   ├─ body task (node loop)      ← panics are caught here by the JoinHandle
//!   └─ heartbeat task
//! teardown: unregister, stop heartbeat, release ownership
//! ```

mod execution;
mod heartbeat;
mod registry;

pub use registry::ExecutorRegistry;

use std::sync::Arc;

use ontology::ports::{
    EntityRepository, OntologyRepository, ProjectPurge, PurgeStep, RunRepository, TenantScope,
};
use ontology::{
    DagNode, DatasourceId, ExtractionRun, InstanceId, NodeError, NodeName, NodeStatus, ProjectId,
    RepositoryError, RunId, RunStatus, RunWithNodes,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use registry::RunRegistry;

#[derive(Debug, Error)]
pub enum DagError {
    #[error("extraction run {0} not found")]
    RunNotFound(RunId),

    #[error("could not claim ownership of run {run_id}")]
    OwnershipClaimFailed { run_id: RunId },

    #[error("project {project} has an extraction in progress")]
    RunInProgress { project: ProjectId },

    #[error("node {node} failed: {source}")]
    NodeFailed {
        node: NodeName,
        #[source]
        source: NodeError,
    },

    #[error("project purge failed at step {step:?}")]
    DeleteFailed {
        step: PurgeStep,
        #[source]
        source: RepositoryError,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Ports the orchestrator persists through.
#[derive(Clone)]
pub struct DagPorts {
    pub runs: Arc<dyn RunRepository>,
    pub ontologies: Arc<dyn OntologyRepository>,
    pub entities: Arc<dyn EntityRepository>,
    pub purge: Arc<dyn ProjectPurge>,
    pub tenants: Arc<dyn TenantScope>,
}

pub(crate) struct Inner {
    pub instance: InstanceId,
    pub ports: DagPorts,
    pub executors: ExecutorRegistry,
    pub runs: RunRegistry,
    pub config: EngineConfig,
    start_lock: Mutex<()>,
    tasks: TaskTracker,
}

/// Drives extraction runs. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct DagOrchestrator {
    inner: Arc<Inner>,
}

impl DagOrchestrator {
    /// Creates an orchestrator with a fresh instance identity.
    pub fn new(ports: DagPorts, executors: ExecutorRegistry, config: EngineConfig) -> Self {
        Self::with_instance(InstanceId::new_random(), ports, executors, config)
    }

    pub fn with_instance(
        instance: InstanceId,
        ports: DagPorts,
        executors: ExecutorRegistry,
        config: EngineConfig,
    ) -> Self {
        let missing = executors.missing();
        if !missing.is_empty() {
            warn!(?missing, "nodes without executors will fail when reached");
        }
        Self {
            inner: Arc::new(Inner {
                instance,
                ports,
                executors,
                runs: RunRegistry::default(),
                config,
                start_lock: Mutex::new(()),
                tasks: TaskTracker::new(),
            }),
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.inner.instance
    }

    /// Runs currently executing on this instance.
    pub fn executing_runs(&self) -> Vec<RunId> {
        self.inner.runs.run_ids()
    }

    /// Starts an extraction for `datasource`, or returns the one already active.
    ///
    /// Returns as soon as the run is persisted and claimed; execution continues
    /// in the background.
    #[instrument(skip(self), fields(instance = %self.inner.instance))]
    pub async fn start(
        &self,
        project: ProjectId,
        datasource: DatasourceId,
    ) -> Result<RunWithNodes, DagError> {
        let _guard = self.inner.start_lock.lock().await;
        let ports = &self.inner.ports;

        if let Some(active) = ports.runs.get_active_by_datasource(datasource).await? {
            info!(run_id = %active.run.id, status = %active.run.status, "extraction already active");
            return Ok(active);
        }

        let ontology = ports.ontologies.get_or_create_active(project).await?;
        let removed = ports.entities.delete_inferred_for_ontology(ontology.id).await?;
        debug!(ontology_id = %ontology.id, removed, "stale inferred entities removed");

        let run = ExtractionRun::new(project, datasource, ontology.id);
        match ports.runs.create_run(&run).await {
            Ok(()) => {}
            Err(RepositoryError::Conflict { message }) => {
                debug!(%message, "another instance created the run first");
                return ports
                    .runs
                    .get_active_by_datasource(datasource)
                    .await?
                    .ok_or(DagError::Repository(RepositoryError::Conflict { message }));
            }
            Err(err) => return Err(err.into()),
        }
        ports.runs.create_nodes(&DagNode::canonical_for(run.id)).await?;

        if !ports.runs.claim_ownership(run.id, self.inner.instance).await? {
            return Err(DagError::OwnershipClaimFailed { run_id: run.id });
        }
        ports.runs.set_current_node(run.id, NodeName::ALL[0]).await?;
        ports.runs.update_run_status(run.id, RunStatus::Running, None).await?;

        let snapshot = ports
            .runs
            .get_with_nodes(run.id)
            .await?
            .ok_or(DagError::RunNotFound(run.id))?;
        info!(run_id = %run.id, ontology_id = %ontology.id, "extraction started");
        self.spawn_execution(run.id);
        Ok(snapshot)
    }

    /// Claims and re-enters an interrupted run. Completed nodes are not run again.
    #[instrument(skip(self), fields(instance = %self.inner.instance))]
    pub async fn resume(&self, run_id: RunId) -> Result<RunWithNodes, DagError> {
        let runs = &self.inner.ports.runs;
        let snapshot = runs
            .get_with_nodes(run_id)
            .await?
            .ok_or(DagError::RunNotFound(run_id))?;
        if snapshot.run.status.is_terminal() || self.inner.runs.contains(run_id) {
            return Ok(snapshot);
        }
        if !runs.claim_ownership(run_id, self.inner.instance).await? {
            return Err(DagError::OwnershipClaimFailed { run_id });
        }
        if snapshot.run.status == RunStatus::Pending {
            runs.update_run_status(run_id, RunStatus::Running, None).await?;
        }
        let completed = snapshot
            .nodes
            .iter()
            .filter(|n| n.status == NodeStatus::Completed)
            .count();
        info!(%run_id, completed, "resuming extraction");
        self.spawn_execution(run_id);
        runs.get_with_nodes(run_id)
            .await?
            .ok_or(DagError::RunNotFound(run_id))
    }

    /// The most recent run of `datasource`, if it was ever started.
    pub async fn status(&self, datasource: DatasourceId) -> Result<Option<RunWithNodes>, DagError> {
        Ok(self
            .inner
            .ports
            .runs
            .get_latest_by_datasource(datasource)
            .await?)
    }

    /// Cancels `run_id`.
    ///
    /// The local token is signalled when this instance executes the run; the
    /// persisted state is updated regardless, so a run owned elsewhere stops
    /// at its next node boundary. Already-terminal runs are left untouched.
    #[instrument(skip(self), fields(instance = %self.inner.instance))]
    pub async fn cancel(&self, run_id: RunId) -> Result<(), DagError> {
        let runs = &self.inner.ports.runs;
        let snapshot = runs
            .get_with_nodes(run_id)
            .await?
            .ok_or(DagError::RunNotFound(run_id))?;
        let signalled = self.inner.runs.cancel(run_id);
        if snapshot.run.status.is_terminal() {
            debug!(%run_id, status = %snapshot.run.status, "run already finished; nothing to cancel");
            return Ok(());
        }

        // Run before nodes: an owner that hits a skipped node must already
        // see a terminal run.
        match runs.update_run_status(run_id, RunStatus::Cancelled, None).await {
            Ok(()) => {}
            Err(RepositoryError::Conflict { message }) => {
                debug!(%run_id, %message, "run finished before it could be cancelled");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }
        for node in snapshot.nodes.iter().filter(|n| !n.status.is_terminal()) {
            match runs.update_node_status(node.id, NodeStatus::Skipped, None).await {
                Ok(()) => {}
                Err(RepositoryError::Conflict { message }) => {
                    debug!(node = %node.name, %message, "node finished before it could be skipped");
                }
                Err(err) => return Err(err.into()),
            }
        }
        info!(%run_id, signalled, "extraction cancelled");
        Ok(())
    }

    /// Deletes every ontology record of `project` in one transaction.
    ///
    /// Refused while any run of the project is running.
    #[instrument(skip(self))]
    pub async fn delete_project(&self, project: ProjectId) -> Result<(), DagError> {
        let ports = &self.inner.ports;
        if ports.runs.has_running_for_project(project).await? {
            return Err(DagError::RunInProgress { project });
        }

        let mut tx = ports.purge.begin(project).await?;
        for step in PurgeStep::ORDER {
            match tx.delete(step).await {
                Ok(rows) => debug!(?step, rows, "purged"),
                Err(source) => {
                    if let Err(err) = tx.rollback().await {
                        warn!(?step, error = %err, "rollback after failed purge step also failed");
                    }
                    return Err(DagError::DeleteFailed { step, source });
                }
            }
        }
        tx.commit().await?;
        info!(%project, "project ontology data deleted");
        Ok(())
    }

    /// Signals every run executing here to stop. Does not wait; see
    /// [`Self::drain`].
    pub fn shutdown(&self) {
        let signalled = self.inner.runs.cancel_all();
        info!(instance = %self.inner.instance, signalled, "orchestrator shutting down");
    }

    /// Waits until every spawned execution has finished its teardown.
    pub async fn drain(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }

    fn spawn_execution(&self, run_id: RunId) {
        let handle = self.inner.runs.register(run_id);
        let inner = Arc::clone(&self.inner);
        self.inner
            .tasks
            .spawn(execution::supervise(inner, run_id, handle));
    }
}
