//! In-memory implementation of every SchemaSense persistence port.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** One [`InMemoryStore`] backs runs, nodes, ontologies,
//! entities, questions, schema snapshots and column metadata. It enforces the
//! same rules a relational backend would: one active run per datasource,
//! monotonic status transitions, the ownership claim, and all-or-nothing
//! project purges.
//!
//! Used by the CLI for single-process runs and by the integration tests.

mod catalog;
mod purge;
mod runs;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ontology::{
    ColumnFeatures, ColumnId, DagNode, DatasourceId, ExtractionRun, NodeId, Ontology, OntologyId,
    OntologyQuestion, ProjectId, RunId, RunWithNodes, SchemaTable,
};
use parking_lot::Mutex;

/// An inferred or user-defined entity of an ontology.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub project_id: ProjectId,
    pub ontology_id: OntologyId,
    pub name: String,
    /// Created by discovery rather than by a user.
    pub is_inferred: bool,
}

/// A project-scoped row whose content this adapter does not model
/// (relationships, chat messages, knowledge facts).
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRow {
    pub project_id: ProjectId,
    pub label: String,
}

#[derive(Debug, Clone)]
struct StoredRun {
    run: ExtractionRun,
    /// Insertion order, used to find the latest run.
    seq: u64,
}

#[derive(Debug, Clone)]
struct StoredFeatures {
    project_id: ProjectId,
    features: ColumnFeatures,
}

#[derive(Debug, Default)]
pub(crate) struct State {
    next_seq: u64,
    runs: HashMap<RunId, StoredRun>,
    nodes: HashMap<NodeId, DagNode>,
    ontologies: Vec<Ontology>,
    entities: Vec<EntityRecord>,
    relationships: Vec<ProjectRow>,
    questions: Vec<OntologyQuestion>,
    chat_history: Vec<ProjectRow>,
    knowledge: Vec<ProjectRow>,
    schemas: HashMap<(ProjectId, DatasourceId), Vec<SchemaTable>>,
    features: HashMap<ColumnId, StoredFeatures>,
}

impl State {
    fn with_nodes(&self, run: &ExtractionRun) -> RunWithNodes {
        let nodes = self
            .nodes
            .values()
            .filter(|n| n.run_id == run.id)
            .cloned()
            .collect();
        RunWithNodes::new(run.clone(), nodes)
    }
}

/// Shared in-memory store. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    open_tenants: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored schema snapshot of `datasource`.
    pub fn load_schema(&self, project: ProjectId, datasource: DatasourceId, tables: Vec<SchemaTable>) {
        let count = tables.len();
        self.state.lock().schemas.insert((project, datasource), tables);
        tracing::debug!(%project, %datasource, tables = count, "schema snapshot loaded");
    }

    /// Tenant contexts acquired and not yet released.
    pub fn open_tenants(&self) -> usize {
        self.open_tenants.load(Ordering::SeqCst)
    }

    pub fn run(&self, run_id: RunId) -> Option<RunWithNodes> {
        let state = self.state.lock();
        state.runs.get(&run_id).map(|r| state.with_nodes(&r.run))
    }

    /// Feature records stored for `project`, in no particular order.
    pub fn column_features(&self, project: ProjectId) -> Vec<ColumnFeatures> {
        self.state
            .lock()
            .features
            .values()
            .filter(|f| f.project_id == project)
            .map(|f| f.features.clone())
            .collect()
    }

    pub fn questions(&self, project: ProjectId) -> Vec<OntologyQuestion> {
        self.state
            .lock()
            .questions
            .iter()
            .filter(|q| q.project_id == project)
            .cloned()
            .collect()
    }

    pub fn entities(&self, ontology: OntologyId) -> Vec<EntityRecord> {
        self.state
            .lock()
            .entities
            .iter()
            .filter(|e| e.ontology_id == ontology)
            .cloned()
            .collect()
    }

    pub fn add_entity(&self, entity: EntityRecord) {
        self.state.lock().entities.push(entity);
    }

    pub fn add_relationship(&self, project: ProjectId, label: impl Into<String>) {
        self.state.lock().relationships.push(ProjectRow {
            project_id: project,
            label: label.into(),
        });
    }

    pub fn add_chat_message(&self, project: ProjectId, label: impl Into<String>) {
        self.state.lock().chat_history.push(ProjectRow {
            project_id: project,
            label: label.into(),
        });
    }

    pub fn add_knowledge(&self, project: ProjectId, label: impl Into<String>) {
        self.state.lock().knowledge.push(ProjectRow {
            project_id: project,
            label: label.into(),
        });
    }

    /// Rows of every kind a project purge removes.
    pub fn project_rows(&self, project: ProjectId) -> usize {
        let state = self.state.lock();
        let runs: Vec<RunId> = state
            .runs
            .values()
            .filter(|r| r.run.project_id == project)
            .map(|r| r.run.id)
            .collect();
        let nodes = state.nodes.values().filter(|n| runs.contains(&n.run_id)).count();
        let of = |rows: &[ProjectRow]| rows.iter().filter(|r| r.project_id == project).count();
        runs.len()
            + nodes
            + of(&state.relationships)
            + state.entities.iter().filter(|e| e.project_id == project).count()
            + state.questions.iter().filter(|q| q.project_id == project).count()
            + of(&state.chat_history)
            + of(&state.knowledge)
            + state.ontologies.iter().filter(|o| o.project_id == project).count()
    }
}
