//! Extraction-run and node records, and their lifecycle rules.
//!
//! A run is created together with one [`DagNode`] per [`NodeName`], in
//! canonical order. Only the instance that claimed the run mutates either
//! record, and both become immutable once terminal.

use serde::{Deserialize, Serialize};

use crate::{DatasourceId, InstanceId, NodeId, OntologyId, ProjectId, RunId, Timestamp};

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Lifecycle status of an [`ExtractionRun`].
///
/// `pending → running → {completed, failed, cancelled}`. All three terminal
/// states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Returns `true` for `completed`, `failed` and `cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        match self {
            RunStatus::Pending => next != RunStatus::Pending,
            RunStatus::Running => next.is_terminal(),
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a [`DagNode`].
///
/// `pending → running → {completed, failed, skipped}`. A pending node may also
/// be skipped (cancellation) or failed directly (failure attributed to a node
/// that never started).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeStatus {
    /// Returns `true` for `completed`, `failed` and `skipped`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped
        )
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: NodeStatus) -> bool {
        match self {
            NodeStatus::Pending => matches!(
                next,
                NodeStatus::Running | NodeStatus::Skipped | NodeStatus::Failed
            ),
            NodeStatus::Running => next.is_terminal(),
            NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "running",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Node names
// ---------------------------------------------------------------------------

/// The fixed, ordered set of steps in an extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeName {
    /// Six-phase column profiling and classification.
    ColumnFeatureExtraction,
    EntityDiscovery,
    EntityEnrichment,
    FkDiscovery,
    RelationshipEnrichment,
    ColumnEnrichment,
    OntologyFinalization,
}

impl NodeName {
    /// Every node in canonical execution order.
    pub const ALL: [NodeName; 7] = [
        NodeName::ColumnFeatureExtraction,
        NodeName::EntityDiscovery,
        NodeName::EntityEnrichment,
        NodeName::FkDiscovery,
        NodeName::RelationshipEnrichment,
        NodeName::ColumnEnrichment,
        NodeName::OntologyFinalization,
    ];

    /// Position of this node in [`NodeName::ALL`].
    pub fn order_index(self) -> u32 {
        Self::ALL
            .iter()
            .position(|n| *n == self)
            .map(|i| i as u32)
            .unwrap_or(u32::MAX)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeName::ColumnFeatureExtraction => "column_feature_extraction",
            NodeName::EntityDiscovery => "entity_discovery",
            NodeName::EntityEnrichment => "entity_enrichment",
            NodeName::FkDiscovery => "fk_discovery",
            NodeName::RelationshipEnrichment => "relationship_enrichment",
            NodeName::ColumnEnrichment => "column_enrichment",
            NodeName::OntologyFinalization => "ontology_finalization",
        }
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One end-to-end execution of the ontology-extraction DAG for a datasource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRun {
    pub id: RunId,
    pub project_id: ProjectId,
    pub datasource_id: DatasourceId,
    /// Ontology the run writes into.
    pub ontology_id: OntologyId,
    pub status: RunStatus,
    /// Node currently (or most recently) executing.
    pub current_node: Option<NodeName>,
    /// Instance that holds the ownership claim, if any.
    pub owner: Option<InstanceId>,
    /// Last liveness refresh by the owner.
    pub last_heartbeat: Option<Timestamp>,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    /// Failure detail for failed runs.
    pub error: Option<String>,
}

impl ExtractionRun {
    /// A fresh pending run with no owner.
    pub fn new(project_id: ProjectId, datasource_id: DatasourceId, ontology_id: OntologyId) -> Self {
        Self {
            id: RunId::new_random(),
            project_id,
            datasource_id,
            ontology_id,
            status: RunStatus::Pending,
            current_node: None,
            owner: None,
            last_heartbeat: None,
            started_at: Timestamp::now(),
            completed_at: None,
            error: None,
        }
    }
}

/// One named, ordered step of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagNode {
    pub id: NodeId,
    pub run_id: RunId,
    pub name: NodeName,
    pub order_index: u32,
    pub status: NodeStatus,
    pub error: Option<String>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl DagNode {
    /// Builds the full pending node list for `run_id`, in canonical order.
    pub fn canonical_for(run_id: RunId) -> Vec<DagNode> {
        NodeName::ALL
            .iter()
            .map(|name| DagNode {
                id: NodeId::new_random(),
                run_id,
                name: *name,
                order_index: name.order_index(),
                status: NodeStatus::Pending,
                error: None,
                started_at: None,
                completed_at: None,
            })
            .collect()
    }
}

/// A run together with its nodes, ordered by `order_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunWithNodes {
    pub run: ExtractionRun,
    pub nodes: Vec<DagNode>,
}

impl RunWithNodes {
    /// Creates the pair, sorting nodes into execution order.
    pub fn new(run: ExtractionRun, mut nodes: Vec<DagNode>) -> Self {
        nodes.sort_by_key(|n| n.order_index);
        Self { run, nodes }
    }

    /// Chooses the node a run-level failure is recorded against.
    ///
    /// Preference order: the run's current node; the first node still pending
    /// or running; the first node by order index.
    pub fn failure_node(&self) -> Option<&DagNode> {
        if let Some(current) = self.run.current_node {
            if let Some(node) = self.nodes.iter().find(|n| n.name == current) {
                return Some(node);
            }
        }
        self.nodes
            .iter()
            .find(|n| matches!(n.status, NodeStatus::Pending | NodeStatus::Running))
            .or_else(|| self.nodes.iter().min_by_key(|n| n.order_index))
    }
}
