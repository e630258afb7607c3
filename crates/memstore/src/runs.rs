use async_trait::async_trait;
use ontology::ports::RunRepository;
use ontology::{
    DagNode, DatasourceId, ExtractionRun, InstanceId, NodeId, NodeName, NodeStatus, ProjectId,
    RepositoryError, RunId, RunStatus, RunWithNodes, Timestamp,
};

use crate::{InMemoryStore, StoredRun};

#[async_trait]
impl RunRepository for InMemoryStore {
    async fn create_run(&self, run: &ExtractionRun) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        let active = state
            .runs
            .values()
            .any(|r| r.run.datasource_id == run.datasource_id && !r.run.status.is_terminal());
        if active {
            return Err(RepositoryError::Conflict {
                message: format!("datasource {} already has an active run", run.datasource_id),
            });
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.runs.insert(
            run.id,
            StoredRun {
                run: run.clone(),
                seq,
            },
        );
        Ok(())
    }

    async fn create_nodes(&self, nodes: &[DagNode]) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        if let Some(orphan) = nodes.iter().find(|n| !state.runs.contains_key(&n.run_id)) {
            return Err(RepositoryError::not_found("run", orphan.run_id));
        }
        for node in nodes {
            state.nodes.insert(node.id, node.clone());
        }
        Ok(())
    }

    async fn update_run_status(
        &self,
        run_id: RunId,
        status: RunStatus,
        error: Option<String>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        let stored = state
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| RepositoryError::not_found("run", run_id))?;
        let run = &mut stored.run;
        if !run.status.can_transition_to(status) {
            return Err(RepositoryError::Conflict {
                message: format!("run {run_id} cannot move from {} to {status}", run.status),
            });
        }
        run.status = status;
        if error.is_some() {
            run.error = error;
        }
        if status.is_terminal() {
            run.completed_at = Some(Timestamp::now());
        }
        Ok(())
    }

    async fn set_current_node(&self, run_id: RunId, node: NodeName) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        let stored = state
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| RepositoryError::not_found("run", run_id))?;
        stored.run.current_node = Some(node);
        Ok(())
    }

    async fn update_node_status(
        &self,
        node_id: NodeId,
        status: NodeStatus,
        error: Option<String>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        let node = state
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| RepositoryError::not_found("node", node_id))?;
        if !node.status.can_transition_to(status) {
            return Err(RepositoryError::Conflict {
                message: format!(
                    "node {} cannot move from {} to {status}",
                    node.name, node.status
                ),
            });
        }
        node.status = status;
        if error.is_some() {
            node.error = error;
        }
        let now = Timestamp::now();
        if status == NodeStatus::Running {
            node.started_at = Some(now);
        }
        if status.is_terminal() {
            node.completed_at = Some(now);
        }
        Ok(())
    }

    async fn get_active_by_datasource(
        &self,
        datasource: DatasourceId,
    ) -> Result<Option<RunWithNodes>, RepositoryError> {
        let state = self.state.lock();
        Ok(state
            .runs
            .values()
            .find(|r| r.run.datasource_id == datasource && !r.run.status.is_terminal())
            .map(|r| state.with_nodes(&r.run)))
    }

    async fn get_latest_by_datasource(
        &self,
        datasource: DatasourceId,
    ) -> Result<Option<RunWithNodes>, RepositoryError> {
        let state = self.state.lock();
        Ok(state
            .runs
            .values()
            .filter(|r| r.run.datasource_id == datasource)
            .max_by_key(|r| r.seq)
            .map(|r| state.with_nodes(&r.run)))
    }

    async fn get_with_nodes(&self, run_id: RunId) -> Result<Option<RunWithNodes>, RepositoryError> {
        let state = self.state.lock();
        Ok(state.runs.get(&run_id).map(|r| state.with_nodes(&r.run)))
    }

    async fn has_running_for_project(&self, project: ProjectId) -> Result<bool, RepositoryError> {
        Ok(self
            .state
            .lock()
            .runs
            .values()
            .any(|r| r.run.project_id == project && r.run.status == RunStatus::Running))
    }

    async fn claim_ownership(
        &self,
        run_id: RunId,
        instance: InstanceId,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock();
        let stored = state
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| RepositoryError::not_found("run", run_id))?;
        let run = &mut stored.run;
        match run.owner {
            Some(owner) if owner != instance => Ok(false),
            _ => {
                run.owner = Some(instance);
                run.last_heartbeat = Some(Timestamp::now());
                Ok(true)
            }
        }
    }

    async fn release_ownership(
        &self,
        run_id: RunId,
        instance: InstanceId,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        if let Some(stored) = state.runs.get_mut(&run_id) {
            if stored.run.owner == Some(instance) {
                stored.run.owner = None;
            }
        }
        Ok(())
    }

    async fn update_heartbeat(
        &self,
        run_id: RunId,
        instance: InstanceId,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        let stored = state
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| RepositoryError::not_found("run", run_id))?;
        if stored.run.owner != Some(instance) {
            return Err(RepositoryError::Conflict {
                message: format!("instance {instance} does not own run {run_id}"),
            });
        }
        stored.run.last_heartbeat = Some(Timestamp::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontology::OntologyId;

    fn new_run(datasource: DatasourceId) -> ExtractionRun {
        ExtractionRun::new(ProjectId::new_random(), datasource, OntologyId::new_random())
    }

    #[tokio::test]
    async fn test_second_active_run_for_datasource_conflicts() {
        let store = InMemoryStore::new();
        let datasource = DatasourceId::new_random();
        store.create_run(&new_run(datasource)).await.unwrap();
        let err = store.create_run(&new_run(datasource)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { .. }));
        store.create_run(&new_run(DatasourceId::new_random())).await.unwrap();
    }

    #[tokio::test]
    async fn test_node_status_never_moves_backwards() {
        let store = InMemoryStore::new();
        let run = new_run(DatasourceId::new_random());
        store.create_run(&run).await.unwrap();
        let nodes = DagNode::canonical_for(run.id);
        store.create_nodes(&nodes).await.unwrap();
        let first = nodes[0].id;

        store.update_node_status(first, NodeStatus::Running, None).await.unwrap();
        store.update_node_status(first, NodeStatus::Completed, None).await.unwrap();
        let err = store
            .update_node_status(first, NodeStatus::Running, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_ownership_is_exclusive_until_released() {
        let store = InMemoryStore::new();
        let run = new_run(DatasourceId::new_random());
        store.create_run(&run).await.unwrap();
        let (a, b) = (InstanceId::new_random(), InstanceId::new_random());

        assert!(store.claim_ownership(run.id, a).await.unwrap());
        assert!(store.claim_ownership(run.id, a).await.unwrap());
        assert!(!store.claim_ownership(run.id, b).await.unwrap());
        assert!(store.update_heartbeat(run.id, b).await.is_err());

        store.release_ownership(run.id, a).await.unwrap();
        assert!(store.claim_ownership(run.id, b).await.unwrap());
    }
}
