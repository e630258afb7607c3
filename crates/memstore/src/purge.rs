//! Transactional project purge.
//!
//! Deletes are staged against a consistent view and applied in one critical
//! section on commit, so a rolled-back or abandoned transaction leaves the
//! store untouched.

use async_trait::async_trait;
use ontology::ports::{ProjectPurge, PurgeStep, PurgeTransaction};
use ontology::{ProjectId, RepositoryError};

use crate::{InMemoryStore, State};

#[async_trait]
impl ProjectPurge for InMemoryStore {
    async fn begin(&self, project: ProjectId) -> Result<Box<dyn PurgeTransaction>, RepositoryError> {
        Ok(Box::new(InMemoryPurge {
            store: self.clone(),
            project,
            staged: Vec::new(),
        }))
    }
}

struct InMemoryPurge {
    store: InMemoryStore,
    project: ProjectId,
    staged: Vec<PurgeStep>,
}

impl State {
    fn count_for(&self, project: ProjectId, step: PurgeStep) -> u64 {
        let of = |rows: &[crate::ProjectRow]| rows.iter().filter(|r| r.project_id == project).count();
        let count = match step {
            PurgeStep::Runs => self.runs.values().filter(|r| r.run.project_id == project).count(),
            PurgeStep::Relationships => of(&self.relationships),
            PurgeStep::Entities => self.entities.iter().filter(|e| e.project_id == project).count(),
            PurgeStep::Questions => self.questions.iter().filter(|q| q.project_id == project).count(),
            PurgeStep::ChatHistory => of(&self.chat_history),
            PurgeStep::Knowledge => of(&self.knowledge),
            PurgeStep::Ontologies => self.ontologies.iter().filter(|o| o.project_id == project).count(),
        };
        count as u64
    }

    fn purge(&mut self, project: ProjectId, step: PurgeStep) {
        match step {
            PurgeStep::Runs => {
                self.runs.retain(|_, r| r.run.project_id != project);
                let runs = &self.runs;
                self.nodes.retain(|_, n| runs.contains_key(&n.run_id));
            }
            PurgeStep::Relationships => self.relationships.retain(|r| r.project_id != project),
            PurgeStep::Entities => self.entities.retain(|e| e.project_id != project),
            PurgeStep::Questions => self.questions.retain(|q| q.project_id != project),
            PurgeStep::ChatHistory => self.chat_history.retain(|r| r.project_id != project),
            PurgeStep::Knowledge => self.knowledge.retain(|r| r.project_id != project),
            PurgeStep::Ontologies => self.ontologies.retain(|o| o.project_id != project),
        }
    }
}

#[async_trait]
impl PurgeTransaction for InMemoryPurge {
    async fn delete(&mut self, step: PurgeStep) -> Result<u64, RepositoryError> {
        let count = self.store.state.lock().count_for(self.project, step);
        if !self.staged.contains(&step) {
            self.staged.push(step);
        }
        Ok(count)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let mut state = self.store.state.lock();
        for step in &self.staged {
            state.purge(self.project, *step);
        }
        tracing::debug!(project = %self.project, steps = self.staged.len(), "purge committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        tracing::debug!(project = %self.project, steps = self.staged.len(), "purge rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityRecord;
    use ontology::ports::{OntologyRepository, RunRepository};
    use ontology::{DagNode, DatasourceId, ExtractionRun};

    async fn seeded(project: ProjectId) -> InMemoryStore {
        let store = InMemoryStore::new();
        let ontology = store.get_or_create_active(project).await.unwrap();
        let run = ExtractionRun::new(project, DatasourceId::new_random(), ontology.id);
        store.create_run(&run).await.unwrap();
        store.create_nodes(&DagNode::canonical_for(run.id)).await.unwrap();
        store.add_entity(EntityRecord {
            project_id: project,
            ontology_id: ontology.id,
            name: "customer".into(),
            is_inferred: true,
        });
        store.add_relationship(project, "customer places order");
        store.add_chat_message(project, "hello");
        store.add_knowledge(project, "fiscal year starts in April");
        store
    }

    #[tokio::test]
    async fn test_commit_removes_every_project_row() {
        let project = ProjectId::new_random();
        let store = seeded(project).await;
        let other = ProjectId::new_random();
        store.add_knowledge(other, "unrelated");
        assert!(store.project_rows(project) > 0);

        let mut tx = store.begin(project).await.unwrap();
        let mut deleted = 0;
        for step in PurgeStep::ORDER {
            deleted += tx.delete(step).await.unwrap();
        }
        tx.commit().await.unwrap();

        // Nodes cascade with their run and are not counted separately.
        assert_eq!(deleted, 6);
        assert_eq!(store.project_rows(project), 0);
        assert_eq!(store.project_rows(other), 1);
    }

    #[tokio::test]
    async fn test_rollback_keeps_everything() {
        let project = ProjectId::new_random();
        let store = seeded(project).await;
        let before = store.project_rows(project);

        let mut tx = store.begin(project).await.unwrap();
        tx.delete(PurgeStep::Runs).await.unwrap();
        tx.delete(PurgeStep::Entities).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.project_rows(project), before);
    }
}
