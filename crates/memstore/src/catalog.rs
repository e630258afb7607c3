use std::sync::atomic::Ordering;

use async_trait::async_trait;
use ontology::ports::{
    ColumnMetadataStore, EntityRepository, OntologyRepository, QuestionStore, SchemaSource,
    TenantContext, TenantScope,
};
use ontology::{
    ColumnFeatures, DatasourceId, NewQuestion, Ontology, OntologyId, OntologyQuestion, ProjectId,
    QuestionId, QuestionStatus, RepositoryError, SchemaTable, Timestamp,
};

use crate::{InMemoryStore, StoredFeatures};

#[async_trait]
impl OntologyRepository for InMemoryStore {
    async fn get_or_create_active(&self, project: ProjectId) -> Result<Ontology, RepositoryError> {
        let mut state = self.state.lock();
        if let Some(active) = state
            .ontologies
            .iter()
            .find(|o| o.project_id == project && o.is_active)
        {
            return Ok(active.clone());
        }
        let version = state
            .ontologies
            .iter()
            .filter(|o| o.project_id == project)
            .map(|o| o.version)
            .max()
            .unwrap_or(0)
            + 1;
        let ontology = Ontology {
            id: OntologyId::new_random(),
            project_id: project,
            version,
            is_active: true,
            created_at: Timestamp::now(),
        };
        state.ontologies.push(ontology.clone());
        tracing::debug!(%project, ontology = %ontology.id, version, "ontology created");
        Ok(ontology)
    }

    async fn get_active(&self, project: ProjectId) -> Result<Option<Ontology>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .ontologies
            .iter()
            .find(|o| o.project_id == project && o.is_active)
            .cloned())
    }
}

#[async_trait]
impl EntityRepository for InMemoryStore {
    async fn delete_inferred_for_ontology(
        &self,
        ontology: OntologyId,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.state.lock();
        let before = state.entities.len();
        state
            .entities
            .retain(|e| !(e.ontology_id == ontology && e.is_inferred));
        Ok((before - state.entities.len()) as u64)
    }
}

#[async_trait]
impl TenantScope for InMemoryStore {
    async fn acquire(&self, project: ProjectId) -> Result<TenantContext, RepositoryError> {
        let open = self.open_tenants.clone();
        open.fetch_add(1, Ordering::SeqCst);
        Ok(TenantContext::new(project, move || {
            open.fetch_sub(1, Ordering::SeqCst);
        }))
    }
}

#[async_trait]
impl SchemaSource for InMemoryStore {
    async fn list_tables(
        &self,
        project: ProjectId,
        datasource: DatasourceId,
    ) -> Result<Vec<SchemaTable>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .schemas
            .get(&(project, datasource))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ColumnMetadataStore for InMemoryStore {
    async fn upsert_column_features(
        &self,
        project: ProjectId,
        features: &ColumnFeatures,
    ) -> Result<(), RepositoryError> {
        self.state.lock().features.insert(
            features.column_id,
            StoredFeatures {
                project_id: project,
                features: features.clone(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl QuestionStore for InMemoryStore {
    async fn list_open(&self, ontology: OntologyId) -> Result<Vec<OntologyQuestion>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .questions
            .iter()
            .filter(|q| q.ontology_id == ontology && q.status == QuestionStatus::Pending)
            .cloned()
            .collect())
    }

    async fn create(&self, question: NewQuestion) -> Result<OntologyQuestion, RepositoryError> {
        let stored = OntologyQuestion {
            id: QuestionId::new_random(),
            project_id: question.project_id,
            ontology_id: question.ontology_id,
            text: question.text,
            affected_column: question.affected_column,
            affected_table: question.affected_table,
            category: question.category,
            priority: question.priority,
            status: QuestionStatus::Pending,
            created_at: Timestamp::now(),
        };
        self.state.lock().questions.push(stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityRecord;

    #[tokio::test]
    async fn test_active_ontology_is_reused() {
        let store = InMemoryStore::new();
        let project = ProjectId::new_random();
        let first = store.get_or_create_active(project).await.unwrap();
        let second = store.get_or_create_active(project).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.version, 1);
        assert_eq!(store.get_active(project).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_only_inferred_entities_are_deleted() {
        let store = InMemoryStore::new();
        let project = ProjectId::new_random();
        let ontology = store.get_or_create_active(project).await.unwrap().id;
        for (name, is_inferred) in [("customer", true), ("order", true), ("region", false)] {
            store.add_entity(EntityRecord {
                project_id: project,
                ontology_id: ontology,
                name: name.into(),
                is_inferred,
            });
        }

        assert_eq!(store.delete_inferred_for_ontology(ontology).await.unwrap(), 2);
        let left = store.entities(ontology);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].name, "region");
    }

    #[tokio::test]
    async fn test_tenant_context_released_on_drop() {
        let store = InMemoryStore::new();
        let ctx = store.acquire(ProjectId::new_random()).await.unwrap();
        assert_eq!(store.open_tenants(), 1);
        drop(ctx);
        assert_eq!(store.open_tenants(), 0);
    }

    #[tokio::test]
    async fn test_answered_questions_are_not_open() {
        let store = InMemoryStore::new();
        let project = ProjectId::new_random();
        let ontology = OntologyId::new_random();
        let created = store
            .create(NewQuestion {
                project_id: project,
                ontology_id: ontology,
                text: "What does flag mean?".into(),
                affected_column: Some("flag".into()),
                affected_table: Some("orders".into()),
                source_column_id: None,
                category: "column_semantics".into(),
                priority: 3,
            })
            .await
            .unwrap();
        assert_eq!(store.list_open(ontology).await.unwrap().len(), 1);

        store
            .state
            .lock()
            .questions
            .iter_mut()
            .filter(|q| q.id == created.id)
            .for_each(|q| q.status = QuestionStatus::Answered);
        assert!(store.list_open(ontology).await.unwrap().is_empty());
    }
}
