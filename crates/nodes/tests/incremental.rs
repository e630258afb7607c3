//! Incremental enrichment of single approved changes.

mod support;

use std::sync::Arc;

use nodes::{ApprovedChange, ClassifierRegistry, IncrementalEnrichmentService, PipelineError};
use ontology::{LlmError, RepositoryError};

use support::{PipelineFixture, ScriptedFactory, ScriptedLlm};

fn service(fixture: &PipelineFixture, llm: Arc<ScriptedFactory>) -> IncrementalEnrichmentService {
    let store = Arc::new(fixture.store.clone());
    IncrementalEnrichmentService::new(
        store.clone(),
        llm,
        store,
        Arc::new(ClassifierRegistry::preloaded()),
    )
}

#[tokio::test]
async fn test_new_column_classifies_only_that_column() {
    let fixture = PipelineFixture::with_columns(&["title", "body"]);
    let llm = Arc::new(ScriptedLlm::new());
    let service = service(&fixture, Arc::new(ScriptedFactory::new(llm.clone())));

    let change = ApprovedChange::NewColumn {
        table: "NOTES".into(),
        column: "body".into(),
    };
    let features = service
        .apply(fixture.project, fixture.datasource, &change)
        .await
        .unwrap();

    assert_eq!(features.len(), 1);
    assert_eq!(features[0].column_name, "body");
    assert_eq!(llm.calls(), 1);
    assert_eq!(fixture.store.column_features(fixture.project).len(), 1);
}

#[tokio::test]
async fn test_new_table_classifies_every_column() {
    let fixture = PipelineFixture::with_columns(&["title", "body", "summary"]);
    let llm = Arc::new(ScriptedLlm::new());
    let service = service(&fixture, Arc::new(ScriptedFactory::new(llm.clone())));

    let change = ApprovedChange::NewTable {
        table: "notes".into(),
    };
    let features = service
        .apply(fixture.project, fixture.datasource, &change)
        .await
        .unwrap();

    assert_eq!(features.len(), 3);
    assert_eq!(fixture.store.column_features(fixture.project).len(), 3);
}

#[tokio::test]
async fn test_unknown_column_is_not_found() {
    let fixture = PipelineFixture::with_columns(&["title"]);
    let service = service(
        &fixture,
        Arc::new(ScriptedFactory::new(Arc::new(ScriptedLlm::new()))),
    );

    let change = ApprovedChange::ModifiedColumn {
        table: "notes".into(),
        column: "missing".into(),
    };
    let err = service
        .apply(fixture.project, fixture.datasource, &change)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Repository(RepositoryError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_missing_llm_refuses_enrichment() {
    let fixture = PipelineFixture::with_columns(&["title"]);
    let service = service(&fixture, Arc::new(ScriptedFactory::unconfigured()));

    let change = ApprovedChange::NewTable {
        table: "notes".into(),
    };
    let err = service
        .apply(fixture.project, fixture.datasource, &change)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::LlmUnavailable {
            source: LlmError::NotConfigured { .. },
            ..
        }
    ));
    assert!(fixture.store.column_features(fixture.project).is_empty());
}

#[test]
fn test_change_parses_from_tagged_json() {
    let change: ApprovedChange =
        serde_json::from_str(r#"{"kind":"new_column","table":"orders","column":"paid_at"}"#)
            .unwrap();
    assert_eq!(
        change,
        ApprovedChange::NewColumn {
            table: "orders".into(),
            column: "paid_at".into()
        }
    );
}
