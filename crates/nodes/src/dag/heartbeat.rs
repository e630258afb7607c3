//! Ownership heartbeat for an executing run.

use std::sync::Arc;
use std::time::Duration;

use ontology::ports::RunRepository;
use ontology::{InstanceId, RunId};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Refreshes the run's liveness timestamp every `interval` until `stop` fires.
///
/// The first beat is sent immediately. A failed beat is logged; the loop keeps
/// going.
pub(crate) fn spawn_heartbeat(
    runs: Arc<dyn RunRepository>,
    run_id: RunId,
    instance: InstanceId,
    interval: Duration,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = stop.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = runs.update_heartbeat(run_id, instance).await {
                        warn!(%run_id, error = %err, "heartbeat update failed");
                    }
                }
            }
        }
        debug!(%run_id, "heartbeat stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use memstore::InMemoryStore;
    use ontology::{DatasourceId, ExtractionRun, OntologyId, ProjectId};

    #[tokio::test]
    async fn test_heartbeat_refreshes_until_stopped() {
        let store = InMemoryStore::new();
        let run = ExtractionRun::new(
            ProjectId::new_random(),
            DatasourceId::new_random(),
            OntologyId::new_random(),
        );
        store.create_run(&run).await.unwrap();
        let owner = InstanceId::new_random();
        assert!(store.claim_ownership(run.id, owner).await.unwrap());
        let claimed_at = store.run(run.id).unwrap().run.last_heartbeat.unwrap();

        let stop = CancellationToken::new();
        let handle = spawn_heartbeat(
            Arc::new(store.clone()),
            run.id,
            owner,
            Duration::from_millis(10),
            stop.clone(),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.cancel();
        handle.await.unwrap();

        let beat = store.run(run.id).unwrap().run.last_heartbeat.unwrap();
        assert!(beat > claimed_at);
    }

    #[tokio::test]
    async fn test_heartbeat_survives_rejected_beats() {
        let store = InMemoryStore::new();
        let run = ExtractionRun::new(
            ProjectId::new_random(),
            DatasourceId::new_random(),
            OntologyId::new_random(),
        );
        store.create_run(&run).await.unwrap();

        let stop = CancellationToken::new();
        let handle = spawn_heartbeat(
            Arc::new(store.clone()),
            run.id,
            InstanceId::new_random(),
            Duration::from_millis(5),
            stop.clone(),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        stop.cancel();
        handle.await.unwrap();
        assert!(store.run(run.id).unwrap().run.last_heartbeat.is_none());
    }
}
