//! Registries owned by the orchestrator: executors by node name and the
//! handles of runs this instance is currently executing.

use std::collections::HashMap;
use std::sync::Arc;

use ontology::ports::NodeExecutor;
use ontology::{NodeName, RunId};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Executors keyed by the node they implement.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<NodeName, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `executor` for `node`, replacing any previous one.
    pub fn register(&mut self, node: NodeName, executor: Arc<dyn NodeExecutor>) -> &mut Self {
        self.executors.insert(node, executor);
        self
    }

    pub fn with(mut self, node: NodeName, executor: Arc<dyn NodeExecutor>) -> Self {
        self.register(node, executor);
        self
    }

    pub fn get(&self, node: NodeName) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(&node).cloned()
    }

    /// Canonical nodes with no registered executor.
    pub fn missing(&self) -> Vec<NodeName> {
        NodeName::ALL
            .into_iter()
            .filter(|n| !self.executors.contains_key(n))
            .collect()
    }
}

/// Signals held for one executing run.
#[derive(Debug, Clone)]
pub(crate) struct RunHandle {
    pub cancel: CancellationToken,
    pub heartbeat: CancellationToken,
}

/// Runs executing on this instance.
///
/// Entries are inserted when execution is spawned and removed only by the
/// execution's teardown.
#[derive(Debug, Default)]
pub(crate) struct RunRegistry {
    handles: Mutex<HashMap<RunId, RunHandle>>,
}

impl RunRegistry {
    pub fn register(&self, run_id: RunId) -> RunHandle {
        let handle = RunHandle {
            cancel: CancellationToken::new(),
            heartbeat: CancellationToken::new(),
        };
        self.handles.lock().insert(run_id, handle.clone());
        handle
    }

    /// Signals the run's cancellation token. Returns `false` when the run is
    /// not executing here.
    pub fn cancel(&self, run_id: RunId) -> bool {
        match self.handles.lock().get(&run_id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Signals every run and stops its heartbeat. Returns the number signalled.
    pub fn cancel_all(&self) -> usize {
        let handles = self.handles.lock();
        for handle in handles.values() {
            handle.cancel.cancel();
            handle.heartbeat.cancel();
        }
        handles.len()
    }

    pub fn remove(&self, run_id: RunId) -> Option<RunHandle> {
        self.handles.lock().remove(&run_id)
    }

    pub fn contains(&self, run_id: RunId) -> bool {
        self.handles.lock().contains_key(&run_id)
    }

    pub fn run_ids(&self) -> Vec<RunId> {
        self.handles.lock().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_signals_only_registered_run() {
        let registry = RunRegistry::default();
        let run = RunId::new_random();
        let handle = registry.register(run);

        assert!(!registry.cancel(RunId::new_random()));
        assert!(registry.cancel(run));
        assert!(handle.cancel.is_cancelled());
        assert!(!handle.heartbeat.is_cancelled());
    }

    #[test]
    fn test_cancel_all_stops_heartbeats_but_keeps_entries() {
        let registry = RunRegistry::default();
        let a = registry.register(RunId::new_random());
        let b = registry.register(RunId::new_random());
        assert_eq!(registry.cancel_all(), 2);
        assert!(a.heartbeat.is_cancelled() && b.heartbeat.is_cancelled());
        assert_eq!(registry.run_ids().len(), 2);
    }

    #[test]
    fn test_missing_executors_listed_in_order() {
        struct Noop;
        #[async_trait::async_trait]
        impl NodeExecutor for Noop {
            async fn execute(
                &self,
                _ctx: &ontology::ports::NodeContext<'_>,
            ) -> Result<(), ontology::NodeError> {
                Ok(())
            }
        }
        let registry = ExecutorRegistry::new().with(NodeName::EntityDiscovery, Arc::new(Noop));
        let missing = registry.missing();
        assert_eq!(missing.len(), NodeName::ALL.len() - 1);
        assert_eq!(missing[0], NodeName::ColumnFeatureExtraction);
        assert!(!missing.contains(&NodeName::EntityDiscovery));
    }
}
