//! Background execution of one run: supervision, the node loop, failure
//! recording and teardown.

use std::any::Any;
use std::sync::Arc;

use ontology::ports::{NodeContext, TenantContext};
use ontology::{
    DagNode, ExtractionRun, NodeError, NodeName, NodeStatus, RepositoryError, RunId, RunStatus,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::heartbeat::spawn_heartbeat;
use super::registry::RunHandle;
use super::{DagError, Inner};
use crate::retry::with_retry;

/// Supervises one run from spawn to teardown.
///
/// The node loop runs in its own task so that a panic surfaces as a
/// `JoinError` here instead of unwinding through the supervisor. Whatever
/// happens, teardown runs exactly once.
pub(crate) async fn supervise(inner: Arc<Inner>, run_id: RunId, handle: RunHandle) {
    let span = info_span!("extraction_run", %run_id, instance = %inner.instance);
    async move {
        let body = tokio::spawn(
            execute_run(Arc::clone(&inner), run_id, handle.cancel.clone()).in_current_span(),
        );
        let heartbeat = spawn_heartbeat(
            Arc::clone(&inner.ports.runs),
            run_id,
            inner.instance,
            inner.config.heartbeat_interval(),
            handle.heartbeat.clone(),
        );

        match body.await {
            Ok(Ok(())) => {}
            Ok(Err(DagError::NodeFailed { node, source })) => {
                record_failure(&inner, run_id, Some(node), source.to_string()).await;
            }
            Ok(Err(err)) => {
                record_failure(&inner, run_id, None, err.to_string()).await;
            }
            Err(join_err) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                error!(panic = %message, "extraction task panicked");
                record_failure(&inner, run_id, None, format!("panic: {message}")).await;
            }
            Err(join_err) => {
                record_failure(&inner, run_id, None, join_err.to_string()).await;
            }
        }

        teardown(&inner, run_id, &handle, heartbeat).await;
    }
    .instrument(span)
    .await
}

/// The node loop.
///
/// Cancellation is checked between nodes; a cancelled run returns quietly
/// since its persisted state was already set by the canceller.
async fn execute_run(
    inner: Arc<Inner>,
    run_id: RunId,
    cancel: CancellationToken,
) -> Result<(), DagError> {
    let runs = &inner.ports.runs;
    let snapshot = runs
        .get_with_nodes(run_id)
        .await?
        .ok_or(DagError::RunNotFound(run_id))?;
    let run = snapshot.run;
    let tenant = inner.ports.tenants.acquire(run.project_id).await?;

    for node in &snapshot.nodes {
        match node.status {
            NodeStatus::Completed => {
                debug!(node = %node.name, "node already completed; skipping");
                continue;
            }
            NodeStatus::Skipped | NodeStatus::Failed => {
                warn!(node = %node.name, status = %node.status, "node already terminal; skipping");
                continue;
            }
            NodeStatus::Pending | NodeStatus::Running => {}
        }
        if stopped(&inner, run_id, &cancel).await? {
            return Ok(());
        }
        execute_node(&inner, &run, node, &tenant).await?;
    }

    if stopped(&inner, run_id, &cancel).await? {
        return Ok(());
    }
    runs.update_run_status(run_id, RunStatus::Completed, None).await?;
    info!("extraction completed");
    Ok(())
}

/// Whether the run was cancelled locally or finished elsewhere.
async fn stopped(inner: &Inner, run_id: RunId, cancel: &CancellationToken) -> Result<bool, DagError> {
    if cancel.is_cancelled() {
        info!("cancellation observed; stopping");
        return Ok(true);
    }
    let current = inner
        .ports
        .runs
        .get_with_nodes(run_id)
        .await?
        .ok_or(DagError::RunNotFound(run_id))?;
    if current.run.status.is_terminal() {
        info!(status = %current.run.status, "run finished externally; stopping");
        return Ok(true);
    }
    Ok(false)
}

async fn execute_node(
    inner: &Inner,
    run: &ExtractionRun,
    node: &DagNode,
    tenant: &TenantContext,
) -> Result<(), DagError> {
    let runs = &inner.ports.runs;
    runs.set_current_node(run.id, node.name).await?;
    if node.status == NodeStatus::Pending {
        match runs.update_node_status(node.id, NodeStatus::Running, None).await {
            Ok(()) => {}
            Err(RepositoryError::Conflict { message }) => {
                // Skipped by a canceller; the loop's next stop check ends the run.
                debug!(node = %node.name, %message, "node no longer pending; not executing");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }
    }
    info!(node = %node.name, "node started");

    let result = match inner.executors.get(node.name) {
        None => Err(NodeError::Configuration {
            message: format!("no executor registered for node {}", node.name),
        }),
        Some(executor) => {
            let ctx = NodeContext {
                run_id: run.id,
                project_id: run.project_id,
                datasource_id: run.datasource_id,
                ontology_id: run.ontology_id,
                node: node.name,
                tenant,
            };
            with_retry(&inner.config.node_retry, node.name.as_str(), || {
                executor.execute(&ctx)
            })
            .await
        }
    };
    result.map_err(|source| DagError::NodeFailed {
        node: node.name,
        source,
    })?;

    match runs.update_node_status(node.id, NodeStatus::Completed, None).await {
        Ok(()) => info!(node = %node.name, "node completed"),
        Err(RepositoryError::Conflict { message }) => {
            debug!(node = %node.name, %message, "node skipped while executing");
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

/// Records a run failure against the attributed node.
///
/// Runs that are already terminal (cancelled, completed elsewhere) are left
/// as they are. Storage errors here are logged; there is no one left to
/// return them to.
async fn record_failure(inner: &Inner, run_id: RunId, node: Option<NodeName>, message: String) {
    let runs = &inner.ports.runs;
    let snapshot = match runs.get_with_nodes(run_id).await {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            warn!(error = %message, "failed run no longer exists");
            return;
        }
        Err(err) => {
            error!(error = %message, storage_error = %err, "could not load run to record failure");
            return;
        }
    };
    if snapshot.run.status.is_terminal() {
        debug!(status = %snapshot.run.status, error = %message, "run already terminal; failure not recorded");
        return;
    }

    let attributed = node
        .and_then(|name| snapshot.nodes.iter().find(|n| n.name == name))
        .or_else(|| snapshot.failure_node());
    let run_error = match attributed {
        Some(node) => {
            if !node.status.is_terminal() {
                if let Err(err) = runs
                    .update_node_status(node.id, NodeStatus::Failed, Some(message.clone()))
                    .await
                {
                    error!(node = %node.name, error = %err, "could not mark node failed");
                }
            }
            format!("{}: {message}", node.name)
        }
        None => message,
    };

    error!(error = %run_error, "extraction failed");
    if let Err(err) = runs
        .update_run_status(run_id, RunStatus::Failed, Some(run_error))
        .await
    {
        error!(error = %err, "could not mark run failed");
    }
}

async fn teardown(
    inner: &Inner,
    run_id: RunId,
    handle: &RunHandle,
    heartbeat: tokio::task::JoinHandle<()>,
) {
    inner.runs.remove(run_id);
    handle.heartbeat.cancel();
    if let Err(err) = heartbeat.await {
        warn!(error = %err, "heartbeat task ended abnormally");
    }
    if let Err(err) = inner
        .ports
        .runs
        .release_ownership(run_id, inner.instance)
        .await
    {
        warn!(error = %err, "could not release run ownership");
    }
    debug!("run teardown complete");
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_handles_common_payloads() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(7_u32)), "non-string panic payload");
    }
}
