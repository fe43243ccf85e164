//! Concurrent batch executor (C11, §4.9). Spawns one task per execution
//! behind a bounded `Semaphore`, collects results in completion order via
//! a `JoinSet`, and serializes progress delivery through a single mpsc
//! consumer so a caller-supplied callback never sees interleaved calls —
//! grounded in the level-by-level `Semaphore` + `JoinSet` fan-out pattern
//! workflow engines in this pack use for bounded node concurrency.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use gre_ast::Value;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::exec::ActionExecutor;

#[derive(Debug, Clone)]
pub struct BatchExecution {
    pub entity_type: String,
    pub action_name: String,
    pub entity_id: i64,
    pub params: BTreeMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct BatchExecutionConfig {
    pub max_concurrent: usize,
    pub timeout_per_action: Duration,
}

impl Default for BatchExecutionConfig {
    fn default() -> Self {
        Self { max_concurrent: 10, timeout_per_action: Duration::from_secs(30) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchSuccess {
    pub entity_id: i64,
    pub changes: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub entity_id: i64,
    pub error: String,
}

/// Delivered sequentially to the caller's `progress_callback`, one at a time,
/// regardless of how many tasks finish concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
    pub entity_id: i64,
    pub success: bool,
    pub changes: Option<BTreeMap<String, Value>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchExecutionResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub successes: Vec<BatchSuccess>,
    pub failures: Vec<BatchFailure>,
    pub duration_seconds: f64,
}

pub struct BatchExecutor {
    executor: Arc<ActionExecutor>,
}

impl BatchExecutor {
    pub fn new(executor: Arc<ActionExecutor>) -> Self {
        Self { executor }
    }

    /// `progress` receives one `ProgressEvent` per completed execution, in
    /// completion order, never called concurrently with itself.
    pub async fn execute_batch<F>(&self, executions: Vec<BatchExecution>, config: BatchExecutionConfig, mut progress: Option<F>) -> BatchExecutionResult
    where
        F: FnMut(ProgressEvent) + Send,
    {
        let total = executions.len();
        let started = std::time::Instant::now();
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();

        let mut join_set: JoinSet<ProgressEvent> = JoinSet::new();
        for execution in executions {
            let sem = semaphore.clone();
            let executor = self.executor.clone();
            let timeout = config.timeout_per_action;
            let tx = tx.clone();
            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await.expect("batch semaphore closed");
                let event = run_one(&executor, execution, timeout).await;
                let _ = tx.send(event.clone());
                event
            });
        }
        drop(tx);

        // Draining the channel delivers progress strictly in completion
        // order and one at a time, independent of join_set's own ordering.
        let progress_task = tokio::spawn(async move {
            let mut delivered = Vec::with_capacity(total);
            let mut completed = 0usize;
            while let Some(mut event) = rx.recv().await {
                completed += 1;
                event.completed = completed;
                if let Some(cb) = progress.as_mut() {
                    cb(event.clone());
                }
                delivered.push(event);
            }
            delivered
        });

        while let Some(joined) = join_set.join_next().await {
            // Results already flow through the channel; joining here just
            // ensures every spawned task is awaited before we return.
            let _ = joined;
        }

        let events = progress_task.await.unwrap_or_default();

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for event in events {
            if event.success {
                successes.push(BatchSuccess { entity_id: event.entity_id, changes: event.changes.unwrap_or_default() });
            } else {
                failures.push(BatchFailure { entity_id: event.entity_id, error: event.error.unwrap_or_else(|| "unknown error".to_string()) });
            }
        }

        BatchExecutionResult {
            total,
            succeeded: successes.len(),
            failed: failures.len(),
            duration_seconds: started.elapsed().as_secs_f64(),
            successes,
            failures,
        }
    }
}

async fn run_one(executor: &Arc<ActionExecutor>, execution: BatchExecution, timeout: Duration) -> ProgressEvent {
    let entity_id = execution.entity_id;
    let fut = executor.execute(&execution.entity_type, &execution.action_name, entity_id, execution.params);
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(result)) if result.success => {
            ProgressEvent { completed: 0, total: 0, entity_id, success: true, changes: Some(result.changes), error: None }
        }
        Ok(Ok(result)) => ProgressEvent { completed: 0, total: 0, entity_id, success: false, changes: None, error: result.error },
        Ok(Err(e)) => ProgressEvent { completed: 0, total: 0, entity_id, success: false, changes: None, error: Some(e.to_string()) },
        Err(_) => ProgressEvent { completed: 0, total: 0, entity_id, success: false, changes: None, error: Some(format!("Timeout after {}s", timeout.as_secs())) },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;
    use gre_ast::{ActionDef, Expr, GraphEntity, SetStatement};

    use super::*;
    use crate::registry::ActionRegistry;
    use crate::store::InMemoryGraphStore;

    fn entity(name: &str) -> GraphEntity {
        GraphEntity { id: 0, name: name.to_string(), entity_type: "Supplier".to_string(), is_instance: true, properties: BTreeMap::new(), uri: None, created_at: Utc::now(), updated_at: Utc::now() }
    }

    #[tokio::test]
    async fn batch_runs_within_concurrency_limit_and_reports_progress_sequentially() {
        let store = InMemoryGraphStore::new();
        let ids: Vec<i64> = (0..5).map(|i| store.insert_entity(entity(&format!("S{i}")))).collect();

        let registry = Arc::new(ActionRegistry::new());
        registry.register(ActionDef {
            entity_type: "Supplier".to_string(),
            action_name: "mark".to_string(),
            parameters: vec![],
            preconditions: vec![],
            effect: Some(gre_ast::EffectBlock { sets: vec![SetStatement { target_path: vec!["this".into(), "marked".into()], value: Expr::Literal(Value::Bool(true)) }] }),
            description: None,
        });

        let executor = Arc::new(ActionExecutor::new(registry, store.clone(), None));
        let batch = BatchExecutor::new(executor);

        let executions: Vec<BatchExecution> = ids.iter().map(|&id| BatchExecution { entity_type: "Supplier".to_string(), action_name: "mark".to_string(), entity_id: id, params: BTreeMap::new() }).collect();

        let progress_log = Arc::new(Mutex::new(Vec::new()));
        let log2 = progress_log.clone();
        let result = batch
            .execute_batch(
                executions,
                BatchExecutionConfig { max_concurrent: 2, timeout_per_action: Duration::from_secs(5) },
                Some(move |event: ProgressEvent| log2.lock().unwrap().push(event.completed)),
            )
            .await;

        assert_eq!(result.total, 5);
        assert_eq!(result.succeeded, 5);
        assert_eq!(result.failed, 0);
        let log = progress_log.lock().unwrap();
        let mut sorted = log.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn missing_entity_is_recorded_as_a_failure_not_a_panic() {
        let store = InMemoryGraphStore::new();
        let registry = Arc::new(ActionRegistry::new());
        let executor = Arc::new(ActionExecutor::new(registry, store, None));
        let batch = BatchExecutor::new(executor);

        let executions = vec![BatchExecution { entity_type: "Supplier".to_string(), action_name: "mark".to_string(), entity_id: 999, params: BTreeMap::new() }];
        let result = batch.execute_batch::<fn(ProgressEvent)>(executions, BatchExecutionConfig::default(), None).await;

        assert_eq!(result.failed, 1);
        assert_eq!(result.failures[0].entity_id, 999);
    }
}
