//! Transactional action executor (C7, §4.6). Preconditions are read-only and
//! evaluated in order — the first failure short-circuits with no side
//! effects; effects and persistence happen only after every precondition
//! passes, and one `UpdateEvent` is emitted per property whose value
//! actually changed.

use std::collections::BTreeMap;
use std::sync::Arc;

use gre_ast::{UpdateEvent, Value};

use crate::errors::EngineError;
use crate::event::GraphEventEmitter;
use crate::eval::{entity_to_value, EvalContext, Evaluator};
use crate::registry::ActionRegistry;
use crate::store::GraphStore;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub error: Option<String>,
    pub changes: BTreeMap<String, Value>,
    /// Events this execution emitted, in emission order — handed back so a
    /// caller driving the reactive cascade (`crate::engine::RuleEngine`)
    /// doesn't have to re-derive them from `changes`.
    pub emitted_events: Vec<UpdateEvent>,
}

impl ExecutionResult {
    fn failure(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()), changes: BTreeMap::new(), emitted_events: Vec::new() }
    }

    fn success(changes: BTreeMap<String, Value>, emitted_events: Vec<UpdateEvent>) -> Self {
        Self { success: true, error: None, changes, emitted_events }
    }
}

pub struct ActionExecutor {
    registry: Arc<ActionRegistry>,
    store: Arc<dyn GraphStore>,
    event_emitter: Option<Arc<GraphEventEmitter>>,
    evaluator: Evaluator,
}

impl ActionExecutor {
    pub fn new(registry: Arc<ActionRegistry>, store: Arc<dyn GraphStore>, event_emitter: Option<Arc<GraphEventEmitter>>) -> Self {
        Self { registry, store, event_emitter, evaluator: Evaluator::new() }
    }

    pub fn store(&self) -> Arc<dyn GraphStore> {
        self.store.clone()
    }

    /// Looks up `entity_type.action_name`, evaluates it against `target_id`
    /// with `params` bound as plain variables (already-evaluated — callers
    /// resolve a `TRIGGER ... WITH {...}` statement's expressions before
    /// invoking this).
    pub async fn execute(
        &self,
        entity_type: &str,
        action_name: &str,
        target_id: i64,
        params: BTreeMap<String, Value>,
    ) -> Result<ExecutionResult, EngineError> {
        let Some(action) = self.registry.lookup(entity_type, action_name) else {
            tracing::info!(entity_type, action_name, "action not found");
            return Ok(ExecutionResult::failure(format!("Action {entity_type}.{action_name} not found")));
        };

        let entity = self
            .store
            .get_entity(target_id)
            .await?
            .ok_or_else(|| EngineError::Eval(format!("entity {target_id} not found for action execution")))?;

        let ctx = EvalContext::for_entity(entity_to_value(&entity), Default::default()).with_variables(params);

        for precondition in &action.preconditions {
            let passed = self.evaluator.evaluate_bool(&precondition.condition, &ctx).await?;
            if !passed {
                tracing::info!(entity_type, action_name, on_failure = %precondition.on_failure, "precondition failed");
                return Ok(ExecutionResult::failure(precondition.on_failure.clone()));
            }
        }

        let mut changes = BTreeMap::new();
        if let Some(effect) = &action.effect {
            for set in &effect.sets {
                let value = self.evaluator.evaluate(&set.value, &ctx).await?;
                let Some(prop_name) = set.target_path.last().cloned() else {
                    continue;
                };
                changes.insert(prop_name, value);
            }
        }

        let mut emitted_events = Vec::new();
        if !changes.is_empty() {
            self.store.run_in_transaction(vec![(target_id, changes.clone())]).await?;
            emitted_events = self.build_update_events(entity_type, target_id, &changes, &entity.properties);
            for event in &emitted_events {
                if let Some(emitter) = &self.event_emitter {
                    emitter.emit(event.clone());
                }
            }
        }

        Ok(ExecutionResult::success(changes, emitted_events))
    }

    fn build_update_events(&self, entity_type: &str, entity_id: i64, changes: &BTreeMap<String, Value>, old_properties: &BTreeMap<String, Value>) -> Vec<UpdateEvent> {
        changes
            .iter()
            .filter_map(|(key, new_value)| {
                let old_value = old_properties.get(key).cloned().unwrap_or(Value::Null);
                if &old_value == new_value {
                    return None;
                }
                Some(UpdateEvent { entity_type: entity_type.to_string(), entity_id, property: key.clone(), old_value, new_value: new_value.clone() })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use gre_ast::{ActionDef, Expr, Precondition, SetStatement};

    use super::*;
    use crate::store::InMemoryGraphStore;

    fn supplier(status: &str) -> gre_ast::GraphEntity {
        let mut properties = BTreeMap::new();
        properties.insert("status".to_string(), Value::String(status.to_string()));
        gre_ast::GraphEntity {
            id: 0,
            name: "Acme".to_string(),
            entity_type: "Supplier".to_string(),
            is_instance: true,
            properties,
            uri: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn precondition_failure_short_circuits_with_no_changes() {
        let store = InMemoryGraphStore::new();
        let id = store.insert_entity(supplier("Blacklisted"));
        let registry = Arc::new(ActionRegistry::new());
        registry.register(ActionDef {
            entity_type: "Supplier".to_string(),
            action_name: "reinstate".to_string(),
            parameters: vec![],
            preconditions: vec![Precondition {
                name: None,
                condition: Expr::Compare {
                    op: gre_ast::CompareOp::Ne,
                    left: Box::new(Expr::path(&["this", "status"])),
                    right: Box::new(Expr::Literal(Value::String("Blacklisted".into()))),
                },
                on_failure: "supplier is blacklisted".to_string(),
            }],
            effect: None,
            description: None,
        });

        let executor = ActionExecutor::new(registry, store.clone(), None);
        let result = executor.execute("Supplier", "reinstate", id, BTreeMap::new()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("supplier is blacklisted"));
        assert!(result.changes.is_empty());
    }

    #[tokio::test]
    async fn effect_persists_and_emits_only_changed_properties() {
        let store = InMemoryGraphStore::new();
        let id = store.insert_entity(supplier("Active"));
        let registry = Arc::new(ActionRegistry::new());
        registry.register(ActionDef {
            entity_type: "Supplier".to_string(),
            action_name: "suspend".to_string(),
            parameters: vec![],
            preconditions: vec![],
            effect: Some(gre_ast::EffectBlock {
                sets: vec![SetStatement { target_path: vec!["this".into(), "status".into()], value: Expr::Literal(Value::String("Suspended".into())) }],
            }),
            description: None,
        });

        let executor = ActionExecutor::new(registry, store.clone(), None);
        let result = executor.execute("Supplier", "suspend", id, BTreeMap::new()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.changes.get("status"), Some(&Value::String("Suspended".into())));

        let updated = store.get_entity(id).await.unwrap().unwrap();
        assert_eq!(updated.property("status"), Some(&Value::String("Suspended".into())));
    }

    #[tokio::test]
    async fn unknown_action_reports_failure_not_error() {
        let store = InMemoryGraphStore::new();
        let id = store.insert_entity(supplier("Active"));
        let executor = ActionExecutor::new(Arc::new(ActionRegistry::new()), store, None);
        let result = executor.execute("Supplier", "nope", id, BTreeMap::new()).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not found"));
    }
}
