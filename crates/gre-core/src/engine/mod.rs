//! Reactive rule engine (C10, §4.8). Drives the cascade explicitly rather
//! than through `GraphEventEmitter::subscribe`: that emitter's listener
//! type is a plain synchronous closure (§4.7), while rule execution needs
//! async store I/O, and §4.8 requires a *synchronous, depth-first* cascade
//! in priority order — bridging a sync callback into an async runtime
//! would either block a worker thread or reorder the cascade behind
//! spawned tasks. Instead, `ActionExecutor::execute` hands back the
//! `UpdateEvent`s it emitted (still fanning them out through the shared
//! emitter for any plain observers), and whoever drives execution — an
//! external caller, or this engine's own `TRIGGER`/`SET` handling —
//! threads them straight into `handle_event`, preserving one call stack
//! per cascade.

use std::collections::BTreeMap;
use std::sync::Arc;

use gre_ast::{ForClause, Statement, Trigger, TriggerStatement, TriggerType, UpdateEvent, Value};

use crate::bindings::{initial_bindings, BoundVar, Bindings};
use crate::errors::EngineError;
use crate::eval::{entity_to_value, EvalContext, Evaluator};
use crate::exec::ActionExecutor;
use crate::registry::RuleRegistry;
use crate::store::GraphStore;

/// §4.8: cascaded executions beyond this depth are dropped with a warning;
/// the action that started the cascade still reports success.
pub const DEFAULT_CASCADE_LIMIT: u32 = 16;

pub struct RuleEngine {
    rule_registry: Arc<RuleRegistry>,
    action_executor: Arc<ActionExecutor>,
    evaluator: Evaluator,
    cascade_limit: u32,
}

impl RuleEngine {
    pub fn new(rule_registry: Arc<RuleRegistry>, action_executor: Arc<ActionExecutor>) -> Self {
        Self { rule_registry, action_executor, evaluator: Evaluator::new(), cascade_limit: DEFAULT_CASCADE_LIMIT }
    }

    pub fn with_cascade_limit(mut self, limit: u32) -> Self {
        self.cascade_limit = limit;
        self
    }

    /// Entry point for both externally-originated events (`depth = 0`) and
    /// cascaded ones. Matches rules by trigger key and runs each body in
    /// priority order; a single rule's failure is logged and does not abort
    /// its siblings.
    pub async fn handle_event(&self, event: &UpdateEvent, depth: u32) {
        if depth > self.cascade_limit {
            tracing::warn!(entity_type = %event.entity_type, property = %event.property, depth, limit = self.cascade_limit, "cascade depth exceeded, dropping further execution");
            return;
        }

        let trigger = Trigger { trigger_type: TriggerType::Update, entity_type: event.entity_type.clone(), property: Some(event.property.clone()) };
        let rules = self.rule_registry.get_by_trigger(&trigger);
        if rules.is_empty() {
            return;
        }
        tracing::info!(entity_type = %event.entity_type, property = %event.property, matched = rules.len(), "rule engine matched rules for event");

        let bindings = initial_bindings(&event.entity_type, event.entity_id);
        for rule in rules {
            if let Err(e) = self.execute_for(&rule.body, bindings.clone(), depth).await {
                tracing::warn!(rule = %rule.name, error = %e, "rule execution failed, continuing with sibling rules");
            }
        }
    }

    /// §4.8 "Body execution": translates/evaluates the `FOR` clause against
    /// the store, then runs every inner statement once per matching row.
    async fn execute_for(&self, for_clause: &ForClause, bindings: Bindings, depth: u32) -> Result<(), EngineError> {
        let store = self.action_executor.store();
        let rows = store.query_for_clause(for_clause, &bindings).await?;

        for row in rows {
            let mut row_bindings = bindings.clone();
            row_bindings.insert(for_clause.variable.clone(), BoundVar { entity_type: row.entity_type.clone(), entity_id: row.id });
            let variables = self.resolve_variables(&row_bindings, &store).await?;
            let ctx = EvalContext::for_entity(entity_to_value(&row), row_bindings.clone()).with_variables(variables.clone()).with_store(store.clone());

            for stmt in &for_clause.statements {
                match stmt {
                    Statement::Set { target_path, value } => {
                        self.apply_set(target_path, value, &ctx, &row_bindings, depth, &store).await?;
                    }
                    Statement::Trigger(trigger_stmt) => {
                        self.apply_trigger(trigger_stmt, &variables, &row_bindings, depth).await?;
                    }
                    Statement::For(nested) => {
                        Box::pin(self.execute_for(nested, row_bindings.clone(), depth)).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// `SET target.path = expr;` — resolves the target's bound entity,
    /// persists the one changed property, and (if it actually changed)
    /// recurses into `handle_event` at `depth + 1` to drive the cascade.
    async fn apply_set(
        &self,
        target_path: &[String],
        value_expr: &gre_ast::Expr,
        ctx: &EvalContext,
        bindings: &Bindings,
        depth: u32,
        store: &Arc<dyn GraphStore>,
    ) -> Result<(), EngineError> {
        let Some(prop_name) = target_path.last().cloned() else {
            return Err(EngineError::Validation(crate::errors::ValidationError::MalformedSetTarget(String::new())));
        };
        let root = target_path.first().map(String::as_str).unwrap_or("");
        let target_bound = if root == "this" || root == "e" {
            bindings.get("this").or_else(|| bindings.get("e"))
        } else {
            bindings.get(root)
        }
        .ok_or_else(|| EngineError::Validation(crate::errors::ValidationError::MalformedSetTarget(target_path.join("."))))?
        .clone();

        let value = self.evaluator.evaluate(value_expr, ctx).await?;

        let before = store
            .get_entity(target_bound.entity_id)
            .await?
            .ok_or_else(|| EngineError::Eval(format!("SET target entity {} not found", target_bound.entity_id)))?;
        let old_value = before.property(&prop_name).cloned().unwrap_or(Value::Null);
        if old_value == value {
            return Ok(());
        }

        let mut patch = BTreeMap::new();
        patch.insert(prop_name.clone(), value.clone());
        store.run_in_transaction(vec![(target_bound.entity_id, patch)]).await?;

        let event = UpdateEvent { entity_type: target_bound.entity_type, entity_id: target_bound.entity_id, property: prop_name, old_value, new_value: value };
        Box::pin(self.handle_event(&event, depth + 1)).await;
        Ok(())
    }

    /// `TRIGGER et.action FOR var [WITH {...}]` — invokes the action
    /// executor on the bound target, then cascades any events it emitted.
    async fn apply_trigger(&self, trigger_stmt: &TriggerStatement, variables: &BTreeMap<String, Value>, bindings: &Bindings, depth: u32) -> Result<(), EngineError> {
        let target_bound = bindings
            .get(&trigger_stmt.target_var)
            .ok_or_else(|| EngineError::Eval(format!("unbound TRIGGER target '{}'", trigger_stmt.target_var)))?
            .clone();

        let param_ctx = EvalContext::for_entity(Value::Null, bindings.clone()).with_variables(variables.clone()).with_store(self.action_executor.store());
        let mut params = BTreeMap::new();
        for (name, expr) in &trigger_stmt.params {
            params.insert(name.clone(), self.evaluator.evaluate(expr, &param_ctx).await?);
        }

        let result = self.action_executor.execute(&trigger_stmt.entity_type, &trigger_stmt.action_name, target_bound.entity_id, params).await?;
        if !result.success {
            tracing::info!(action = %trigger_stmt.action_name, error = ?result.error, "TRIGGER statement's action did not succeed");
            return Ok(());
        }
        for event in &result.emitted_events {
            Box::pin(self.handle_event(event, depth + 1)).await;
        }
        Ok(())
    }

    /// Fetches every non-`this`/`e` bound variable's current entity so
    /// conditions/effects can resolve paths like `po.status`.
    async fn resolve_variables(&self, bindings: &Bindings, store: &Arc<dyn GraphStore>) -> Result<BTreeMap<String, Value>, EngineError> {
        let mut variables = BTreeMap::new();
        for (name, bound) in bindings {
            if name == "this" || name == "e" {
                continue;
            }
            if let Some(entity) = store.get_entity(bound.entity_id).await? {
                variables.insert(name.clone(), entity_to_value(&entity));
            }
        }
        Ok(variables)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use gre_ast::{EdgeDirection, Expr, GraphEntity, GraphRelationship, Pattern, PatternEdge};

    use super::*;
    use crate::registry::ActionRegistry;
    use crate::store::InMemoryGraphStore;

    fn entity(entity_type: &str, name: &str, props: Vec<(&str, Value)>) -> GraphEntity {
        let mut properties = BTreeMap::new();
        for (k, v) in props {
            properties.insert(k.to_string(), v);
        }
        GraphEntity { id: 0, name: name.to_string(), entity_type: entity_type.to_string(), is_instance: true, properties, uri: None, created_at: Utc::now(), updated_at: Utc::now() }
    }

    /// Spec §8 scenario 1: a Supplier's status flipping to Blacklisted
    /// cascades into blocking every PurchaseOrder sourced from it.
    #[tokio::test]
    async fn supplier_blacklist_cascades_to_purchase_orders() {
        let store = InMemoryGraphStore::new();
        let supplier_id = store.insert_entity(entity("Supplier", "Globex", vec![("status", Value::String("Active".into()))]));
        let po_id = store.insert_entity(entity("PurchaseOrder", "PO-1", vec![("status", Value::String("Open".into()))]));
        store.insert_relationship(GraphRelationship {
            id: 0,
            source_id: po_id,
            target_id: supplier_id,
            relationship_type: "orderedFrom".to_string(),
            properties: BTreeMap::new(),
            created_at: Utc::now(),
        });

        let rule_registry = Arc::new(RuleRegistry::new());
        rule_registry
            .register(gre_ast::RuleDef {
                name: "BlockOrdersFromBlacklistedSupplier".to_string(),
                priority: 0,
                trigger: Trigger { trigger_type: TriggerType::Update, entity_type: "Supplier".to_string(), property: Some("status".to_string()) },
                body: ForClause {
                    variable: "po".to_string(),
                    entity_type: "PurchaseOrder".to_string(),
                    condition: Some(Expr::Exists(Pattern {
                        root_var: "po".to_string(),
                        edges: vec![PatternEdge { relationship_type: "orderedFrom".to_string(), direction: EdgeDirection::Forward, target_var: "this".to_string() }],
                        condition: None,
                    })),
                    statements: vec![Statement::Set { target_path: vec!["po".to_string(), "status".to_string()], value: Expr::Literal(Value::String("Blocked".into())) }],
                },
            })
            .unwrap();

        let action_registry = Arc::new(ActionRegistry::new());
        let executor = Arc::new(ActionExecutor::new(action_registry, store.clone(), None));
        let engine = RuleEngine::new(rule_registry, executor);

        let event = UpdateEvent { entity_type: "Supplier".to_string(), entity_id: supplier_id, property: "status".to_string(), old_value: Value::String("Active".into()), new_value: Value::String("Blacklisted".into()) };
        engine.handle_event(&event, 0).await;

        let po = store.get_entity(po_id).await.unwrap().unwrap();
        assert_eq!(po.property("status"), Some(&Value::String("Blocked".into())));
    }

    #[tokio::test]
    async fn cascade_beyond_the_limit_is_dropped() {
        let store = InMemoryGraphStore::new();
        let counter_id = store.insert_entity(entity("Counter", "C1", vec![("n", Value::Int(0))]));

        // A rule that would always fire again (SET to a literal different
        // from the current value every time) if the depth guard didn't stop it.
        let rule_registry = Arc::new(RuleRegistry::new());
        rule_registry
            .register(gre_ast::RuleDef {
                name: "AlwaysReflip".to_string(),
                priority: 0,
                trigger: Trigger { trigger_type: TriggerType::Update, entity_type: "Counter".to_string(), property: Some("n".to_string()) },
                body: ForClause {
                    variable: "c".to_string(),
                    entity_type: "Counter".to_string(),
                    condition: None,
                    statements: vec![Statement::Set { target_path: vec!["c".to_string(), "n".to_string()], value: Expr::Literal(Value::Int(99)) }],
                },
            })
            .unwrap();

        let action_registry = Arc::new(ActionRegistry::new());
        let executor = Arc::new(ActionExecutor::new(action_registry, store.clone(), None));
        let engine = RuleEngine::new(rule_registry, executor).with_cascade_limit(2);

        // Calling directly at a depth already past the limit must be a no-op.
        let event = UpdateEvent { entity_type: "Counter".to_string(), entity_id: counter_id, property: "n".to_string(), old_value: Value::Int(0), new_value: Value::Int(1) };
        engine.handle_event(&event, 3).await;

        let counter = store.get_entity(counter_id).await.unwrap().unwrap();
        assert_eq!(counter.property("n"), Some(&Value::Int(0)));
    }
}
