//! gre-cli: demonstrates the reactive rule engine end to end against the
//! in-memory store. For the fuller demo (with a rule loaded from DSL text),
//! see the root binary.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use gre_ast::{CompareOp, EdgeDirection, EffectBlock, Expr, ForClause, GraphEntity, GraphRelationship, Pattern, PatternEdge, RuleDef, SetStatement, Statement, Trigger, TriggerType, Value};
use gre_core::{initial_bindings, ActionExecutor, ActionRegistry, GraphEventEmitter, GraphStore, InMemoryGraphStore, RuleEngine, RuleRegistry};

fn entity(name: &str, entity_type: &str, properties: BTreeMap<String, Value>) -> GraphEntity {
    let now = Utc::now();
    GraphEntity { id: 0, name: name.to_string(), entity_type: entity_type.to_string(), is_instance: true, properties, uri: None, created_at: now, updated_at: now }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    println!("gre-cli: reactive rule engine demo");
    println!("===================================");

    let store = InMemoryGraphStore::new();

    let mut supplier_props = BTreeMap::new();
    supplier_props.insert("status".to_string(), Value::String("Active".to_string()));
    let supplier_id = store.insert_entity(entity("Globex", "Supplier", supplier_props));

    let mut po_props = BTreeMap::new();
    po_props.insert("status".to_string(), Value::String("Open".to_string()));
    let po_id = store.insert_entity(entity("PO-1", "PurchaseOrder", po_props));

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
        .register(RuleDef {
            name: "block_pos_for_blacklisted_supplier".to_string(),
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
                statements: vec![Statement::Set { target_path: vec!["po".to_string(), "status".to_string()], value: Expr::Literal(Value::String("Blocked".to_string())) }],
            },
        })
        .expect("register rule");

    let action_registry = Arc::new(ActionRegistry::new());
    action_registry.register(gre_ast::ActionDef {
        entity_type: "Supplier".to_string(),
        action_name: "blacklist".to_string(),
        parameters: vec![],
        preconditions: vec![gre_ast::Precondition {
            name: None,
            condition: Expr::Compare { op: CompareOp::Ne, left: Box::new(Expr::path(&["this", "status"])), right: Box::new(Expr::Literal(Value::String("Blacklisted".to_string()))) },
            on_failure: "supplier is already blacklisted".to_string(),
        }],
        effect: Some(EffectBlock { sets: vec![SetStatement { target_path: vec!["this".to_string(), "status".to_string()], value: Expr::Literal(Value::String("Blacklisted".to_string())) }] }),
        description: Some("Marks a supplier blacklisted".to_string()),
    });

    let emitter = Arc::new(GraphEventEmitter::new());
    let executor = Arc::new(ActionExecutor::new(action_registry, store.clone(), Some(emitter)));
    let engine = RuleEngine::new(rule_registry, executor.clone());

    println!("triggering Supplier.blacklist on {supplier_id} (Globex)...");
    let result = executor.execute("Supplier", "blacklist", supplier_id, BTreeMap::new()).await.expect("action execution");
    if !result.success {
        println!("action failed: {:?}", result.error);
        return;
    }
    println!("action succeeded, changes: {:?}", result.changes);

    for event in &result.emitted_events {
        engine.handle_event(event, 0).await;
    }

    let po_after = store.get_entity(po_id).await.expect("query").expect("po exists");
    println!("PO-1 status after cascade: {:?}", po_after.property("status"));

    // Re-query independently of the cascade, from the same kind of scope
    // `RuleEngine::handle_event` builds before running a rule body, to
    // confirm the cascade's effect is visible to a fresh caller.
    let supplier_bindings = initial_bindings("Supplier", supplier_id);
    let blocked_pos = store
        .query_for_clause(
            &ForClause {
                variable: "po".to_string(),
                entity_type: "PurchaseOrder".to_string(),
                condition: Some(Expr::Compare {
                    op: CompareOp::Eq,
                    left: Box::new(Expr::path(&["po", "status"])),
                    right: Box::new(Expr::Literal(Value::String("Blocked".to_string()))),
                }),
                statements: vec![],
            },
            &supplier_bindings,
        )
        .await
        .expect("query_for_clause");
    println!("purchase orders now blocked: {}", blocked_pos.len());
}
