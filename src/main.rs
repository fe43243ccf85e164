//! Reproduces the `SupplierStatusBlocking` cascade (spec §8 scenario 1) end
//! to end: parse the DSL rule text, register it, flip a Supplier's status,
//! and observe the cascade block every Open PurchaseOrder sourced from it.

#![allow(unused_imports)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use graphrules::{parse, ActionRegistry, GraphEntity, GraphRelationship, GraphStore, InMemoryGraphStore, ParsedItem, RuleEngine, RuleRegistry, UpdateEvent, Value};
use gre_core::ActionExecutor;

const RULE_DSL: &str = r#"
RULE SupplierStatusBlocking PRIORITY 100 {
    ON UPDATE(Supplier.status)
    FOR (s: Supplier WHERE s.status IN ["Expired", "Blacklisted"]) {
        FOR (po: PurchaseOrder WHERE po -[orderedFrom]-> s AND po.status == "Open") {
            SET po.status = "RiskLocked";
        }
    }
}
"#;

fn entity(entity_type: &str, name: &str, properties: Vec<(&str, Value)>) -> GraphEntity {
    let now = Utc::now();
    GraphEntity {
        id: 0,
        name: name.to_string(),
        entity_type: entity_type.to_string(),
        is_instance: true,
        properties: properties.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        uri: None,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(feature = "pg_demo")]
async fn seed(store: &dyn GraphStore) -> (i64, i64) {
    let s1_rows = store
        .execute_parameterized_sql(
            "INSERT INTO graph_entities (name, entity_type, is_instance, properties) VALUES ($1, 'Supplier', true, $2) RETURNING id",
            &[Value::String("S1".to_string()), Value::Map(BTreeMap::from([("status".to_string(), Value::String("Active".to_string()))]))],
        )
        .await
        .expect("seed S1");
    let po1_rows = store
        .execute_parameterized_sql(
            "INSERT INTO graph_entities (name, entity_type, is_instance, properties) VALUES ($1, 'PurchaseOrder', true, $2) RETURNING id",
            &[Value::String("PO1".to_string()), Value::Map(BTreeMap::from([("status".to_string(), Value::String("Open".to_string()))]))],
        )
        .await
        .expect("seed PO1");

    let s1 = s1_rows[0].0.get("id").and_then(Value::as_f64).expect("S1 id") as i64;
    let po1 = po1_rows[0].0.get("id").and_then(Value::as_f64).expect("PO1 id") as i64;

    store
        .execute_parameterized_sql(
            "INSERT INTO graph_relationships (source_id, target_id, relationship_type, properties) VALUES ($1, $2, 'orderedFrom', '{}'::jsonb)",
            &[Value::Int(po1), Value::Int(s1)],
        )
        .await
        .expect("seed orderedFrom relationship");

    (s1, po1)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let items = parse(RULE_DSL).expect("rule DSL parses");
    let rule = items
        .into_iter()
        .find_map(|item| match item {
            ParsedItem::Rule(r) => Some(r),
            _ => None,
        })
        .expect("DSL text contains a rule");

    let rule_registry = Arc::new(RuleRegistry::new());
    rule_registry.register(rule).expect("register rule");

    #[cfg(not(feature = "pg_demo"))]
    let (store, s1, po1): (Arc<dyn GraphStore>, i64, i64) = {
        let mem = InMemoryGraphStore::new();
        let s1 = mem.insert_entity(entity("Supplier", "S1", vec![("status", Value::String("Active".into()))]));
        let po1 = mem.insert_entity(entity("PurchaseOrder", "PO1", vec![("status", Value::String("Open".into()))]));
        mem.insert_relationship(GraphRelationship {
            id: 0,
            source_id: po1,
            target_id: s1,
            relationship_type: "orderedFrom".to_string(),
            properties: BTreeMap::new(),
            created_at: Utc::now(),
        });
        (mem, s1, po1)
    };

    #[cfg(feature = "pg_demo")]
    let (store, s1, po1): (Arc<dyn GraphStore>, i64, i64) = {
        let pool = gre_persistence::build_dev_pool_from_env().expect("DATABASE_URL pool");
        let pg_store: Arc<dyn GraphStore> = Arc::new(gre_persistence::PgGraphStore::new(pool));
        let (s1, po1) = seed(pg_store.as_ref()).await;
        (pg_store, s1, po1)
    };

    let action_registry = Arc::new(ActionRegistry::new());
    let executor = Arc::new(ActionExecutor::new(action_registry, store.clone(), None));
    let engine = RuleEngine::new(rule_registry, executor);

    println!("PO1.status before: Open");
    println!("flipping S1.status: Active -> Expired");

    let mut patch = BTreeMap::new();
    patch.insert("status".to_string(), Value::String("Expired".to_string()));
    store.run_in_transaction(vec![(s1, patch)]).await.expect("update S1");

    let event = UpdateEvent {
        entity_type: "Supplier".to_string(),
        entity_id: s1,
        property: "status".to_string(),
        old_value: Value::String("Active".to_string()),
        new_value: Value::String("Expired".to_string()),
    };
    engine.handle_event(&event, 0).await;

    let po1_after = store.get_entity(po1).await.expect("query PO1").expect("PO1 exists");
    println!("PO1.status after cascade: {:?}", po1_after.property("status"));
    assert_eq!(po1_after.property("status"), Some(&Value::String("RiskLocked".to_string())));
    println!("scenario 1 reproduced: supplier blocking cascaded to the linked purchase order");
}
