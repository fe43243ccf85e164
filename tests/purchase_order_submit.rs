//! Spec §8 scenario 2: submitting an already-submitted purchase order fails
//! its precondition and leaves the entity untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use graphrules::{parse, ActionRegistry, GraphEntity, GraphStore, InMemoryGraphStore, ParsedItem, Value};
use gre_core::ActionExecutor;

const ACTION_DSL: &str = r#"
ACTION PurchaseOrder.submit {
    PRECONDITION statusCheck: this.status == "Draft"
        ON_FAILURE: "Only draft orders can be submitted"
    PRECONDITION: this.amount > 0
        ON_FAILURE: "Amount must be positive"
    EFFECT {
        SET this.status = "Submitted";
        SET this.submittedAt = NOW();
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

#[tokio::test]
async fn submitting_an_already_submitted_order_fails_its_precondition() {
    let items = parse(ACTION_DSL).expect("action DSL parses");
    let action = items
        .into_iter()
        .find_map(|item| match item {
            ParsedItem::Action(a) => Some(a),
            _ => None,
        })
        .expect("DSL text contains an action");

    let action_registry = Arc::new(ActionRegistry::new());
    action_registry.register(action);

    let store = InMemoryGraphStore::new();
    let po = store.insert_entity(entity("PurchaseOrder", "PO-2", vec![("status", Value::String("Submitted".into())), ("amount", Value::Int(100))]));

    let executor = ActionExecutor::new(action_registry, store.clone(), None);
    let result = executor.execute("PurchaseOrder", "submit", po, BTreeMap::new()).await.expect("execution runs");

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Only draft orders can be submitted"));
    assert!(result.emitted_events.is_empty());

    let unchanged = store.get_entity(po).await.expect("query").expect("entity exists");
    assert_eq!(unchanged.property("status"), Some(&Value::String("Submitted".into())));
}
