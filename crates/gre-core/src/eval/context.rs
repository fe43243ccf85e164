//! Evaluation context (§3 "Evaluation context"): the entity bound to `this`,
//! any other bound variables, and a handle back to the store for `EXISTS`.

use std::collections::BTreeMap;
use std::sync::Arc;

use gre_ast::{GraphEntity, Value};

use crate::bindings::Bindings;
use crate::store::GraphStore;

/// Flattens a `GraphEntity` into the `Value::Map` shape path resolution
/// expects: declared properties plus the reserved fields `id`/`name`/
/// `entity_type`/`is_instance`/`uri`/`created_at`/`updated_at`, which take
/// precedence over a same-named property (schemas are not expected to
/// collide with them).
pub fn entity_to_value(entity: &GraphEntity) -> Value {
    let mut map = entity.properties.clone();
    map.insert("id".to_string(), Value::Int(entity.id));
    map.insert("name".to_string(), Value::String(entity.name.clone()));
    map.insert("entity_type".to_string(), Value::String(entity.entity_type.clone()));
    map.insert("is_instance".to_string(), Value::Bool(entity.is_instance));
    map.insert("uri".to_string(), entity.uri.clone().map(Value::String).unwrap_or(Value::Null));
    map.insert("created_at".to_string(), Value::String(entity.created_at.to_rfc3339()));
    map.insert("updated_at".to_string(), Value::String(entity.updated_at.to_rfc3339()));
    Value::Map(map)
}

#[derive(Clone)]
pub struct EvalContext {
    /// `this` / `e` — always present for action and rule-trigger evaluation.
    pub entity: Value,
    pub old_values: BTreeMap<String, Value>,
    /// Other bound names: entity-shaped maps for FOR-loop variables, plain
    /// scalars for action parameters.
    pub variables: BTreeMap<String, Value>,
    /// id-level bindings, used only to resolve `EXISTS(pattern)` against the store.
    pub bindings: Bindings,
    pub store: Option<Arc<dyn GraphStore>>,
}

impl EvalContext {
    pub fn for_entity(entity: Value, bindings: Bindings) -> Self {
        Self { entity, old_values: BTreeMap::new(), variables: BTreeMap::new(), bindings, store: None }
    }

    pub fn with_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_old_values(mut self, old_values: BTreeMap<String, Value>) -> Self {
        self.old_values = old_values;
        self
    }

    pub fn with_variables(mut self, variables: BTreeMap<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// `this.x.y` resolves from `entity`; `name.x` resolves `name` in
    /// `variables` then indexes `.x`. A missing path resolves to `Value::Null`.
    pub fn resolve_path(&self, segments: &[String]) -> Value {
        if segments.is_empty() {
            return Value::Null;
        }
        let root = match segments[0].as_str() {
            "this" | "e" => &self.entity,
            other => match self.variables.get(other) {
                Some(v) => v,
                None => return Value::Null,
            },
        };
        let mut cur = root;
        for seg in &segments[1..] {
            match cur.get(seg) {
                Some(v) => cur = v,
                None => return Value::Null,
            }
        }
        cur.clone()
    }
}
