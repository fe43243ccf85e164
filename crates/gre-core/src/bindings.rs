//! The bound-variable registry threaded through evaluation, translation and
//! rule-body execution (§3 "Evaluation context", §4.5 "Bound-variable
//! registry"). A `Bindings` map is built fresh per rule execution / pattern
//! translation and is never shared across threads.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundVar {
    pub entity_type: String,
    pub entity_id: i64,
}

pub type Bindings = BTreeMap<String, BoundVar>;

/// Builds the initial bindings a rule body sees: `{"this": id, "e": id}`
/// per §4.8 step 3c.
pub fn initial_bindings(entity_type: &str, entity_id: i64) -> Bindings {
    let mut b = Bindings::new();
    let bound = BoundVar { entity_type: entity_type.to_string(), entity_id };
    b.insert("this".to_string(), bound.clone());
    b.insert("e".to_string(), bound);
    b
}
