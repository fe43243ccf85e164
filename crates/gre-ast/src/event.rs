//! Events the emitter fans out (§3, §4.7). An `UpdateEvent` lives only for
//! the fan-out duration; the core never stores it.

use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub entity_type: String,
    pub entity_id: i64,
    pub property: String,
    pub old_value: Value,
    pub new_value: Value,
}

/// Present in the data model for observability tooling outside this crate;
/// nothing here produces one — there is no graph-viewing endpoint in scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphViewEvent {
    pub nodes: Vec<i64>,
    pub edges: Vec<i64>,
}
