//! Action definitions (§3, §4.1): parameterized operations on an entity
//! type with ordered preconditions and an optional effect block.

use serde::{Deserialize, Serialize};

use crate::expr::Expr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub param_type: String,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precondition {
    pub name: Option<String>,
    pub condition: Expr,
    pub on_failure: String,
}

/// `SET this.path = expr;` inside an `EFFECT { ... }` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetStatement {
    pub target_path: Vec<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectBlock {
    pub sets: Vec<SetStatement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDef {
    pub entity_type: String,
    pub action_name: String,
    pub parameters: Vec<Parameter>,
    pub preconditions: Vec<Precondition>,
    pub effect: Option<EffectBlock>,
    pub description: Option<String>,
}

impl ActionDef {
    pub fn key(&self) -> (String, String) {
        (self.entity_type.clone(), self.action_name.clone())
    }
}
