//! Rule definitions (§3, §4.1): a trigger shape plus a body that iterates
//! matching entities and applies statements to them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::expr::Expr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum TriggerType {
    Update,
    Create,
    Delete,
    Link,
    Scan,
}

impl TriggerType {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerType::Update => "UPDATE",
            TriggerType::Create => "CREATE",
            TriggerType::Delete => "DELETE",
            TriggerType::Link => "LINK",
            TriggerType::Scan => "SCAN",
        }
    }
}

/// `ON UPDATE(Supplier.status)` — `property` is `None` when the trigger
/// binds to any property change on `entity_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub trigger_type: TriggerType,
    pub entity_type: String,
    pub property: Option<String>,
}

impl Trigger {
    /// `type:entity_type[:property]` — the rule registry's secondary index key.
    pub fn trigger_key(&self) -> String {
        match &self.property {
            Some(p) => format!("{}:{}:{}", self.trigger_type.as_str(), self.entity_type, p),
            None => format!("{}:{}", self.trigger_type.as_str(), self.entity_type),
        }
    }
}

/// `TRIGGER et.action FOR var [WITH {...}]` — invokes the action executor
/// on the named action for the entity bound to `target_var`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerStatement {
    pub entity_type: String,
    pub action_name: String,
    pub target_var: String,
    pub params: BTreeMap<String, Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Set { target_path: Vec<String>, value: Expr },
    Trigger(TriggerStatement),
    For(Box<ForClause>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForClause {
    pub variable: String,
    pub entity_type: String,
    pub condition: Option<Expr>,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDef {
    pub name: String,
    pub priority: i32,
    pub trigger: Trigger,
    pub body: ForClause,
}
