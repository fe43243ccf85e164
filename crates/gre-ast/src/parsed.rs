//! The parser's output contract (§4.1): a flat list of actions and rules,
//! structurally complete but not semantically validated.

use serde::{Deserialize, Serialize};

use crate::action::ActionDef;
use crate::rule::RuleDef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParsedItem {
    Action(ActionDef),
    Rule(RuleDef),
}
