//! Expression AST (§3, §4.1). Every node is a plain sum-type variant; there
//! is no inheritance and no "tuple AST" — the parser, evaluator and
//! translator all pattern-match exhaustively over these types.

use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
            CompareOp::Ge => ">=",
        }
    }
}

/// An edge in a graph pattern: `-[rel]->`, `<-[rel]-`, or the undirected `-[rel]-`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeDirection {
    Forward,
    Backward,
    Either,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternEdge {
    pub relationship_type: String,
    pub direction: EdgeDirection,
    pub target_var: String,
}

/// `node_ref (edge node_ref)* ["WHERE" expression]` — a chain of bound
/// variables connected by relationship edges, with an optional trailing
/// filter evaluated once all variables in the chain are bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub root_var: String,
    pub edges: Vec<PatternEdge>,
    pub condition: Option<Box<Expr>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    /// Dotted identifier, e.g. `this.status` or `po.amount`.
    Path(Vec<String>),
    Compare { op: CompareOp, left: Box<Expr>, right: Box<Expr> },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    In { left: Box<Expr>, list: Vec<Expr> },
    IsNull { expr: Box<Expr>, negated: bool },
    Call { name: String, args: Vec<Expr> },
    Exists(Pattern),
    /// A comparator the grammar accepts but the evaluator declines to run
    /// (`MATCHES`/`CHANGED`); kept so the parser stays total over the
    /// grammar without inventing undocumented runtime semantics.
    Unsupported(String),
}

impl Expr {
    pub fn path(segments: &[&str]) -> Self {
        Expr::Path(segments.iter().map(|s| s.to_string()).collect())
    }
}
