//! Expression evaluator (C4, §4.4). Three-valued logic is not used: null
//! comparisons are false except through explicit `IS [NOT] NULL`.

use gre_ast::{CompareOp, Expr, Value};

use super::builtins;
use super::context::EvalContext;
use crate::errors::EngineError;

#[derive(Debug, Default, Clone, Copy)]
pub struct Evaluator;

impl Evaluator {
    pub fn new() -> Self {
        Self
    }

    pub async fn evaluate(&self, expr: &Expr, ctx: &EvalContext) -> Result<Value, EngineError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Path(segments) => Ok(ctx.resolve_path(segments)),
            Expr::Compare { op, left, right } => {
                let l = Box::pin(self.evaluate(left, ctx)).await?;
                let r = Box::pin(self.evaluate(right, ctx)).await?;
                Ok(Value::Bool(compare(*op, &l, &r)))
            }
            Expr::And(l, r) => {
                let lv = Box::pin(self.evaluate(l, ctx)).await?;
                if !lv.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                let rv = Box::pin(self.evaluate(r, ctx)).await?;
                Ok(Value::Bool(rv.is_truthy()))
            }
            Expr::Or(l, r) => {
                let lv = Box::pin(self.evaluate(l, ctx)).await?;
                if lv.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                let rv = Box::pin(self.evaluate(r, ctx)).await?;
                Ok(Value::Bool(rv.is_truthy()))
            }
            Expr::Not(inner) => {
                let v = Box::pin(self.evaluate(inner, ctx)).await?;
                Ok(Value::Bool(!v.is_truthy()))
            }
            Expr::In { left, list } => {
                let l = Box::pin(self.evaluate(left, ctx)).await?;
                for item_expr in list {
                    let item = Box::pin(self.evaluate(item_expr, ctx)).await?;
                    if l == item {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expr::IsNull { expr, negated } => {
                let v = Box::pin(self.evaluate(expr, ctx)).await?;
                Ok(Value::Bool(v.is_null() != *negated))
            }
            Expr::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for a in args {
                    values.push(Box::pin(self.evaluate(a, ctx)).await?);
                }
                builtins::call(name, &values)
            }
            Expr::Exists(pattern) => {
                let store = ctx
                    .store
                    .as_ref()
                    .ok_or_else(|| EngineError::Eval("EXISTS requires a store handle".to_string()))?;
                let found = store.exists_pattern(pattern, &ctx.bindings).await?;
                Ok(Value::Bool(found))
            }
            Expr::Unsupported(op) => Err(EngineError::Eval(format!("comparator '{op}' has no runtime semantics"))),
        }
    }

    pub async fn evaluate_bool(&self, expr: &Expr, ctx: &EvalContext) -> Result<bool, EngineError> {
        Ok(Box::pin(self.evaluate(expr, ctx)).await?.is_truthy())
    }
}

/// `==/!=/</>/<=/>=` — numeric comparisons promote int<->float, string
/// comparison is lexicographic, cross-type comparisons are always false
/// except for the numeric promotion case.
fn compare(op: CompareOp, l: &Value, r: &Value) -> bool {
    match op {
        CompareOp::Eq => l == r,
        CompareOp::Ne => l != r,
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => apply_ord(op, a.partial_cmp(&b)),
            _ => match (l.as_str(), r.as_str()) {
                (Some(a), Some(b)) => apply_ord(op, a.partial_cmp(b)),
                _ => false,
            },
        },
    }
}

fn apply_ord(op: CompareOp, ord: Option<std::cmp::Ordering>) -> bool {
    use std::cmp::Ordering::*;
    match (op, ord) {
        (CompareOp::Lt, Some(Less)) => true,
        (CompareOp::Gt, Some(Greater)) => true,
        (CompareOp::Le, Some(Less)) | (CompareOp::Le, Some(Equal)) => true,
        (CompareOp::Ge, Some(Greater)) | (CompareOp::Ge, Some(Equal)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use gre_ast::{CompareOp, Expr, Value};

    use super::*;
    use crate::bindings::Bindings;

    fn ctx_with(props: Vec<(&str, Value)>) -> EvalContext {
        let mut map = BTreeMap::new();
        for (k, v) in props {
            map.insert(k.to_string(), v);
        }
        EvalContext::for_entity(Value::Map(map), Bindings::new())
    }

    #[tokio::test]
    async fn missing_path_resolves_to_null() {
        let ctx = ctx_with(vec![]);
        let v = Evaluator::new().evaluate(&Expr::path(&["this", "status"]), &ctx).await.unwrap();
        assert!(v.is_null());
    }

    #[tokio::test]
    async fn numeric_promotion_in_comparison() {
        let ctx = ctx_with(vec![("amount", Value::Int(100))]);
        let expr = Expr::Compare {
            op: CompareOp::Gt,
            left: Box::new(Expr::path(&["this", "amount"])),
            right: Box::new(Expr::Literal(Value::Float(0.0))),
        };
        assert!(Evaluator::new().evaluate_bool(&expr, &ctx).await.unwrap());
    }

    #[tokio::test]
    async fn and_short_circuits() {
        let ctx = ctx_with(vec![]);
        // `this.missing AND CALL_TO_UNKNOWN()` must short-circuit before the
        // unknown function call is ever evaluated.
        let expr = Expr::And(
            Box::new(Expr::path(&["this", "missing"])),
            Box::new(Expr::Call { name: "NOPE".into(), args: vec![] }),
        );
        assert!(!Evaluator::new().evaluate_bool(&expr, &ctx).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_function_errors() {
        let ctx = ctx_with(vec![]);
        let expr = Expr::Call { name: "NOPE".into(), args: vec![] };
        let err = Evaluator::new().evaluate(&expr, &ctx).await.unwrap_err();
        assert!(matches!(err, EngineError::Eval(ref m) if m.contains("Unknown function")));
    }

    #[tokio::test]
    async fn in_membership_by_equality() {
        let ctx = ctx_with(vec![("status", Value::String("Expired".into()))]);
        let expr = Expr::In {
            left: Box::new(Expr::path(&["this", "status"])),
            list: vec![Expr::Literal(Value::String("Expired".into())), Expr::Literal(Value::String("Blacklisted".into()))],
        };
        assert!(Evaluator::new().evaluate_bool(&expr, &ctx).await.unwrap());
    }
}
