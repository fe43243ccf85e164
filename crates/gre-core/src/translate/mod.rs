//! Pattern translator (C5, §4.5). Converts graph-pattern AST fragments into
//! parameterized SQL over the schema in §6.2. Never interpolates user data
//! into SQL text — only identifier-like constants (entity types,
//! relationship types, property keys) are spliced in, and only after a
//! whitelist check.

use gre_ast::{CompareOp, EdgeDirection, Expr, ForClause, Pattern, Value};

use crate::bindings::Bindings;
use crate::errors::EngineError;

/// An identifier-like constant (entity_type, relationship_type, property
/// key) is safe to splice into SQL text only if it looks like one: ASCII
/// alphanumeric plus underscore, non-empty, reasonably short. Everything
/// else is routed through parameter binding instead (§9 "SQL string
/// composition").
fn validate_identifier(s: &str) -> Result<&str, EngineError> {
    let ok = !s.is_empty()
        && s.len() <= 128
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && s.chars().next().map(|c| c.is_ascii_alphabetic() || c == '_').unwrap_or(false);
    if ok {
        Ok(s)
    } else {
        Err(EngineError::Translate(format!("'{s}' is not a valid identifier-like constant")))
    }
}

pub struct Params(Vec<Value>);

impl Params {
    fn new() -> Self {
        Self(Vec::new())
    }

    fn push(&mut self, v: Value) -> String {
        self.0.push(v);
        format!("${}", self.0.len())
    }

    fn into_vec(self) -> Vec<Value> {
        self.0
    }
}

/// Translates FOR clauses and graph patterns into parameterized SQL.
/// Carries no mutable bound-variable stack of its own — bound outer
/// variables are passed in explicitly per call, matching the rule
/// engine's own `Bindings` so a single source of truth threads through
/// evaluation and translation alike.
pub struct SqlTranslator;

impl SqlTranslator {
    pub fn new() -> Self {
        Self
    }

    /// `translate_for(for_clause) -> SQL` producing
    /// `SELECT e.* FROM graph_entities e [JOIN ...] WHERE e.entity_type = $1
    /// AND e.is_instance = true AND <condition>`.
    pub fn translate_for(&self, for_clause: &ForClause, outer: &Bindings) -> Result<(String, Vec<Value>), EngineError> {
        let mut params = Params::new();
        let entity_type_param = params.push(Value::String(for_clause.entity_type.clone()));
        let mut joins = Vec::new();

        let condition_sql = match &for_clause.condition {
            Some(expr) => {
                let sql = self.translate_condition(expr, &for_clause.variable, outer, &mut params, &mut joins)?;
                format!(" AND ({sql})")
            }
            None => String::new(),
        };

        let join_sql = joins.join(" ");
        let sql = format!(
            "SELECT e.* FROM graph_entities e{joins} WHERE e.entity_type = {et} AND e.is_instance = true{cond}",
            joins = if join_sql.is_empty() { String::new() } else { format!(" {join_sql}") },
            et = entity_type_param,
            cond = condition_sql,
        );
        Ok((sql, params.into_vec()))
    }

    /// `translate_pattern(pattern, bindings) -> SQL EXISTS-subquery text`,
    /// used by `EXISTS(...)` in expressions and by the bare-pattern
    /// boolean-term shorthand the DSL surface also accepts. Called at
    /// evaluation time, where every pattern variable is already bound, so
    /// there is no "current FOR row" to special-case.
    pub fn translate_pattern(&self, pattern: &Pattern, bindings: &Bindings) -> Result<(String, Vec<Value>), EngineError> {
        let mut params = Params::new();
        let sql = self.translate_pattern_inner(pattern, None, bindings, &mut params)?;
        Ok((sql, params.into_vec()))
    }

    /// `current_var`, when set, is the enclosing FOR clause's own loop
    /// variable: a pattern variable matching it refers to the row alias `e`
    /// being selected, not a binding looked up in `bindings` (it isn't bound
    /// yet — selecting candidate rows for that very variable is the point of
    /// the query being built). Mirrors `translate_path`'s `current_var` alias.
    fn translate_pattern_inner(&self, pattern: &Pattern, current_var: Option<&str>, bindings: &Bindings, params: &mut Params) -> Result<String, EngineError> {
        let mut clauses = Vec::new();
        let mut current_id_expr = self.resolve_pattern_var_id(&pattern.root_var, current_var, bindings, params)?;

        for edge in &pattern.edges {
            let rel_type = validate_identifier(&edge.relationship_type)?;
            let target_id_expr = self.resolve_pattern_var_id(&edge.target_var, current_var, bindings, params)?;
            let rel_clause = match edge.direction {
                EdgeDirection::Forward => format!(
                    "EXISTS (SELECT 1 FROM graph_relationships r WHERE r.source_id = {current_id_expr} AND r.relationship_type = '{rel_type}' AND r.target_id = {target_id_expr})"
                ),
                EdgeDirection::Backward => format!(
                    "EXISTS (SELECT 1 FROM graph_relationships r WHERE r.target_id = {current_id_expr} AND r.relationship_type = '{rel_type}' AND r.source_id = {target_id_expr})"
                ),
                EdgeDirection::Either => format!(
                    "EXISTS (SELECT 1 FROM graph_relationships r WHERE r.relationship_type = '{rel_type}' AND ((r.source_id = {current_id_expr} AND r.target_id = {target_id_expr}) OR (r.source_id = {target_id_expr} AND r.target_id = {current_id_expr})))"
                ),
            };
            clauses.push(rel_clause);
            current_id_expr = target_id_expr;
        }

        if let Some(cond) = &pattern.condition {
            let mut joins = Vec::new();
            let last_var = pattern.edges.last().map(|e| e.target_var.as_str()).unwrap_or(pattern.root_var.as_str());
            clauses.push(self.translate_condition(cond, last_var, bindings, params, &mut joins)?);
            debug_assert!(joins.is_empty(), "pattern WHERE clauses never introduce new outer bindings");
        }

        if clauses.is_empty() {
            return Err(EngineError::Translate("pattern has no relationship edges".to_string()));
        }
        Ok(format!("({})", clauses.join(" AND ")))
    }

    /// Resolves a pattern variable to a SQL id expression: `e.id` if it is
    /// the row currently being selected, otherwise a bound parameter for
    /// the id looked up in `bindings`.
    fn resolve_pattern_var_id(&self, var: &str, current_var: Option<&str>, bindings: &Bindings, params: &mut Params) -> Result<String, EngineError> {
        if current_var == Some(var) {
            return Ok("e.id".to_string());
        }
        let bound = bindings.get(var).ok_or_else(|| EngineError::Translate(format!("unbound pattern variable '{var}'")))?;
        Ok(params.push(Value::Int(bound.entity_id)))
    }

    /// Recursively translates a boolean expression into SQL text. `current_var`
    /// is the FOR clause's own loop variable (maps to alias `e`); any other
    /// variable name found in a path must already be present in `outer`
    /// (the translator's bound-variable registry) and is joined in.
    fn translate_condition(
        &self,
        expr: &Expr,
        current_var: &str,
        outer: &Bindings,
        params: &mut Params,
        joins: &mut Vec<String>,
    ) -> Result<String, EngineError> {
        match expr {
            Expr::Literal(v) => Ok(params.push(v.clone())),
            Expr::Path(segments) => self.translate_path(segments, current_var, outer, params, joins),
            Expr::Compare { op, left, right } => {
                let l = self.translate_condition(left, current_var, outer, params, joins)?;
                let r = self.translate_condition(right, current_var, outer, params, joins)?;
                Ok(format!("{l} {} {r}", op.as_sql()))
            }
            Expr::And(l, r) => {
                let l = self.translate_condition(l, current_var, outer, params, joins)?;
                let r = self.translate_condition(r, current_var, outer, params, joins)?;
                Ok(format!("({l} AND {r})"))
            }
            Expr::Or(l, r) => {
                let l = self.translate_condition(l, current_var, outer, params, joins)?;
                let r = self.translate_condition(r, current_var, outer, params, joins)?;
                Ok(format!("({l} OR {r})"))
            }
            Expr::Not(inner) => {
                let i = self.translate_condition(inner, current_var, outer, params, joins)?;
                Ok(format!("(NOT {i})"))
            }
            Expr::In { left, list } => {
                let l = self.translate_condition(left, current_var, outer, params, joins)?;
                let mut items = Vec::with_capacity(list.len());
                for item in list {
                    items.push(self.translate_condition(item, current_var, outer, params, joins)?);
                }
                Ok(format!("{l} IN ({})", items.join(", ")))
            }
            Expr::IsNull { expr, negated } => {
                let e = self.translate_condition(expr, current_var, outer, params, joins)?;
                Ok(format!("{e} IS {}NULL", if *negated { "NOT " } else { "" }))
            }
            Expr::Exists(pattern) => {
                // Nested pattern inside a FOR's WHERE: root/target vars that
                // aren't the loop variable resolve through `outer`; a var
                // matching `current_var` (e.g. the pattern's own root_var
                // being the FOR clause's loop variable) maps to `e` instead.
                self.translate_pattern_inner(pattern, Some(current_var), outer, params)
            }
            Expr::Call { .. } => Err(EngineError::Translate("function calls cannot be translated to SQL".to_string())),
            Expr::Unsupported(op) => Err(EngineError::Translate(format!("comparator '{op}' cannot be translated"))),
        }
    }

    fn translate_path(
        &self,
        segments: &[String],
        current_var: &str,
        outer: &Bindings,
        params: &mut Params,
        joins: &mut Vec<String>,
    ) -> Result<String, EngineError> {
        if segments.is_empty() {
            return Err(EngineError::Translate("empty path".to_string()));
        }
        let var = &segments[0];
        let alias = if var == current_var || var == "this" || var == "e" {
            "e".to_string()
        } else {
            let bound = outer.get(var).ok_or_else(|| EngineError::Translate(format!("unbound variable '{var}' in condition")))?;
            let alias = validate_identifier(var)?.to_string();
            let id_param = params.push(Value::Int(bound.entity_id));
            let join = format!("JOIN graph_entities {alias} ON {alias}.id = {id_param}");
            if !joins.contains(&join) {
                joins.push(join);
            }
            alias
        };

        if segments.len() == 1 {
            return Ok(format!("{alias}.id"));
        }

        let mut sql = format!("{alias}.properties");
        let leaf_idx = segments.len() - 1;
        for (idx, seg) in segments[1..].iter().enumerate() {
            let key = validate_identifier(seg)?;
            let op = if idx == leaf_idx - 1 { "->>" } else { "->" };
            sql = format!("{sql} {op} '{key}'");
        }
        Ok(sql)
    }
}

impl Default for SqlTranslator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::BoundVar;
    use gre_ast::Pattern;

    fn for_clause_with_cond(cond: Expr) -> ForClause {
        ForClause { variable: "s".into(), entity_type: "Supplier".into(), condition: Some(cond), statements: vec![] }
    }

    #[test]
    fn for_without_where_selects_all_active_instances() {
        let fc = ForClause { variable: "s".into(), entity_type: "Supplier".into(), condition: None, statements: vec![] };
        let (sql, params) = SqlTranslator::new().translate_for(&fc, &Bindings::new()).unwrap();
        assert!(sql.contains("e.entity_type = $1"));
        assert!(sql.contains("e.is_instance = true"));
        assert!(!sql.to_uppercase().contains("ORDER BY"));
        assert_eq!(params, vec![Value::String("Supplier".into())]);
    }

    #[test]
    fn in_list_condition_uses_bind_parameters_not_inlined_values() {
        let cond = Expr::In {
            left: Box::new(Expr::path(&["s", "status"])),
            list: vec![Expr::Literal(Value::String("Expired".into())), Expr::Literal(Value::String("Blacklisted".into()))],
        };
        let (sql, params) = SqlTranslator::new().translate_for(&for_clause_with_cond(cond), &Bindings::new()).unwrap();
        assert!(sql.contains("IN ($2, $3)"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn relationship_pattern_uses_bound_ids_not_literal_names() {
        let mut bindings = Bindings::new();
        bindings.insert("po".into(), BoundVar { entity_type: "PurchaseOrder".into(), entity_id: 7 });
        bindings.insert("s".into(), BoundVar { entity_type: "Supplier".into(), entity_id: 3 });
        let pattern = Pattern {
            root_var: "po".into(),
            edges: vec![gre_ast::PatternEdge {
                relationship_type: "orderedFrom".into(),
                direction: EdgeDirection::Forward,
                target_var: "s".into(),
            }],
            condition: None,
        };
        let (sql, params) = SqlTranslator::new().translate_pattern(&pattern, &bindings).unwrap();
        assert!(sql.contains("r.relationship_type = 'orderedFrom'"));
        assert_eq!(params, vec![Value::Int(7), Value::Int(3)]);
    }

    #[test]
    fn for_clause_pattern_referencing_its_own_loop_variable_resolves_to_row_alias() {
        // FOR (po: PurchaseOrder WHERE po -[orderedFrom]-> s AND po.status == "Open")
        let mut outer = Bindings::new();
        outer.insert("s".into(), BoundVar { entity_type: "Supplier".into(), entity_id: 3 });
        let pattern = Pattern {
            root_var: "po".into(),
            edges: vec![gre_ast::PatternEdge {
                relationship_type: "orderedFrom".into(),
                direction: EdgeDirection::Forward,
                target_var: "s".into(),
            }],
            condition: None,
        };
        let cond = Expr::And(
            Box::new(Expr::Exists(pattern)),
            Box::new(Expr::Compare {
                op: CompareOp::Eq,
                left: Box::new(Expr::path(&["po", "status"])),
                right: Box::new(Expr::Literal(Value::String("Open".into()))),
            }),
        );
        let fc = ForClause { variable: "po".into(), entity_type: "PurchaseOrder".into(), condition: Some(cond), statements: vec![] };
        let (sql, params) = SqlTranslator::new().translate_for(&fc, &outer).unwrap();
        assert!(sql.contains("r.source_id = e.id"), "sql was: {sql}");
        assert!(sql.contains("r.target_id ="));
        assert_eq!(params, vec![Value::String("PurchaseOrder".into()), Value::Int(3), Value::String("Open".into())]);
    }

    #[test]
    fn rejects_non_identifier_relationship_type() {
        let mut bindings = Bindings::new();
        bindings.insert("po".into(), BoundVar { entity_type: "PurchaseOrder".into(), entity_id: 7 });
        bindings.insert("s".into(), BoundVar { entity_type: "Supplier".into(), entity_id: 3 });
        let pattern = Pattern {
            root_var: "po".into(),
            edges: vec![gre_ast::PatternEdge {
                relationship_type: "bad; DROP TABLE graph_entities;--".into(),
                direction: EdgeDirection::Forward,
                target_var: "s".into(),
            }],
            condition: None,
        };
        assert!(SqlTranslator::new().translate_pattern(&pattern, &bindings).is_err());
    }
}
