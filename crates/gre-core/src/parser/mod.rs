//! DSL parser (C2, §4.1): lexes and parses text into a flat list of
//! `ActionDef`/`RuleDef` nodes. No semantic validation happens here —
//! that's the registries' and executor's job.

mod error;
mod grammar;
mod lexer;

pub use error::ParseError;
pub use grammar::parse;
pub use lexer::{lex, Spanned, Token};

#[cfg(test)]
mod tests {
    use super::*;
    use gre_ast::{CompareOp, Expr, ParsedItem, Statement, TriggerType};

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

    const RULE_DSL: &str = r#"
RULE SupplierStatusBlocking PRIORITY 100 {
    ON UPDATE(Supplier.status)
    FOR (s: Supplier WHERE s.status IN ["Expired", "Blacklisted"]) {
        FOR (po: PurchaseOrder WHERE po -[orderedFrom]-> s AND po.status == "Open") {
            SET po.status = "RiskLocked";
        }
    }
}
"#;

    #[test]
    fn empty_dsl_parses_to_empty_list() {
        assert_eq!(parse("").unwrap(), vec![]);
        assert_eq!(parse("   \n\n  ").unwrap(), vec![]);
    }

    #[test]
    fn parses_action_with_two_preconditions_and_effect() {
        let items = parse(ACTION_DSL).unwrap();
        assert_eq!(items.len(), 1);
        let ParsedItem::Action(a) = &items[0] else { panic!("expected action") };
        assert_eq!(a.entity_type, "PurchaseOrder");
        assert_eq!(a.action_name, "submit");
        assert_eq!(a.preconditions.len(), 2);
        assert_eq!(a.preconditions[0].name.as_deref(), Some("statusCheck"));
        assert_eq!(a.preconditions[1].name, None);
        assert!(matches!(
            &a.preconditions[0].condition,
            Expr::Compare { op: CompareOp::Eq, .. }
        ));
        let effect = a.effect.as_ref().unwrap();
        assert_eq!(effect.sets.len(), 2);
        assert_eq!(effect.sets[0].target_path, vec!["this", "status"]);
    }

    #[test]
    fn parses_rule_with_nested_for_and_pattern() {
        let items = parse(RULE_DSL).unwrap();
        assert_eq!(items.len(), 1);
        let ParsedItem::Rule(r) = &items[0] else { panic!("expected rule") };
        assert_eq!(r.name, "SupplierStatusBlocking");
        assert_eq!(r.priority, 100);
        assert_eq!(r.trigger.trigger_type, TriggerType::Update);
        assert_eq!(r.trigger.entity_type, "Supplier");
        assert_eq!(r.trigger.property.as_deref(), Some("status"));
        assert_eq!(r.body.variable, "s");
        assert_eq!(r.body.statements.len(), 1);
        let Statement::For(inner) = &r.body.statements[0] else { panic!("expected nested for") };
        assert_eq!(inner.variable, "po");
        assert!(inner.condition.is_some());
    }

    #[test]
    fn parse_error_reports_line_and_column() {
        let bad = "ACTION Foo.bar {\n  PRECONDITION: this.x ==\n}";
        let err = parse(bad).unwrap_err();
        assert!(err.line >= 1);
    }

    #[test]
    fn trigger_statement_with_with_clause_parses_params() {
        let dsl = r#"
RULE R {
    ON UPDATE(A)
    FOR (a: A) {
        TRIGGER B.doit FOR a WITH { amount: 10, note: "x" };
    }
}
"#;
        let items = parse(dsl).unwrap();
        let ParsedItem::Rule(r) = &items[0] else { panic!() };
        let Statement::Trigger(t) = &r.body.statements[0] else { panic!() };
        assert_eq!(t.entity_type, "B");
        assert_eq!(t.action_name, "doit");
        assert_eq!(t.target_var, "a");
        assert_eq!(t.params.len(), 2);
    }
}
