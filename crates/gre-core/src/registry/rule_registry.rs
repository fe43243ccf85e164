//! Rule registry (C8, §4.3). Keyed by `name`; registering a duplicate name
//! is a `ValidationError`, unlike the action registry's overwrite-by-design.
//! A secondary index maps `trigger_key` to rule names for `get_by_trigger`.

use std::collections::BTreeMap;
use std::sync::RwLock;

use gre_ast::{RuleDef, Trigger};

use crate::errors::ValidationError;

struct Inner {
    by_name: BTreeMap<String, RuleDef>,
    /// Registration order per rule name, used to break priority ties.
    order: BTreeMap<String, u64>,
    next_seq: u64,
    /// `trigger_key -> [rule name]`, insertion order preserved per bucket.
    by_trigger: BTreeMap<String, Vec<String>>,
}

impl Default for Inner {
    fn default() -> Self {
        Self { by_name: BTreeMap::new(), order: BTreeMap::new(), next_seq: 0, by_trigger: BTreeMap::new() }
    }
}

#[derive(Default)]
pub struct RuleRegistry {
    inner: RwLock<Inner>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, rule: RuleDef) -> Result<(), ValidationError> {
        let mut inner = self.inner.write().expect("rule registry poisoned");
        if inner.by_name.contains_key(&rule.name) {
            return Err(ValidationError::DuplicateRuleName(rule.name.clone()));
        }
        let key = rule.trigger.trigger_key();
        inner.by_trigger.entry(key).or_default().push(rule.name.clone());
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(rule.name.clone(), seq);
        inner.by_name.insert(rule.name.clone(), rule);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<RuleDef> {
        self.inner.read().expect("rule registry poisoned").by_name.get(name).cloned()
    }

    /// Rules sorted by `priority` descending, ties broken by registration
    /// order (P5). `trigger.property == None` matches any property of the
    /// entity_type; looks up both the specific and the wildcard bucket.
    pub fn get_by_trigger(&self, trigger: &Trigger) -> Vec<RuleDef> {
        let inner = self.inner.read().expect("rule registry poisoned");
        let wildcard_key = format!("{}:{}", trigger.trigger_type.as_str(), trigger.entity_type);
        let mut names: Vec<String> = Vec::new();
        if let Some(ns) = inner.by_trigger.get(&trigger.trigger_key()) {
            names.extend(ns.iter().cloned());
        }
        // Wildcard rules (no declared property) match any property event,
        // and must not be double-counted when the event itself has no property.
        if trigger.property.is_some() {
            if let Some(ns) = inner.by_trigger.get(&wildcard_key) {
                names.extend(ns.iter().cloned());
            }
        }
        let mut rules: Vec<RuleDef> = names.into_iter().filter_map(|n| inner.by_name.get(&n).cloned()).collect();
        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| inner.order[&a.name].cmp(&inner.order[&b.name]))
        });
        rules
    }

    pub fn get_all(&self) -> Vec<RuleDef> {
        self.inner.read().expect("rule registry poisoned").by_name.values().cloned().collect()
    }

    pub fn clear(&self) {
        *self.inner.write().expect("rule registry poisoned") = Inner::default();
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("rule registry poisoned").by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().expect("rule registry poisoned").by_name.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use gre_ast::{ForClause, TriggerType};

    use super::*;

    fn rule(name: &str, priority: i32, entity_type: &str, property: Option<&str>) -> RuleDef {
        RuleDef {
            name: name.to_string(),
            priority,
            trigger: Trigger { trigger_type: TriggerType::Update, entity_type: entity_type.to_string(), property: property.map(String::from) },
            body: ForClause { variable: "x".into(), entity_type: entity_type.to_string(), condition: None, statements: vec![] },
        }
    }

    #[test]
    fn duplicate_name_rejected_and_original_kept() {
        let reg = RuleRegistry::new();
        reg.register(rule("R1", 10, "Supplier", Some("status"))).unwrap();
        let err = reg.register(rule("R1", 99, "Supplier", Some("status"))).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateRuleName(ref n) if n == "R1"));
        assert_eq!(reg.lookup("R1").unwrap().priority, 10);
    }

    #[test]
    fn get_by_trigger_orders_by_priority_then_registration() {
        let reg = RuleRegistry::new();
        reg.register(rule("Low", 10, "Supplier", Some("status"))).unwrap();
        reg.register(rule("High", 100, "Supplier", Some("status"))).unwrap();
        reg.register(rule("Mid", 100, "Supplier", Some("status"))).unwrap();
        let trigger = Trigger { trigger_type: TriggerType::Update, entity_type: "Supplier".into(), property: Some("status".into()) };
        let matched: Vec<String> = reg.get_by_trigger(&trigger).into_iter().map(|r| r.name).collect();
        assert_eq!(matched, vec!["High", "Mid", "Low"]);
    }

    #[test]
    fn wildcard_property_matches_any_property_event() {
        let reg = RuleRegistry::new();
        reg.register(rule("AnyProp", 0, "Supplier", None)).unwrap();
        let trigger = Trigger { trigger_type: TriggerType::Update, entity_type: "Supplier".into(), property: Some("status".into()) };
        let matched = reg.get_by_trigger(&trigger);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "AnyProp");
    }
}
