//! Action registry (C6, §4.3). Keyed by `(entity_type, action_name)`;
//! registering an existing key overwrites by design so re-uploading a
//! definition works without an explicit delete first.

use std::collections::BTreeMap;
use std::sync::RwLock;

use gre_ast::ActionDef;

type Key = (String, String);

/// Readers take a short-lived lock rather than a full snapshot copy — the
/// map is read-mostly and writes are rare (upload/delete), matching §5's
/// "readers take a short-lived immutable snapshot" via a read guard.
#[derive(Default)]
pub struct ActionRegistry {
    inner: RwLock<BTreeMap<Key, ActionDef>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, action: ActionDef) {
        let key = action.key();
        self.inner.write().expect("action registry poisoned").insert(key, action);
    }

    pub fn unregister(&self, entity_type: &str, action_name: &str) -> bool {
        self.inner
            .write()
            .expect("action registry poisoned")
            .remove(&(entity_type.to_string(), action_name.to_string()))
            .is_some()
    }

    pub fn lookup(&self, entity_type: &str, action_name: &str) -> Option<ActionDef> {
        self.inner
            .read()
            .expect("action registry poisoned")
            .get(&(entity_type.to_string(), action_name.to_string()))
            .cloned()
    }

    pub fn list_by_entity(&self, entity_type: &str) -> Vec<ActionDef> {
        self.inner
            .read()
            .expect("action registry poisoned")
            .values()
            .filter(|a| a.entity_type == entity_type)
            .cloned()
            .collect()
    }

    pub fn list_all(&self) -> Vec<ActionDef> {
        self.inner.read().expect("action registry poisoned").values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("action registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use gre_ast::ActionDef;

    use super::*;

    fn action(entity_type: &str, name: &str) -> ActionDef {
        ActionDef {
            entity_type: entity_type.to_string(),
            action_name: name.to_string(),
            parameters: vec![],
            preconditions: vec![],
            effect: None,
            description: None,
        }
    }

    #[test]
    fn register_overwrites_by_key() {
        let reg = ActionRegistry::new();
        reg.register(action("PurchaseOrder", "submit"));
        let mut second = action("PurchaseOrder", "submit");
        second.description = Some("v2".to_string());
        reg.register(second);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.lookup("PurchaseOrder", "submit").unwrap().description.as_deref(), Some("v2"));
    }

    #[test]
    fn unregister_reports_presence() {
        let reg = ActionRegistry::new();
        assert!(!reg.unregister("PurchaseOrder", "submit"));
        reg.register(action("PurchaseOrder", "submit"));
        assert!(reg.unregister("PurchaseOrder", "submit"));
        assert!(reg.lookup("PurchaseOrder", "submit").is_none());
    }
}
