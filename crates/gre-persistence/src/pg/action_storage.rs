//! DSL text storage for action definitions (§4.10's upload/round-trip
//! validation applies equally to actions, mirroring `rule_storage.py`'s
//! sibling action-storage path in `original_source`).

use diesel::prelude::*;
use gre_ast::{ActionDef, ParsedItem};
use gre_core::errors::{EngineError, ValidationError};
use gre_core::hashing::hash_str;
use gre_core::parser::parse;

use crate::error::PersistenceError;
use crate::pg::PgPool;
use crate::schema::action_definitions;

#[derive(Queryable, Insertable, Debug)]
#[diesel(table_name = action_definitions)]
struct ActionRow {
    entity_type: String,
    action_name: String,
    dsl_text: String,
    definition_hash: String,
    updated_at: chrono::DateTime<chrono::Utc>,
}

pub struct PgActionStorage {
    pool: PgPool,
}

impl PgActionStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upload(&self, dsl_text: String) -> Result<ActionDef, EngineError> {
        let items = parse(&dsl_text)?;
        let action = items.into_iter().find_map(|item| match item {
            ParsedItem::Action(a) => Some(a),
            _ => None,
        });
        let Some(action) = action else {
            return Err(EngineError::Validation(ValidationError::NoRuleInUpload(dsl_text)));
        };

        let pool = self.pool.clone();
        let hash = hash_str(&dsl_text);
        let row = ActionRow { entity_type: action.entity_type.clone(), action_name: action.action_name.clone(), dsl_text, definition_hash: hash, updated_at: chrono::Utc::now() };
        tokio::task::spawn_blocking(move || -> Result<(), PersistenceError> {
            let mut conn = pool.get()?;
            diesel::insert_into(action_definitions::table)
                .values(&row)
                .on_conflict((action_definitions::entity_type, action_definitions::action_name))
                .do_update()
                .set((action_definitions::dsl_text.eq(&row.dsl_text), action_definitions::definition_hash.eq(&row.definition_hash), action_definitions::updated_at.eq(&row.updated_at)))
                .execute(&mut conn)?;
            Ok(())
        })
        .await
        .map_err(|e| EngineError::Eval(format!("join error: {e}")))?
        .map_err(|e| EngineError::Eval(e.to_string()))?;

        Ok(action)
    }

    pub async fn load_all(&self) -> Result<Vec<ActionDef>, PersistenceError> {
        let pool = self.pool.clone();
        let rows: Vec<ActionRow> = tokio::task::spawn_blocking(move || -> Result<Vec<ActionRow>, PersistenceError> {
            let mut conn = pool.get()?;
            Ok(action_definitions::table.load(&mut conn)?)
        })
        .await
        .map_err(|e| PersistenceError::Unknown(format!("join error: {e}")))??;

        let mut loaded = Vec::new();
        for row in rows {
            match parse(&row.dsl_text) {
                Ok(items) => {
                    let found = items.into_iter().find_map(|item| match item {
                        ParsedItem::Action(a) => Some(a),
                        _ => None,
                    });
                    match found {
                        Some(action) => loaded.push(action),
                        None => tracing::warn!(entity_type = %row.entity_type, action = %row.action_name, "stored action text contains no action, skipping"),
                    }
                }
                Err(e) => tracing::warn!(entity_type = %row.entity_type, action = %row.action_name, error = %e, "stored action text no longer parses, skipping"),
            }
        }
        Ok(loaded)
    }
}
