//! DSL text storage for rules and actions (§4.10). Uploads round-trip
//! through the parser before they're committed; boot-time loads skip rows
//! that no longer parse (schema drift, a hand-edited row) and log a warning
//! rather than refusing to start — mirrors `rule_storage.py`'s boot
//! behavior in `original_source`.

use diesel::prelude::*;
use gre_ast::{ParsedItem, RuleDef};
use gre_core::errors::EngineError;
use gre_core::hashing::hash_str;
use gre_core::parser::parse;

use crate::error::PersistenceError;
use crate::pg::PgPool;
use crate::schema::rules;

#[derive(Queryable, Insertable, Debug)]
#[diesel(table_name = rules)]
struct RuleRow {
    name: String,
    dsl_text: String,
    definition_hash: String,
    enabled: bool,
    updated_at: chrono::DateTime<chrono::Utc>,
}

pub struct PgRuleStorage {
    pool: PgPool,
}

impl PgRuleStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Parses `dsl_text` first and rejects it before writing anything,
    /// exactly as `rule_storage.py`/`app/api/rules.py` do. `dsl_text` must
    /// contain exactly one rule.
    pub async fn upload(&self, dsl_text: String) -> Result<RuleDef, EngineError> {
        let items = parse(&dsl_text)?;
        let rule = items.into_iter().find_map(|item| match item {
            ParsedItem::Rule(r) => Some(r),
            _ => None,
        });
        let Some(rule) = rule else {
            return Err(EngineError::Validation(gre_core::errors::ValidationError::NoRuleInUpload(dsl_text)));
        };

        let pool = self.pool.clone();
        let name = rule.name.clone();
        let hash = hash_str(&dsl_text);
        let row = RuleRow { name, dsl_text, definition_hash: hash, enabled: true, updated_at: chrono::Utc::now() };
        tokio::task::spawn_blocking(move || -> Result<(), PersistenceError> {
            let mut conn = pool.get()?;
            diesel::insert_into(rules::table)
                .values(&row)
                .on_conflict(rules::name)
                .do_update()
                .set((rules::dsl_text.eq(&row.dsl_text), rules::definition_hash.eq(&row.definition_hash), rules::updated_at.eq(&row.updated_at)))
                .execute(&mut conn)?;
            Ok(())
        })
        .await
        .map_err(|e| EngineError::Eval(format!("join error: {e}")))?
        .map_err(|e| EngineError::Eval(e.to_string()))?;

        Ok(rule)
    }

    /// Loads every enabled rule, skipping (and logging) rows whose stored
    /// text no longer parses rather than refusing to boot.
    pub async fn load_all(&self) -> Result<Vec<RuleDef>, PersistenceError> {
        let pool = self.pool.clone();
        let rows: Vec<RuleRow> = tokio::task::spawn_blocking(move || -> Result<Vec<RuleRow>, PersistenceError> {
            let mut conn = pool.get()?;
            let rows = rules::table.filter(rules::enabled.eq(true)).load(&mut conn)?;
            Ok(rows)
        })
        .await
        .map_err(|e| PersistenceError::Unknown(format!("join error: {e}")))??;

        let mut loaded = Vec::new();
        for row in rows {
            match parse(&row.dsl_text) {
                Ok(items) => {
                    let found = items.into_iter().find_map(|item| match item {
                        ParsedItem::Rule(r) => Some(r),
                        _ => None,
                    });
                    match found {
                        Some(rule) => loaded.push(rule),
                        None => tracing::warn!(rule = %row.name, "stored rule text contains no rule, skipping"),
                    }
                }
                Err(e) => tracing::warn!(rule = %row.name, error = %e, "stored rule text no longer parses, skipping"),
            }
        }
        Ok(loaded)
    }
}
