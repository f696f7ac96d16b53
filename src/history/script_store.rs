//! Persistence for user script filters

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tracing::warn;

use super::{new_record_id, ContentType, HistoryDatabase, StoreError, StoreResult};
use crate::scripts::{ScriptFilter, ScriptTrigger};

const SCRIPT_COLUMNS: &str = "id, name, enabled, trigger, content_types, keywords, script, \
     description, sort_order, plugin_id, created_at, updated_at";

/// Matches SQLite's `datetime('now')`
const SQLITE_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

impl HistoryDatabase {
    /// Upsert a script; new scripts get an id and a sort order above every other
    pub async fn save_script(&self, script: &mut ScriptFilter) -> StoreResult<()> {
        let conn = self.conn.lock().await;

        if script.id.is_empty() {
            script.id = new_record_id();
            script.created_at = Utc::now();
            if script.sort_order == 0 {
                let max: Option<i64> =
                    conn.query_row("SELECT MAX(sort_order) FROM user_scripts", [], |row| {
                        row.get::<_, Option<i64>>(0)
                    })?;
                script.sort_order = max.map_or(1, |max| max + 1);
            }
        }
        script.updated_at = Utc::now();

        let content_types: Vec<&str> = script.content_types.iter().map(|t| t.as_str()).collect();

        conn.execute(
            "INSERT INTO user_scripts
             (id, name, enabled, trigger, content_types, keywords, script, description,
              sort_order, plugin_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 enabled = excluded.enabled,
                 trigger = excluded.trigger,
                 content_types = excluded.content_types,
                 keywords = excluded.keywords,
                 script = excluded.script,
                 description = excluded.description,
                 sort_order = excluded.sort_order,
                 plugin_id = excluded.plugin_id,
                 updated_at = excluded.updated_at",
            params![
                script.id,
                script.name,
                script.enabled,
                script.trigger.as_str(),
                serde_json::to_string(&content_types)?,
                serde_json::to_string(&script.keywords)?,
                script.script,
                script.description,
                script.sort_order,
                script.plugin_id,
                format_datetime(&script.created_at),
                format_datetime(&script.updated_at),
            ],
        )?;

        Ok(())
    }

    pub async fn get_script(&self, id: &str) -> StoreResult<ScriptFilter> {
        let conn = self.conn.lock().await;

        conn.query_row(
            &format!("SELECT {} FROM user_scripts WHERE id = ?1", SCRIPT_COLUMNS),
            params![id],
            row_to_script,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("script {}", id)))
    }

    /// All scripts, highest sort order first
    pub async fn scripts(&self) -> StoreResult<Vec<ScriptFilter>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM user_scripts ORDER BY sort_order DESC, created_at DESC",
            SCRIPT_COLUMNS
        ))?;
        let scripts = stmt
            .query_map([], row_to_script)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(scripts)
    }

    pub async fn enabled_scripts(&self, trigger: ScriptTrigger) -> StoreResult<Vec<ScriptFilter>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM user_scripts
             WHERE enabled = 1 AND trigger = ?1
             ORDER BY sort_order DESC, created_at DESC",
            SCRIPT_COLUMNS
        ))?;
        let scripts = stmt
            .query_map(params![trigger.as_str()], row_to_script)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(scripts)
    }

    /// Scripts with the given ids, ordered like [`Self::scripts`]; unknown ids are skipped
    pub async fn scripts_by_ids(&self, ids: &[String]) -> StoreResult<Vec<ScriptFilter>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock().await;

        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM user_scripts
             WHERE id IN ({})
             ORDER BY sort_order DESC, created_at DESC",
            SCRIPT_COLUMNS, placeholders
        ))?;
        let scripts = stmt
            .query_map(params_from_iter(ids), row_to_script)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(scripts)
    }

    pub async fn delete_script(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().await;

        let deleted = conn.execute("DELETE FROM user_scripts WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(format!("script {}", id)));
        }

        Ok(())
    }

    pub async fn update_script_order(&self, id: &str, sort_order: i64) -> StoreResult<()> {
        let conn = self.conn.lock().await;

        let updated = conn.execute(
            "UPDATE user_scripts SET sort_order = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![sort_order, id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("script {}", id)));
        }

        Ok(())
    }
}

fn format_datetime(datetime: &DateTime<Utc>) -> String {
    datetime.format(SQLITE_DATETIME).to_string()
}

fn parse_datetime(value: Option<String>) -> DateTime<Utc> {
    value
        .and_then(|value| NaiveDateTime::parse_from_str(&value, SQLITE_DATETIME).ok())
        .map(|naive| naive.and_utc())
        .unwrap_or_else(Utc::now)
}

/// Decode a JSON string array column, tolerating NULL and empty values
fn parse_string_list(id: &str, column: &str, value: Option<String>) -> Vec<String> {
    match value.as_deref() {
        None | Some("") | Some("null") => Vec::new(),
        Some(json) => serde_json::from_str(json).unwrap_or_else(|e| {
            warn!("Ignoring malformed {} on script {}: {}", column, id, e);
            Vec::new()
        }),
    }
}

fn row_to_script(row: &Row) -> rusqlite::Result<ScriptFilter> {
    let id: String = row.get(0)?;

    let trigger: String = row.get(3)?;
    let trigger = trigger
        .parse::<ScriptTrigger>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    let content_types = parse_string_list(&id, "content_types", row.get(4)?)
        .into_iter()
        .filter_map(|name| match name.parse::<ContentType>() {
            Ok(content_type) => Some(content_type),
            Err(e) => {
                warn!("Ignoring content type on script {}: {}", id, e);
                None
            }
        })
        .collect();
    let keywords = parse_string_list(&id, "keywords", row.get(5)?);

    Ok(ScriptFilter {
        name: row.get(1)?,
        enabled: row.get::<_, Option<bool>>(2)?.unwrap_or(true),
        trigger,
        content_types,
        keywords,
        script: row.get(6)?,
        description: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        sort_order: row.get::<_, Option<i64>>(8)?.unwrap_or_default(),
        plugin_id: row
            .get::<_, Option<String>>(9)?
            .filter(|plugin_id| !plugin_id.is_empty()),
        created_at: parse_datetime(row.get(10)?),
        updated_at: parse_datetime(row.get(11)?),
        id,
    })
}
