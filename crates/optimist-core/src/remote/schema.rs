//! SQLite schema for the demo widget store

use rusqlite::{params, Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Bulk read used to seed a widget store
pub const SELECT_ALL_WIDGETS: &str = "SELECT id, description, active FROM widgets ORDER BY id;";

/// Update templates mirror the optimistic change so re-running them is harmless
pub const ACTIVATE_WIDGET: &str = "UPDATE widgets SET active = TRUE WHERE id = ?;";
pub const DEACTIVATE_WIDGET: &str = "UPDATE widgets SET active = FALSE WHERE id = ?;";

/// Insert template; returns the stored row including the generated id
pub const INSERT_WIDGET: &str =
    "INSERT INTO widgets (description, active) VALUES (:description, :active) RETURNING *;";

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS widgets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            description TEXT NOT NULL,
            active BOOLEAN NOT NULL DEFAULT FALSE
        );

        CREATE INDEX IF NOT EXISTS idx_widgets_active ON widgets(active);
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Insert `count` inactive widgets named "widget 1", "widget 2", ...
///
/// Returns the number of widgets in the table afterwards.
pub fn seed_widgets(conn: &Connection, count: usize) -> Result<i64> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM widgets", [], |row| row.get(0))?;

    let mut stmt = conn.prepare("INSERT INTO widgets (description, active) VALUES (?1, FALSE)")?;
    for n in 1..=count as i64 {
        stmt.execute(params![format!("widget {}", existing + n)])?;
    }

    conn.query_row("SELECT COUNT(*) FROM widgets", [], |row| row.get(0))
}
