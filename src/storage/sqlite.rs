//! SQLite storage implementation

use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};

use super::schema;
use crate::entity::EntityDescriptor;
use crate::naming::placeholders;
use crate::row::Row;
use crate::Result;

/// SQLite-backed row store; all entity statements go through one connection
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create the entity table and its join tables if they don't exist
    pub fn create_tables(&self, descriptor: &EntityDescriptor) -> Result<()> {
        for stmt in schema::all_schema_statements(descriptor) {
            tracing::debug!("{}", stmt);
            self.conn.execute(&stmt, [])?;
        }
        Ok(())
    }

    // ========== Row Operations ==========

    /// Insert a row, replacing any row it conflicts with; returns the row id
    pub fn insert_or_replace(&self, table: &str, row: &Row) -> Result<i64> {
        let sql = if row.is_empty() {
            format!("INSERT OR REPLACE INTO {} DEFAULT VALUES", table)
        } else {
            format!(
                "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
                table,
                row.columns().collect::<Vec<_>>().join(", "),
                placeholders(row.len())
            )
        };
        tracing::debug!("{}", sql);
        self.conn.execute(&sql, params_from_iter(row.values()))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert a row unless it violates a constraint; returns whether a row was added
    pub fn insert_or_ignore(&self, table: &str, row: &Row) -> Result<bool> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
            table,
            row.columns().collect::<Vec<_>>().join(", "),
            placeholders(row.len())
        );
        tracing::debug!("{}", sql);
        let changed = self.conn.execute(&sql, params_from_iter(row.values()))?;
        Ok(changed > 0)
    }

    /// Update the matching rows; returns the number of rows changed
    pub fn update(&self, table: &str, row: &Row, filter: &str, args: &[Value]) -> Result<usize> {
        let assignments: Vec<String> = row.columns().map(|c| format!("{} = ?", c)).collect();
        let sql = format!("UPDATE {} SET {} WHERE {}", table, assignments.join(", "), filter);
        tracing::debug!("{}", sql);
        let changed = self
            .conn
            .execute(&sql, params_from_iter(row.values().chain(args.iter())))?;
        Ok(changed)
    }

    /// Delete rows matching `filter`, or every row when there is none
    pub fn delete(&self, table: &str, filter: Option<&str>, args: &[Value]) -> Result<usize> {
        let sql = match filter {
            Some(filter) => format!("DELETE FROM {} WHERE {}", table, filter),
            None => format!("DELETE FROM {}", table),
        };
        tracing::debug!("{}", sql);
        let changed = self.conn.execute(&sql, params_from_iter(args.iter()))?;
        Ok(changed)
    }

    /// Execute an arbitrary statement
    pub fn execute(&self, sql: &str, args: &[Value]) -> Result<usize> {
        tracing::debug!("{}", sql);
        let changed = self.conn.execute(sql, params_from_iter(args.iter()))?;
        Ok(changed)
    }

    /// Run a single-value `COUNT` style query
    pub fn count(&self, sql: &str, args: &[Value]) -> Result<i64> {
        tracing::debug!("{}", sql);
        let count: i64 = self
            .conn
            .query_row(sql, params_from_iter(args.iter()), |row| row.get(0))?;
        Ok(count)
    }

    /// Read every result row of a query
    pub fn read_rows(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        tracing::debug!("{}", sql);
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| Row::from_sqlite(row, &columns))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    // ========== Introspection ==========

    /// Names of all user tables
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;

        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(names)
    }

    /// Row count of every user table
    pub fn stats(&self) -> Result<Vec<TableStats>> {
        self.table_names()?
            .into_iter()
            .map(|name| {
                let rows = self.count(&format!("SELECT COUNT(*) FROM \"{}\"", name), &[])?;
                Ok(TableStats {
                    name,
                    rows: rows as usize,
                })
            })
            .collect()
    }
}

/// Row count of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    pub name: String,
    pub rows: usize,
}

impl std::fmt::Display for TableStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} rows", self.name, self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .execute(
                "CREATE TABLE NOTE (ID INTEGER PRIMARY KEY AUTOINCREMENT, TEXT TEXT, CODE TEXT UNIQUE)",
                &[],
            )
            .unwrap();
        store
    }

    fn note(text: &str, code: &str) -> Row {
        let mut row = Row::new();
        row.set("TEXT", text.to_string());
        row.set("CODE", code.to_string());
        row
    }

    #[test]
    fn test_insert_returns_row_id() {
        let store = sample_store();
        assert_eq!(store.insert_or_replace("NOTE", &note("a", "x")).unwrap(), 1);
        assert_eq!(store.insert_or_replace("NOTE", &note("b", "y")).unwrap(), 2);
    }

    #[test]
    fn test_insert_default_values() {
        let store = sample_store();
        let id = store.insert_or_replace("NOTE", &Row::new()).unwrap();
        assert_eq!(id, 1);
        assert_eq!(store.count("SELECT COUNT(*) FROM NOTE", &[]).unwrap(), 1);
    }

    #[test]
    fn test_replace_on_conflict() {
        let store = sample_store();
        store.insert_or_replace("NOTE", &note("a", "x")).unwrap();
        store.insert_or_replace("NOTE", &note("b", "x")).unwrap();

        let rows = store.read_rows("SELECT * FROM NOTE", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("TEXT"), Some(&Value::Text("b".into())));
    }

    #[test]
    fn test_insert_or_ignore() {
        let store = sample_store();
        assert!(store.insert_or_ignore("NOTE", &note("a", "x")).unwrap());
        assert!(!store.insert_or_ignore("NOTE", &note("b", "x")).unwrap());
    }

    #[test]
    fn test_update_and_delete() {
        let store = sample_store();
        store.insert_or_replace("NOTE", &note("a", "x")).unwrap();

        let mut change = Row::new();
        change.set("TEXT", "z".to_string());
        let updated = store
            .update("NOTE", &change, "CODE = ?", &[Value::Text("x".into())])
            .unwrap();
        assert_eq!(updated, 1);

        let deleted = store.delete("NOTE", Some("ID = ?"), &[Value::Integer(1)]).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.delete("NOTE", None, &[]).unwrap(), 0);
    }

    #[test]
    fn test_stats() {
        let store = sample_store();
        store.insert_or_replace("NOTE", &note("a", "x")).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats, vec![TableStats { name: "NOTE".into(), rows: 1 }]);
        assert_eq!(stats[0].to_string(), "NOTE: 1 rows");
    }
}
