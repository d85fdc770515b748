//! Row - ordered column name to storage value mapping exchanged with the store

use rusqlite::types::Value;

use crate::naming::ID_COLUMN;

/// An ordered set of `(column, value)` pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing any previous value in place
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.cells.iter_mut().find(|(c, _)| *c == column) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((column, value)),
        }
    }

    /// Look up a column, case-insensitively (SQLite column names are)
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(column))
            .map(|(_, v)| v)
    }

    /// The `ID` column as an integer, if present
    pub fn id(&self) -> Option<i64> {
        match self.get(ID_COLUMN) {
            Some(Value::Integer(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.cells.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.cells.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Copy a result row, using the statement's column names
    pub fn from_sqlite(row: &rusqlite::Row<'_>, columns: &[String]) -> rusqlite::Result<Self> {
        let mut cells = Vec::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            cells.push((name.clone(), row.get::<_, Value>(i)?));
        }
        Ok(Self { cells })
    }

    /// JSON object keyed by column; blobs are rendered as byte arrays
    pub fn to_json(&self) -> serde_json::Value {
        let object = self
            .cells
            .iter()
            .map(|(column, value)| {
                let json = match value {
                    Value::Null => serde_json::Value::Null,
                    Value::Integer(v) => serde_json::Value::from(*v),
                    Value::Real(v) => serde_json::Value::from(*v),
                    Value::Text(v) => serde_json::Value::from(v.as_str()),
                    Value::Blob(v) => serde_json::Value::from(v.clone()),
                };
                (column.clone(), json)
            })
            .collect();
        serde_json::Value::Object(object)
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.set(column, value);
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_in_place() {
        let mut row = Row::new();
        row.set("TITLE", "Dune".to_string());
        row.set("PAGES", 412i64);
        row.set("TITLE", "Emma".to_string());

        let columns: Vec<_> = row.columns().collect();
        assert_eq!(columns, vec!["TITLE", "PAGES"]);
        assert_eq!(row.get("title"), Some(&Value::Text("Emma".into())));
    }

    #[test]
    fn test_id() {
        let mut row = Row::new();
        assert_eq!(row.id(), None);
        row.set("ID", 9i64);
        assert_eq!(row.id(), Some(9));
    }

    #[test]
    fn test_from_sqlite() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let columns = vec!["ID".to_string(), "NAME".to_string()];
        let row = conn
            .query_row("SELECT 3 AS ID, 'x' AS NAME", [], |r| Row::from_sqlite(r, &columns))
            .unwrap();

        assert_eq!(row.id(), Some(3));
        assert_eq!(row.get("NAME"), Some(&Value::Text("x".into())));
    }

    #[test]
    fn test_to_json() {
        let mut row = Row::new();
        row.set("ID", 1i64);
        row.set("NAME", "x".to_string());
        row.set("NOTE", Value::Null);

        let json = row.to_json();
        assert_eq!(json["ID"], 1);
        assert_eq!(json["NAME"], "x");
        assert!(json["NOTE"].is_null());
    }
}
