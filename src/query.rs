//! Query - selection criteria for reading entities
//!
//! A query is a `WHERE` clause with positional `?` arguments plus optional
//! grouping, ordering and paging. Table names come from the entity
//! descriptor, never from the query.

use rusqlite::types::Value;

/// A value usable as a positional query argument
pub trait ToArg {
    fn to_arg(&self) -> Value;
}

impl ToArg for str {
    fn to_arg(&self) -> Value {
        Value::Text(self.to_string())
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl ToArg for i64 {
    fn to_arg(&self) -> Value {
        Value::Integer(*self)
    }
}

impl ToArg for i32 {
    fn to_arg(&self) -> Value {
        Value::Integer(i64::from(*self))
    }
}

impl ToArg for u32 {
    fn to_arg(&self) -> Value {
        Value::Integer(i64::from(*self))
    }
}

impl ToArg for f64 {
    fn to_arg(&self) -> Value {
        Value::Real(*self)
    }
}

/// Booleans bind as `1` / `0`, matching how they are stored
impl ToArg for bool {
    fn to_arg(&self) -> Value {
        Value::Integer(i64::from(*self))
    }
}

impl ToArg for Value {
    fn to_arg(&self) -> Value {
        self.clone()
    }
}

impl<T: ToArg> ToArg for Option<T> {
    fn to_arg(&self) -> Value {
        self.as_ref().map_or(Value::Null, ToArg::to_arg)
    }
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn to_arg(&self) -> Value {
        (**self).to_arg()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filter: Option<String>,
    args: Vec<Value>,
    group_by: Option<String>,
    order_by: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Query {
    /// Matches every row
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `WHERE` clause (without the keyword)
    pub fn filter(mut self, clause: impl Into<String>) -> Self {
        self.filter = Some(clause.into());
        self
    }

    /// Bind the next positional argument
    pub fn arg(mut self, value: impl ToArg) -> Self {
        self.args.push(value.to_arg());
        self
    }

    pub fn args<I>(mut self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        self.args.extend(values.into_iter().map(|v| v.to_arg()));
        self
    }

    pub fn group_by(mut self, clause: impl Into<String>) -> Self {
        self.group_by = Some(clause.into());
        self
    }

    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Bound arguments, in order
    pub fn arguments(&self) -> &[Value] {
        &self.args
    }

    pub fn select_sql(&self, table: &str) -> String {
        let mut sql = format!("SELECT * FROM {}", table);
        self.push_filter(&mut sql);
        if let Some(group_by) = &self.group_by {
            sql.push_str(&format!(" GROUP BY {}", group_by));
        }
        if let Some(order_by) = &self.order_by {
            sql.push_str(&format!(" ORDER BY {}", order_by));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            // SQLite only accepts OFFSET after a LIMIT
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }
        sql
    }

    pub fn count_sql(&self, table: &str) -> String {
        let mut sql = format!("SELECT COUNT(*) FROM {}", table);
        self.push_filter(&mut sql);
        sql
    }

    fn push_filter(&self, sql: &mut String) {
        if let Some(filter) = self.filter.as_deref().filter(|f| !f.trim().is_empty()) {
            sql.push_str(&format!(" WHERE {}", filter));
        }
    }
}
