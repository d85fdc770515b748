//! Naming conventions - type and field names to SQL identifiers
//!
//! The mapping is deterministic: the same input always yields the same
//! identifier, which is what makes a saved row readable again.
//!
//! Examples:
//! - `BookAuthor` → `BOOK_AUTHOR`
//! - `first_name` → `FIRST_NAME`
//! - `HTTPServer` → `HTTP_SERVER`

/// Column holding every entity's row identifier
pub const ID_COLUMN: &str = "ID";

/// Convert a type or field name into an upper snake case SQL identifier
pub fn to_sql_name(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.extend(c.to_uppercase());
    }

    out
}

/// Last path segment of a Rust type name, without generic arguments
///
/// `my_app::model::Book` → `Book`
pub fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Default join table for a relationship field: `<OWNER>_<FIELD>`
pub fn join_table_name(owner: &str, field: &str) -> String {
    format!("{}_{}", to_sql_name(owner), to_sql_name(field))
}

/// Default join column for one side of a relationship: `<NAME>_ID`
pub fn join_column_name(name: &str) -> String {
    format!("{}_{}", to_sql_name(name), ID_COLUMN)
}

/// Comma separated `?` placeholders for an `IN (...)` clause
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case_types() {
        assert_eq!(to_sql_name("Book"), "BOOK");
        assert_eq!(to_sql_name("BookAuthor"), "BOOK_AUTHOR");
        assert_eq!(to_sql_name("HTTPServer"), "HTTP_SERVER");
        assert_eq!(to_sql_name("Item2Box"), "ITEM2_BOX");
    }

    #[test]
    fn test_snake_case_fields() {
        assert_eq!(to_sql_name("title"), "TITLE");
        assert_eq!(to_sql_name("first_name"), "FIRST_NAME");
        assert_eq!(to_sql_name("firstName"), "FIRST_NAME");
        assert_eq!(to_sql_name("already_SNAKE"), "ALREADY_SNAKE");
    }

    #[test]
    fn test_deterministic() {
        for name in ["Book", "created_at", "XMLHttpRequest", ""] {
            assert_eq!(to_sql_name(name), to_sql_name(name));
        }
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("my_app::model::Book"), "Book");
        assert_eq!(short_type_name("Book"), "Book");
        assert_eq!(short_type_name("a::Wrapper<b::Inner>"), "Wrapper");
    }

    #[test]
    fn test_join_names() {
        assert_eq!(join_table_name("Book", "author"), "BOOK_AUTHOR");
        assert_eq!(join_column_name("Book"), "BOOK_ID");
        assert_eq!(join_column_name("co_authors"), "CO_AUTHORS_ID");
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(0), "");
    }
}
