//! Database schema definitions derived from entity descriptors
//!
//! Every entity table has an `ID INTEGER PRIMARY KEY AUTOINCREMENT` column.
//! Join tables carry a `UNIQUE(owner, referent)` constraint so repeated
//! link inserts are no-ops.

use crate::entity::{EntityDescriptor, RelationshipDescriptor};
use crate::naming::ID_COLUMN;

/// SQL to create the table of one entity
pub fn create_table_sql(descriptor: &EntityDescriptor) -> String {
    let mut columns = vec![format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", ID_COLUMN)];

    for field in descriptor.fields.iter().filter(|f| !f.is_identity()) {
        let (Some(column), Some(affinity)) = (&field.column, field.tag.affinity()) else {
            continue;
        };
        let mut definition = format!("{} {}", column, affinity);
        if field.is_unique() {
            definition.push_str(" UNIQUE");
        }
        columns.push(definition);
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        descriptor.table,
        columns.join(",\n    ")
    )
}

/// SQL to create the join table of one relationship
pub fn create_join_table_sql(relationship: &RelationshipDescriptor) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n    {owner} INTEGER NOT NULL,\n    {referent} INTEGER NOT NULL,\n    UNIQUE({owner}, {referent})\n)",
        table = relationship.join_table,
        owner = relationship.owner_column,
        referent = relationship.referent_column,
    )
}

/// All schema creation statements for one entity
pub fn all_schema_statements(descriptor: &EntityDescriptor) -> Vec<String> {
    let mut stmts = vec![create_table_sql(descriptor)];
    stmts.extend(
        descriptor
            .relationships()
            .map(|(_, relationship)| create_join_table_sql(relationship)),
    );
    stmts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::cache::descriptor_of;
    use crate::fixtures::{Account, Book, Person};

    #[test]
    fn test_entity_table() {
        let sql = create_table_sql(descriptor_of::<Book>().unwrap());
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS BOOK ("));
        assert!(sql.contains("ID INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("TITLE TEXT"));
        assert!(sql.contains("AUTHOR INTEGER"));
    }

    #[test]
    fn test_unique_column() {
        let sql = create_table_sql(descriptor_of::<Account>().unwrap());
        assert!(sql.contains("EMAIL TEXT UNIQUE"));
    }

    #[test]
    fn test_collections_have_no_column() {
        let sql = create_table_sql(descriptor_of::<Person>().unwrap());
        assert!(!sql.contains("FRIENDS"));
        assert!(sql.contains("PARTNER INTEGER"));
    }

    #[test]
    fn test_join_tables() {
        let stmts = all_schema_statements(descriptor_of::<Person>().unwrap());
        assert_eq!(stmts.len(), 4);
        assert!(stmts.iter().any(|s| s.contains("PERSON_FRIENDS")
            && s.contains("UNIQUE(PERSON_ID, FRIENDS_ID)")));
    }

    #[test]
    fn test_statements_execute() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        for descriptor in [descriptor_of::<Book>().unwrap(), descriptor_of::<Person>().unwrap()] {
            for stmt in all_schema_statements(descriptor) {
                conn.execute(&stmt, []).unwrap();
            }
        }
    }
}
