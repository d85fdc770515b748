//! Relationship resolver - plans which objects a save touches and which join rows it writes
//!
//! The object graph is walked depth-first from the root. Every object is
//! tracked in a visited set keyed by [`HandleKey`], so shared and cyclic
//! references are planned exactly once. Join rows are collected as pairs of
//! nodes; their identifiers are resolved only when they are flushed.

use std::collections::{BTreeMap, HashSet};

use crate::entity::{Cardinality, HandleKey, Node};
use crate::value::FieldValue;
use crate::Result;

/// One `(owner, referent)` row of a join table
#[derive(Debug, Clone)]
pub struct JoinLink {
    pub owner_column: String,
    pub referent_column: String,
    pub owner: Node,
    pub referent: Node,
    /// Relationship field that produced the link
    pub field: String,
}

/// Objects and join rows involved in saving one root object
#[derive(Debug, Default)]
pub struct SavePlan {
    /// Cascaded objects in post-order (referents before referrers), root excluded
    pub members: Vec<Node>,
    /// Join rows grouped by join table
    pub joins: BTreeMap<String, Vec<JoinLink>>,
}

impl SavePlan {
    pub fn link_count(&self) -> usize {
        self.joins.values().map(Vec::len).sum()
    }
}

/// Plan the save of `root` and everything it cascades to
pub fn plan_save(root: &Node) -> Result<SavePlan> {
    let mut plan = SavePlan::default();
    let mut visited = HashSet::from([root.key()]);
    walk(root, &mut visited, &mut plan, true)?;
    Ok(plan)
}

/// Collect the join rows of `owner` without descending into referents
pub fn plan_links(owner: &Node) -> Result<SavePlan> {
    let mut plan = SavePlan::default();
    let mut visited = HashSet::from([owner.key()]);
    walk(owner, &mut visited, &mut plan, false)?;
    Ok(plan)
}

fn walk(
    owner: &Node,
    visited: &mut HashSet<HandleKey>,
    plan: &mut SavePlan,
    descend: bool,
) -> Result<()> {
    let descriptor = owner.descriptor()?;

    for (field, relationship) in descriptor.relationships() {
        // Read releases the owner's borrow before any recursion
        let referents = match owner.read(field)? {
            FieldValue::Entity(node) => vec![node],
            FieldValue::Entities(nodes) => nodes,
            _ => Vec::new(),
        };
        debug_assert!(
            relationship.cardinality == Cardinality::Collection || referents.len() <= 1
        );

        for referent in referents {
            let newly_planned = relationship.cascade && visited.insert(referent.key());

            plan.joins
                .entry(relationship.join_table.clone())
                .or_default()
                .push(JoinLink {
                    owner_column: relationship.owner_column.clone(),
                    referent_column: relationship.referent_column.clone(),
                    owner: owner.clone(),
                    referent: referent.clone(),
                    field: field.name.clone(),
                });

            if newly_planned && descend {
                walk(&referent, visited, plan, descend)?;
                plan.members.push(referent);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Handle;
    use crate::fixtures::{Author, Book, Person, Tag};

    #[test]
    fn test_single_relationship_plans_referent_first() {
        let author = Handle::new(Author::named("Tolkien"));
        let book = Handle::new(Book::titled("The Hobbit"));
        book.borrow_mut().author = Some(author.clone());

        let plan = plan_save(&book.erase()).unwrap();
        assert_eq!(plan.members.len(), 1);
        assert_eq!(plan.members[0].key(), author.key());

        let links = &plan.joins["BOOK_AUTHOR"];
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].owner.key(), book.key());
        assert_eq!(links[0].owner_column, "BOOK_ID");
        assert_eq!(links[0].referent_column, "AUTHOR_ID");
    }

    #[test]
    fn test_cycle_is_planned_once() {
        let a = Handle::new(Person::named("a"));
        let b = Handle::new(Person::named("b"));
        a.borrow_mut().friends.push(b.clone());
        b.borrow_mut().friends.push(a.clone());

        let plan = plan_save(&a.erase()).unwrap();
        assert_eq!(plan.members.len(), 1);
        assert_eq!(plan.members[0].key(), b.key());
        // a->b and b->a are both emitted
        assert_eq!(plan.link_count(), 2);
    }

    #[test]
    fn test_shared_referent_is_planned_once_but_linked_twice() {
        let shared = Handle::new(Person::named("shared"));
        let root = Handle::new(Person::named("root"));
        root.borrow_mut().friends.push(shared.clone());
        root.borrow_mut().friends.push(shared.clone());

        let plan = plan_save(&root.erase()).unwrap();
        assert_eq!(plan.members.len(), 1);
        assert_eq!(plan.joins["PERSON_FRIENDS"].len(), 2);
    }

    #[test]
    fn test_link_only_relationship_does_not_cascade() {
        let tag = Handle::new(Tag::labelled("rust"));
        let person = Handle::new(Person::named("p"));
        person.borrow_mut().tags.push(tag.clone());

        let plan = plan_save(&person.erase()).unwrap();
        assert!(plan.members.is_empty());
        assert_eq!(plan.joins["PERSON_TAGS"].len(), 1);
    }

    #[test]
    fn test_self_reference() {
        let narcissus = Handle::new(Person::named("n"));
        narcissus.borrow_mut().partner = Some(narcissus.clone());

        let plan = plan_save(&narcissus.erase()).unwrap();
        assert!(plan.members.is_empty());
    }

    #[test]
    fn test_plan_links_does_not_descend() {
        let a = Handle::new(Person::named("a"));
        let b = Handle::new(Person::named("b"));
        let c = Handle::new(Person::named("c"));
        a.borrow_mut().friends.push(b.clone());
        b.borrow_mut().friends.push(c.clone());

        let plan = plan_links(&a.erase()).unwrap();
        assert!(plan.members.is_empty());
        assert_eq!(plan.link_count(), 1);
    }
}
