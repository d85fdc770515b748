//! Entity types shared by the unit tests

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::entity::{Entity, Handle, Relationship, Schema};
use crate::session::Session;

/// In-memory session with the tables of `T` created
pub fn session_with<T: Entity>() -> Session {
    let session = Session::open_in_memory().unwrap();
    session.create_table::<T>().unwrap();
    session
}

/// No identity field: ids live in the identity map only
#[derive(Debug, Default)]
pub struct Author {
    pub name: String,
}

impl Author {
    pub fn named(name: &str) -> Self {
        Self { name: name.to_string() }
    }
}

impl Entity for Author {
    fn describe() -> Schema<Self> {
        Schema::<Self>::new("Author").field("name", |a| &a.name, |a| &mut a.name)
    }
}

#[derive(Debug, Default)]
pub struct Book {
    pub id: Option<i64>,
    pub title: String,
    pub author: Option<Handle<Author>>,
}

impl Book {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for Book {
    fn describe() -> Schema<Self> {
        Schema::<Self>::new("Book")
            .id("id", |b| &b.id, |b| &mut b.id)
            .field("title", |b| &b.title, |b| &mut b.title)
            .has_one(
                "author",
                Relationship::cascading(),
                |b| b.author.clone(),
                |b, author| b.author = author,
            )
    }
}

#[derive(Debug, Default)]
pub struct Tag {
    pub id: Option<i64>,
    pub label: String,
}

impl Tag {
    pub fn labelled(label: &str) -> Self {
        Self {
            id: None,
            label: label.to_string(),
        }
    }
}

impl Entity for Tag {
    fn describe() -> Schema<Self> {
        Schema::<Self>::new("Tag")
            .id("id", |t| &t.id, |t| &mut t.id)
            .field("label", |t| &t.label, |t| &mut t.label)
    }
}

#[derive(Debug, Default)]
pub struct Person {
    pub id: Option<i64>,
    pub name: String,
    pub friends: Vec<Handle<Person>>,
    pub tags: Vec<Handle<Tag>>,
    pub partner: Option<Handle<Person>>,
}

impl Person {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for Person {
    fn describe() -> Schema<Self> {
        Schema::<Self>::new("Person")
            .id("id", |p| &p.id, |p| &mut p.id)
            .field("name", |p| &p.name, |p| &mut p.name)
            .has_many("friends", Relationship::cascading(), |p| p.friends.clone())
            .has_many("tags", Relationship::link_only(), |p| p.tags.clone())
            .has_one(
                "partner",
                Relationship::cascading(),
                |p| p.partner.clone(),
                |p, partner| p.partner = partner,
            )
    }
}

#[derive(Debug, Default)]
pub struct Account {
    pub id: Option<i64>,
    pub email: String,
    pub display_name: String,
}

impl Account {
    pub fn with_email(email: &str) -> Self {
        Self {
            email: email.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for Account {
    fn describe() -> Schema<Self> {
        Schema::<Self>::new("Account")
            .id("id", |a| &a.id, |a| &mut a.id)
            .unique("email", |a| &a.email, |a| &mut a.email)
            .field("display_name", |a| &a.display_name, |a| &mut a.display_name)
    }
}

/// Plain reference: the author is never saved along with the note
#[derive(Debug, Default)]
pub struct Note {
    pub text: String,
    pub author: Option<Handle<Author>>,
}

impl Note {
    pub fn about(text: &str, author: Option<Handle<Author>>) -> Self {
        Self {
            text: text.to_string(),
            author,
        }
    }
}

impl Entity for Note {
    fn describe() -> Schema<Self> {
        Schema::<Self>::new("Note")
            .field("text", |n| &n.text, |n| &mut n.text)
            .reference("author", |n| n.author.clone(), |n, author| n.author = author)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Draft,
    Published,
}

crate::enum_column!(Status { Draft, Published });

#[derive(Debug, Default)]
pub struct Event {
    pub id: Option<i64>,
    pub title: String,
    pub attendees: i64,
    pub rating: f64,
    pub public: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub price: Option<Decimal>,
    pub payload: Vec<u8>,
    pub status: Status,
    pub scratch: String,
    pub cached_label: String,
}

impl Entity for Event {
    fn describe() -> Schema<Self> {
        Schema::<Self>::new("Event")
            .id("id", |e| &e.id, |e| &mut e.id)
            .field("title", |e| &e.title, |e| &mut e.title)
            .field("attendees", |e| &e.attendees, |e| &mut e.attendees)
            .field("rating", |e| &e.rating, |e| &mut e.rating)
            .field("public", |e| &e.public, |e| &mut e.public)
            .field("starts_at", |e| &e.starts_at, |e| &mut e.starts_at)
            .field("price", |e| &e.price, |e| &mut e.price)
            .field("payload", |e| &e.payload, |e| &mut e.payload)
            .field("status", |e| &e.status, |e| &mut e.status)
            .ignore("scratch")
            .transient("cached_label")
    }
}

#[derive(Debug, Default)]
pub struct Employee {
    pub id: Option<i64>,
    pub name: String,
}

impl Entity for Employee {
    fn describe() -> Schema<Self> {
        Schema::<Self>::new("Employee")
            .id("id", |e| &e.id, |e| &mut e.id)
            .field("name", |e| &e.name, |e| &mut e.name)
    }
}

#[derive(Debug, Default)]
pub struct Manager {
    pub level: i32,
    pub employee: Employee,
}

impl Entity for Manager {
    fn describe() -> Schema<Self> {
        Schema::<Self>::new("Manager")
            .field("level", |m| &m.level, |m| &mut m.level)
            .extends(|m| &m.employee, |m| &mut m.employee)
    }
}

#[derive(Debug, Default)]
pub struct DoubleId {
    pub id: Option<i64>,
    pub other_id: Option<i64>,
}

impl Entity for DoubleId {
    fn describe() -> Schema<Self> {
        Schema::<Self>::new("DoubleId")
            .id("id", |d| &d.id, |d| &mut d.id)
            .id("other_id", |d| &d.other_id, |d| &mut d.other_id)
    }
}
