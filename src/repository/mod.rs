//! Storage abstraction shared by every handler. Filters are plain equality
//! documents; a filter value matched against an array field matches when the
//! array contains it, the same way MongoDB evaluates `{field: value}`.

pub mod memory;
pub mod mongo;

use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::{self, doc, Bson, Document};
use serde::Serialize;

use crate::error::StoreError;
use crate::models::issue::{Issue, OldIssue};

pub trait Entity {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
}

#[async_trait]
pub trait Repository<T>: Send + Sync {
    async fn insert(&self, item: &T) -> Result<(), StoreError>;
    async fn find(&self, filter: Document) -> Result<Option<T>, StoreError>;
    async fn find_many(&self, filter: Document) -> Result<Vec<T>, StoreError>;
    async fn count(&self, filter: Document) -> Result<u64, StoreError>;
    /// `$set`s the first match and returns it as it is after the update.
    async fn update(&self, filter: Document, set: Document) -> Result<Option<T>, StoreError>;
    async fn delete(&self, filter: Document) -> Result<Option<T>, StoreError>;
}

pub type RepositoryObject<T> = Arc<dyn Repository<T>>;

/// Owns the archive-then-overwrite write pair for full issue edits.
#[async_trait]
pub trait IssueLedger: Send + Sync {
    /// Inserts `snapshot` and replaces the stored issue with `edited` as a
    /// single unit. The replace only applies while the stored issue is still
    /// at `snapshot.revision` and `snapshot.status`; status endpoints change
    /// the latter without a new revision. Returns `false` and writes nothing
    /// otherwise.
    async fn archive_and_replace(
        &self,
        snapshot: &OldIssue,
        edited: &Issue,
    ) -> Result<bool, StoreError>;
}

pub fn by_id(id: &str) -> Document {
    doc! { "_id": id }
}

/// Serializes a patch struct into the body of a `$set`.
pub fn to_set<S: Serialize>(patch: &S) -> Result<Document, StoreError> {
    Ok(bson::to_document(patch)?)
}

/// Equality match with MongoDB's array-contains semantics. A value made
/// only of `$gt`, `$gte`, `$lt` and `$lte` is a numeric range instead.
pub fn matches(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, expected)| match expected {
        Bson::Document(range) if is_range(range) => range
            .iter()
            .all(|(op, bound)| in_range(document.get(key), op, bound)),
        _ => match (document.get(key), expected) {
            (Some(actual @ Bson::Array(_)), Bson::Array(_)) => actual == expected,
            (Some(Bson::Array(items)), value) => items.contains(value),
            (Some(actual), value) => actual == value,
            (None, Bson::Null) => true,
            (None, _) => false,
        },
    })
}

fn is_range(operators: &Document) -> bool {
    !operators.is_empty() && operators.keys().all(|op| op.starts_with('$'))
}

fn in_range(actual: Option<&Bson>, op: &str, bound: &Bson) -> bool {
    let (Some(actual), Some(bound)) = (actual.and_then(as_number), as_number(bound)) else {
        return false;
    };
    match op {
        "$gt" => actual > bound,
        "$gte" => actual >= bound,
        "$lt" => actual < bound,
        "$lte" => actual <= bound,
        _ => false,
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches(&doc! { "a": 1 }, &doc! {}));
    }

    #[test]
    fn equality_and_array_containment() {
        let row = doc! { "status": "Open", "departments": ["Quality", "Maintenance"] };
        assert!(matches(&row, &doc! { "status": "Open" }));
        assert!(!matches(&row, &doc! { "status": "Resolved" }));
        assert!(matches(&row, &doc! { "departments": "Maintenance" }));
        assert!(!matches(&row, &doc! { "departments": "Safety" }));
        assert!(matches(&row, &doc! { "status": "Open", "departments": "Quality" }));
    }

    #[test]
    fn missing_field_only_matches_null() {
        let row = doc! { "leader": Bson::Null };
        assert!(matches(&row, &doc! { "leader": Bson::Null }));
        assert!(matches(&doc! {}, &doc! { "leader": Bson::Null }));
        assert!(!matches(&doc! {}, &doc! { "leader": "u1" }));
    }

    #[test]
    fn numeric_ranges_compare_across_integer_widths() {
        let row = doc! { "revision": 2_i64, "sla": 1.5 };
        assert!(matches(&row, &doc! { "revision": { "$gt": 0 } }));
        assert!(matches(&row, &doc! { "revision": { "$gte": 2, "$lt": 3 } }));
        assert!(!matches(&row, &doc! { "revision": { "$gt": 2 } }));
        assert!(matches(&row, &doc! { "sla": { "$lte": 1.5 } }));
        assert!(!matches(&doc! {}, &doc! { "revision": { "$gt": 0 } }));
        assert!(!matches(&doc! { "revision": "2" }, &doc! { "revision": { "$gt": 0 } }));
    }
}
