use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::{self, doc, Document};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;

use super::{matches, Entity, IssueLedger, Repository};
use crate::error::StoreError;
use crate::models::issue::{Issue, OldIssue};

/// Keeps documents in process memory. Backs the test suite and
/// `ANDON_STORAGE=memory` runs.
pub struct MemoryRepository<T> {
    rows: Arc<RwLock<Vec<Document>>>,
    unique: Vec<&'static str>,
    _t: PhantomData<fn() -> T>,
}

impl<T> Clone for MemoryRepository<T> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
            unique: self.unique.clone(),
            _t: PhantomData,
        }
    }
}

impl<T> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(Vec::new())),
            unique: Vec::new(),
            _t: PhantomData,
        }
    }

    /// Rejects writes that would give two rows the same value for `field`.
    pub fn with_unique(mut self, field: &'static str) -> Self {
        self.unique.push(field);
        self
    }

    fn conflict(&self, rows: &[Document], candidate: &Document, skip: Option<usize>) -> Option<String> {
        std::iter::once("_id")
            .chain(self.unique.iter().copied())
            .find(|field| {
                let Some(value) = candidate.get(*field) else {
                    return false;
                };
                rows.iter()
                    .enumerate()
                    .filter(|(i, _)| Some(*i) != skip)
                    .any(|(_, row)| row.get(*field) == Some(value))
            })
            .map(str::to_string)
    }
}

#[async_trait]
impl<T> Repository<T> for MemoryRepository<T>
where
    T: Entity + Serialize + DeserializeOwned + Send + Sync,
{
    async fn insert(&self, item: &T) -> Result<(), StoreError> {
        let row = bson::to_document(item)?;
        let mut rows = self.rows.write().await;
        if let Some(field) = self.conflict(&rows, &row, None) {
            return Err(StoreError::Duplicate(field));
        }
        rows.push(row);
        Ok(())
    }

    async fn find(&self, filter: Document) -> Result<Option<T>, StoreError> {
        let rows = self.rows.read().await;
        rows.iter()
            .find(|row| matches(row, &filter))
            .map(|row| bson::from_document(row.clone()))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn find_many(&self, filter: Document) -> Result<Vec<T>, StoreError> {
        let rows = self.rows.read().await;
        rows.iter()
            .filter(|row| matches(row, &filter))
            .map(|row| bson::from_document(row.clone()).map_err(StoreError::from))
            .collect()
    }

    async fn count(&self, filter: Document) -> Result<u64, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().filter(|row| matches(row, &filter)).count() as u64)
    }

    async fn update(&self, filter: Document, set: Document) -> Result<Option<T>, StoreError> {
        let mut rows = self.rows.write().await;
        let Some(pos) = rows.iter().position(|row| matches(row, &filter)) else {
            return Ok(None);
        };

        let mut updated = rows[pos].clone();
        updated.extend(set);
        if let Some(field) = self.conflict(&rows, &updated, Some(pos)) {
            return Err(StoreError::Duplicate(field));
        }
        let item = bson::from_document(updated.clone())?;
        rows[pos] = updated;
        Ok(Some(item))
    }

    async fn delete(&self, filter: Document) -> Result<Option<T>, StoreError> {
        let mut rows = self.rows.write().await;
        let Some(pos) = rows.iter().position(|row| matches(row, &filter)) else {
            return Ok(None);
        };
        Ok(Some(bson::from_document(rows.remove(pos))?))
    }
}

pub struct MemoryIssueLedger {
    issues: MemoryRepository<Issue>,
    old_issues: MemoryRepository<OldIssue>,
}

impl MemoryIssueLedger {
    pub fn new(issues: MemoryRepository<Issue>, old_issues: MemoryRepository<OldIssue>) -> Self {
        Self { issues, old_issues }
    }
}

#[async_trait]
impl IssueLedger for MemoryIssueLedger {
    async fn archive_and_replace(
        &self,
        snapshot: &OldIssue,
        edited: &Issue,
    ) -> Result<bool, StoreError> {
        let snapshot_row = bson::to_document(snapshot)?;
        let edited_row = bson::to_document(edited)?;

        // Lock order: issues, then archive.
        let mut issues = self.issues.rows.write().await;
        let expected = doc! {
            "_id": &edited.id,
            "revision": snapshot.revision,
            "status": snapshot.status.as_str(),
        };
        let Some(pos) = issues.iter().position(|row| matches(row, &expected)) else {
            return Ok(false);
        };

        let mut archive = self.old_issues.rows.write().await;
        if let Some(field) = self.old_issues.conflict(&archive, &snapshot_row, None) {
            return Err(StoreError::Duplicate(field));
        }
        archive.push(snapshot_row);
        issues[pos] = edited_row;
        Ok(true)
    }
}
