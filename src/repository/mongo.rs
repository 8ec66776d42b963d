use async_trait::async_trait;
use futures::TryStreamExt;
use log::debug;
use mongodb::{
    bson::{doc, Document},
    options::{IndexOptions, ReturnDocument},
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};

use super::{Entity, IssueLedger, Repository};
use crate::error::StoreError;
use crate::models::issue::{Issue, OldIssue};

pub struct MongoRepository<T: Send + Sync> {
    pub collection: Collection<T>,
}

impl<T: Send + Sync> MongoRepository<T> {
    pub fn new(collection: Collection<T>) -> Self {
        Self { collection }
    }

    pub async fn ensure_index(&self, field: &str, unique: bool) -> Result<(), StoreError> {
        let model = IndexModel::builder()
            .keys(doc! { field: 1 })
            .options(IndexOptions::builder().unique(unique).build())
            .build();
        self.collection.create_index(model).await?;
        Ok(())
    }
}

#[async_trait]
impl<T> Repository<T> for MongoRepository<T>
where
    T: Entity + Serialize + DeserializeOwned + Unpin + Send + Sync + 'static,
{
    async fn insert(&self, item: &T) -> Result<(), StoreError> {
        self.collection.insert_one(item).await?;
        debug!("Inserted {} into {}", item.id(), T::COLLECTION);
        Ok(())
    }

    async fn find(&self, filter: Document) -> Result<Option<T>, StoreError> {
        Ok(self.collection.find_one(filter).await?)
    }

    async fn find_many(&self, filter: Document) -> Result<Vec<T>, StoreError> {
        let cursor = self.collection.find(filter).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count(&self, filter: Document) -> Result<u64, StoreError> {
        Ok(self.collection.count_documents(filter).await?)
    }

    async fn update(&self, filter: Document, set: Document) -> Result<Option<T>, StoreError> {
        Ok(self
            .collection
            .find_one_and_update(filter, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn delete(&self, filter: Document) -> Result<Option<T>, StoreError> {
        Ok(self.collection.find_one_and_delete(filter).await?)
    }
}

/// Runs the archive/overwrite pair in a multi-document transaction, so the
/// server must be a replica set or sharded cluster.
pub struct MongoIssueLedger {
    client: Client,
    issues: Collection<Issue>,
    old_issues: Collection<OldIssue>,
}

impl MongoIssueLedger {
    pub fn new(client: Client, issues: Collection<Issue>, old_issues: Collection<OldIssue>) -> Self {
        Self {
            client,
            issues,
            old_issues,
        }
    }
}

#[async_trait]
impl IssueLedger for MongoIssueLedger {
    async fn archive_and_replace(
        &self,
        snapshot: &OldIssue,
        edited: &Issue,
    ) -> Result<bool, StoreError> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        // An error from here on drops the session, which aborts the transaction.
        self.old_issues
            .insert_one(snapshot)
            .session(&mut session)
            .await?;

        let filter = doc! {
            "_id": &edited.id,
            "revision": snapshot.revision,
            "status": snapshot.status.as_str(),
        };
        let replaced = self
            .issues
            .replace_one(filter, edited)
            .session(&mut session)
            .await?;

        if replaced.matched_count == 0 {
            session.abort_transaction().await?;
            return Ok(false);
        }

        session.commit_transaction().await?;
        Ok(true)
    }
}
