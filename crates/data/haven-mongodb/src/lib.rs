//! # Haven MongoDB
//!
//! Hosted-database backend for the document store contract.
//!
//! - documents use string `_id`s (UUID v4)
//! - inserts are a single upsert: `$setOnInsert` the fields, `$currentDate`
//!   the `createdAt` stamp
//! - pages are `find(filter).sort({order, _id}).limit(n)` with a seek filter
//!   past the cursor, so ties on the order key never skip or repeat rows

pub mod convert;

use async_trait::async_trait;
use bson::{doc, Document};
use futures::TryStreamExt;
use haven_core::{
    new_document_id, DocumentStore, EqualityFilter, Error, FeedCursor, FeedItem, FeedQuery,
    Fields, Record, Result,
};
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use std::time::Duration;

use convert::{id_filter, insert_update, page_filter, page_sort, to_bson, to_document, to_item};

/// Connection settings
#[derive(Debug, Clone)]
pub struct MongoSettings {
    pub uri: String,
    pub database: String,
    /// Server selection timeout
    pub timeout: Duration,
}

/// Document store backed by a MongoDB database
pub struct MongoStore {
    db: Database,
}

fn map_err(err: mongodb::error::Error) -> Error {
    match *err.kind {
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => Error::Unavailable(err.to_string()),
        _ => Error::Backend(err.to_string()),
    }
}

impl MongoStore {
    /// Connect using the given settings
    pub async fn connect(settings: &MongoSettings) -> Result<Self> {
        let mut options = ClientOptions::parse(&settings.uri).await.map_err(map_err)?;
        options.server_selection_timeout = Some(settings.timeout);
        options.app_name = Some("haven".to_string());

        let client = Client::with_options(options).map_err(map_err)?;
        tracing::info!("Connected to MongoDB database '{}'", settings.database);

        Ok(Self {
            db: client.database(&settings.database),
        })
    }

    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn name(&self) -> &str {
        "mongodb"
    }

    async fn query(&self, query: &FeedQuery, after: Option<&FeedCursor>) -> Result<Vec<FeedItem>> {
        if let Some(cursor) = after {
            cursor.ensure_valid_for(query)?;
        }

        let docs: Vec<Document> = self
            .collection(query.collection())
            .find(page_filter(query, after))
            .sort(page_sort(query))
            .limit(query.page_size() as i64)
            .await
            .map_err(map_err)?
            .try_collect()
            .await
            .map_err(map_err)?;

        Ok(docs.iter().filter_map(to_item).collect())
    }

    async fn increment(&self, collection: &str, id: &str, counter: &str, delta: i64) -> Result<()> {
        let mut inc = Document::new();
        inc.insert(counter, delta);

        let result = self
            .collection(collection)
            .update_one(id_filter(id), doc! { "$inc": inc })
            .await
            .map_err(map_err)?;

        if result.matched_count == 0 {
            return Err(Error::not_found(collection, id));
        }
        Ok(())
    }

    async fn insert(&self, collection: &str, record: Record) -> Result<String> {
        let id = new_document_id();

        self.collection(collection)
            .update_one(id_filter(&id), insert_update(&record.fields))
            .upsert(true)
            .await
            .map_err(map_err)?;

        tracing::debug!("Inserted {}/{}", collection, id);
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<FeedItem>> {
        let doc = self
            .collection(collection)
            .find_one(id_filter(id))
            .await
            .map_err(map_err)?;

        Ok(doc.as_ref().and_then(to_item))
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let set = to_document(&fields);
        if set.is_empty() {
            return Ok(());
        }

        let result = self
            .collection(collection)
            .update_one(id_filter(id), doc! { "$set": set })
            .await
            .map_err(map_err)?;

        if result.matched_count == 0 {
            return Err(Error::not_found(collection, id));
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let result = self
            .collection(collection)
            .delete_one(id_filter(id))
            .await
            .map_err(map_err)?;

        if result.deleted_count == 0 {
            tracing::debug!("Delete of missing document {}/{}", collection, id);
        }
        Ok(())
    }

    async fn count(&self, collection: &str, filter: Option<&EqualityFilter>) -> Result<u64> {
        let mut query = Document::new();
        if let Some(filter) = filter {
            query.insert(filter.field.clone(), to_bson(&filter.value));
        }

        self.collection(collection)
            .count_documents(query)
            .await
            .map_err(map_err)
    }
}
