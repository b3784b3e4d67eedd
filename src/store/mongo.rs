use anyhow::{Context, Result, bail};
use bson::{Bson, doc};
use mongodb::options::UpdateOptions;
use mongodb::sync::{Client, Collection, Database};
use serde_json::Value;

use super::{DocumentStore, UpsertOutcome};
use crate::document::Document;

pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    /// Connects and pings the server so connectivity and auth failures surface
    /// before any data is touched.
    pub fn connect(uri: &str, database: &str) -> Result<Self> {
        let client =
            Client::with_uri_str(uri).context("failed to parse MongoDB connection string")?;
        let database = client.database(database);

        database
            .run_command(doc! { "ping": 1 }, None)
            .with_context(|| format!("failed to reach MongoDB database {}", database.name()))?;

        Ok(Self { database })
    }

    fn collection(&self, name: &str) -> Collection<bson::Document> {
        self.database.collection::<bson::Document>(name)
    }
}

impl DocumentStore for MongoStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    fn list_collections(&self) -> Result<Vec<String>> {
        let mut names = self
            .database
            .list_collection_names(None)
            .context("failed to list collections")?;
        names.sort();
        Ok(names)
    }

    fn drop_collection(&self, collection: &str) -> Result<()> {
        self.collection(collection)
            .drop(None)
            .with_context(|| format!("failed to drop collection {collection}"))
    }

    fn delete_all(&self, collection: &str) -> Result<u64> {
        let result = self
            .collection(collection)
            .delete_many(doc! {}, None)
            .with_context(|| format!("failed to clear collection {collection}"))?;
        Ok(result.deleted_count)
    }

    fn insert_one(&self, collection: &str, document: &Document) -> Result<()> {
        let document = to_bson_document(document)?;
        self.collection(collection)
            .insert_one(document, None)
            .with_context(|| format!("failed to insert document into {collection}"))?;
        Ok(())
    }

    fn insert_many(&self, collection: &str, documents: &[Document]) -> Result<usize> {
        if documents.is_empty() {
            bail!("insert_many into {collection} requires at least one document");
        }

        let documents = documents
            .iter()
            .map(to_bson_document)
            .collect::<Result<Vec<_>>>()?;
        let result = self
            .collection(collection)
            .insert_many(documents, None)
            .with_context(|| format!("failed to insert batch into {collection}"))?;
        Ok(result.inserted_ids.len())
    }

    fn find_all(&self, collection: &str) -> Result<Vec<Document>> {
        let cursor = self
            .collection(collection)
            .find(None, None)
            .with_context(|| format!("failed to query {collection}"))?;

        let mut out = Vec::new();
        for document in cursor {
            let document =
                document.with_context(|| format!("failed to read document from {collection}"))?;
            out.push(from_bson_document(document)?);
        }
        Ok(out)
    }

    fn upsert_by_field(
        &self,
        collection: &str,
        key_field: &str,
        document: &Document,
    ) -> Result<UpsertOutcome> {
        let Some(key) = document.get(key_field) else {
            bail!("upsert into {collection} is missing key field {key_field}");
        };

        let mut filter = bson::Document::new();
        filter.insert(key_field, to_bson(key)?);
        let update = doc! { "$set": to_bson_document(document)? };
        let options = UpdateOptions::builder().upsert(true).build();

        let result = self
            .collection(collection)
            .update_one(filter, update, options)
            .with_context(|| format!("failed to upsert {key} into {collection}"))?;

        if result.upserted_id.is_some() {
            Ok(UpsertOutcome::Inserted)
        } else {
            Ok(UpsertOutcome::Updated)
        }
    }

    fn count(&self, collection: &str) -> Result<u64> {
        self.collection(collection)
            .count_documents(None, None)
            .with_context(|| format!("failed to count {collection}"))
    }
}

/// Interprets extended JSON markers (`$oid`, `$date`, ...) into native BSON types.
fn to_bson(value: &Value) -> Result<Bson> {
    Bson::try_from(value.clone()).context("invalid extended JSON value")
}

fn to_bson_document(document: &Document) -> Result<bson::Document> {
    match to_bson(&Value::Object(document.clone()))? {
        Bson::Document(document) => Ok(document),
        other => bail!("expected a document, extended JSON produced {other}"),
    }
}

fn from_bson_document(document: bson::Document) -> Result<Document> {
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(map) => Ok(map),
        other => bail!("stored document did not convert to a JSON object: {other}"),
    }
}
