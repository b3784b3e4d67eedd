use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::info;

use crate::cli::ConnectionArgs;
use crate::document::Document;

mod mongo;
mod sqlite;

pub use mongo::MongoStore;
pub use sqlite::SqliteStore;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Blocking document-store operations shared by the MongoDB and SQLite backends.
///
/// Collections are created implicitly on first write. Every call completes before
/// it returns; there is no batching beyond what a single call does.
pub trait DocumentStore {
    fn backend(&self) -> &'static str;

    fn list_collections(&self) -> Result<Vec<String>>;

    /// Removes the collection and everything in it. Irreversible.
    fn drop_collection(&self, collection: &str) -> Result<()>;

    fn delete_all(&self, collection: &str) -> Result<u64>;

    fn insert_one(&self, collection: &str, document: &Document) -> Result<()>;

    fn insert_many(&self, collection: &str, documents: &[Document]) -> Result<usize>;

    /// All documents in storage order, `_id` included.
    fn find_all(&self, collection: &str) -> Result<Vec<Document>>;

    /// Field-level upsert keyed on `key_field`: fields of `document` overwrite the
    /// matching stored document's fields, others are left untouched.
    fn upsert_by_field(
        &self,
        collection: &str,
        key_field: &str,
        document: &Document,
    ) -> Result<UpsertOutcome>;

    fn count(&self, collection: &str) -> Result<u64>;
}

pub fn open(connection: &ConnectionArgs) -> Result<Box<dyn DocumentStore>> {
    let uri = connection.uri.trim();
    let database = connection.database.trim();
    if database.is_empty() {
        bail!("database name must not be empty");
    }

    let store: Box<dyn DocumentStore> =
        if uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://") {
            Box::new(MongoStore::connect(uri, database)?)
        } else if uri == "sqlite::memory:" {
            Box::new(SqliteStore::open_in_memory(database)?)
        } else if let Some(path) = uri.strip_prefix("sqlite://") {
            Box::new(SqliteStore::open(path, database)?)
        } else {
            bail!("unsupported connection string scheme: {uri}");
        };

    info!(backend = store.backend(), database = %database, "document store ready");
    Ok(store)
}

pub fn validate_collection_name(name: &str) -> Result<()> {
    let pattern =
        Regex::new(r"^[^$\x00]+$").context("failed to compile collection name regex")?;

    if !pattern.is_match(name) {
        bail!("invalid collection name {name:?}: must be non-empty without '$' or NUL");
    }
    if name.starts_with("system.") {
        bail!("invalid collection name {name:?}: the system. prefix is reserved");
    }

    Ok(())
}
