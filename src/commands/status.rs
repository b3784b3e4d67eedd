use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::store::{self, DocumentStore};

pub fn run(args: StatusArgs) -> Result<()> {
    let store = store::open(&args.connection)?;
    let counts = collection_counts(store.as_ref())?;

    if counts.is_empty() {
        warn!(database = %args.connection.database, "database has no collections");
        return Ok(());
    }

    for (collection, documents) in &counts {
        info!(collection = %collection, documents, "collection status");
    }
    info!(
        database = %args.connection.database,
        collections = counts.len(),
        documents = counts.iter().map(|(_, documents)| documents).sum::<u64>(),
        "database status"
    );

    Ok(())
}

pub fn collection_counts(store: &dyn DocumentStore) -> Result<Vec<(String, u64)>> {
    let mut counts = Vec::new();
    for collection in store.list_collections()? {
        let documents = store.count(&collection)?;
        counts.push((collection, documents));
    }
    Ok(counts)
}
