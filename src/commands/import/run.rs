use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use super::*;
use crate::cli::ImportArgs;
use crate::model::{FileImportOutcome, ImportRunManifest, ImportedFile};
use crate::store::{self, DocumentStore};
use crate::util::{now_utc_string, read_text_with_digest, run_id_for, write_json_pretty};

pub fn run(args: ImportArgs) -> Result<()> {
    let started_at = now_utc_string();
    let run_id = run_id_for("import", Utc::now());

    info!(
        run_id = %run_id,
        source = %args.source_dir.display(),
        drop_existing = args.drop_existing,
        "starting import"
    );

    let store = store::open(&args.connection)?;
    let files = import_directory(store.as_ref(), &args.source_dir, args.drop_existing)?;
    let documents_inserted: usize = files.iter().map(|file| file.documents_inserted).sum();

    if let Some(report_path) = &args.report_path {
        let manifest =
            build_import_manifest(&args, store.backend(), run_id.clone(), started_at, files);
        write_json_pretty(report_path, &manifest)?;
        info!(path = %report_path.display(), "wrote import run manifest");
    }

    info!(run_id = %run_id, documents = documents_inserted, "import completed");
    Ok(())
}

pub fn build_import_manifest(
    args: &ImportArgs,
    backend: &str,
    run_id: String,
    started_at: String,
    files: Vec<ImportedFile>,
) -> ImportRunManifest {
    ImportRunManifest {
        manifest_version: 1,
        run_id,
        started_at,
        completed_at: now_utc_string(),
        backend: backend.to_string(),
        database: args.connection.database.clone(),
        source_directory: args.source_dir.display().to_string(),
        file_count: files.len(),
        documents_inserted: files.iter().map(|file| file.documents_inserted).sum(),
        files,
    }
}

/// Imports every data file of `source_dir`, in name order, into the collection
/// named after the file. The first failure aborts the remaining files.
///
/// With `drop_existing`, each target collection is dropped before its insert.
/// That is destructive and irreversible.
pub fn import_directory(
    store: &dyn DocumentStore,
    source_dir: &Path,
    drop_existing: bool,
) -> Result<Vec<ImportedFile>> {
    let paths = discover_data_files(source_dir)?;
    info!(
        count = paths.len(),
        source = %source_dir.display(),
        "discovered data files"
    );

    let mut imported = Vec::with_capacity(paths.len());
    for path in &paths {
        imported.push(import_file(store, path, drop_existing)?);
    }

    Ok(imported)
}

fn import_file(
    store: &dyn DocumentStore,
    path: &Path,
    drop_existing: bool,
) -> Result<ImportedFile> {
    let collection = collection_name_for(path)?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    info!(file = %filename, collection = %collection, "importing");

    let (text, sha256) = read_text_with_digest(path)?;
    let payload = parse_payload(&text, path)?;

    if drop_existing {
        warn!(collection = %collection, "dropping existing collection");
        store.drop_collection(&collection)?;
    }

    let (documents_inserted, outcome) = match payload {
        Payload::Batch(documents) => {
            if documents.is_empty() {
                info!(file = %filename, "file contains an empty list, skipped");
                (0, FileImportOutcome::SkippedEmpty)
            } else {
                let inserted = store.insert_many(&collection, &documents)?;
                info!(collection = %collection, inserted, "inserted documents");
                (inserted, FileImportOutcome::InsertedBatch)
            }
        }
        Payload::Single(document) => {
            store.insert_one(&collection, &document)?;
            info!(collection = %collection, inserted = 1, "inserted document");
            (1, FileImportOutcome::InsertedSingle)
        }
    };

    Ok(ImportedFile {
        filename,
        collection,
        sha256,
        dropped_existing: drop_existing,
        documents_inserted,
        outcome,
    })
}
