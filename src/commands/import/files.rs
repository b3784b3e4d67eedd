use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::Value;

use crate::document::Document;
use crate::store::validate_collection_name;

pub(super) const DATA_FILE_EXTENSION: &str = "json";

#[derive(Debug)]
pub(super) enum Payload {
    Single(Document),
    Batch(Vec<Document>),
}

/// Regular files with a lowercase `.json` extension, sorted by path.
pub(super) fn discover_data_files(source_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    let entries = fs::read_dir(source_dir)
        .with_context(|| format!("failed to read source directory {}", source_dir.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", source_dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let is_data_file = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext == DATA_FILE_EXTENSION)
            .unwrap_or(false);

        if is_data_file {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

pub(super) fn collection_name_for(path: &Path) -> Result<String> {
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;

    validate_collection_name(&name)
        .with_context(|| format!("cannot derive a collection from {}", path.display()))?;

    Ok(name)
}

pub(super) fn parse_payload(text: &str, path: &Path) -> Result<Payload> {
    let value: Value = serde_json::from_str(text)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    match value {
        Value::Object(document) => Ok(Payload::Single(document)),
        Value::Array(items) => {
            let mut documents = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                match item {
                    Value::Object(document) => documents.push(document),
                    other => bail!(
                        "element {index} of {} is not an object: {other}",
                        path.display()
                    ),
                }
            }
            Ok(Payload::Batch(documents))
        }
        other => bail!(
            "{} must contain an object or an array of objects, found {other}",
            path.display()
        ),
    }
}
