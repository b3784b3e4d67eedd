use std::path::Path;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::cli::ImportCsvArgs;
use crate::document::Document;
use crate::store::{self, DocumentStore, validate_collection_name};
use crate::util::{now_utc_string, read_text_with_digest};

const CREATED_AT_FIELD: &str = "createdAt";
const UPDATED_AT_FIELD: &str = "updatedAt";

#[derive(Debug, Default)]
pub struct CsvRecords {
    pub headers: Vec<String>,
    pub records: Vec<Document>,
    /// 1-based line numbers skipped for a cell-count mismatch.
    pub skipped_lines: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvImportSummary {
    pub deleted: u64,
    pub inserted: usize,
    pub skipped_lines: Vec<usize>,
    pub total_in_collection: u64,
}

pub fn run(args: ImportCsvArgs) -> Result<()> {
    info!(
        path = %args.csv_path.display(),
        collection = %args.collection,
        keep_existing = args.keep_existing,
        "starting csv import"
    );

    let store = store::open(&args.connection)?;
    let summary = import_csv_file(
        store.as_ref(),
        &args.csv_path,
        &args.collection,
        args.keep_existing,
    )?;

    info!(
        collection = %args.collection,
        deleted = summary.deleted,
        inserted = summary.inserted,
        skipped_lines = summary.skipped_lines.len(),
        total = summary.total_in_collection,
        "csv import completed"
    );
    Ok(())
}

pub fn import_csv_file(
    store: &dyn DocumentStore,
    path: &Path,
    collection: &str,
    keep_existing: bool,
) -> Result<CsvImportSummary> {
    validate_collection_name(collection)?;

    let (text, sha256) = read_text_with_digest(path)?;
    let mut parsed =
        parse_csv(&text).with_context(|| format!("failed to parse {}", path.display()))?;
    stamp_timestamps(&mut parsed.records, &now_utc_string());
    info!(
        path = %path.display(),
        sha256 = %sha256,
        columns = parsed.headers.len(),
        records = parsed.records.len(),
        "parsed csv"
    );

    let deleted = if keep_existing {
        0
    } else {
        let deleted = store.delete_all(collection)?;
        info!(collection = %collection, deleted, "cleared existing documents");
        deleted
    };

    let inserted = if parsed.records.is_empty() {
        warn!(path = %path.display(), "csv has no data rows, nothing inserted");
        0
    } else {
        store.insert_many(collection, &parsed.records)?
    };

    let total_in_collection = store.count(collection)?;
    info!(collection = %collection, total = total_in_collection, "collection count verified");

    if let Some(sample) = store.find_all(collection)?.into_iter().next() {
        let rendered = serde_json::to_string_pretty(&sample)?;
        info!(sample = %rendered, "sample document");
    }

    Ok(CsvImportSummary {
        deleted,
        inserted,
        skipped_lines: parsed.skipped_lines,
        total_in_collection,
    })
}

/// Comma-split parser for headered CSV without quoting. Blank lines are ignored;
/// rows whose cell count differs from the header are skipped.
pub fn parse_csv(content: &str) -> Result<CsvRecords> {
    let number = Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$")
        .context("failed to compile numeric cell regex")?;

    let mut lines = content.trim().lines().enumerate();
    let Some((_, header_line)) = lines.next() else {
        bail!("csv is empty");
    };

    let headers: Vec<String> = header_line
        .split(',')
        .map(|header| header.trim().to_string())
        .collect();
    if headers.iter().all(String::is_empty) {
        bail!("csv header line is empty");
    }

    let mut parsed = CsvRecords {
        headers,
        ..CsvRecords::default()
    };

    for (index, line) in lines {
        if line.trim().is_empty() {
            continue;
        }

        let line_number = index + 1;
        let cells: Vec<&str> = line.split(',').map(str::trim).collect();
        if cells.len() != parsed.headers.len() {
            warn!(
                line = line_number,
                values = cells.len(),
                headers = parsed.headers.len(),
                "column count mismatch, skipping line"
            );
            parsed.skipped_lines.push(line_number);
            continue;
        }

        let record = parsed
            .headers
            .iter()
            .zip(cells)
            .map(|(header, cell)| (header.clone(), coerce_cell(cell, &number)))
            .collect::<Document>();
        parsed.records.push(record);
    }

    Ok(parsed)
}

/// Sets `createdAt` and `updatedAt` as extended-JSON dates. Columns the CSV
/// already provides are left alone.
pub fn stamp_timestamps(records: &mut [Document], timestamp: &str) {
    for record in records {
        for field in [CREATED_AT_FIELD, UPDATED_AT_FIELD] {
            record
                .entry(field)
                .or_insert_with(|| json!({ "$date": timestamp }));
        }
    }
}

fn coerce_cell(cell: &str, number: &Regex) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }

    match cell.parse::<f64>() {
        Ok(value) if value.is_finite() && number.is_match(cell) => {
            // Whole numbers are stored as integers.
            if value.fract() == 0.0 && value.abs() < 9.0e15 {
                Value::from(value as i64)
            } else {
                Value::from(value)
            }
        }
        _ => Value::String(cell.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::store::SqliteStore;

    const SAMPLE: &str = "Model,Provider,Context Window,Price / Million Tokens,Open-Source\n\
        GPT-4o, OpenAI ,128000,5.0,0\n\
        \n\
        Llama 3,Meta,8000,,1\n\
        Broken,Row\n\
        Claude 3,Anthropic,200000,15,0\n";

    #[test]
    fn parse_csv_coerces_numbers_and_empty_cells() {
        let parsed = parse_csv(SAMPLE).expect("parse");

        assert_eq!(parsed.headers.len(), 5);
        assert_eq!(parsed.records.len(), 3);

        let gpt = &parsed.records[0];
        assert_eq!(gpt["Model"], json!("GPT-4o"));
        assert_eq!(gpt["Provider"], json!("OpenAI"));
        assert_eq!(gpt["Context Window"], json!(128000));
        assert_eq!(gpt["Price / Million Tokens"], json!(5));
        assert_eq!(gpt["Open-Source"], json!(0));

        let llama = &parsed.records[1];
        assert_eq!(llama["Price / Million Tokens"], Value::Null);
    }

    #[test]
    fn parse_csv_skips_rows_with_wrong_cell_count() {
        let parsed = parse_csv(SAMPLE).expect("parse");
        assert_eq!(parsed.skipped_lines, vec![5]);
    }

    #[test]
    fn cells_with_trailing_text_stay_strings() {
        let number = Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("regex");
        assert_eq!(coerce_cell("4o", &number), json!("4o"));
        assert_eq!(coerce_cell("0.75", &number), json!(0.75));
        assert_eq!(coerce_cell("-2", &number), json!(-2));
        assert_eq!(coerce_cell("1e3", &number), json!(1000));
        assert_eq!(coerce_cell("NaN", &number), json!("NaN"));
    }

    #[test]
    fn empty_csv_is_rejected() {
        assert!(parse_csv("   \n").is_err());
    }

    #[test]
    fn imported_rows_carry_creation_and_update_dates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("llm_comparison_dataset.csv");
        fs::write(&path, SAMPLE).expect("write csv");

        let store = SqliteStore::open_in_memory("catalog").expect("store");
        import_csv_file(&store, &path, "Comparison Chart", false).expect("import");

        for row in store.find_all("Comparison Chart").expect("find") {
            let created = row["createdAt"]["$date"].as_str().expect("createdAt date");
            assert!(created.ends_with('Z'));
            assert_eq!(row["updatedAt"], row["createdAt"]);
        }
    }

    #[test]
    fn timestamp_columns_from_the_csv_are_kept() {
        let mut parsed =
            parse_csv("Model,createdAt\nGPT-4o,2024-05-13\n").expect("parse");
        stamp_timestamps(&mut parsed.records, "2026-01-01T00:00:00Z");

        let row = &parsed.records[0];
        assert_eq!(row["createdAt"], json!("2024-05-13"));
        assert_eq!(row["updatedAt"], json!({"$date": "2026-01-01T00:00:00Z"}));
    }

    #[test]
    fn import_clears_collection_unless_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("llm_comparison_dataset.csv");
        fs::write(&path, SAMPLE).expect("write csv");

        let store = SqliteStore::open_in_memory("catalog").expect("store");

        let first = import_csv_file(&store, &path, "Comparison Chart", false).expect("first");
        assert_eq!(first.inserted, 3);
        assert_eq!(first.total_in_collection, 3);

        let second = import_csv_file(&store, &path, "Comparison Chart", false).expect("second");
        assert_eq!(second.deleted, 3);
        assert_eq!(second.total_in_collection, 3);

        let kept = import_csv_file(&store, &path, "Comparison Chart", true).expect("kept");
        assert_eq!(kept.deleted, 0);
        assert_eq!(kept.total_in_collection, 6);
    }
}
