use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use super::{DocumentStore, UpsertOutcome};
use crate::document::{Document, ID_FIELD};
use crate::util::now_utc_string;

/// Embedded document store: every document is a JSON body row scoped by
/// database name and collection.
pub struct SqliteStore {
    connection: Connection,
    database: String,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>, database: &str) -> Result<Self> {
        let path = path.as_ref();
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        connection
            .pragma_update(None, "journal_mode", "WAL")
            .context("failed to set journal_mode=WAL")?;
        connection
            .pragma_update(None, "synchronous", "NORMAL")
            .context("failed to set synchronous=NORMAL")?;

        Self::with_connection(connection, database)
    }

    pub fn open_in_memory(database: &str) -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory sqlite store")?;
        Self::with_connection(connection, database)
    }

    fn with_connection(connection: Connection, database: &str) -> Result<Self> {
        ensure_schema(&connection)?;
        Ok(Self {
            connection,
            database: database.to_string(),
        })
    }

    fn register_collection(&self, collection: &str) -> Result<()> {
        self.connection
            .execute(
                "INSERT INTO collections(database_name, name, created_at) VALUES(?1, ?2, ?3)
                 ON CONFLICT(database_name, name) DO NOTHING",
                params![self.database, collection, now_utc_string()],
            )
            .with_context(|| format!("failed to register collection {collection}"))?;
        Ok(())
    }

    fn insert_row(&self, collection: &str, document: &Document) -> Result<()> {
        let doc_key = match document.get(ID_FIELD) {
            Some(id) => Some(serde_json::to_string(id)?),
            None => None,
        };
        let body = serde_json::to_string(document)?;

        self.connection
            .execute(
                "INSERT INTO documents(database_name, collection, doc_key, body) VALUES(?1, ?2, ?3, ?4)",
                params![self.database, collection, doc_key, body],
            )
            .with_context(|| match &doc_key {
                Some(key) => format!("failed to insert document {key} into {collection}"),
                None => format!("failed to insert document into {collection}"),
            })?;

        Ok(())
    }

    fn load_rows(&self, collection: &str) -> Result<Vec<(i64, Document)>> {
        let mut statement = self.connection.prepare(
            "
            SELECT doc_seq, body
            FROM documents
            WHERE database_name = ?1 AND collection = ?2
            ORDER BY doc_seq ASC
            ",
        )?;

        let mut rows = statement.query(params![self.database, collection])?;
        let mut out = Vec::new();

        while let Some(row) = rows.next()? {
            let doc_seq: i64 = row.get(0)?;
            let body: String = row.get(1)?;
            let document = match serde_json::from_str::<Value>(&body)
                .with_context(|| format!("corrupt document {doc_seq} in {collection}"))?
            {
                Value::Object(map) => map,
                other => bail!("document {doc_seq} in {collection} is not an object: {other}"),
            };
            out.push((doc_seq, document));
        }

        Ok(out)
    }

    /// First document whose `field` equals `key`. Scalar keys are matched inside
    /// SQLite with `json_extract`, numbers by value and text exactly; compound
    /// keys fall back to comparing parsed bodies.
    fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        key: &Value,
    ) -> Result<Option<(i64, Document)>> {
        let bound: rusqlite::types::Value = match key {
            Value::String(text) => text.clone().into(),
            Value::Number(number) => match (number.as_i64(), number.as_f64()) {
                (Some(integer), _) => integer.into(),
                (None, Some(float)) => float.into(),
                (None, None) => bail!("unsupported numeric key {number} in {collection}"),
            },
            _ => {
                return Ok(self
                    .load_rows(collection)?
                    .into_iter()
                    .find(|(_, stored)| stored.get(field) == Some(key)));
            }
        };

        let path = format!("$.\"{}\"", field.replace('"', "\\\""));
        let row = self
            .connection
            .query_row(
                "
                SELECT doc_seq, body
                FROM documents
                WHERE database_name = ?1
                  AND collection = ?2
                  AND json_type(body, ?3) IN ('text', 'integer', 'real')
                  AND json_extract(body, ?3) = ?4
                ORDER BY doc_seq ASC
                LIMIT 1
                ",
                params![self.database, collection, path, bound],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .with_context(|| format!("failed to look up {field} = {key} in {collection}"))?;

        let Some((doc_seq, body)) = row else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(&body)
            .with_context(|| format!("corrupt document {doc_seq} in {collection}"))?
        {
            Value::Object(document) => Ok(Some((doc_seq, document))),
            other => bail!("document {doc_seq} in {collection} is not an object: {other}"),
        }
    }
}

impl DocumentStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn list_collections(&self) -> Result<Vec<String>> {
        let mut statement = self.connection.prepare(
            "SELECT name FROM collections WHERE database_name = ?1 ORDER BY name ASC",
        )?;
        let names = statement
            .query_map(params![self.database], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    fn drop_collection(&self, collection: &str) -> Result<()> {
        let tx = self.connection.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM documents WHERE database_name = ?1 AND collection = ?2",
            params![self.database, collection],
        )?;
        tx.execute(
            "DELETE FROM collections WHERE database_name = ?1 AND name = ?2",
            params![self.database, collection],
        )?;
        tx.commit()
            .with_context(|| format!("failed to drop collection {collection}"))?;
        Ok(())
    }

    fn delete_all(&self, collection: &str) -> Result<u64> {
        let deleted = self
            .connection
            .execute(
                "DELETE FROM documents WHERE database_name = ?1 AND collection = ?2",
                params![self.database, collection],
            )
            .with_context(|| format!("failed to clear collection {collection}"))?;
        Ok(deleted as u64)
    }

    fn insert_one(&self, collection: &str, document: &Document) -> Result<()> {
        self.register_collection(collection)?;
        self.insert_row(collection, document)
    }

    fn insert_many(&self, collection: &str, documents: &[Document]) -> Result<usize> {
        if documents.is_empty() {
            bail!("insert_many into {collection} requires at least one document");
        }

        let tx = self.connection.unchecked_transaction()?;
        self.register_collection(collection)?;
        for document in documents {
            self.insert_row(collection, document)?;
        }
        tx.commit()
            .with_context(|| format!("failed to commit batch insert into {collection}"))?;

        Ok(documents.len())
    }

    fn find_all(&self, collection: &str) -> Result<Vec<Document>> {
        let rows = self.load_rows(collection)?;
        Ok(rows
            .into_iter()
            .map(|(doc_seq, mut document)| {
                if !document.contains_key(ID_FIELD) {
                    document.insert(ID_FIELD.to_string(), Value::from(doc_seq));
                }
                document
            })
            .collect())
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

        match self.find_by_field(collection, key_field, key)? {
            Some((doc_seq, mut stored)) => {
                for (name, value) in document {
                    stored.insert(name.clone(), value.clone());
                }
                self.connection
                    .execute(
                        "UPDATE documents SET body = ?1 WHERE doc_seq = ?2",
                        params![serde_json::to_string(&stored)?, doc_seq],
                    )
                    .with_context(|| format!("failed to update {key} in {collection}"))?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                self.insert_one(collection, document)?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    fn count(&self, collection: &str) -> Result<u64> {
        let count: i64 = self
            .connection
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE database_name = ?1 AND collection = ?2",
                params![self.database, collection],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to count {collection}"))?;
        Ok(count as u64)
    }
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS collections (
              database_name TEXT NOT NULL,
              name TEXT NOT NULL,
              created_at TEXT NOT NULL,
              PRIMARY KEY (database_name, name)
            );

            CREATE TABLE IF NOT EXISTS documents (
              doc_seq INTEGER PRIMARY KEY AUTOINCREMENT,
              database_name TEXT NOT NULL,
              collection TEXT NOT NULL,
              doc_key TEXT,
              body TEXT NOT NULL,
              UNIQUE (database_name, collection, doc_key)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_collection
              ON documents(database_name, collection, doc_seq);
            ",
        )
        .context("failed to initialize sqlite document schema")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory("catalog").expect("in-memory store")
    }

    #[test]
    fn insert_and_find_preserve_order_and_assign_ids() {
        let store = store();
        store
            .insert_many(
                "llm_provider",
                &[
                    doc(json!({"model_id": "m2", "provider_id": "p2"})),
                    doc(json!({"_id": {"$oid": "65a1f0c2e4b0a1b2c3d4e5f6"}, "model_id": "m3"})),
                ],
            )
            .expect("insert");

        let found = store.find_all("llm_provider").expect("find");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0]["model_id"], json!("m2"));
        assert!(found[0].contains_key(ID_FIELD));
        assert_eq!(found[1][ID_FIELD], json!({"$oid": "65a1f0c2e4b0a1b2c3d4e5f6"}));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let store = store();
        let document = doc(json!({"_id": 7, "model_id": "m1"}));
        store.insert_one("llm_organization", &document).expect("first insert");
        assert!(store.insert_one("llm_organization", &document).is_err());
    }

    #[test]
    fn upsert_merges_fields_instead_of_replacing() {
        let store = store();
        store
            .insert_one(
                "llm_merged",
                &doc(json!({"model_id": "m1", "provider_id": "p1", "note": "keep me"})),
            )
            .expect("seed");

        let outcome = store
            .upsert_by_field(
                "llm_merged",
                "model_id",
                &doc(json!({"model_id": "m1", "provider_id": null, "avg_benchmark_score": 0.5})),
            )
            .expect("upsert");
        assert_eq!(outcome, UpsertOutcome::Updated);

        let found = store.find_all("llm_merged").expect("find");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["note"], json!("keep me"));
        assert_eq!(found[0]["provider_id"], Value::Null);
        assert_eq!(found[0]["avg_benchmark_score"], json!(0.5));
    }

    #[test]
    fn upsert_matches_numeric_keys_by_value_and_text_exactly() {
        let store = store();
        store
            .insert_many(
                "llm_merged",
                &[
                    doc(json!({"model_id": 1, "note": "number"})),
                    doc(json!({"model_id": "1", "note": "text"})),
                    doc(json!({"model_id": {"family": "gpt"}, "note": "object"})),
                ],
            )
            .expect("seed");

        let by_float = store
            .upsert_by_field("llm_merged", "model_id", &doc(json!({"model_id": 1.0, "rank": 1})))
            .expect("upsert float");
        let by_text = store
            .upsert_by_field("llm_merged", "model_id", &doc(json!({"model_id": "1", "rank": 2})))
            .expect("upsert text");
        let by_object = store
            .upsert_by_field(
                "llm_merged",
                "model_id",
                &doc(json!({"model_id": {"family": "gpt"}, "rank": 3})),
            )
            .expect("upsert object");
        let serialized = store
            .upsert_by_field(
                "llm_merged",
                "model_id",
                &doc(json!({"model_id": "{\"family\":\"gpt\"}"})),
            )
            .expect("upsert look-alike text");

        assert_eq!(by_float, UpsertOutcome::Updated);
        assert_eq!(by_text, UpsertOutcome::Updated);
        assert_eq!(by_object, UpsertOutcome::Updated);
        assert_eq!(serialized, UpsertOutcome::Inserted);

        let found = store.find_all("llm_merged").expect("find");
        assert_eq!(found.len(), 4);
        assert_eq!(found[0]["note"], json!("number"));
        assert_eq!(found[0]["rank"], json!(1));
        assert_eq!(found[1]["note"], json!("text"));
        assert_eq!(found[1]["rank"], json!(2));
        assert_eq!(found[2]["rank"], json!(3));
    }

    #[test]
    fn upsert_inserts_when_key_is_new() {
        let store = store();
        let outcome = store
            .upsert_by_field("llm_merged", "model_id", &doc(json!({"model_id": "m9"})))
            .expect("upsert");
        assert_eq!(outcome, UpsertOutcome::Inserted);
        assert_eq!(store.count("llm_merged").expect("count"), 1);
        assert_eq!(
            store.list_collections().expect("collections"),
            vec!["llm_merged".to_string()]
        );
    }

    #[test]
    fn drop_removes_collection_but_delete_all_keeps_it() {
        let store = store();
        store
            .insert_one("a", &doc(json!({"model_id": "m1"})))
            .expect("insert a");
        store
            .insert_one("b", &doc(json!({"model_id": "m1"})))
            .expect("insert b");

        store.drop_collection("a").expect("drop");
        assert_eq!(store.delete_all("b").expect("delete"), 1);

        assert_eq!(store.list_collections().expect("collections"), vec!["b".to_string()]);
        assert_eq!(store.count("a").expect("count a"), 0);
        assert_eq!(store.count("b").expect("count b"), 0);
    }

    #[test]
    fn databases_are_isolated_within_one_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("catalog.sqlite");

        let first = SqliteStore::open(&path, "first").expect("open first");
        first
            .insert_one("shared", &doc(json!({"model_id": "m1"})))
            .expect("insert");

        let second = SqliteStore::open(&path, "second").expect("open second");
        assert_eq!(second.count("shared").expect("count"), 0);
        assert!(second.list_collections().expect("collections").is_empty());
    }
}
