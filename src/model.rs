use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileImportOutcome {
    InsertedBatch,
    InsertedSingle,
    SkippedEmpty,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportedFile {
    pub filename: String,
    pub collection: String,
    pub sha256: String,
    pub dropped_existing: bool,
    pub documents_inserted: usize,
    pub outcome: FileImportOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub completed_at: String,
    pub backend: String,
    pub database: String,
    pub source_directory: String,
    pub file_count: usize,
    pub documents_inserted: usize,
    pub files: Vec<ImportedFile>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MergeCounts {
    pub organization_records: usize,
    pub provider_records: usize,
    pub performance_records: usize,
    pub skipped_without_model_id: usize,
    pub duplicate_organization_ids: usize,
    pub duplicate_provider_ids: usize,
    pub matched: usize,
    pub organization_only: usize,
    pub provider_only: usize,
    pub scored: usize,
    pub unscored: usize,
    pub ignored_scores: usize,
    pub inserted: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeCollections {
    pub organization: String,
    pub provider: String,
    pub performance: String,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub completed_at: String,
    pub backend: String,
    pub database: String,
    pub dry_run: bool,
    pub template_mode: String,
    pub organization_template: Vec<String>,
    pub provider_template: Vec<String>,
    pub collections: MergeCollections,
    pub counts: MergeCounts,
    pub warnings: Vec<String>,
}
