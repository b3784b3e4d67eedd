use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "llm-catalog",
    version,
    about = "Load LLM catalog exports into a document store and derive merged benchmark records"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import every JSON file of a directory, one collection per file.
    Import(ImportArgs),
    /// Import a flat CSV comparison dataset into a single collection.
    ImportCsv(ImportCsvArgs),
    /// Join organization and provider records, score them, upsert the result.
    Merge(MergeArgs),
    /// List collections and their document counts.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// `mongodb://`, `mongodb+srv://`, `sqlite://<path>` or `sqlite::memory:`.
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub uri: String,

    #[arg(long, env = "DATABASE_NAME")]
    pub database: String,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(long, env = "JSON_FOLDER", default_value = "mongo_exports")]
    pub source_dir: PathBuf,

    /// DESTRUCTIVE: drop each target collection before inserting. Irreversible.
    #[arg(long, default_value_t = false)]
    pub drop_existing: bool,

    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ImportCsvArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(long, default_value = "llm_comparison_dataset.csv")]
    pub csv_path: PathBuf,

    #[arg(long, default_value = "Comparison Chart")]
    pub collection: String,

    /// Append to the collection instead of clearing it first.
    #[arg(long, default_value_t = false)]
    pub keep_existing: bool,
}

#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(long, default_value = "llm_organization")]
    pub organization_collection: String,

    #[arg(long, default_value = "llm_provider")]
    pub provider_collection: String,

    #[arg(long, default_value = "llm_performance")]
    pub performance_collection: String,

    #[arg(long, default_value = "llm_merged")]
    pub destination_collection: String,

    #[arg(long, value_enum, default_value_t = TemplateMode::FirstRecord)]
    pub template_mode: TemplateMode,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Which field names a synthesized one-sided record is defaulted with.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum TemplateMode {
    /// Field names of the first record returned by storage.
    #[default]
    FirstRecord,
    /// Union of field names across every record.
    Union,
}

impl TemplateMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FirstRecord => "first-record",
            Self::Union => "union",
        }
    }
}
