mod engine;
mod run;
mod scoring;

pub use engine::{MergePlan, MergedRecord, plan_merge};
pub use run::{build_merge_manifest, merge_collections, run, upsert_records};
