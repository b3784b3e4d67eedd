use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use super::engine::{MergePlan, MergedRecord, plan_merge};
use crate::cli::{MergeArgs, TemplateMode};
use crate::document::MODEL_ID_FIELD;
use crate::model::{MergeCollections, MergeRunManifest};
use crate::store::{self, DocumentStore, UpsertOutcome, validate_collection_name};
use crate::util::{now_utc_string, run_id_for, write_json_pretty};

pub fn run(args: MergeArgs) -> Result<()> {
    let started_at = now_utc_string();
    let run_id = run_id_for("merge", Utc::now());

    let collections = MergeCollections {
        organization: args.organization_collection.clone(),
        provider: args.provider_collection.clone(),
        performance: args.performance_collection.clone(),
        destination: args.destination_collection.clone(),
    };

    info!(
        run_id = %run_id,
        organization = %collections.organization,
        provider = %collections.provider,
        performance = %collections.performance,
        destination = %collections.destination,
        template_mode = args.template_mode.as_str(),
        dry_run = args.dry_run,
        "starting merge"
    );

    let store = store::open(&args.connection)?;
    let plan = merge_collections(store.as_ref(), &collections, args.template_mode, args.dry_run)?;

    if let Some(report_path) = &args.report_path {
        let manifest = build_merge_manifest(
            &args,
            store.backend(),
            run_id.clone(),
            started_at,
            collections,
            &plan,
        );
        write_json_pretty(report_path, &manifest)?;
        info!(path = %report_path.display(), "wrote merge run manifest");
    }

    info!(
        run_id = %run_id,
        records = plan.records.len(),
        matched = plan.counts.matched,
        organization_only = plan.counts.organization_only,
        provider_only = plan.counts.provider_only,
        scored = plan.counts.scored,
        unscored = plan.counts.unscored,
        inserted = plan.counts.inserted,
        updated = plan.counts.updated,
        "merge completed"
    );

    Ok(())
}

pub fn build_merge_manifest(
    args: &MergeArgs,
    backend: &str,
    run_id: String,
    started_at: String,
    collections: MergeCollections,
    plan: &MergePlan,
) -> MergeRunManifest {
    MergeRunManifest {
        manifest_version: 1,
        run_id,
        started_at,
        completed_at: now_utc_string(),
        backend: backend.to_string(),
        database: args.connection.database.clone(),
        dry_run: args.dry_run,
        template_mode: args.template_mode.as_str().to_string(),
        organization_template: plan.organization_template.iter().cloned().collect(),
        provider_template: plan.provider_template.iter().cloned().collect(),
        collections,
        counts: plan.counts.clone(),
        warnings: plan.warnings.clone(),
    }
}

/// Reads the three source collections, computes the merge and, unless `dry_run`,
/// upserts every record into the destination collection.
pub fn merge_collections(
    store: &dyn DocumentStore,
    collections: &MergeCollections,
    template_mode: TemplateMode,
    dry_run: bool,
) -> Result<MergePlan> {
    for name in [
        &collections.organization,
        &collections.provider,
        &collections.performance,
        &collections.destination,
    ] {
        validate_collection_name(name)?;
    }

    let organizations = store.find_all(&collections.organization)?;
    let providers = store.find_all(&collections.provider)?;
    let performances = store.find_all(&collections.performance)?;

    info!(
        organizations = organizations.len(),
        providers = providers.len(),
        performances = performances.len(),
        "loaded source collections"
    );

    let mut plan = plan_merge(&organizations, &providers, &performances, template_mode);
    for warning in &plan.warnings {
        warn!(warning = %warning, "merge warning");
    }

    if dry_run {
        info!(
            records = plan.records.len(),
            destination = %collections.destination,
            "dry run, destination left untouched"
        );
        return Ok(plan);
    }

    let (inserted, updated) = upsert_records(store, &collections.destination, &plan.records)?;
    plan.counts.inserted = inserted;
    plan.counts.updated = updated;

    Ok(plan)
}

/// Upserts by `model_id`, one record at a time. A failure leaves earlier
/// records written; there is no rollback.
pub fn upsert_records(
    store: &dyn DocumentStore,
    collection: &str,
    records: &[MergedRecord],
) -> Result<(usize, usize)> {
    let mut inserted = 0;
    let mut updated = 0;

    for record in records {
        let outcome = store
            .upsert_by_field(collection, MODEL_ID_FIELD, &record.to_document())
            .with_context(|| format!("failed to upsert merged record {}", record.key))?;
        match outcome {
            UpsertOutcome::Inserted => inserted += 1,
            UpsertOutcome::Updated => updated += 1,
        }
    }

    info!(collection = %collection, inserted, updated, "upserted merged records");
    Ok((inserted, updated))
}
