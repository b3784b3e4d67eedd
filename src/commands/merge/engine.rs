use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;

use super::scoring::ScoreIndex;
use crate::cli::TemplateMode;
use crate::document::{
    AVG_SCORE_FIELD, Document, ID_FIELD, MODEL_ID_FIELD, ModelKey, PROVIDER_ID_FIELD,
    SCORE_FIELD, field_template,
};
use crate::model::MergeCounts;

/// One destination record. `None` field values are absent markers and are written
/// as `null`; they are never collapsed to zero or dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub key: ModelKey,
    pub model_id: Value,
    pub fields: BTreeMap<String, Option<Value>>,
    pub avg_benchmark_score: Option<f64>,
}

impl MergedRecord {
    fn new(key: ModelKey, model_id: Value) -> Self {
        Self {
            key,
            model_id,
            fields: BTreeMap::new(),
            avg_benchmark_score: None,
        }
    }

    /// Copies every field of `document` over this record, except the identity and
    /// join fields.
    fn overlay(&mut self, document: &Document) {
        for (name, value) in document {
            if name == ID_FIELD || name == MODEL_ID_FIELD {
                continue;
            }
            let value = match value {
                Value::Null => None,
                other => Some(other.clone()),
            };
            self.fields.insert(name.clone(), value);
        }
    }

    fn default_missing(&mut self, template: &BTreeSet<String>) {
        for name in template {
            if name == MODEL_ID_FIELD {
                continue;
            }
            self.fields.entry(name.clone()).or_insert(None);
        }
    }

    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        document.insert(MODEL_ID_FIELD.to_string(), self.model_id.clone());
        for (name, value) in &self.fields {
            document.insert(name.clone(), value.clone().unwrap_or(Value::Null));
        }
        document.insert(
            AVG_SCORE_FIELD.to_string(),
            self.avg_benchmark_score
                .map(Value::from)
                .unwrap_or(Value::Null),
        );
        document
    }
}

#[derive(Debug, Clone)]
pub struct MergePlan {
    pub records: Vec<MergedRecord>,
    pub organization_template: BTreeSet<String>,
    pub provider_template: BTreeSet<String>,
    pub counts: MergeCounts,
    pub warnings: Vec<String>,
}

/// Joins organization and provider records on `model_id` in both directions and
/// attaches the average performance score of every resulting record.
///
/// Output order is organization order first, then provider-only records in
/// provider order.
pub fn plan_merge(
    organizations: &[Document],
    providers: &[Document],
    performances: &[Document],
    template_mode: TemplateMode,
) -> MergePlan {
    let organization_template = field_template(organizations, template_mode);
    let mut provider_template = field_template(providers, template_mode);
    provider_template.insert(PROVIDER_ID_FIELD.to_string());

    let mut counts = MergeCounts {
        organization_records: organizations.len(),
        provider_records: providers.len(),
        performance_records: performances.len(),
        ..MergeCounts::default()
    };
    let mut warnings = Vec::new();

    let mut providers_by_key: HashMap<ModelKey, &Document> = HashMap::new();
    let mut provider_order = Vec::new();
    for provider in providers {
        let Some(key) = ModelKey::of(provider) else {
            counts.skipped_without_model_id += 1;
            continue;
        };
        if providers_by_key.contains_key(&key) {
            counts.duplicate_provider_ids += 1;
            warnings.push(format!(
                "duplicate provider model_id {key}: keeping the first record"
            ));
            continue;
        }
        providers_by_key.insert(key.clone(), provider);
        provider_order.push(key);
    }

    let mut records: Vec<MergedRecord> = Vec::with_capacity(organizations.len());
    let mut positions: HashMap<ModelKey, usize> = HashMap::new();

    for organization in organizations {
        let (Some(key), Some(model_id)) =
            (ModelKey::of(organization), organization.get(MODEL_ID_FIELD))
        else {
            counts.skipped_without_model_id += 1;
            continue;
        };
        let provider = providers_by_key.get(&key).copied();

        if let Some(&position) = positions.get(&key) {
            counts.duplicate_organization_ids += 1;
            warnings.push(format!(
                "duplicate organization model_id {key}: later fields overwrite earlier ones"
            ));
            let record = &mut records[position];
            record.overlay(organization);
            if let Some(provider) = provider {
                record.overlay(provider);
            }
            continue;
        }

        let mut record = MergedRecord::new(key.clone(), model_id.clone());
        record.overlay(organization);
        record.default_missing(&provider_template);
        match provider {
            Some(provider) => {
                record.overlay(provider);
                counts.matched += 1;
            }
            None => counts.organization_only += 1,
        }

        positions.insert(key, records.len());
        records.push(record);
    }

    for key in provider_order {
        if positions.contains_key(&key) {
            continue;
        }
        let Some(provider) = providers_by_key.get(&key).copied() else {
            continue;
        };
        let Some(model_id) = provider.get(MODEL_ID_FIELD) else {
            continue;
        };

        let mut record = MergedRecord::new(key.clone(), model_id.clone());
        record.default_missing(&organization_template);
        record.overlay(provider);
        counts.provider_only += 1;

        positions.insert(key, records.len());
        records.push(record);
    }

    let score_index = ScoreIndex::build(performances);
    counts.skipped_without_model_id += score_index.skipped_without_model_id;
    counts.ignored_scores = score_index.ignored_scores;

    for record in &mut records {
        record.avg_benchmark_score = score_index.average(&record.key);
        if record.avg_benchmark_score.is_some() {
            counts.scored += 1;
        } else {
            counts.unscored += 1;
        }
    }

    if counts.skipped_without_model_id > 0 {
        warnings.push(format!(
            "{} source records had no usable model_id and were skipped",
            counts.skipped_without_model_id
        ));
    }
    if counts.ignored_scores > 0 {
        warnings.push(format!(
            "{} performance records had no numeric {} and were not averaged",
            counts.ignored_scores, SCORE_FIELD
        ));
    }
    if organization_template.is_empty() && counts.provider_only > 0 {
        warnings.push(
            "organization collection is empty: provider-only records carry provider fields only"
                .to_string(),
        );
    }

    MergePlan {
        records,
        organization_template,
        provider_template,
        counts,
        warnings,
    }
}
