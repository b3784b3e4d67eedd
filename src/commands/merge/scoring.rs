use std::collections::HashMap;

use crate::document::{Document, ModelKey, SCORE_FIELD, numeric_value};

#[derive(Debug, Default)]
pub(super) struct ScoreIndex {
    pub(super) scores: HashMap<ModelKey, Vec<f64>>,
    pub(super) skipped_without_model_id: usize,
    pub(super) ignored_scores: usize,
}

impl ScoreIndex {
    pub(super) fn build(performances: &[Document]) -> Self {
        let mut index = Self::default();

        for record in performances {
            let Some(key) = ModelKey::of(record) else {
                index.skipped_without_model_id += 1;
                continue;
            };

            match record.get(SCORE_FIELD).and_then(numeric_value) {
                Some(score) => index.scores.entry(key).or_default().push(score),
                None => index.ignored_scores += 1,
            }
        }

        index
    }

    /// Mean of the numeric scores recorded for `key`, `None` when there are none.
    pub(super) fn average(&self, key: &ModelKey) -> Option<f64> {
        self.scores.get(key).and_then(|scores| mean(scores))
    }
}

pub(super) fn mean(scores: &[f64]) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().sum::<f64>() / scores.len() as f64)
}
