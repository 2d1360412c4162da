//! Per-field normalization statistics.
//!
//! `normalize(x) = (x - mean) / scale`, `denormalize(y) = y * scale + mean`.
//! A field without an entry is left unchanged, and zero or non-finite scale
//! components count as 1.

use std::fs;
use std::path::Path;

use hashbrown::HashMap;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::layout::PoseField;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl FieldStats {
    fn mean_at(&self, i: usize) -> f32 {
        self.mean.get(i).copied().unwrap_or(0.0)
    }

    fn scale_at(&self, i: usize) -> f32 {
        match self.scale.get(i) {
            Some(&s) if s.is_finite() && s != 0.0 => s,
            _ => 1.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizationStatistics {
    fields: HashMap<String, FieldStats>,
}

impl NormalizationStatistics {
    /// Statistics that leave every field unchanged.
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self, GraphError> {
        let stats: Self = serde_json::from_str(text).map_err(|e| GraphError::Stats {
            reason: e.to_string(),
        })?;
        stats.validate()?;
        Ok(stats)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| GraphError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn with_field(mut self, field: PoseField, stats: FieldStats) -> Result<Self, GraphError> {
        check_width(field, &stats)?;
        self.fields.insert(field.key().to_string(), stats);
        Ok(self)
    }

    pub fn get(&self, field: PoseField) -> Option<&FieldStats> {
        self.fields.get(field.key())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn normalize(&self, field: PoseField, values: &mut [f32]) {
        if let Some(stats) = self.get(field) {
            for (i, v) in values.iter_mut().enumerate() {
                *v = (*v - stats.mean_at(i)) / stats.scale_at(i);
            }
        }
    }

    pub fn denormalize(&self, field: PoseField, values: &mut [f32]) {
        if let Some(stats) = self.get(field) {
            for (i, v) in values.iter_mut().enumerate() {
                *v = *v * stats.scale_at(i) + stats.mean_at(i);
            }
        }
    }

    fn validate(&self) -> Result<(), GraphError> {
        for (key, stats) in &self.fields {
            match PoseField::from_key(key) {
                Some(field) => check_width(field, stats)?,
                None => warn!("ignoring statistics for unknown feature '{key}'"),
            }
        }
        Ok(())
    }
}

fn check_width(field: PoseField, stats: &FieldStats) -> Result<(), GraphError> {
    let width = field.width();
    if stats.mean.len() != width || stats.scale.len() != width {
        return Err(GraphError::Stats {
            reason: format!(
                "'{}' expects {width} components, got mean {} / scale {}",
                field.key(),
                stats.mean.len(),
                stats.scale.len()
            ),
        });
    }
    Ok(())
}
