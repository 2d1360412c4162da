//! Options for motion normalization.

use serde::{Deserialize, Serialize};

use crate::contact::ContactOptions;

/// Canonicalization settings applied to every source motion before encoding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    /// Multiplier applied to offsets and root translations (e.g. 0.01 for cm -> m).
    pub unit_scale: f32,
    /// Rotate about the vertical axis so the first frame's root faces +Z.
    pub align_heading: bool,
    pub contact: ContactOptions,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            unit_scale: 1.0,
            align_heading: true,
            contact: ContactOptions::default(),
        }
    }
}
