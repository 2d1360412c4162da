//! Feature layouts: which per-node fields a batch row carries, in which order.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// One pose attribute in a node feature row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseField {
    /// Local rotation as a unit quaternion, `x y z w`.
    Rotation,
    /// First two columns of the local rotation matrix.
    #[serde(rename = "rotation_6d")]
    Rotation6d,
    /// Local position; the root row holds the root's global position.
    Position,
    /// Previous frame's local rotation, `x y z w`.
    PrevRotation,
    RootLinearVelocity,
    RootAngularVelocity,
    RootHeight,
    /// 1.0 when the joint touches the ground.
    Contact,
}

impl PoseField {
    pub const ALL: [PoseField; 8] = [
        PoseField::Rotation,
        PoseField::Rotation6d,
        PoseField::Position,
        PoseField::PrevRotation,
        PoseField::RootLinearVelocity,
        PoseField::RootAngularVelocity,
        PoseField::RootHeight,
        PoseField::Contact,
    ];

    pub const fn width(self) -> usize {
        match self {
            PoseField::Rotation | PoseField::PrevRotation => 4,
            PoseField::Rotation6d => 6,
            PoseField::Position
            | PoseField::RootLinearVelocity
            | PoseField::RootAngularVelocity => 3,
            PoseField::RootHeight | PoseField::Contact => 1,
        }
    }

    /// Root-only fields are written on the root row and zero elsewhere.
    pub const fn root_only(self) -> bool {
        matches!(
            self,
            PoseField::RootLinearVelocity | PoseField::RootAngularVelocity | PoseField::RootHeight
        )
    }

    /// Name used as the statistics key.
    pub const fn key(self) -> &'static str {
        match self {
            PoseField::Rotation => "rotation",
            PoseField::Rotation6d => "rotation_6d",
            PoseField::Position => "position",
            PoseField::PrevRotation => "prev_rotation",
            PoseField::RootLinearVelocity => "root_linear_velocity",
            PoseField::RootAngularVelocity => "root_angular_velocity",
            PoseField::RootHeight => "root_height",
            PoseField::Contact => "contact",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.key() == key)
    }
}

/// Ordered, duplicate-free list of fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PoseField>", into = "Vec<PoseField>")]
pub struct FeatureLayout {
    fields: Vec<PoseField>,
    width: usize,
}

impl FeatureLayout {
    pub fn new(fields: Vec<PoseField>) -> Result<Self, GraphError> {
        if fields.is_empty() {
            return Err(GraphError::Layout {
                reason: "layout has no fields".into(),
            });
        }
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].contains(field) {
                return Err(GraphError::Layout {
                    reason: format!("field '{}' listed twice", field.key()),
                });
            }
        }
        let width = fields.iter().map(|f| f.width()).sum();
        Ok(Self { fields, width })
    }

    /// Model input: rotation, position, previous rotation, root motion, contact.
    pub fn default_input() -> Self {
        Self::from_known(vec![
            PoseField::Rotation,
            PoseField::Position,
            PoseField::PrevRotation,
            PoseField::RootLinearVelocity,
            PoseField::RootAngularVelocity,
            PoseField::RootHeight,
            PoseField::Contact,
        ])
    }

    /// Model output: rotation, position, root linear velocity, root height, contact.
    pub fn default_output() -> Self {
        Self::from_known(vec![
            PoseField::Rotation,
            PoseField::Position,
            PoseField::RootLinearVelocity,
            PoseField::RootHeight,
            PoseField::Contact,
        ])
    }

    fn from_known(fields: Vec<PoseField>) -> Self {
        let width = fields.iter().map(|f| f.width()).sum();
        Self { fields, width }
    }

    pub fn fields(&self) -> &[PoseField] {
        &self.fields
    }

    /// Row width in floats.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn contains(&self, field: PoseField) -> bool {
        self.fields.contains(&field)
    }

    /// Column range of `field` within a row, if present.
    pub fn range_of(&self, field: PoseField) -> Option<Range<usize>> {
        self.columns().find(|(f, _)| *f == field).map(|(_, r)| r)
    }

    /// Fields paired with their column ranges, in layout order.
    pub fn columns(&self) -> impl Iterator<Item = (PoseField, Range<usize>)> + '_ {
        self.fields.iter().scan(0usize, |start, &field| {
            let range = *start..*start + field.width();
            *start = range.end;
            Some((field, range))
        })
    }
}

impl TryFrom<Vec<PoseField>> for FeatureLayout {
    type Error = GraphError;

    fn try_from(fields: Vec<PoseField>) -> Result<Self, Self::Error> {
        Self::new(fields)
    }
}

impl From<FeatureLayout> for Vec<PoseField> {
    fn from(layout: FeatureLayout) -> Self {
        layout.fields
    }
}

/// Input and output layouts the model was trained with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Representation {
    pub input: FeatureLayout,
    pub output: FeatureLayout,
}

impl Default for Representation {
    fn default() -> Self {
        Self {
            input: FeatureLayout::default_input(),
            output: FeatureLayout::default_output(),
        }
    }
}

/// Static per-node skeleton features: local offset, global rest offset, end-effector flag.
pub const STATIC_WIDTH: usize = 7;
pub const STATIC_OFFSET: Range<usize> = 0..3;
pub const STATIC_GLOBAL_OFFSET: Range<usize> = 3..6;
pub const STATIC_END_EFFECTOR: usize = 6;
