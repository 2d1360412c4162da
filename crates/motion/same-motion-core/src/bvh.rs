//! BVH motion-capture codec.
//!
//! `End Site` blocks are promoted to ordinary joints named `<parent>_End`, so
//! every leaf of the loaded hierarchy has an explicit joint. Root world
//! translation is taken from the root position channels; the root `OFFSET` is
//! kept on the hierarchy but not added to the channel data. Position channels
//! are only accepted on the root; other joints are placed by their `OFFSET`.
//!
//! Euler channels compose in the order they are listed: `Xrotation Yrotation
//! Zrotation` yields `qx * qy * qz`.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use nalgebra::{Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::MotionError;
use crate::pose::{Motion, Pose};
use crate::skeleton::{Joint, SkeletonHierarchy};

/// Suffix given to joints created from `End Site` blocks.
pub const END_SUFFIX: &str = "_End";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BvhOptions {
    /// Multiplier applied to offsets and root translations on load.
    pub scale: f32,
}

impl Default for BvhOptions {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Channel {
    Position(usize),
    Rotation(usize),
}

impl Channel {
    fn parse(token: &str, line: usize) -> Result<Self, MotionError> {
        let channel = match token {
            "Xposition" => Channel::Position(0),
            "Yposition" => Channel::Position(1),
            "Zposition" => Channel::Position(2),
            "Xrotation" => Channel::Rotation(0),
            "Yrotation" => Channel::Rotation(1),
            "Zrotation" => Channel::Rotation(2),
            other => return Err(MotionError::parse(line, format!("unknown channel '{other}'"))),
        };
        Ok(channel)
    }
}

fn axis(index: usize) -> Unit<Vector3<f32>> {
    match index {
        0 => Vector3::x_axis(),
        1 => Vector3::y_axis(),
        _ => Vector3::z_axis(),
    }
}

struct Tokens<'a> {
    inner: Box<dyn Iterator<Item = (usize, &'a str)> + 'a>,
    line: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        let inner = text
            .lines()
            .enumerate()
            .flat_map(|(i, l)| l.split_whitespace().map(move |t| (i + 1, t)));
        Self {
            inner: Box::new(inner),
            line: 0,
        }
    }

    fn next_token(&mut self, what: &str) -> Result<(usize, &'a str), MotionError> {
        match self.inner.next() {
            Some((line, tok)) => {
                self.line = line;
                Ok((line, tok))
            }
            None => Err(MotionError::parse(
                self.line,
                format!("unexpected end of file, expected {what}"),
            )),
        }
    }

    fn keyword(&mut self, keyword: &str) -> Result<(), MotionError> {
        let (line, tok) = self.next_token(keyword)?;
        if tok != keyword {
            return Err(MotionError::parse(
                line,
                format!("expected '{keyword}', found '{tok}'"),
            ));
        }
        Ok(())
    }

    fn float(&mut self, what: &str) -> Result<f32, MotionError> {
        let (line, tok) = self.next_token(what)?;
        tok.parse::<f32>()
            .map_err(|e| MotionError::parse(line, format!("invalid {what} '{tok}': {e}")))
    }

    fn count(&mut self, what: &str) -> Result<usize, MotionError> {
        let (line, tok) = self.next_token(what)?;
        tok.parse::<usize>()
            .map_err(|e| MotionError::parse(line, format!("invalid {what} '{tok}': {e}")))
    }

    fn vec3(&mut self, scale: f32) -> Result<Vector3<f32>, MotionError> {
        let x = self.float("offset x")?;
        let y = self.float("offset y")?;
        let z = self.float("offset z")?;
        Ok(Vector3::new(x, y, z) * scale)
    }
}

/// Load a BVH file; the skeleton is named after the file stem.
pub fn load(path: impl AsRef<Path>, options: &BvhOptions) -> Result<Motion, MotionError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(MotionError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let text = fs::read_to_string(path).map_err(|source| MotionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    parse(&text, &name, options)
}

/// Parse BVH text.
pub fn parse(text: &str, name: &str, options: &BvhOptions) -> Result<Motion, MotionError> {
    let mut tokens = Tokens::new(text);
    tokens.keyword("HIERARCHY")?;
    tokens.keyword("ROOT")?;
    let (_, root_name) = tokens.next_token("root name")?;
    tokens.keyword("{")?;

    let mut joints = vec![Joint::new(root_name, None, Vector3::zeros())];
    let mut channels: Vec<Vec<Channel>> = vec![Vec::new()];
    let mut stack = vec![0usize];

    while let Some(&current) = stack.last() {
        let (line, tok) = tokens.next_token("joint body")?;
        match tok {
            "OFFSET" => joints[current].offset = tokens.vec3(options.scale)?,
            "CHANNELS" => {
                let n = tokens.count("channel count")?;
                if n != 3 && n != 6 {
                    return Err(MotionError::parse(
                        line,
                        format!("channel count must be 3 or 6, got {n}"),
                    ));
                }
                for _ in 0..n {
                    let (line, tok) = tokens.next_token("channel name")?;
                    let channel = Channel::parse(tok, line)?;
                    if current != 0 && matches!(channel, Channel::Position(_)) {
                        return Err(MotionError::parse(
                            line,
                            format!(
                                "position channel '{tok}' on non-root joint '{}'",
                                joints[current].name
                            ),
                        ));
                    }
                    channels[current].push(channel);
                }
            }
            "JOINT" => {
                let (_, joint_name) = tokens.next_token("joint name")?;
                tokens.keyword("{")?;
                joints.push(Joint::new(joint_name, Some(current), Vector3::zeros()));
                channels.push(Vec::new());
                stack.push(joints.len() - 1);
            }
            "End" => {
                tokens.keyword("Site")?;
                tokens.keyword("{")?;
                tokens.keyword("OFFSET")?;
                let offset = tokens.vec3(options.scale)?;
                tokens.keyword("}")?;
                let end_name = format!("{}{END_SUFFIX}", joints[current].name);
                joints.push(Joint::new(end_name, Some(current), offset));
                channels.push(Vec::new());
            }
            "}" => {
                stack.pop();
            }
            other => {
                return Err(MotionError::parse(
                    line,
                    format!("unexpected token '{other}' in hierarchy"),
                ))
            }
        }
    }

    tokens.keyword("MOTION")?;
    tokens.keyword("Frames:")?;
    let frames = tokens.count("frame count")?;
    tokens.keyword("Frame")?;
    tokens.keyword("Time:")?;
    let frame_time = tokens.float("frame time")?;

    let skeleton = SkeletonHierarchy::new(name, joints)?;
    let rest = Pose::rest(&skeleton);
    let mut motion = Motion::new(skeleton, frame_time);
    for _ in 0..frames {
        let mut pose = rest.clone();
        for (joint, joint_channels) in channels.iter().enumerate() {
            let mut rotation = UnitQuaternion::identity();
            let mut translation = Vector3::zeros();
            let mut has_translation = false;
            for channel in joint_channels {
                let value = tokens.float("channel value")?;
                match *channel {
                    Channel::Position(i) => {
                        translation[i] = value * options.scale;
                        has_translation = true;
                    }
                    Channel::Rotation(i) => {
                        rotation *= UnitQuaternion::from_axis_angle(&axis(i), value.to_radians());
                    }
                }
            }
            pose.rotations[joint] = rotation;
            if has_translation {
                pose.root_translation = translation;
            }
        }
        motion.push(pose)?;
    }
    Ok(motion)
}

fn is_end_site(skeleton: &SkeletonHierarchy, joint: usize) -> bool {
    match skeleton.parent(joint) {
        Some(parent) if skeleton.is_end_effector(joint) => {
            let name = &skeleton.joint(joint).name;
            name.strip_suffix(END_SUFFIX) == Some(skeleton.joint(parent).name.as_str())
        }
        _ => false,
    }
}

enum Visit {
    Open(usize),
    Close(usize),
}

fn pad(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push('\t');
    }
}

/// Serialize a motion to BVH text.
///
/// Root channels are `Xposition Yposition Zposition Zrotation Yrotation
/// Xrotation`, other joints `Zrotation Yrotation Xrotation`. Rest rotations
/// are folded into the written frame rotations.
pub fn to_string(motion: &Motion) -> String {
    let skeleton = &motion.skeleton;
    let mut depth = vec![0usize; skeleton.len()];
    for j in 1..skeleton.len() {
        if let Some(p) = skeleton.parent(j) {
            depth[j] = depth[p] + 1;
        }
    }

    let mut out = String::from("HIERARCHY\n");
    let mut order: Vec<usize> = Vec::with_capacity(skeleton.len());
    let mut stack = vec![Visit::Open(0)];
    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Open(j) => {
                let joint = skeleton.joint(j);
                let d = depth[j];
                let o = joint.offset;
                if is_end_site(skeleton, j) {
                    pad(&mut out, d);
                    out.push_str("End Site\n");
                    pad(&mut out, d);
                    out.push_str("{\n");
                    pad(&mut out, d + 1);
                    let _ = writeln!(out, "OFFSET {} {} {}", o.x, o.y, o.z);
                    pad(&mut out, d);
                    out.push_str("}\n");
                    continue;
                }
                pad(&mut out, d);
                let label = if j == 0 { "ROOT" } else { "JOINT" };
                let _ = writeln!(out, "{label} {}", joint.name);
                pad(&mut out, d);
                out.push_str("{\n");
                pad(&mut out, d + 1);
                let _ = writeln!(out, "OFFSET {} {} {}", o.x, o.y, o.z);
                pad(&mut out, d + 1);
                if j == 0 {
                    out.push_str(
                        "CHANNELS 6 Xposition Yposition Zposition Zrotation Yrotation Xrotation\n",
                    );
                } else {
                    out.push_str("CHANNELS 3 Zrotation Yrotation Xrotation\n");
                }
                order.push(j);
                stack.push(Visit::Close(j));
                for &child in skeleton.children(j).iter().rev() {
                    stack.push(Visit::Open(child));
                }
            }
            Visit::Close(j) => {
                pad(&mut out, depth[j]);
                out.push_str("}\n");
            }
        }
    }

    out.push_str("MOTION\n");
    let _ = writeln!(out, "Frames: {}", motion.num_frames());
    let _ = writeln!(out, "Frame Time: {}", motion.frame_time);
    for pose in motion.poses() {
        let mut values: Vec<String> = Vec::with_capacity(order.len() * 3 + 3);
        for &j in &order {
            if j == 0 {
                let t = pose.root_translation;
                values.extend([t.x, t.y, t.z].iter().map(|v| v.to_string()));
            }
            let q = skeleton.joint(j).rotation * pose.rotations[j];
            let (roll, pitch, yaw) = q.euler_angles();
            values.extend(
                [yaw, pitch, roll]
                    .iter()
                    .map(|v| v.to_degrees().to_string()),
            );
        }
        out.push_str(&values.join(" "));
        out.push('\n');
    }
    out
}

/// Write a motion to `path` as BVH.
pub fn save(motion: &Motion, path: impl AsRef<Path>) -> Result<(), MotionError> {
    let path = path.as_ref();
    fs::write(path, to_string(motion)).map_err(|source| MotionError::Io {
        path: path.to_path_buf(),
        source,
    })
}
