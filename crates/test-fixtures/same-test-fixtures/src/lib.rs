//! Manifest-driven access to the BVH and statistics fixtures under `fixtures/`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures/manifest.json must parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    skeletons: HashMap<String, String>,
    motions: HashMap<String, MotionEntry>,
    statistics: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MotionEntry {
    Path(String),
    Detailed { path: String, frames: usize },
}

impl MotionEntry {
    fn as_path(&self) -> &str {
        match self {
            MotionEntry::Path(path) => path,
            MotionEntry::Detailed { path, .. } => path,
        }
    }

    fn frames(&self) -> Option<usize> {
        match self {
            MotionEntry::Path(_) => None,
            MotionEntry::Detailed { frames, .. } => Some(*frames),
        }
    }
}

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn fixture_path(rel: &str) -> PathBuf {
    fixtures_dir().join(rel)
}

fn read_fixture(rel: &str) -> Result<String> {
    let path = fixture_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("cannot read fixture {}", path.display()))
}

fn parse_json_fixture<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_fixture(rel)?;
    serde_json::from_str(&text).with_context(|| format!("{rel} is not valid JSON"))
}

fn manifest_entry<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("no {kind} named '{name}' in fixtures/manifest.json"))
}

pub mod skeletons {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.skeletons.keys().cloned().collect()
    }

    pub fn bvh(name: &str) -> Result<String> {
        let rel = manifest_entry(&MANIFEST.skeletons, "skeleton", name)?;
        read_fixture(rel)
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let rel = manifest_entry(&MANIFEST.skeletons, "skeleton", name)?;
        Ok(fixture_path(rel))
    }
}

pub mod motions {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.motions.keys().cloned().collect()
    }

    pub fn bvh(name: &str) -> Result<String> {
        let entry = manifest_entry(&MANIFEST.motions, "motion", name)?;
        read_fixture(entry.as_path())
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let entry = manifest_entry(&MANIFEST.motions, "motion", name)?;
        Ok(fixture_path(entry.as_path()))
    }

    /// Frame count recorded in the manifest, when the entry declares one.
    pub fn frames(name: &str) -> Result<Option<usize>> {
        let entry = manifest_entry(&MANIFEST.motions, "motion", name)?;
        Ok(entry.frames())
    }
}

pub mod statistics {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.statistics.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let rel = manifest_entry(&MANIFEST.statistics, "statistics", name)?;
        read_fixture(rel)
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = manifest_entry(&MANIFEST.statistics, "statistics", name)?;
        super::parse_json_fixture(rel)
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let rel = manifest_entry(&MANIFEST.statistics, "statistics", name)?;
        Ok(fixture_path(rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_manifest_entry_resolves() {
        for name in skeletons::keys() {
            assert!(skeletons::bvh(&name).unwrap().starts_with("HIERARCHY"), "{name}");
        }
        for name in motions::keys() {
            assert!(motions::bvh(&name).unwrap().contains("MOTION"), "{name}");
        }
        for name in statistics::keys() {
            let _: serde_json::Value = statistics::load(&name).unwrap();
        }
        assert!(skeletons::path("missing").is_err());
    }
}
