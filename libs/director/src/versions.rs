//! Resolution of `latest` release and stemcell versions.
//!
//! Manifests are generated with `version: latest`; the director expects
//! concrete versions, so they are replaced with the highest uploaded one.

use std::cmp::Ordering;

use serde_yaml::Value;

use crate::types::{ReleaseSummary, StemcellSummary};
use crate::DirectorError;

const LATEST: &str = "latest";

/// Compare dotted version strings numerically where possible.
///
/// `"3263.10" > "3263.8"`, `"12" > "9"`, `"1.0" < "1.0.1"`. Non-numeric
/// components fall back to lexical comparison.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split(['.', '+', '-']);
    let mut right = b.split(['.', '+', '-']);

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(l), Some(r)) => {
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn latest_release(releases: &[ReleaseSummary], name: &str) -> Result<String, DirectorError> {
    releases
        .iter()
        .filter(|r| r.name == name)
        .flat_map(|r| r.release_versions.iter())
        .map(|v| v.version.as_str())
        .max_by(|a, b| compare_versions(a, b))
        .map(str::to_string)
        .ok_or_else(|| DirectorError::UnknownArtifact {
            kind: "release",
            name: name.to_string(),
        })
}

fn latest_stemcell(stemcells: &[StemcellSummary], name: &str) -> Result<String, DirectorError> {
    stemcells
        .iter()
        .filter(|s| s.name == name || s.operating_system.as_deref() == Some(name))
        .map(|s| s.version.as_str())
        .max_by(|a, b| compare_versions(a, b))
        .map(str::to_string)
        .ok_or_else(|| DirectorError::UnknownArtifact {
            kind: "stemcell",
            name: name.to_string(),
        })
}

fn is_latest(entry: &Value) -> bool {
    entry.get("version").and_then(Value::as_str) == Some(LATEST)
}

fn name_of(entry: &Value) -> Option<String> {
    entry
        .get("name")
        .or_else(|| entry.get("os"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn set_version(entry: &mut Value, version: String) {
    if let Some(map) = entry.as_mapping_mut() {
        map.insert(Value::from("version"), Value::from(version));
    }
}

/// Rewrite every `latest` version in `yaml`.
///
/// Covers `releases[].version`, `resource_pools[].stemcell.version` and
/// `stemcells[].version`. Other fields are left untouched.
pub fn resolve_versions(
    yaml: &str,
    releases: &[ReleaseSummary],
    stemcells: &[StemcellSummary],
) -> Result<String, DirectorError> {
    let mut doc: Value = serde_yaml::from_str(yaml)?;

    if let Some(entries) = doc.get_mut("releases").and_then(Value::as_sequence_mut) {
        for entry in entries.iter_mut().filter(|e| is_latest(e)) {
            if let Some(name) = name_of(entry) {
                let version = latest_release(releases, &name)?;
                set_version(entry, version);
            }
        }
    }

    if let Some(pools) = doc
        .get_mut("resource_pools")
        .and_then(Value::as_sequence_mut)
    {
        for pool in pools.iter_mut() {
            let Some(stemcell) = pool.get_mut("stemcell") else {
                continue;
            };
            if !is_latest(stemcell) {
                continue;
            }
            if let Some(name) = name_of(stemcell) {
                let version = latest_stemcell(stemcells, &name)?;
                set_version(stemcell, version);
            }
        }
    }

    if let Some(entries) = doc.get_mut("stemcells").and_then(Value::as_sequence_mut) {
        for entry in entries.iter_mut().filter(|e| is_latest(e)) {
            if let Some(name) = name_of(entry) {
                let version = latest_stemcell(stemcells, &name)?;
                set_version(entry, version);
            }
        }
    }

    Ok(serde_yaml::to_string(&doc)?)
}
