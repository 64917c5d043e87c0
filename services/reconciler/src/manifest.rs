//! Seed specifications for the in-memory spec store.
//!
//! A manifest is a list of [`DesiredState`] documents in YAML, or JSON when the
//! file name ends in `.json`.
use crate::model::DesiredState;
use anyhow::{Context, Result, bail};
use std::collections::HashSet;
use std::path::Path;

pub fn load(path: &Path, default_istio_revision: Option<&str>) -> Result<Vec<DesiredState>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("read manifest {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let mut states = parse(&contents, is_json)
        .with_context(|| format!("parse manifest {}", path.display()))?;
    for state in &mut states {
        state.apply_defaults(default_istio_revision);
    }
    Ok(states)
}

fn parse(contents: &str, is_json: bool) -> Result<Vec<DesiredState>> {
    let states: Vec<DesiredState> = if is_json {
        serde_json::from_str(contents)?
    } else {
        serde_yaml::from_str(contents)?
    };
    let mut seen = HashSet::new();
    for state in &states {
        if !seen.insert(state.name.as_str()) {
            bail!("duplicate specification {}", state.name);
        }
    }
    Ok(states)
}
