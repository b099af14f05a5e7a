use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use schemars::schema_for;

use crate::flow::FlowData;

pub const FLOW_SCHEMA_FILE: &str = "flow.schema.json";

/// Writes the JSON schema of flow files into `out_dir` and returns its path.
pub fn write_schema(out_dir: &Path) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(out_dir).with_context(|| format!("could not create {}", out_dir.display()))?;
    let schema = schema_for!(FlowData);
    let path = out_dir.join(FLOW_SCHEMA_FILE);
    fs::write(&path, serde_json::to_string_pretty(&schema)?)?;
    Ok(path)
}
