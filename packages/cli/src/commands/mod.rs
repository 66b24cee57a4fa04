pub mod check;
pub mod fmt;
pub mod render;
pub mod submit;

pub use check::{check, CheckArgs};
pub use fmt::{fmt, FmtArgs};
pub use render::{render, RenderArgs};
pub use submit::{submit, SubmitArgs};

use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use pages_editor::{CodeBufferConfig, Document, ModeController};
use pages_evaluator::{PageRuntime, SourceState};
use pages_schema::Id;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Load a page into a controller using the project config
pub fn load_controller(input: &Path, config: &Config, params: &[String]) -> Result<ModeController> {
    let document = Document::load(PathBuf::from(input))
        .with_context(|| format!("Failed to load {}", input.display()))?;
    let controller = ModeController::new(
        document,
        config.params_with(params)?,
        CodeBufferConfig {
            debounce_ms: config.debounce_ms,
        },
    )?;
    Ok(controller)
}

/// Read a JSON object file keyed by id
pub fn read_id_map(path: &Path) -> Result<Vec<(Id, Value)>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)?;
    let Value::Object(entries) = value else {
        return Err(anyhow!("{} must contain a JSON object", path.display()));
    };

    entries
        .into_iter()
        .map(|(key, value)| Ok((Id::new(key)?, value)))
        .collect()
}

/// Publish query results from a data file, then re-render what depends on them
pub fn publish_data(runtime: &mut PageRuntime, path: &Path) -> Result<()> {
    for (id, value) in read_id_map(path)? {
        runtime.publish(id, SourceState::Ready(value));
    }
    runtime.flush();
    Ok(())
}
