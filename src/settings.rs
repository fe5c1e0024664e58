use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SETTINGS_FILE: &str = "settings.json";

/// Last-used workbook and sheet, restored by the host on launch. The file
/// format is internal; only these operations are part of the surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workbook_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_sheet: Option<String>,
}

pub fn load(dir: &Path) -> anyhow::Result<Settings> {
    let path = dir.join(SETTINGS_FILE);
    if !path.is_file() {
        return Ok(Settings::default());
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} is invalid JSON", path.to_string_lossy()))
}

pub fn store(dir: &Path, settings: &Settings) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.to_string_lossy()))?;
    let path = dir.join(SETTINGS_FILE);
    let text = serde_json::to_string_pretty(settings).context("failed to serialize settings")?;
    std::fs::write(&path, text)
        .with_context(|| format!("failed to write {}", path.to_string_lossy()))
}
