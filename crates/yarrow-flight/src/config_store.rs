//! Configuration persistence: one JSON file of gains and limits.

use std::path::Path;

use anyhow::Context;
use yarrow_core::CoreConfig;

/// Read and validate the config file.
pub fn load_config(path: &Path) -> anyhow::Result<CoreConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: CoreConfig = serde_json::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

/// Write the default config to `path` and return it.
pub fn create_default_config(path: &Path) -> anyhow::Result<CoreConfig> {
    let config = CoreConfig::default();
    let text = serde_json::to_string_pretty(&config)?;
    std::fs::write(path, text)
        .with_context(|| format!("writing default config {}", path.display()))?;
    Ok(config)
}

/// Load the config, materializing defaults if the file is missing or bad.
/// Never fails: if even the default can't be written we still fly on the
/// built-in values, with a warning.
pub fn load_or_default(path: &Path) -> CoreConfig {
    match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("no usable configuration file ({e:#}); loading default settings");
            match create_default_config(path) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("can't write default config file: {e:#}");
                    CoreConfig::default()
                }
            }
        }
    }
}
