//! CLI command implementations.

pub mod list;
pub mod run;

use ctlsync_engine::SyncConfig;
use std::path::Path;

/// Loads the configuration file (if any), applies a URL override and
/// fills in defaults.
pub fn load_config(
    path: Option<&Path>,
    url: Option<String>,
) -> Result<SyncConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => SyncConfig::from_file(path)?,
        None => SyncConfig::default(),
    };
    if let Some(url) = url {
        config.url = url;
    }
    config.apply_defaults();
    config.validate()?;
    Ok(config)
}
