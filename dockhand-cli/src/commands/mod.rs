pub mod daemon;
pub mod direct;
pub mod init;
pub mod run;

use std::path::PathBuf;

use anyhow::{Context, Result};

use dockhand_core::{config, Config};

use crate::GlobalArgs;

pub fn home() -> Result<PathBuf> {
    config::home().context("could not determine home directory")
}

/// Load `--config`, or `~/.dockhand/config.yaml` when it was not given.
pub fn load_config(global: &GlobalArgs, home: &std::path::Path) -> Result<Config> {
    let path = global
        .config
        .clone()
        .unwrap_or_else(|| config::config_path_at(home));
    tracing::debug!(path = %path.display(), "loading configuration");
    let loaded = config::load_from(&path);
    loaded.context("failed to load configuration")
}
