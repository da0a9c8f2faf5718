//! Optional TOML config file, merged under whatever the matching CLI flags
//! set. Mirrors the precedence a deployment's `kimberlite.toml` gets, just
//! scoped to the handful of settings this process has: CLI flags always win
//! when both are given, since they're the more specific, "I'm overriding
//! this run" source.

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct CellConfig {
    pub locations: Option<u32>,
}

impl CellConfig {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).format(config::FileFormat::Toml))
            .build()
            .context("building config")?;
        settings.try_deserialize().context("deserializing config")
    }
}
