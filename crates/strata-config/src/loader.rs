// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with figment.
//!
//! Lookup order: `/etc/strata/strata.toml`, then
//! `~/.config/strata/strata.toml`, then `./strata.toml`, with `STRATA_*`
//! environment variables applied last.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use tracing::debug;

use crate::model::StrataConfig;

/// System-wide configuration file.
pub const SYSTEM_CONFIG: &str = "/etc/strata/strata.toml";

/// Configuration file in the working directory.
pub const LOCAL_CONFIG: &str = "strata.toml";

/// `$XDG_CONFIG_HOME/strata/strata.toml`, when a config directory exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("strata").join("strata.toml"))
}

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Missing files are skipped.
pub fn load_config() -> Result<StrataConfig, figment::Error> {
    debug!(user = ?user_config_path(), "loading layered configuration");
    build_figment().extract()
}

/// Load configuration from a TOML string over the compiled defaults.
///
/// No files or environment variables are consulted.
pub fn load_config_from_str(toml_content: &str) -> Result<StrataConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(StrataConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from one explicit file, then env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<StrataConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(StrataConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full layered figment, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(StrataConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// `STRATA_DATABASE_EVENT_CAPACITY` maps to `database.event_capacity`.
///
/// Only the section prefix is turned into a dot; `Env::split("_")` would
/// break keys that contain underscores.
pub(crate) fn env_provider() -> Env {
    Env::prefixed("STRATA_").map(|key| {
        key.as_str()
            .replacen("database_", "database.", 1)
            .replacen("log_", "log.", 1)
            .into()
    })
}
