// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

use hpt_core::{ConfigLoader, HptConfig, HptResult};

pub mod bench;
pub mod layout;
pub mod stats;
pub mod validate;

/// Load the config file if one was given, otherwise use defaults.
pub fn load_config(path: Option<&str>) -> HptResult<HptConfig> {
    match path {
        Some(path) => {
            tracing::debug!(file = %path, "Loading configuration");
            ConfigLoader::load_file(path)
        }
        None => Ok(HptConfig::default()),
    }
}
