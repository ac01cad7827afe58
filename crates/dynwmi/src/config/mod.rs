// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client configuration.
//!
//! [`ClientConfig`] is carried by every namespace, class and object built
//! from one connection; there is no process-wide state. Connection profiles
//! and provider fixtures can be loaded from YAML with
//! [`yaml::YamlLoader`] (feature `yaml-loaders`, on by default).

#[cfg(feature = "yaml-loaders")]
pub mod yaml;

use serde::Deserialize;

/// Per-connection client settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Log every query, notification query and moniker at debug level.
    pub debug: bool,
}

impl ClientConfig {
    /// Config with query tracing enabled.
    pub fn debug() -> Self {
        Self { debug: true }
    }
}
