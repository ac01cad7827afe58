// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! YAML connection profile loader.
//!
//! # Example YAML
//!
//! ```yaml
//! # connections.yaml
//! default_profile: local
//! config:
//!   debug: true
//! profiles:
//!   local:
//!     namespace: root/cimv2
//!     privileges: [Security]
//!   remote:
//!     computer: server01
//!     user: CORP\admin
//!     password: secret
//! ```
//!
//! The same loader reads provider fixtures in the
//! [`MemorySnapshot`](crate::provider::memory::MemorySnapshot) format.

use super::ClientConfig;
use crate::connect::ConnectionOptions;
use crate::error::{Error, Result};
use crate::provider::memory::MemorySnapshot;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// YAML profile loader.
pub struct YamlLoader;

/// Root YAML document structure.
#[derive(Debug, Default, Deserialize)]
pub struct YamlConnectionDocument {
    /// Named connection profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, ConnectionOptions>,

    /// Default profile name (optional).
    #[serde(default)]
    pub default_profile: Option<String>,

    /// Client settings applied to every profile.
    #[serde(default)]
    pub config: ClientConfig,
}

impl YamlLoader {
    /// Load connection profiles from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<YamlConnectionDocument> {
        let yaml_content = fs::read_to_string(path)?;
        Self::parse_yaml(&yaml_content)
    }

    /// Parse YAML content.
    pub fn parse_yaml(yaml_content: &str) -> Result<YamlConnectionDocument> {
        serde_yaml::from_str(yaml_content)
            .map_err(|e| Error::Config(format!("Failed to parse YAML: {}", e)))
    }

    /// Get connection options by profile name.
    pub fn get_profile(doc: &YamlConnectionDocument, name: &str) -> Result<ConnectionOptions> {
        let profile = doc
            .profiles
            .get(name)
            .ok_or_else(|| Error::Config(format!("Profile '{}' not found", name)))?;
        Ok(profile.clone().config(doc.config.clone()))
    }

    /// Get the default profile: the named default, else the first profile,
    /// else default options.
    pub fn get_default_profile(doc: &YamlConnectionDocument) -> Result<ConnectionOptions> {
        if let Some(ref default_name) = doc.default_profile {
            Self::get_profile(doc, default_name)
        } else if let Some((_, profile)) = doc.profiles.iter().next() {
            Ok(profile.clone().config(doc.config.clone()))
        } else {
            Ok(ConnectionOptions::default().config(doc.config.clone()))
        }
    }

    /// Load a provider snapshot from a YAML file.
    pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<MemorySnapshot> {
        let yaml_content = fs::read_to_string(path)?;
        Self::parse_snapshot(&yaml_content)
    }

    /// Parse a provider snapshot.
    pub fn parse_snapshot(yaml_content: &str) -> Result<MemorySnapshot> {
        serde_yaml::from_str(yaml_content)
            .map_err(|e| Error::Config(format!("Failed to parse snapshot: {}", e)))
    }
}
