/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * This file is part of the Ark QuickJS Host.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 *
 * 1. OPEN SOURCE: You may use this file under the terms of the GNU Affero
 * General Public License v3.0. If you link to this code, your ENTIRE
 * application must be open-sourced under AGPLv3.
 *
 * 2. COMMERCIAL: For proprietary use, you must obtain a Commercial License
 * from Sovereign Systems.
 *
 * PATENT NOTICE: Protected by US Patent App #63/935,467.
 * NO IMPLIED LICENSE to rights of Mohamad Al-Zawahreh or Sovereign Systems.
 */

use crate::error::QjsError;
use crate::intrinsics::IntrinsicSelection;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for the loaded module instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostOptions {
    /// Buffer guest stdout/stderr and `print` output instead of forwarding it.
    pub capture_output: bool,
}

/// Global limits applied to a runtime right after creation. Sizes in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    pub memory_limit: Option<u32>,
    pub gc_threshold: Option<u32>,
    pub max_stack_size: Option<u32>,
}

/// Full configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub host: HostOptions,
    pub runtime: RuntimeOptions,
    /// `None` means "use the all-intrinsics constructor".
    pub intrinsics: Option<IntrinsicSelection>,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, QjsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, QjsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
