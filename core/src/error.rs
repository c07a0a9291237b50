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

use thiserror::Error;

/// Which kind of handle an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Runtime,
    Context,
    Value,
}

impl std::fmt::Display for HandleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            HandleKind::Runtime => "Runtime",
            HandleKind::Context => "Context",
            HandleKind::Value => "Value",
        };
        f.write_str(name)
    }
}

/// Every failure the bridge can report.
///
/// Host-binding faults are always raised through this type. Faults produced
/// by evaluated script code are not: they come back as exception values.
#[derive(Error, Debug)]
pub enum QjsError {
    #[error("Use After Free: {0} handle has already been released")]
    UseAfterFree(HandleKind),
    #[error("Double Free: {0} handle released twice")]
    DoubleFree(HandleKind),
    #[error("Initialization Error: {0}")]
    Initialization(String),
    #[error("Allocation Error: foreign allocator could not provide {size} bytes")]
    Allocation { size: u32 },
    #[error("Coercion Error: {0}")]
    Coercion(String),
    #[error("Invalid Value: tag {0} is not in the tag table")]
    InvalidValue(i32),
    #[error("Tag Table Error: {0}")]
    TagTable(String),
    #[error("UTF-8 Decode Error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Module Load Error: {0}")]
    Load(String),
    #[error("Trap in {op}: {message}")]
    Trap { op: &'static str, message: String },
    #[error("Fatal Error raised by engine: {0}")]
    Fatal(String),
    #[error("Out Of Bounds: {len} bytes at {ptr:#x} exceed linear memory")]
    OutOfBounds { ptr: u32, len: u32 },
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config Error: {0}")]
    Config(#[from] serde_json::Error),
}

impl QjsError {
    /// True for liveness violations (use after free, double free).
    pub fn is_liveness(&self) -> bool {
        matches!(self, QjsError::UseAfterFree(_) | QjsError::DoubleFree(_))
    }
}
