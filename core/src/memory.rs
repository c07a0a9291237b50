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

//! Moving bytes and strings across the host/engine memory boundary.
//!
//! Strings cross as a `(pointer, byte length)` pair. Buffers handed to the
//! engine are never freed here: the callee copies them and owns them after.

use crate::backend::Backend;
use crate::error::QjsError;

/// A span of foreign linear memory holding UTF-8 text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringDescriptor {
    pub ptr: u32,
    /// Length in bytes, not code points.
    pub len: u32,
}

impl StringDescriptor {
    /// Unpacks the engine's single-quantity form: length high, pointer low.
    pub fn from_packed(packed: u64) -> Self {
        StringDescriptor {
            ptr: packed as u32,
            len: (packed >> 32) as u32,
        }
    }

    pub fn packed(self) -> u64 {
        ((self.len as u64) << 32) | self.ptr as u64
    }

    pub fn is_null(self) -> bool {
        self.ptr == 0
    }
}

/// Requests `size` bytes from the foreign allocator.
pub fn allocate(backend: &mut dyn Backend, size: u32) -> Result<u32, QjsError> {
    match backend.malloc(size)? {
        0 => Err(QjsError::Allocation { size }),
        ptr => Ok(ptr),
    }
}

/// Copies `text` into freshly allocated foreign memory.
///
/// The buffer carries a trailing NUL for engine entry points that expect
/// one, but the descriptor's length covers only the text itself.
pub fn marshal_str(backend: &mut dyn Backend, text: &str) -> Result<StringDescriptor, QjsError> {
    let len = u32::try_from(text.len()).map_err(|_| QjsError::Allocation { size: u32::MAX })?;
    let size = len.checked_add(1).ok_or(QjsError::Allocation { size: u32::MAX })?;
    let ptr = allocate(backend, size)?;

    let mut bytes = Vec::with_capacity(size as usize);
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(0);
    backend.write(ptr, &bytes)?;

    Ok(StringDescriptor { ptr, len })
}

/// Reads the described bytes back and decodes them strictly as UTF-8.
pub fn read_str(backend: &mut dyn Backend, desc: StringDescriptor) -> Result<String, QjsError> {
    let bytes = backend.read(desc.ptr, desc.len)?;
    decode_utf8(bytes)
}

pub fn decode_utf8(bytes: Vec<u8>) -> Result<String, QjsError> {
    Ok(String::from_utf8(bytes)?)
}
