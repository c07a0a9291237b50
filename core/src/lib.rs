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

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod handle;
pub mod host;
pub mod intrinsics;
pub mod memory;
#[cfg(test)]
pub(crate) mod mock;
pub mod runtime;
pub mod tags;
pub mod value;
pub mod wasi;

pub use backend::{Backend, Equality};
pub use config::{EngineConfig, HostOptions, RuntimeOptions};
pub use context::Context;
pub use error::{HandleKind, QjsError};
pub use handle::{ForeignHandle, RawValue};
pub use host::{Host, WasmBackend};
pub use intrinsics::{Intrinsic, IntrinsicSelection};
pub use memory::StringDescriptor;
pub use runtime::Runtime;
pub use tags::{Tag, TagTable, TypeOf};
pub use value::Value;
pub use wasi::CapturedOutput;
