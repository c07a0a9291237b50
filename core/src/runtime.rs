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

use crate::backend::SharedBackend;
use crate::config::RuntimeOptions;
use crate::context::Context;
use crate::error::{HandleKind, QjsError};
use crate::handle::{ForeignHandle, Liveness};
use crate::host::Host;
use crate::intrinsics::IntrinsicSelection;
use std::fmt;
use tracing::{debug, warn};

/// Owns one foreign engine runtime.
///
/// Contexts created against a runtime must be released before it. Using a
/// context after its runtime is gone fails with `UseAfterFree(Runtime)`.
pub struct Runtime {
    backend: SharedBackend,
    handle: ForeignHandle,
    alive: Liveness,
}

impl Runtime {
    pub fn create(host: &Host) -> Result<Self, QjsError> {
        let backend = host.backend().clone();
        let raw = backend.borrow_mut().new_runtime()?;
        let handle = ForeignHandle::new(raw).ok_or_else(|| {
            QjsError::Initialization("JS_NewRuntime returned a null runtime".to_string())
        })?;
        debug!(?handle, "runtime created");
        Ok(Runtime {
            backend,
            handle,
            alive: Liveness::new(HandleKind::Runtime),
        })
    }

    /// Creates a runtime and applies `options` to it.
    pub fn with_options(host: &Host, options: &RuntimeOptions) -> Result<Self, QjsError> {
        let runtime = Runtime::create(host)?;
        runtime.apply(options)?;
        Ok(runtime)
    }

    pub fn apply(&self, options: &RuntimeOptions) -> Result<(), QjsError> {
        if let Some(bytes) = options.memory_limit {
            self.set_memory_limit(bytes)?;
        }
        if let Some(bytes) = options.gc_threshold {
            self.set_gc_threshold(bytes)?;
        }
        if let Some(bytes) = options.max_stack_size {
            self.set_max_stack_size(bytes)?;
        }
        Ok(())
    }

    pub fn set_memory_limit(&self, bytes: u32) -> Result<(), QjsError> {
        self.alive.check()?;
        self.backend.borrow_mut().set_memory_limit(self.handle, bytes)
    }

    pub fn set_gc_threshold(&self, bytes: u32) -> Result<(), QjsError> {
        self.alive.check()?;
        self.backend.borrow_mut().set_gc_threshold(self.handle, bytes)
    }

    pub fn gc_threshold(&self) -> Result<u32, QjsError> {
        self.alive.check()?;
        self.backend.borrow_mut().gc_threshold(self.handle)
    }

    pub fn set_max_stack_size(&self, bytes: u32) -> Result<(), QjsError> {
        self.alive.check()?;
        self.backend.borrow_mut().set_max_stack_size(self.handle, bytes)
    }

    /// Runs a full collection; returns once the engine is done.
    pub fn run_gc(&self) -> Result<(), QjsError> {
        self.alive.check()?;
        self.backend.borrow_mut().run_gc(self.handle)
    }

    /// Context with every intrinsic installed.
    pub fn new_context(&self) -> Result<Context, QjsError> {
        Context::create(self, None)
    }

    /// Raw context with only the selected intrinsics installed.
    pub fn new_context_with(&self, selection: &IntrinsicSelection) -> Result<Context, QjsError> {
        Context::create(self, Some(selection))
    }

    /// Frees the foreign runtime. A second call fails with `DoubleFree`.
    pub fn release(&mut self) -> Result<(), QjsError> {
        // Dead before the foreign call, so reentrant callers see it released.
        self.alive.kill()?;
        debug!(handle = ?self.handle, "runtime released");
        self.backend.borrow_mut().free_runtime(self.handle)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.is_alive()
    }

    pub(crate) fn handle(&self) -> ForeignHandle {
        self.handle
    }

    pub(crate) fn liveness(&self) -> &Liveness {
        &self.alive
    }

    pub(crate) fn backend(&self) -> &SharedBackend {
        &self.backend
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if self.alive.is_alive() {
            if let Err(e) = self.release() {
                warn!(handle = ?self.handle, error = %e, "runtime release on drop failed");
            }
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("handle", &self.handle)
            .field("alive", &self.alive.is_alive())
            .finish()
    }
}
