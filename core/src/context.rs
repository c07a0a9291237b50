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

use crate::backend::{Equality, SharedBackend};
use crate::error::{HandleKind, QjsError};
use crate::handle::{ForeignHandle, Liveness, RawValue};
use crate::intrinsics::IntrinsicSelection;
use crate::memory;
use crate::runtime::Runtime;
use crate::value::Value;
use std::fmt;
use tracing::{debug, warn};

/// Filename pointer passed to the evaluator: anonymous source.
const EVAL_ANONYMOUS: u32 = 0;
/// Evaluation flags: global code, default mode.
const EVAL_FLAGS_DEFAULT: i32 = 0;

/// One foreign execution context bound to a [`Runtime`].
///
/// Factory for [`Value`]s. Must be released before its runtime.
pub struct Context {
    backend: SharedBackend,
    handle: ForeignHandle,
    alive: Liveness,
    runtime_alive: Liveness,
}

impl Context {
    /// Creates a context.
    ///
    /// Without a selection the engine's all-intrinsics constructor is used.
    /// With one, a raw context is created and each enabled intrinsic is
    /// installed in the fixed table order.
    pub fn create(
        runtime: &Runtime,
        selection: Option<&IntrinsicSelection>,
    ) -> Result<Self, QjsError> {
        runtime.liveness().check()?;
        let backend = runtime.backend().clone();

        let raw = {
            let mut b = backend.borrow_mut();
            match selection {
                None => b.new_context(runtime.handle())?,
                Some(_) => b.new_context_raw(runtime.handle())?,
            }
        };
        let handle = ForeignHandle::new(raw).ok_or_else(|| {
            QjsError::Initialization("engine returned a null context".to_string())
        })?;

        // Built before installing so a failed install still frees it on drop.
        let context = Context {
            backend,
            handle,
            alive: Liveness::new(HandleKind::Context),
            runtime_alive: runtime.liveness().clone(),
        };

        if let Some(selection) = selection {
            let mut b = context.backend.borrow_mut();
            for intrinsic in selection.enabled() {
                b.add_intrinsic(handle, intrinsic)?;
            }
        }

        debug!(?handle, raw = selection.is_some(), "context created");
        Ok(context)
    }

    fn check(&self) -> Result<(), QjsError> {
        self.alive.check()?;
        self.runtime_alive.check()
    }

    /// Whether the pending-exception slot is occupied.
    pub fn has_exception(&self) -> Result<bool, QjsError> {
        self.check()?;
        Ok(self.backend.borrow_mut().has_exception(self.handle)? != 0)
    }

    /// Removes the pending exception and hands it back as a value.
    pub fn take_exception(&self) -> Result<Value, QjsError> {
        self.check()?;
        let raw = self.backend.borrow_mut().get_exception(self.handle)?;
        self.adopt(raw)
    }

    fn compare(&self, kind: Equality, a: &Value, b: &Value) -> Result<bool, QjsError> {
        self.check()?;
        let (ra, rb) = (a.raw()?, b.raw()?);
        let result = self
            .backend
            .borrow_mut()
            .compare(self.handle, kind, ra, rb)?;
        if result < 0 {
            return Err(QjsError::Coercion(format!(
                "{} raised an exception",
                kind.export()
            )));
        }
        Ok(result != 0)
    }

    /// `a == b`
    pub fn is_equal(&self, a: &Value, b: &Value) -> Result<bool, QjsError> {
        self.compare(Equality::Loose, a, b)
    }

    /// `a === b`
    pub fn is_strict_equal(&self, a: &Value, b: &Value) -> Result<bool, QjsError> {
        self.compare(Equality::Strict, a, b)
    }

    /// `Object.is(a, b)`
    pub fn is_same_value(&self, a: &Value, b: &Value) -> Result<bool, QjsError> {
        self.compare(Equality::SameValue, a, b)
    }

    pub fn is_same_value_zero(&self, a: &Value, b: &Value) -> Result<bool, QjsError> {
        self.compare(Equality::SameValueZero, a, b)
    }

    pub fn new_boolean(&self, value: bool) -> Result<Value, QjsError> {
        self.check()?;
        let raw = self.backend.borrow_mut().new_bool(self.handle, value)?;
        self.adopt(raw)
    }

    pub fn new_int32(&self, value: i32) -> Result<Value, QjsError> {
        self.check()?;
        let raw = self.backend.borrow_mut().new_int32(self.handle, value)?;
        self.adopt(raw)
    }

    pub fn new_float64(&self, value: f64) -> Result<Value, QjsError> {
        self.check()?;
        let raw = self.backend.borrow_mut().new_float64(self.handle, value)?;
        self.adopt(raw)
    }

    /// Same as [`Context::new_float64`].
    pub fn new_number(&self, value: f64) -> Result<Value, QjsError> {
        self.new_float64(value)
    }

    pub fn new_string(&self, text: &str) -> Result<Value, QjsError> {
        self.check()?;
        let raw = {
            let mut b = self.backend.borrow_mut();
            let desc = memory::marshal_str(&mut *b, text)?;
            b.new_string(self.handle, desc.ptr, desc.len)?
        };
        self.adopt(raw)
    }

    pub fn new_object(&self) -> Result<Value, QjsError> {
        self.check()?;
        let raw = self.backend.borrow_mut().new_object(self.handle)?;
        self.adopt(raw)
    }

    /// Evaluates `source` as anonymous global code.
    ///
    /// A script that throws does not produce an `Err`: the result is a value
    /// whose `is_exception()` is true, and the thrown object is available
    /// through [`Context::take_exception`].
    pub fn eval(&self, source: &str) -> Result<Value, QjsError> {
        self.check()?;
        let raw = {
            let mut b = self.backend.borrow_mut();
            let desc = memory::marshal_str(&mut *b, source)?;
            b.eval(self.handle, desc.ptr, desc.len, EVAL_ANONYMOUS, EVAL_FLAGS_DEFAULT)?
        };
        self.adopt(raw)
    }

    /// Adopts a foreign reference produced elsewhere. The returned value owns
    /// that reference and frees it on release.
    pub fn wrap_raw(&self, raw: RawValue) -> Result<Value, QjsError> {
        self.check()?;
        self.adopt(raw)
    }

    fn adopt(&self, raw: RawValue) -> Result<Value, QjsError> {
        Value::new(
            self.backend.clone(),
            self.handle,
            raw,
            self.alive.clone(),
            self.runtime_alive.clone(),
        )
    }

    /// Frees the foreign context. A second call fails with `DoubleFree`.
    pub fn release(&mut self) -> Result<(), QjsError> {
        self.alive.kill()?;
        self.runtime_alive.check()?;
        debug!(handle = ?self.handle, "context released");
        self.backend.borrow_mut().free_context(self.handle)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.is_alive()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if !self.alive.is_alive() {
            return;
        }
        if !self.runtime_alive.is_alive() {
            // Freed along with its runtime.
            let _ = self.alive.kill();
            return;
        }
        if let Err(e) = self.release() {
            warn!(handle = ?self.handle, error = %e, "context release on drop failed");
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Context")
            .field("handle", &self.handle)
            .field("alive", &self.alive.is_alive())
            .finish()
    }
}
