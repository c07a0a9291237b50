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
use crate::error::{HandleKind, QjsError};
use crate::handle::{ForeignHandle, Liveness, RawValue};
use crate::memory::{self, StringDescriptor};
use crate::tags::{Tag, TypeOf};
use std::fmt;
use tracing::warn;

/// A reference to one foreign value, tagged once at construction.
///
/// The value itself lives in the engine; this handle owns one reference to
/// it and gives it back on [`Value::release`] or drop. Must not outlive its
/// [`Context`](crate::Context).
pub struct Value {
    backend: SharedBackend,
    ctx: ForeignHandle,
    raw: RawValue,
    tag: Tag,
    alive: Liveness,
    context_alive: Liveness,
    runtime_alive: Liveness,
}

impl Value {
    pub(crate) fn new(
        backend: SharedBackend,
        ctx: ForeignHandle,
        raw: RawValue,
        context_alive: Liveness,
        runtime_alive: Liveness,
    ) -> Result<Self, QjsError> {
        let tag = {
            let mut b = backend.borrow_mut();
            let raw_tag = b.value_tag(raw)?;
            b.tags().classify(raw_tag)
        };
        Ok(Value {
            backend,
            ctx,
            raw,
            tag,
            alive: Liveness::new(HandleKind::Value),
            context_alive,
            runtime_alive,
        })
    }

    fn check(&self) -> Result<(), QjsError> {
        self.alive.check()?;
        self.context_alive.check()?;
        self.runtime_alive.check()
    }

    pub(crate) fn raw(&self) -> Result<RawValue, QjsError> {
        self.check()?;
        Ok(self.raw)
    }

    pub fn tag(&self) -> Result<Tag, QjsError> {
        self.check()?;
        Ok(self.tag)
    }

    fn tag_is(&self, tag: Tag) -> Result<bool, QjsError> {
        Ok(self.tag()? == tag)
    }

    pub fn is_boolean(&self) -> Result<bool, QjsError> {
        self.tag_is(Tag::Boolean)
    }

    /// Int32 or Float64.
    pub fn is_number(&self) -> Result<bool, QjsError> {
        Ok(matches!(self.tag()?, Tag::Int32 | Tag::Float64))
    }

    pub fn is_int32(&self) -> Result<bool, QjsError> {
        self.tag_is(Tag::Int32)
    }

    pub fn is_float64(&self) -> Result<bool, QjsError> {
        self.tag_is(Tag::Float64)
    }

    pub fn is_big_int(&self) -> Result<bool, QjsError> {
        self.tag_is(Tag::BigInt)
    }

    pub fn is_null(&self) -> Result<bool, QjsError> {
        self.tag_is(Tag::Null)
    }

    pub fn is_undefined(&self) -> Result<bool, QjsError> {
        self.tag_is(Tag::Undefined)
    }

    pub fn is_exception(&self) -> Result<bool, QjsError> {
        self.tag_is(Tag::Exception)
    }

    pub fn is_uninitialized(&self) -> Result<bool, QjsError> {
        self.tag_is(Tag::Uninitialized)
    }

    pub fn is_string(&self) -> Result<bool, QjsError> {
        self.tag_is(Tag::String)
    }

    pub fn is_symbol(&self) -> Result<bool, QjsError> {
        self.tag_is(Tag::Symbol)
    }

    pub fn is_object(&self) -> Result<bool, QjsError> {
        self.tag_is(Tag::Object)
    }

    /// Compiled function bytecode, not a callable function object.
    pub fn is_function(&self) -> Result<bool, QjsError> {
        self.tag_is(Tag::FunctionBytecode)
    }

    pub fn is_module(&self) -> Result<bool, QjsError> {
        self.tag_is(Tag::Module)
    }

    /// The `typeof` category. An unrecognized tag is `InvalidValue`.
    pub fn type_of(&self) -> Result<TypeOf, QjsError> {
        self.tag()?.type_of()
    }

    /// Fails with `Coercion` when the engine reports the conversion failed.
    pub fn get_boolean(&self) -> Result<bool, QjsError> {
        self.check()?;
        match self.backend.borrow_mut().to_bool(self.ctx, self.raw)? {
            n if n < 0 => Err(QjsError::Coercion(format!(
                "boolean conversion failed for {:?} value",
                self.tag
            ))),
            n => Ok(n != 0),
        }
    }

    pub fn get_int32(&self) -> Result<i32, QjsError> {
        self.check()?;
        self.backend.borrow_mut().to_int32(self.ctx, self.raw)
    }

    pub fn get_float64(&self) -> Result<f64, QjsError> {
        self.check()?;
        self.backend.borrow_mut().to_float64(self.ctx, self.raw)
    }

    /// Same as [`Value::get_float64`].
    pub fn get_number(&self) -> Result<f64, QjsError> {
        self.get_float64()
    }

    /// String conversion of the value, decoded strictly as UTF-8.
    pub fn get_string(&self) -> Result<String, QjsError> {
        self.check()?;
        let mut b = self.backend.borrow_mut();
        let desc = StringDescriptor::from_packed(b.to_cstring(self.ctx, self.raw)?);
        if desc.is_null() {
            return Err(QjsError::Coercion(format!(
                "string conversion failed for {:?} value",
                self.tag
            )));
        }
        let bytes = b.read(desc.ptr, desc.len);
        b.free_cstring(self.ctx, desc.ptr)?;
        memory::decode_utf8(bytes?)
    }

    /// A second, independently owned reference to the same foreign value.
    pub fn dup(&self) -> Result<Value, QjsError> {
        self.check()?;
        let raw = self.backend.borrow_mut().dup_value(self.ctx, self.raw)?;
        Value::new(
            self.backend.clone(),
            self.ctx,
            raw,
            self.context_alive.clone(),
            self.runtime_alive.clone(),
        )
    }

    /// Gives up ownership without freeing. The caller becomes responsible
    /// for the foreign reference.
    pub fn into_raw(self) -> Result<RawValue, QjsError> {
        self.check()?;
        self.alive.kill()?;
        Ok(self.raw)
    }

    /// Drops this handle's reference in the engine. A second call fails with
    /// `DoubleFree`.
    pub fn release(&mut self) -> Result<(), QjsError> {
        self.alive.kill()?;
        self.context_alive.check()?;
        self.runtime_alive.check()?;
        self.backend.borrow_mut().free_value(self.ctx, self.raw)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.is_alive()
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        if !self.alive.is_alive() {
            return;
        }
        if !self.context_alive.is_alive() || !self.runtime_alive.is_alive() {
            let _ = self.alive.kill();
            return;
        }
        if let Err(e) = self.release() {
            warn!(raw = ?self.raw, error = %e, "value release on drop failed");
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Value")
            .field("raw", &self.raw)
            .field("tag", &self.tag)
            .field("alive", &self.alive.is_alive())
            .finish()
    }
}
