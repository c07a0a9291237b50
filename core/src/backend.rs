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

//! The foreign interface: one method per engine export the bridge calls.
//!
//! Methods are thin. They pass raw handles through and return raw results;
//! null checks, sentinel handling and liveness live in the handle types.

use crate::error::QjsError;
use crate::handle::{ForeignHandle, RawValue};
use crate::intrinsics::Intrinsic;
use crate::tags::TagTable;
use crate::wasi::CapturedOutput;
use std::cell::RefCell;
use std::rc::Rc;

/// The four equality predicates the engine offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equality {
    /// `==`
    Loose,
    /// `===`
    Strict,
    /// `Object.is`: NaN equals NaN, +0 and -0 differ.
    SameValue,
    /// Like `SameValue`, but +0 equals -0.
    SameValueZero,
}

impl Equality {
    pub fn export(self) -> &'static str {
        match self {
            Equality::Loose => "JS_IsEqual",
            Equality::Strict => "JS_IsStrictEqual",
            Equality::SameValue => "JS_IsSameValue",
            Equality::SameValueZero => "JS_IsSameValueZero",
        }
    }
}

pub trait Backend {
    fn tags(&self) -> &TagTable;

    // --- linear memory ---

    /// Raw allocator call. Returns 0 when the foreign allocator is exhausted.
    fn malloc(&mut self, size: u32) -> Result<u32, QjsError>;
    fn write(&mut self, ptr: u32, bytes: &[u8]) -> Result<(), QjsError>;
    fn read(&mut self, ptr: u32, len: u32) -> Result<Vec<u8>, QjsError>;

    // --- runtime ---

    fn new_runtime(&mut self) -> Result<u32, QjsError>;
    fn free_runtime(&mut self, rt: ForeignHandle) -> Result<(), QjsError>;
    fn set_memory_limit(&mut self, rt: ForeignHandle, bytes: u32) -> Result<(), QjsError>;
    fn set_gc_threshold(&mut self, rt: ForeignHandle, bytes: u32) -> Result<(), QjsError>;
    fn gc_threshold(&mut self, rt: ForeignHandle) -> Result<u32, QjsError>;
    fn set_max_stack_size(&mut self, rt: ForeignHandle, bytes: u32) -> Result<(), QjsError>;
    fn run_gc(&mut self, rt: ForeignHandle) -> Result<(), QjsError>;

    // --- context ---

    fn new_context(&mut self, rt: ForeignHandle) -> Result<u32, QjsError>;
    fn new_context_raw(&mut self, rt: ForeignHandle) -> Result<u32, QjsError>;
    fn add_intrinsic(&mut self, ctx: ForeignHandle, intrinsic: Intrinsic) -> Result<(), QjsError>;
    fn free_context(&mut self, ctx: ForeignHandle) -> Result<(), QjsError>;
    fn has_exception(&mut self, ctx: ForeignHandle) -> Result<i32, QjsError>;
    fn get_exception(&mut self, ctx: ForeignHandle) -> Result<RawValue, QjsError>;
    fn compare(
        &mut self,
        ctx: ForeignHandle,
        kind: Equality,
        a: RawValue,
        b: RawValue,
    ) -> Result<i32, QjsError>;

    // --- value factories ---

    fn new_bool(&mut self, ctx: ForeignHandle, value: bool) -> Result<RawValue, QjsError>;
    fn new_int32(&mut self, ctx: ForeignHandle, value: i32) -> Result<RawValue, QjsError>;
    fn new_float64(&mut self, ctx: ForeignHandle, value: f64) -> Result<RawValue, QjsError>;
    fn new_string(&mut self, ctx: ForeignHandle, ptr: u32, len: u32)
        -> Result<RawValue, QjsError>;
    fn new_object(&mut self, ctx: ForeignHandle) -> Result<RawValue, QjsError>;
    fn eval(
        &mut self,
        ctx: ForeignHandle,
        ptr: u32,
        len: u32,
        filename: u32,
        flags: i32,
    ) -> Result<RawValue, QjsError>;

    // --- values ---

    fn value_tag(&mut self, value: RawValue) -> Result<i32, QjsError>;
    fn free_value(&mut self, ctx: ForeignHandle, value: RawValue) -> Result<(), QjsError>;
    fn dup_value(&mut self, ctx: ForeignHandle, value: RawValue) -> Result<RawValue, QjsError>;
    /// Returns -1 when the conversion failed.
    fn to_bool(&mut self, ctx: ForeignHandle, value: RawValue) -> Result<i32, QjsError>;
    fn to_int32(&mut self, ctx: ForeignHandle, value: RawValue) -> Result<i32, QjsError>;
    fn to_float64(&mut self, ctx: ForeignHandle, value: RawValue) -> Result<f64, QjsError>;
    /// Packed `(len << 32) | ptr`; a zero pointer means failure.
    fn to_cstring(&mut self, ctx: ForeignHandle, value: RawValue) -> Result<u64, QjsError>;
    fn free_cstring(&mut self, ctx: ForeignHandle, ptr: u32) -> Result<(), QjsError>;

    /// Drains captured guest output. Backends that never capture return nothing.
    fn take_output(&mut self) -> CapturedOutput {
        CapturedOutput::default()
    }
}

/// A backend shared by every handle created from one loaded module.
pub(crate) type SharedBackend = Rc<RefCell<dyn Backend>>;
