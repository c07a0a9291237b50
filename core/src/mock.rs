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

//! In-process stand-in for the engine module, used by unit tests.
//!
//! Keeps a flat byte array as linear memory, a slot table of refcounted
//! values, and a log of every export called. Script evaluation is canned:
//! tests register source text and the value it should produce.

use crate::backend::{Backend, Equality};
use crate::error::QjsError;
use crate::handle::{ForeignHandle, RawValue};
use crate::intrinsics::{Intrinsic, INTRINSICS};
use crate::memory::StringDescriptor;
use crate::tags::TagTable;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

const TAG_INT: i32 = 0;
const TAG_BOOL: i32 = 1;
const TAG_UNDEFINED: i32 = 3;
const TAG_EXCEPTION: i32 = 6;
const TAG_FLOAT64: i32 = 8;
const TAG_OBJECT: i32 = -1;
const TAG_STRING: i32 = -7;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MockData {
    Bool(bool),
    Int(i32),
    Float(f64),
    Str(String),
    /// String-tagged value whose bytes are not valid UTF-8.
    Bytes(Vec<u8>),
    Object,
    Undefined,
}

impl MockData {
    fn tag(&self) -> i32 {
        match self {
            MockData::Bool(_) => TAG_BOOL,
            MockData::Int(_) => TAG_INT,
            MockData::Float(_) => TAG_FLOAT64,
            MockData::Str(_) | MockData::Bytes(_) => TAG_STRING,
            MockData::Object => TAG_OBJECT,
            MockData::Undefined => TAG_UNDEFINED,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            MockData::Int(n) => Some(*n as f64),
            MockData::Float(x) => Some(*x),
            _ => None,
        }
    }

    fn to_text(&self) -> Vec<u8> {
        match self {
            MockData::Bool(b) => b.to_string().into_bytes(),
            MockData::Int(n) => n.to_string().into_bytes(),
            MockData::Float(x) if x.is_finite() && x.fract() == 0.0 => {
                (*x as i64).to_string().into_bytes()
            }
            MockData::Float(x) => x.to_string().into_bytes(),
            MockData::Str(s) => s.clone().into_bytes(),
            MockData::Bytes(b) => b.clone(),
            MockData::Object => b"[object Object]".to_vec(),
            MockData::Undefined => b"undefined".to_vec(),
        }
    }
}

struct Slot {
    data: MockData,
    refs: u32,
}

struct MockContext {
    intrinsics: Vec<Intrinsic>,
    exception: Option<MockData>,
}

#[derive(Default)]
struct MockState {
    memory: Vec<u8>,
    heap_top: usize,
    runtimes: HashMap<u32, u32>,
    contexts: HashMap<u32, MockContext>,
    slots: Vec<Slot>,
    next_handle: u32,
    calls: Vec<String>,
    scripts: HashMap<String, MockData>,
    last_eval: Option<(String, u32, i32)>,
    fail_next_runtime: bool,
    failing_intrinsic: Option<Intrinsic>,
}

fn trap(op: &'static str, message: &str) -> QjsError {
    QjsError::Trap {
        op,
        message: message.to_string(),
    }
}

fn pack(tag: i32, index: u32) -> RawValue {
    RawValue::from_bits(((tag as u32 as u64) << 32) | index as u64)
}

fn exception_value() -> RawValue {
    pack(TAG_EXCEPTION, 0)
}

impl MockState {
    fn handle(&mut self) -> u32 {
        self.next_handle += 0x10;
        self.next_handle
    }

    fn push(&mut self, data: MockData) -> RawValue {
        let tag = data.tag();
        self.slots.push(Slot { data, refs: 1 });
        pack(tag, (self.slots.len() - 1) as u32)
    }

    fn slot(&mut self, value: RawValue) -> Option<&mut Slot> {
        if (value.bits() >> 32) as u32 as i32 == TAG_EXCEPTION {
            return None;
        }
        self.slots
            .get_mut(value.bits() as u32 as usize)
            .filter(|slot| slot.refs > 0)
    }

    fn data(&mut self, value: RawValue) -> Option<MockData> {
        self.slot(value).map(|slot| slot.data.clone())
    }

    fn context(&mut self, ctx: ForeignHandle) -> Result<&mut MockContext, QjsError> {
        self.contexts
            .get_mut(&ctx.raw())
            .ok_or_else(|| trap("context", "unknown context"))
    }

    fn throw(&mut self, ctx: ForeignHandle, message: String) -> Result<RawValue, QjsError> {
        self.context(ctx)?.exception = Some(MockData::Str(message));
        Ok(exception_value())
    }

    fn malloc(&mut self, size: u32) -> u32 {
        let start = (self.heap_top + 7) & !7;
        let end = start + size as usize;
        if end > self.memory.len() {
            return 0;
        }
        self.heap_top = end;
        start as u32
    }

    fn read(&self, ptr: u32, len: u32) -> Result<Vec<u8>, QjsError> {
        let start = ptr as usize;
        self.memory
            .get(start..start + len as usize)
            .map(|bytes| bytes.to_vec())
            .ok_or(QjsError::OutOfBounds { ptr, len })
    }
}

/// Cloning shares the same state, so tests keep a clone for inspection.
#[derive(Clone)]
pub(crate) struct MockBackend {
    state: Rc<RefCell<MockState>>,
    tags: TagTable,
}

impl MockBackend {
    pub const MEMORY_SIZE: usize = 64 * 1024;

    pub fn new() -> Self {
        let state = MockState {
            memory: vec![0; Self::MEMORY_SIZE],
            heap_top: 8,
            next_handle: 0x100,
            ..MockState::default()
        };
        MockBackend {
            state: Rc::new(RefCell::new(state)),
            tags: crate::tags::tests::quickjs_table(),
        }
    }

    fn log(&self, name: &str) {
        self.state.borrow_mut().calls.push(name.to_string());
    }

    pub fn count_calls(&self, name: &str) -> usize {
        self.state.borrow().calls.iter().filter(|c| *c == name).count()
    }

    pub fn calls_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn live_runtimes(&self) -> usize {
        self.state.borrow().runtimes.len()
    }

    pub fn live_values(&self) -> usize {
        self.state.borrow().slots.iter().filter(|s| s.refs > 0).count()
    }

    /// Makes `eval(source)` produce `result`.
    pub fn script(&self, source: &str, result: MockData) {
        self.state
            .borrow_mut()
            .scripts
            .insert(source.to_string(), result);
    }

    pub fn last_eval(&self) -> Option<(String, u32, i32)> {
        self.state.borrow().last_eval.clone()
    }

    pub fn fail_next_runtime(&self) {
        self.state.borrow_mut().fail_next_runtime = true;
    }

    pub fn fail_intrinsic(&self, intrinsic: Intrinsic) {
        self.state.borrow_mut().failing_intrinsic = Some(intrinsic);
    }
}

impl Backend for MockBackend {
    fn tags(&self) -> &TagTable {
        &self.tags
    }

    fn malloc(&mut self, size: u32) -> Result<u32, QjsError> {
        Ok(self.state.borrow_mut().malloc(size))
    }

    fn write(&mut self, ptr: u32, bytes: &[u8]) -> Result<(), QjsError> {
        let mut state = self.state.borrow_mut();
        let start = ptr as usize;
        let slot = state
            .memory
            .get_mut(start..start + bytes.len())
            .ok_or(QjsError::OutOfBounds {
                ptr,
                len: bytes.len() as u32,
            })?;
        slot.copy_from_slice(bytes);
        Ok(())
    }

    fn read(&mut self, ptr: u32, len: u32) -> Result<Vec<u8>, QjsError> {
        self.state.borrow().read(ptr, len)
    }

    fn new_runtime(&mut self) -> Result<u32, QjsError> {
        self.log("JS_NewRuntime");
        let mut state = self.state.borrow_mut();
        if std::mem::take(&mut state.fail_next_runtime) {
            return Ok(0);
        }
        let handle = state.handle();
        state.runtimes.insert(handle, 256 * 1024);
        Ok(handle)
    }

    fn free_runtime(&mut self, rt: ForeignHandle) -> Result<(), QjsError> {
        self.log("JS_FreeRuntime");
        match self.state.borrow_mut().runtimes.remove(&rt.raw()) {
            Some(_) => Ok(()),
            None => Err(trap("JS_FreeRuntime", "unknown runtime")),
        }
    }

    fn set_memory_limit(&mut self, _rt: ForeignHandle, _bytes: u32) -> Result<(), QjsError> {
        self.log("JS_SetMemoryLimit");
        Ok(())
    }

    fn set_gc_threshold(&mut self, rt: ForeignHandle, bytes: u32) -> Result<(), QjsError> {
        self.log("JS_SetGCThreshold");
        self.state.borrow_mut().runtimes.insert(rt.raw(), bytes);
        Ok(())
    }

    fn gc_threshold(&mut self, rt: ForeignHandle) -> Result<u32, QjsError> {
        self.log("JS_GetGCThreshold");
        self.state
            .borrow()
            .runtimes
            .get(&rt.raw())
            .copied()
            .ok_or_else(|| trap("JS_GetGCThreshold", "unknown runtime"))
    }

    fn set_max_stack_size(&mut self, _rt: ForeignHandle, _bytes: u32) -> Result<(), QjsError> {
        self.log("JS_SetMaxStackSize");
        Ok(())
    }

    fn run_gc(&mut self, _rt: ForeignHandle) -> Result<(), QjsError> {
        self.log("JS_RunGC");
        Ok(())
    }

    fn new_context(&mut self, _rt: ForeignHandle) -> Result<u32, QjsError> {
        self.log("JS_NewContext");
        let mut state = self.state.borrow_mut();
        let handle = state.handle();
        let intrinsics = INTRINSICS.iter().map(|(i, _, _)| *i).collect();
        state.contexts.insert(
            handle,
            MockContext {
                intrinsics,
                exception: None,
            },
        );
        Ok(handle)
    }

    fn new_context_raw(&mut self, _rt: ForeignHandle) -> Result<u32, QjsError> {
        self.log("JS_NewContextRaw");
        let mut state = self.state.borrow_mut();
        let handle = state.handle();
        state.contexts.insert(
            handle,
            MockContext {
                intrinsics: Vec::new(),
                exception: None,
            },
        );
        Ok(handle)
    }

    fn add_intrinsic(&mut self, ctx: ForeignHandle, intrinsic: Intrinsic) -> Result<(), QjsError> {
        self.log(intrinsic.export());
        let mut state = self.state.borrow_mut();
        if state.failing_intrinsic == Some(intrinsic) {
            return Err(trap(intrinsic.export(), "unreachable executed"));
        }
        state.context(ctx)?.intrinsics.push(intrinsic);
        Ok(())
    }

    fn free_context(&mut self, ctx: ForeignHandle) -> Result<(), QjsError> {
        self.log("JS_FreeContext");
        match self.state.borrow_mut().contexts.remove(&ctx.raw()) {
            Some(_) => Ok(()),
            None => Err(trap("JS_FreeContext", "unknown context")),
        }
    }

    fn has_exception(&mut self, ctx: ForeignHandle) -> Result<i32, QjsError> {
        let mut state = self.state.borrow_mut();
        Ok(state.context(ctx)?.exception.is_some() as i32)
    }

    fn get_exception(&mut self, ctx: ForeignHandle) -> Result<RawValue, QjsError> {
        let mut state = self.state.borrow_mut();
        let thrown = state.context(ctx)?.exception.take();
        Ok(state.push(thrown.unwrap_or(MockData::Undefined)))
    }

    fn compare(
        &mut self,
        _ctx: ForeignHandle,
        kind: Equality,
        a: RawValue,
        b: RawValue,
    ) -> Result<i32, QjsError> {
        self.log(kind.export());
        let mut state = self.state.borrow_mut();
        let same_ref = a == b;
        let (a, b) = match (state.data(a), state.data(b)) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(trap(kind.export(), "freed value")),
        };
        let equal = match (a.as_number(), b.as_number()) {
            _ if a == MockData::Object => same_ref,
            (Some(x), Some(y)) => match kind {
                Equality::Loose | Equality::Strict => x == y,
                Equality::SameValue => {
                    (x.is_nan() && y.is_nan())
                        || (x == y && x.is_sign_negative() == y.is_sign_negative())
                }
                Equality::SameValueZero => (x.is_nan() && y.is_nan()) || x == y,
            },
            _ => a == b,
        };
        Ok(equal as i32)
    }

    fn new_bool(&mut self, _ctx: ForeignHandle, value: bool) -> Result<RawValue, QjsError> {
        Ok(self.state.borrow_mut().push(MockData::Bool(value)))
    }

    fn new_int32(&mut self, _ctx: ForeignHandle, value: i32) -> Result<RawValue, QjsError> {
        Ok(self.state.borrow_mut().push(MockData::Int(value)))
    }

    fn new_float64(&mut self, _ctx: ForeignHandle, value: f64) -> Result<RawValue, QjsError> {
        Ok(self.state.borrow_mut().push(MockData::Float(value)))
    }

    fn new_string(
        &mut self,
        _ctx: ForeignHandle,
        ptr: u32,
        len: u32,
    ) -> Result<RawValue, QjsError> {
        let mut state = self.state.borrow_mut();
        let bytes = state.read(ptr, len)?;
        let text = String::from_utf8(bytes).map_err(|_| trap("JS_NewStringLen", "bad utf-8"))?;
        Ok(state.push(MockData::Str(text)))
    }

    fn new_object(&mut self, _ctx: ForeignHandle) -> Result<RawValue, QjsError> {
        Ok(self.state.borrow_mut().push(MockData::Object))
    }

    fn eval(
        &mut self,
        ctx: ForeignHandle,
        ptr: u32,
        len: u32,
        filename: u32,
        flags: i32,
    ) -> Result<RawValue, QjsError> {
        self.log("JS_Eval");
        let mut state = self.state.borrow_mut();
        let source = String::from_utf8(state.read(ptr, len)?)
            .map_err(|_| trap("JS_Eval", "bad utf-8"))?;
        state.last_eval = Some((source.clone(), filename, flags));

        let has_json = state.context(ctx)?.intrinsics.contains(&Intrinsic::Json);
        if source.contains("JSON") && !has_json {
            return state.throw(ctx, "ReferenceError: JSON is not defined".to_string());
        }
        match state.scripts.get(&source).cloned() {
            Some(data) => Ok(state.push(data)),
            None => state.throw(ctx, format!("Error: cannot evaluate `{}`", source)),
        }
    }

    fn value_tag(&mut self, value: RawValue) -> Result<i32, QjsError> {
        Ok((value.bits() >> 32) as u32 as i32)
    }

    fn free_value(&mut self, _ctx: ForeignHandle, value: RawValue) -> Result<(), QjsError> {
        self.log("JS_FreeValue");
        if value == exception_value() {
            return Ok(());
        }
        let mut state = self.state.borrow_mut();
        match state.slot(value) {
            Some(slot) => {
                slot.refs -= 1;
                Ok(())
            }
            None => Err(trap("JS_FreeValue", "refcount underflow")),
        }
    }

    fn dup_value(&mut self, _ctx: ForeignHandle, value: RawValue) -> Result<RawValue, QjsError> {
        let mut state = self.state.borrow_mut();
        match state.slot(value) {
            Some(slot) => {
                slot.refs += 1;
                Ok(value)
            }
            None => Err(trap("JS_DupValue", "freed value")),
        }
    }

    fn to_bool(&mut self, _ctx: ForeignHandle, value: RawValue) -> Result<i32, QjsError> {
        let truthy = match self.state.borrow_mut().data(value) {
            None => return Ok(-1),
            Some(MockData::Bool(b)) => b,
            Some(MockData::Int(n)) => n != 0,
            Some(MockData::Float(x)) => x != 0.0 && !x.is_nan(),
            Some(MockData::Str(s)) => !s.is_empty(),
            Some(MockData::Bytes(b)) => !b.is_empty(),
            Some(MockData::Object) => true,
            Some(MockData::Undefined) => false,
        };
        Ok(truthy as i32)
    }

    fn to_int32(&mut self, _ctx: ForeignHandle, value: RawValue) -> Result<i32, QjsError> {
        Ok(match self.state.borrow_mut().data(value) {
            Some(MockData::Int(n)) => n,
            Some(MockData::Float(x)) => x as i32,
            Some(MockData::Bool(b)) => b as i32,
            _ => 0,
        })
    }

    fn to_float64(&mut self, _ctx: ForeignHandle, value: RawValue) -> Result<f64, QjsError> {
        Ok(match self.state.borrow_mut().data(value) {
            Some(MockData::Bool(b)) => b as i32 as f64,
            Some(data) => data.as_number().unwrap_or(f64::NAN),
            None => f64::NAN,
        })
    }

    fn to_cstring(&mut self, _ctx: ForeignHandle, value: RawValue) -> Result<u64, QjsError> {
        let mut state = self.state.borrow_mut();
        let text = match state.data(value) {
            Some(data) => data.to_text(),
            None => return Ok(0),
        };
        let ptr = state.malloc(text.len() as u32 + 1);
        if ptr == 0 {
            return Ok(0);
        }
        let start = ptr as usize;
        state.memory[start..start + text.len()].copy_from_slice(&text);
        state.memory[start + text.len()] = 0;
        Ok(StringDescriptor {
            ptr,
            len: text.len() as u32,
        }
        .packed())
    }

    fn free_cstring(&mut self, _ctx: ForeignHandle, _ptr: u32) -> Result<(), QjsError> {
        self.log("JS_FreeCString");
        Ok(())
    }
}
