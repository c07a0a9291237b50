/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * Wasmtime host for the QuickJS engine module.
 *
 * Loads the engine binary, links the boundary callbacks (`env.print`,
 * `env.throwError`) and the WASI shim, reads the tag table and resolves
 * every export the bridge needs, all once at load time.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 */

use crate::backend::{Backend, Equality, SharedBackend};
use crate::config::HostOptions;
use crate::error::QjsError;
use crate::handle::{ForeignHandle, RawValue};
use crate::intrinsics::{Intrinsic, INTRINSICS};
use crate::runtime::Runtime;
use crate::tags::TagTable;
use crate::wasi::{self, CapturedOutput, HostState};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, error, info};
use wasmtime::{
    Caller, Engine, Extern, Instance, Linker, Memory, Module, Store, TypedFunc, Val, WasmParams,
    WasmResults,
};

// =============================================================================
// Boundary Callbacks
// =============================================================================

/// Decodes a `(ptr, len)` UTF-8 span of the caller's memory.
fn read_guest_str(caller: &mut Caller<'_, HostState>, ptr: i32, len: i32) -> wasmtime::Result<String> {
    let (ptr, len) = (ptr as u32, len as u32);
    let memory = match caller.get_export("memory") {
        Some(Extern::Memory(mem)) => mem,
        _ => return Err(wasmtime::Error::new(QjsError::Load("module has no memory".into()))),
    };
    let start = ptr as usize;
    let bytes = memory
        .data(&caller)
        .get(start..start + len as usize)
        .ok_or_else(|| wasmtime::Error::new(QjsError::OutOfBounds { ptr, len }))?
        .to_vec();
    String::from_utf8(bytes).map_err(|e| wasmtime::Error::new(QjsError::from(e)))
}

fn link_callbacks(linker: &mut Linker<HostState>) -> Result<(), QjsError> {
    linker
        .func_wrap(
            "env",
            "print",
            |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> wasmtime::Result<()> {
                let text = read_guest_str(&mut caller, ptr, len)?;
                let state = caller.data_mut();
                if state.capture {
                    state.output.printed.push(text);
                } else {
                    info!(target: "qjs::print", "{}", text);
                }
                Ok(())
            },
        )
        .map_err(|e| QjsError::Load(format!("failed to link env::print: {}", e)))?;

    // Aborts the foreign call in progress; surfaces as QjsError::Fatal.
    linker
        .func_wrap(
            "env",
            "throwError",
            |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> wasmtime::Result<()> {
                let text = read_guest_str(&mut caller, ptr, len)?;
                error!(target: "qjs::fatal", "{}", text);
                Err(wasmtime::Error::new(QjsError::Fatal(text)))
            },
        )
        .map_err(|e| QjsError::Load(format!("failed to link env::throwError: {}", e)))?;

    Ok(())
}

/// Maps an error out of a foreign call. Errors raised by our own callbacks
/// keep their kind; anything else is a trap inside `op`.
fn foreign_fault(op: &'static str, err: wasmtime::Error) -> QjsError {
    match err.downcast::<QjsError>() {
        Ok(inner) => inner,
        Err(err) => QjsError::Trap {
            op,
            message: format!("{:#}", err),
        },
    }
}

// =============================================================================
// Exports
// =============================================================================

fn typed<P, R>(instance: &Instance, store: &mut Store<HostState>, name: &str) -> Result<TypedFunc<P, R>, QjsError>
where
    P: WasmParams,
    R: WasmResults,
{
    instance
        .get_typed_func::<P, R>(&mut *store, name)
        .map_err(|e| QjsError::Load(format!("missing or mistyped export `{}`: {}", name, e)))
}

type CtxValue = (u32, u64);
type Compare = TypedFunc<(u32, u64, u64), i32>;

/// Every engine function the bridge calls, resolved once.
struct Exports {
    malloc: TypedFunc<u32, u32>,

    new_runtime: TypedFunc<(), u32>,
    free_runtime: TypedFunc<u32, ()>,
    set_memory_limit: TypedFunc<(u32, u32), ()>,
    set_gc_threshold: TypedFunc<(u32, u32), ()>,
    get_gc_threshold: TypedFunc<u32, u32>,
    set_max_stack_size: TypedFunc<(u32, u32), ()>,
    run_gc: TypedFunc<u32, ()>,

    new_context: TypedFunc<u32, u32>,
    new_context_raw: TypedFunc<u32, u32>,
    free_context: TypedFunc<u32, ()>,
    installers: Vec<(Intrinsic, TypedFunc<u32, ()>)>,
    has_exception: TypedFunc<u32, i32>,
    get_exception: TypedFunc<u32, u64>,
    is_equal: Compare,
    is_strict_equal: Compare,
    is_same_value: Compare,
    is_same_value_zero: Compare,

    new_bool: TypedFunc<(u32, i32), u64>,
    new_int32: TypedFunc<(u32, i32), u64>,
    new_float64: TypedFunc<(u32, f64), u64>,
    new_string: TypedFunc<(u32, u32, u32), u64>,
    new_object: TypedFunc<u32, u64>,
    eval: TypedFunc<(u32, u32, u32, u32, i32), u64>,

    value_tag: TypedFunc<u64, i32>,
    free_value: TypedFunc<CtxValue, ()>,
    dup_value: TypedFunc<CtxValue, u64>,
    to_bool: TypedFunc<CtxValue, i32>,
    to_int32: TypedFunc<CtxValue, i32>,
    to_float64: TypedFunc<CtxValue, f64>,
    to_cstring: TypedFunc<CtxValue, u64>,
    free_cstring: TypedFunc<(u32, u32), ()>,
}

impl Exports {
    fn resolve(instance: &Instance, store: &mut Store<HostState>) -> Result<Self, QjsError> {
        let installers = INTRINSICS
            .iter()
            .map(|(intrinsic, _, export)| Ok((*intrinsic, typed(instance, store, export)?)))
            .collect::<Result<Vec<_>, QjsError>>()?;

        Ok(Exports {
            malloc: typed(instance, store, "malloc")?,

            new_runtime: typed(instance, store, "JS_NewRuntime")?,
            free_runtime: typed(instance, store, "JS_FreeRuntime")?,
            set_memory_limit: typed(instance, store, "JS_SetMemoryLimit")?,
            set_gc_threshold: typed(instance, store, "JS_SetGCThreshold")?,
            get_gc_threshold: typed(instance, store, "JS_GetGCThreshold")?,
            set_max_stack_size: typed(instance, store, "JS_SetMaxStackSize")?,
            run_gc: typed(instance, store, "JS_RunGC")?,

            new_context: typed(instance, store, "JS_NewContext")?,
            new_context_raw: typed(instance, store, "JS_NewContextRaw")?,
            free_context: typed(instance, store, "JS_FreeContext")?,
            installers,
            has_exception: typed(instance, store, "JS_HasException")?,
            get_exception: typed(instance, store, "JS_GetException")?,
            is_equal: typed(instance, store, Equality::Loose.export())?,
            is_strict_equal: typed(instance, store, Equality::Strict.export())?,
            is_same_value: typed(instance, store, Equality::SameValue.export())?,
            is_same_value_zero: typed(instance, store, Equality::SameValueZero.export())?,

            new_bool: typed(instance, store, "JS_NewBool")?,
            new_int32: typed(instance, store, "JS_NewInt32")?,
            new_float64: typed(instance, store, "JS_NewFloat64")?,
            new_string: typed(instance, store, "JS_NewStringLen")?,
            new_object: typed(instance, store, "JS_NewObject")?,
            eval: typed(instance, store, "JS_Eval")?,

            value_tag: typed(instance, store, "JS_ValueGetTag")?,
            free_value: typed(instance, store, "JS_FreeValue")?,
            dup_value: typed(instance, store, "JS_DupValue")?,
            to_bool: typed(instance, store, "JS_ToBool")?,
            to_int32: typed(instance, store, "JS_ToInt32")?,
            to_float64: typed(instance, store, "JS_ToFloat64")?,
            to_cstring: typed(instance, store, "JS_ToCStringLen")?,
            free_cstring: typed(instance, store, "JS_FreeCString")?,
        })
    }
}

// =============================================================================
// Wasm Backend
// =============================================================================

/// The engine module instantiated in its own wasmtime store.
pub struct WasmBackend {
    store: Store<HostState>,
    memory: Memory,
    exports: Exports,
    tags: TagTable,
}

impl WasmBackend {
    /// Compiles and instantiates an engine module (binary or text format).
    pub fn load(bytes: &[u8], options: &HostOptions) -> Result<Self, QjsError> {
        let engine = Engine::default();
        let module = Module::new(&engine, bytes)
            .map_err(|e| QjsError::Load(format!("failed to compile engine module: {}", e)))?;

        let mut linker = Linker::<HostState>::new(&engine);
        wasi::link(&mut linker)?;
        link_callbacks(&mut linker)?;
        linker
            .define_unknown_imports_as_traps(&module)
            .map_err(|e| QjsError::Load(format!("failed to stub unknown imports: {}", e)))?;

        let mut store = Store::new(&engine, HostState::new(options.capture_output));
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| foreign_fault("instantiate", e))?;

        // wasi-libc reactors must run their constructors before any export.
        if let Ok(init) = instance.get_typed_func::<(), ()>(&mut store, "_initialize") {
            init.call(&mut store, ())
                .map_err(|e| foreign_fault("_initialize", e))?;
        }

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| QjsError::Load("missing export `memory`".to_string()))?;

        let tags = TagTable::from_lookup(|name| {
            let global = instance.get_global(&mut store, name)?;
            match global.get(&mut store) {
                Val::I32(raw) => Some(raw),
                _ => None,
            }
        })?;

        let exports = Exports::resolve(&instance, &mut store)?;

        debug!(
            memory_bytes = memory.data_size(&store),
            capture = options.capture_output,
            "engine module loaded"
        );

        Ok(WasmBackend {
            store,
            memory,
            exports,
            tags,
        })
    }

    fn comparator(&self, kind: Equality) -> &Compare {
        match kind {
            Equality::Loose => &self.exports.is_equal,
            Equality::Strict => &self.exports.is_strict_equal,
            Equality::SameValue => &self.exports.is_same_value,
            Equality::SameValueZero => &self.exports.is_same_value_zero,
        }
    }
}

impl Backend for WasmBackend {
    fn tags(&self) -> &TagTable {
        &self.tags
    }

    fn malloc(&mut self, size: u32) -> Result<u32, QjsError> {
        self.exports
            .malloc
            .call(&mut self.store, size)
            .map_err(|e| foreign_fault("malloc", e))
    }

    fn write(&mut self, ptr: u32, bytes: &[u8]) -> Result<(), QjsError> {
        self.memory
            .write(&mut self.store, ptr as usize, bytes)
            .map_err(|_| QjsError::OutOfBounds {
                ptr,
                len: bytes.len() as u32,
            })
    }

    fn read(&mut self, ptr: u32, len: u32) -> Result<Vec<u8>, QjsError> {
        let mut buf = vec![0u8; len as usize];
        self.memory
            .read(&self.store, ptr as usize, &mut buf)
            .map_err(|_| QjsError::OutOfBounds { ptr, len })?;
        Ok(buf)
    }

    fn new_runtime(&mut self) -> Result<u32, QjsError> {
        self.exports
            .new_runtime
            .call(&mut self.store, ())
            .map_err(|e| foreign_fault("JS_NewRuntime", e))
    }

    fn free_runtime(&mut self, rt: ForeignHandle) -> Result<(), QjsError> {
        self.exports
            .free_runtime
            .call(&mut self.store, rt.raw())
            .map_err(|e| foreign_fault("JS_FreeRuntime", e))
    }

    fn set_memory_limit(&mut self, rt: ForeignHandle, bytes: u32) -> Result<(), QjsError> {
        self.exports
            .set_memory_limit
            .call(&mut self.store, (rt.raw(), bytes))
            .map_err(|e| foreign_fault("JS_SetMemoryLimit", e))
    }

    fn set_gc_threshold(&mut self, rt: ForeignHandle, bytes: u32) -> Result<(), QjsError> {
        self.exports
            .set_gc_threshold
            .call(&mut self.store, (rt.raw(), bytes))
            .map_err(|e| foreign_fault("JS_SetGCThreshold", e))
    }

    fn gc_threshold(&mut self, rt: ForeignHandle) -> Result<u32, QjsError> {
        self.exports
            .get_gc_threshold
            .call(&mut self.store, rt.raw())
            .map_err(|e| foreign_fault("JS_GetGCThreshold", e))
    }

    fn set_max_stack_size(&mut self, rt: ForeignHandle, bytes: u32) -> Result<(), QjsError> {
        self.exports
            .set_max_stack_size
            .call(&mut self.store, (rt.raw(), bytes))
            .map_err(|e| foreign_fault("JS_SetMaxStackSize", e))
    }

    fn run_gc(&mut self, rt: ForeignHandle) -> Result<(), QjsError> {
        self.exports
            .run_gc
            .call(&mut self.store, rt.raw())
            .map_err(|e| foreign_fault("JS_RunGC", e))
    }

    fn new_context(&mut self, rt: ForeignHandle) -> Result<u32, QjsError> {
        self.exports
            .new_context
            .call(&mut self.store, rt.raw())
            .map_err(|e| foreign_fault("JS_NewContext", e))
    }

    fn new_context_raw(&mut self, rt: ForeignHandle) -> Result<u32, QjsError> {
        self.exports
            .new_context_raw
            .call(&mut self.store, rt.raw())
            .map_err(|e| foreign_fault("JS_NewContextRaw", e))
    }

    fn add_intrinsic(&mut self, ctx: ForeignHandle, intrinsic: Intrinsic) -> Result<(), QjsError> {
        let installer = self
            .exports
            .installers
            .iter()
            .find(|(i, _)| *i == intrinsic)
            .map(|(_, f)| f.clone())
            .ok_or_else(|| QjsError::Load(format!("missing export `{}`", intrinsic.export())))?;
        installer
            .call(&mut self.store, ctx.raw())
            .map_err(|e| foreign_fault(intrinsic.export(), e))
    }

    fn free_context(&mut self, ctx: ForeignHandle) -> Result<(), QjsError> {
        self.exports
            .free_context
            .call(&mut self.store, ctx.raw())
            .map_err(|e| foreign_fault("JS_FreeContext", e))
    }

    fn has_exception(&mut self, ctx: ForeignHandle) -> Result<i32, QjsError> {
        self.exports
            .has_exception
            .call(&mut self.store, ctx.raw())
            .map_err(|e| foreign_fault("JS_HasException", e))
    }

    fn get_exception(&mut self, ctx: ForeignHandle) -> Result<RawValue, QjsError> {
        self.exports
            .get_exception
            .call(&mut self.store, ctx.raw())
            .map(RawValue::from_bits)
            .map_err(|e| foreign_fault("JS_GetException", e))
    }

    fn compare(
        &mut self,
        ctx: ForeignHandle,
        kind: Equality,
        a: RawValue,
        b: RawValue,
    ) -> Result<i32, QjsError> {
        let func = self.comparator(kind).clone();
        func.call(&mut self.store, (ctx.raw(), a.bits(), b.bits()))
            .map_err(|e| foreign_fault(kind.export(), e))
    }

    fn new_bool(&mut self, ctx: ForeignHandle, value: bool) -> Result<RawValue, QjsError> {
        self.exports
            .new_bool
            .call(&mut self.store, (ctx.raw(), value as i32))
            .map(RawValue::from_bits)
            .map_err(|e| foreign_fault("JS_NewBool", e))
    }

    fn new_int32(&mut self, ctx: ForeignHandle, value: i32) -> Result<RawValue, QjsError> {
        self.exports
            .new_int32
            .call(&mut self.store, (ctx.raw(), value))
            .map(RawValue::from_bits)
            .map_err(|e| foreign_fault("JS_NewInt32", e))
    }

    fn new_float64(&mut self, ctx: ForeignHandle, value: f64) -> Result<RawValue, QjsError> {
        self.exports
            .new_float64
            .call(&mut self.store, (ctx.raw(), value))
            .map(RawValue::from_bits)
            .map_err(|e| foreign_fault("JS_NewFloat64", e))
    }

    fn new_string(
        &mut self,
        ctx: ForeignHandle,
        ptr: u32,
        len: u32,
    ) -> Result<RawValue, QjsError> {
        self.exports
            .new_string
            .call(&mut self.store, (ctx.raw(), ptr, len))
            .map(RawValue::from_bits)
            .map_err(|e| foreign_fault("JS_NewStringLen", e))
    }

    fn new_object(&mut self, ctx: ForeignHandle) -> Result<RawValue, QjsError> {
        self.exports
            .new_object
            .call(&mut self.store, ctx.raw())
            .map(RawValue::from_bits)
            .map_err(|e| foreign_fault("JS_NewObject", e))
    }

    fn eval(
        &mut self,
        ctx: ForeignHandle,
        ptr: u32,
        len: u32,
        filename: u32,
        flags: i32,
    ) -> Result<RawValue, QjsError> {
        self.exports
            .eval
            .call(&mut self.store, (ctx.raw(), ptr, len, filename, flags))
            .map(RawValue::from_bits)
            .map_err(|e| foreign_fault("JS_Eval", e))
    }

    fn value_tag(&mut self, value: RawValue) -> Result<i32, QjsError> {
        self.exports
            .value_tag
            .call(&mut self.store, value.bits())
            .map_err(|e| foreign_fault("JS_ValueGetTag", e))
    }

    fn free_value(&mut self, ctx: ForeignHandle, value: RawValue) -> Result<(), QjsError> {
        self.exports
            .free_value
            .call(&mut self.store, (ctx.raw(), value.bits()))
            .map_err(|e| foreign_fault("JS_FreeValue", e))
    }

    fn dup_value(&mut self, ctx: ForeignHandle, value: RawValue) -> Result<RawValue, QjsError> {
        self.exports
            .dup_value
            .call(&mut self.store, (ctx.raw(), value.bits()))
            .map(RawValue::from_bits)
            .map_err(|e| foreign_fault("JS_DupValue", e))
    }

    fn to_bool(&mut self, ctx: ForeignHandle, value: RawValue) -> Result<i32, QjsError> {
        self.exports
            .to_bool
            .call(&mut self.store, (ctx.raw(), value.bits()))
            .map_err(|e| foreign_fault("JS_ToBool", e))
    }

    fn to_int32(&mut self, ctx: ForeignHandle, value: RawValue) -> Result<i32, QjsError> {
        self.exports
            .to_int32
            .call(&mut self.store, (ctx.raw(), value.bits()))
            .map_err(|e| foreign_fault("JS_ToInt32", e))
    }

    fn to_float64(&mut self, ctx: ForeignHandle, value: RawValue) -> Result<f64, QjsError> {
        self.exports
            .to_float64
            .call(&mut self.store, (ctx.raw(), value.bits()))
            .map_err(|e| foreign_fault("JS_ToFloat64", e))
    }

    fn to_cstring(&mut self, ctx: ForeignHandle, value: RawValue) -> Result<u64, QjsError> {
        self.exports
            .to_cstring
            .call(&mut self.store, (ctx.raw(), value.bits()))
            .map_err(|e| foreign_fault("JS_ToCStringLen", e))
    }

    fn free_cstring(&mut self, ctx: ForeignHandle, ptr: u32) -> Result<(), QjsError> {
        self.exports
            .free_cstring
            .call(&mut self.store, (ctx.raw(), ptr))
            .map_err(|e| foreign_fault("JS_FreeCString", e))
    }

    fn take_output(&mut self) -> CapturedOutput {
        std::mem::take(&mut self.store.data_mut().output)
    }
}

// =============================================================================
// Public API
// =============================================================================

/// One loaded engine module. Runtimes are created against it.
///
/// Cloning is cheap and yields another reference to the same instance.
/// Not `Send`: everything created from a host stays on its thread.
#[derive(Clone)]
pub struct Host {
    backend: SharedBackend,
}

impl Host {
    pub fn load(bytes: &[u8], options: &HostOptions) -> Result<Self, QjsError> {
        let backend = WasmBackend::load(bytes, options)?;
        Ok(Host::with_backend(backend))
    }

    pub fn from_file(path: impl AsRef<Path>, options: &HostOptions) -> Result<Self, QjsError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        debug!(path = %path.display(), size = bytes.len(), "reading engine module");
        Host::load(&bytes, options)
    }

    /// Wraps any implementation of the foreign interface.
    pub fn with_backend(backend: impl Backend + 'static) -> Self {
        Host {
            backend: Rc::new(RefCell::new(backend)),
        }
    }

    /// Shorthand for [`Runtime::create`].
    pub fn new_runtime(&self) -> Result<Runtime, QjsError> {
        Runtime::create(self)
    }

    pub fn tags(&self) -> TagTable {
        self.backend.borrow().tags().clone()
    }

    /// Drains captured stdout/stderr/print output.
    pub fn take_output(&self) -> CapturedOutput {
        self.backend.borrow_mut().take_output()
    }

    pub(crate) fn backend(&self) -> &SharedBackend {
        &self.backend
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}
