/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * Minimal WASI preview1 shim for the engine module.
 *
 * The engine is built against wasi-libc, which needs a handful of
 * wasi_snapshot_preview1 imports for stdio, clocks and randomness. This
 * provides them directly on the wasmtime Linker (no full wasmtime-wasi
 * dependency). Only stdout and stderr are writable; stdin reads as EOF.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 */

use crate::error::QjsError;
use rand::RngCore;
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use wasmtime::{Caller, Extern, Linker, Memory};

const MODULE: &str = "wasi_snapshot_preview1";

const ERRNO_SUCCESS: i32 = 0;
const ERRNO_BADF: i32 = 8;
const ERRNO_FAULT: i32 = 21;
const ERRNO_IO: i32 = 29;
const ERRNO_SPIPE: i32 = 70;

const FILETYPE_CHARACTER_DEVICE: u8 = 2;

// =============================================================================
// Host State
// =============================================================================

/// Output the guest produced while capture was on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Messages passed to the `print` callback, already decoded.
    pub printed: Vec<String>,
}

/// Data stored in the wasmtime `Store` next to the engine instance.
#[derive(Debug, Default)]
pub struct HostState {
    pub capture: bool,
    pub output: CapturedOutput,
}

impl HostState {
    pub fn new(capture: bool) -> Self {
        HostState {
            capture,
            output: CapturedOutput::default(),
        }
    }

    /// Writes to guest fd 1 or 2.
    fn write_fd(&mut self, fd: i32, bytes: &[u8]) -> std::io::Result<()> {
        if self.capture {
            let sink = if fd == 1 {
                &mut self.output.stdout
            } else {
                &mut self.output.stderr
            };
            sink.extend_from_slice(bytes);
            return Ok(());
        }
        if fd == 1 {
            let mut out = std::io::stdout().lock();
            out.write_all(bytes)?;
            out.flush()
        } else {
            let mut err = std::io::stderr().lock();
            err.write_all(bytes)?;
            err.flush()
        }
    }
}

fn guest_memory(caller: &mut Caller<'_, HostState>) -> Option<Memory> {
    match caller.get_export("memory") {
        Some(Extern::Memory(mem)) => Some(mem),
        _ => None,
    }
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Copies `bytes` into guest memory at `offset`; false when out of bounds.
fn store_bytes(data: &mut [u8], offset: usize, bytes: &[u8]) -> bool {
    match offset
        .checked_add(bytes.len())
        .and_then(|end| data.get_mut(offset..end))
    {
        Some(slot) => {
            slot.copy_from_slice(bytes);
            true
        }
        None => false,
    }
}

fn link_error(name: &str, e: impl std::fmt::Display) -> QjsError {
    QjsError::Load(format!("failed to link {}::{}: {}", MODULE, name, e))
}

// =============================================================================
// Linking
// =============================================================================

/// Links every shim function into `linker`.
pub fn link(linker: &mut Linker<HostState>) -> Result<(), QjsError> {
    link_fd_write(linker)?;
    link_fd_stubs(linker)?;
    link_clock_and_random(linker)?;
    link_process_stubs(linker)?;
    Ok(())
}

/// fd_write(fd: i32, iovs: i32, iovs_len: i32, nwritten_ptr: i32) -> errno
///
/// Each iovec is `{ buf_ptr: u32, buf_len: u32 }`, 8 bytes apart. All
/// iovecs are gathered before the single host write.
fn link_fd_write(linker: &mut Linker<HostState>) -> Result<(), QjsError> {
    linker
        .func_wrap(
            MODULE,
            "fd_write",
            |mut caller: Caller<'_, HostState>,
             fd: i32,
             iovs: i32,
             iovs_len: i32,
             nwritten_ptr: i32|
             -> i32 {
                if fd != 1 && fd != 2 {
                    return ERRNO_BADF;
                }
                let memory = match guest_memory(&mut caller) {
                    Some(mem) => mem,
                    None => return ERRNO_BADF,
                };

                let mut gathered = Vec::new();
                {
                    let data = memory.data(&caller);
                    for i in 0..iovs_len.max(0) as usize {
                        let iov = iovs as u32 as usize + i * 8;
                        let (buf_ptr, buf_len) = match (read_u32(data, iov), read_u32(data, iov + 4))
                        {
                            (Some(p), Some(l)) => (p as usize, l as usize),
                            _ => return ERRNO_FAULT,
                        };
                        match data.get(buf_ptr..buf_ptr + buf_len) {
                            Some(chunk) => gathered.extend_from_slice(chunk),
                            None => return ERRNO_FAULT,
                        }
                    }
                }

                if let Err(e) = caller.data_mut().write_fd(fd, &gathered) {
                    debug!(fd, error = %e, "guest write failed");
                    return ERRNO_IO;
                }

                let written = gathered.len() as u32;
                let data = memory.data_mut(&mut caller);
                if !store_bytes(data, nwritten_ptr as u32 as usize, &written.to_le_bytes()) {
                    return ERRNO_FAULT;
                }
                ERRNO_SUCCESS
            },
        )
        .map_err(|e| link_error("fd_write", e))?;
    Ok(())
}

fn link_fd_stubs(linker: &mut Linker<HostState>) -> Result<(), QjsError> {
    // fd_read(fd, iovs, iovs_len, nread_ptr) -> errno: stdin is always at EOF.
    linker
        .func_wrap(
            MODULE,
            "fd_read",
            |mut caller: Caller<'_, HostState>,
             fd: i32,
             _iovs: i32,
             _iovs_len: i32,
             nread_ptr: i32|
             -> i32 {
                if fd != 0 {
                    return ERRNO_BADF;
                }
                match guest_memory(&mut caller) {
                    Some(memory) => {
                        let data = memory.data_mut(&mut caller);
                        if store_bytes(data, nread_ptr as u32 as usize, &0u32.to_le_bytes()) {
                            ERRNO_SUCCESS
                        } else {
                            ERRNO_FAULT
                        }
                    }
                    None => ERRNO_BADF,
                }
            },
        )
        .map_err(|e| link_error("fd_read", e))?;

    linker
        .func_wrap(
            MODULE,
            "fd_close",
            |_caller: Caller<'_, HostState>, _fd: i32| -> i32 { ERRNO_SUCCESS },
        )
        .map_err(|e| link_error("fd_close", e))?;

    // fd_seek(fd, offset, whence, newoffset_ptr) -> errno: stdio is not seekable.
    linker
        .func_wrap(
            MODULE,
            "fd_seek",
            |_caller: Caller<'_, HostState>,
             _fd: i32,
             _offset: i64,
             _whence: i32,
             _newoffset: i32|
             -> i32 { ERRNO_SPIPE },
        )
        .map_err(|e| link_error("fd_seek", e))?;

    // fd_fdstat_get(fd, stat_ptr) -> errno
    // fdstat layout: filetype u8 @0, flags u16 @2, rights_base u64 @8, rights_inheriting u64 @16.
    linker
        .func_wrap(
            MODULE,
            "fd_fdstat_get",
            |mut caller: Caller<'_, HostState>, fd: i32, stat_ptr: i32| -> i32 {
                if !(0..=2).contains(&fd) {
                    return ERRNO_BADF;
                }
                let memory = match guest_memory(&mut caller) {
                    Some(mem) => mem,
                    None => return ERRNO_BADF,
                };
                let mut stat = [0u8; 24];
                stat[0] = FILETYPE_CHARACTER_DEVICE;
                stat[8..16].copy_from_slice(&u64::MAX.to_le_bytes());
                let data = memory.data_mut(&mut caller);
                if store_bytes(data, stat_ptr as u32 as usize, &stat) {
                    ERRNO_SUCCESS
                } else {
                    ERRNO_FAULT
                }
            },
        )
        .map_err(|e| link_error("fd_fdstat_get", e))?;

    // No preopened directories: wasi-libc stops scanning at the first EBADF.
    linker
        .func_wrap(
            MODULE,
            "fd_prestat_get",
            |_caller: Caller<'_, HostState>, _fd: i32, _buf: i32| -> i32 { ERRNO_BADF },
        )
        .map_err(|e| link_error("fd_prestat_get", e))?;
    linker
        .func_wrap(
            MODULE,
            "fd_prestat_dir_name",
            |_caller: Caller<'_, HostState>, _fd: i32, _path: i32, _len: i32| -> i32 {
                ERRNO_BADF
            },
        )
        .map_err(|e| link_error("fd_prestat_dir_name", e))?;

    Ok(())
}

fn link_clock_and_random(linker: &mut Linker<HostState>) -> Result<(), QjsError> {
    // clock_time_get(clock_id, precision, timestamp_ptr) -> errno
    linker
        .func_wrap(
            MODULE,
            "clock_time_get",
            |mut caller: Caller<'_, HostState>,
             _clock_id: i32,
             _precision: i64,
             timestamp_ptr: i32|
             -> i32 {
                let nanos = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(0);
                match guest_memory(&mut caller) {
                    Some(memory) => {
                        let data = memory.data_mut(&mut caller);
                        if store_bytes(data, timestamp_ptr as u32 as usize, &nanos.to_le_bytes()) {
                            ERRNO_SUCCESS
                        } else {
                            ERRNO_FAULT
                        }
                    }
                    None => ERRNO_BADF,
                }
            },
        )
        .map_err(|e| link_error("clock_time_get", e))?;

    // random_get(buf, buf_len) -> errno
    linker
        .func_wrap(
            MODULE,
            "random_get",
            |mut caller: Caller<'_, HostState>, buf: i32, buf_len: i32| -> i32 {
                let memory = match guest_memory(&mut caller) {
                    Some(mem) => mem,
                    None => return ERRNO_BADF,
                };
                let start = buf as u32 as usize;
                let end = start + buf_len as u32 as usize;
                match memory.data_mut(&mut caller).get_mut(start..end) {
                    Some(slot) => {
                        rand::thread_rng().fill_bytes(slot);
                        ERRNO_SUCCESS
                    }
                    None => ERRNO_FAULT,
                }
            },
        )
        .map_err(|e| link_error("random_get", e))?;

    Ok(())
}

/// Empty argv and environment; `proc_exit` aborts the current call.
fn link_process_stubs(linker: &mut Linker<HostState>) -> Result<(), QjsError> {
    for name in ["args_sizes_get", "environ_sizes_get"] {
        linker
            .func_wrap(
                MODULE,
                name,
                |mut caller: Caller<'_, HostState>, count_ptr: i32, buf_size_ptr: i32| -> i32 {
                    let memory = match guest_memory(&mut caller) {
                        Some(mem) => mem,
                        None => return ERRNO_BADF,
                    };
                    let data = memory.data_mut(&mut caller);
                    let zero = 0u32.to_le_bytes();
                    if store_bytes(data, count_ptr as u32 as usize, &zero)
                        && store_bytes(data, buf_size_ptr as u32 as usize, &zero)
                    {
                        ERRNO_SUCCESS
                    } else {
                        ERRNO_FAULT
                    }
                },
            )
            .map_err(|e| link_error(name, e))?;
    }

    for name in ["args_get", "environ_get"] {
        linker
            .func_wrap(
                MODULE,
                name,
                |_caller: Caller<'_, HostState>, _ptrs: i32, _buf: i32| -> i32 { ERRNO_SUCCESS },
            )
            .map_err(|e| link_error(name, e))?;
    }

    linker
        .func_wrap(
            MODULE,
            "proc_exit",
            |_caller: Caller<'_, HostState>, code: i32| -> wasmtime::Result<()> {
                Err(wasmtime::Error::new(QjsError::Fatal(format!(
                    "engine called proc_exit({})",
                    code
                ))))
            },
        )
        .map_err(|e| link_error("proc_exit", e))?;

    Ok(())
}
