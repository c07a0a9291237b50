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

//! Opaque foreign references and the liveness flags guarding them.

use crate::error::{HandleKind, QjsError};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// A pointer into foreign linear memory identifying a runtime or context.
///
/// Only ever handed back to the foreign module that produced it. No
/// arithmetic is exposed.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForeignHandle(u32);

impl ForeignHandle {
    /// Wraps a constructor result; a zero pointer yields `None`.
    pub fn new(raw: u32) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(ForeignHandle(raw))
        }
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ForeignHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ForeignHandle({:#x})", self.0)
    }
}

/// A packed 64-bit foreign value (payload plus type discriminant).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawValue(u64);

impl RawValue {
    pub fn from_bits(bits: u64) -> Self {
        RawValue(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RawValue({:#018x})", self.0)
    }
}

/// Shared liveness flag of one handle.
///
/// The owner flips it on release; descendants hold clones so they can tell
/// when an ancestor is gone.
#[derive(Clone, Debug)]
pub(crate) struct Liveness {
    kind: HandleKind,
    alive: Rc<Cell<bool>>,
}

impl Liveness {
    pub fn new(kind: HandleKind) -> Self {
        Liveness {
            kind,
            alive: Rc::new(Cell::new(true)),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }

    pub fn check(&self) -> Result<(), QjsError> {
        if self.alive.get() {
            Ok(())
        } else {
            Err(QjsError::UseAfterFree(self.kind))
        }
    }

    /// Marks the handle dead. Fails if it already was.
    pub fn kill(&self) -> Result<(), QjsError> {
        if self.alive.replace(false) {
            Ok(())
        } else {
            Err(QjsError::DoubleFree(self.kind))
        }
    }
}
