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

//! Optional engine subsystems and the order they are installed in.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A built-in subsystem that can be installed into a raw context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Intrinsic {
    BaseObjects,
    Date,
    Eval,
    RegExpCompiler,
    RegExp,
    Json,
    Proxy,
    MapSet,
    TypedArrays,
    Promise,
    BigInt,
    WeakRef,
    Performance,
}

/// Installation table: (intrinsic, configuration name, installer export).
///
/// Row order is install order. Some installers depend on objects created by
/// earlier rows, so callers never get to reorder it.
pub static INTRINSICS: [(Intrinsic, &str, &str); 13] = [
    (Intrinsic::BaseObjects, "BaseObjects", "JS_AddIntrinsicBaseObjects"),
    (Intrinsic::Date, "Date", "JS_AddIntrinsicDate"),
    (Intrinsic::Eval, "Eval", "JS_AddIntrinsicEval"),
    (Intrinsic::RegExpCompiler, "RegExpCompiler", "JS_AddIntrinsicRegExpCompiler"),
    (Intrinsic::RegExp, "RegExp", "JS_AddIntrinsicRegExp"),
    (Intrinsic::Json, "JSON", "JS_AddIntrinsicJSON"),
    (Intrinsic::Proxy, "Proxy", "JS_AddIntrinsicProxy"),
    (Intrinsic::MapSet, "MapSet", "JS_AddIntrinsicMapSet"),
    (Intrinsic::TypedArrays, "TypedArrays", "JS_AddIntrinsicTypedArrays"),
    (Intrinsic::Promise, "Promise", "JS_AddIntrinsicPromise"),
    (Intrinsic::BigInt, "BigInt", "JS_AddIntrinsicBigInt"),
    (Intrinsic::WeakRef, "WeakRef", "JS_AddIntrinsicWeakRef"),
    (Intrinsic::Performance, "Performance", "JS_AddIntrinsicPerformance"),
];

impl Intrinsic {
    fn row(self) -> &'static (Intrinsic, &'static str, &'static str) {
        // Every variant has exactly one row.
        &INTRINSICS[self as usize]
    }

    /// Key used in the selection map.
    pub fn name(self) -> &'static str {
        self.row().1
    }

    /// Name of the installer function the engine module exports.
    pub fn export(self) -> &'static str {
        self.row().2
    }

    pub fn from_name(name: &str) -> Option<Self> {
        INTRINSICS
            .iter()
            .find(|(_, n, _)| *n == name)
            .map(|(intrinsic, _, _)| *intrinsic)
    }
}

/// Which intrinsics a raw context gets, keyed by configuration name.
///
/// Unknown keys are kept but never acted on; a missing key means "not
/// installed".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntrinsicSelection {
    flags: HashMap<String, bool>,
}

impl IntrinsicSelection {
    /// A selection with nothing enabled.
    pub fn none() -> Self {
        IntrinsicSelection::default()
    }

    /// A selection with every intrinsic enabled.
    pub fn all() -> Self {
        INTRINSICS
            .iter()
            .fold(IntrinsicSelection::none(), |sel, (intrinsic, _, _)| {
                sel.with(*intrinsic, true)
            })
    }

    pub fn with(mut self, intrinsic: Intrinsic, enabled: bool) -> Self {
        self.flags.insert(intrinsic.name().to_string(), enabled);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, enabled: bool) {
        self.flags.insert(name.into(), enabled);
    }

    pub fn is_enabled(&self, intrinsic: Intrinsic) -> bool {
        self.flags.get(intrinsic.name()).copied().unwrap_or(false)
    }

    /// Enabled intrinsics in install order.
    pub fn enabled(&self) -> impl Iterator<Item = Intrinsic> + '_ {
        INTRINSICS
            .iter()
            .map(|(intrinsic, _, _)| *intrinsic)
            .filter(move |intrinsic| self.is_enabled(*intrinsic))
    }
}

impl FromIterator<(String, bool)> for IntrinsicSelection {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        IntrinsicSelection {
            flags: iter.into_iter().collect(),
        }
    }
}
