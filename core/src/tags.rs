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

//! Value tags as published by the loaded engine module.
//!
//! Tag numbers differ between engine builds, so they are never hardcoded:
//! the module exports one `i32` global per tag and the table is read once
//! at load time.

use crate::error::QjsError;
use serde::Serialize;
use std::fmt;

/// Classification of a foreign value, decoded once from its raw tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tag {
    Boolean,
    Int32,
    Float64,
    String,
    Object,
    BigInt,
    Symbol,
    Module,
    FunctionBytecode,
    Null,
    Undefined,
    Uninitialized,
    Exception,
    /// A tag number the table does not know. Signals an engine/binding mismatch.
    Unrecognized(i32),
}

/// Exported global names, in table order.
pub const REQUIRED_TAGS: [(&str, Tag); 13] = [
    ("JS_TAG_BOOL", Tag::Boolean),
    ("JS_TAG_INT", Tag::Int32),
    ("JS_TAG_FLOAT64", Tag::Float64),
    ("JS_TAG_STRING", Tag::String),
    ("JS_TAG_OBJECT", Tag::Object),
    ("JS_TAG_BIG_INT", Tag::BigInt),
    ("JS_TAG_SYMBOL", Tag::Symbol),
    ("JS_TAG_MODULE", Tag::Module),
    ("JS_TAG_FUNCTION_BYTECODE", Tag::FunctionBytecode),
    ("JS_TAG_NULL", Tag::Null),
    ("JS_TAG_UNDEFINED", Tag::Undefined),
    ("JS_TAG_UNINITIALIZED", Tag::Uninitialized),
    ("JS_TAG_EXCEPTION", Tag::Exception),
];

/// Second big-int encoding; only newer engine builds export it.
pub const SHORT_BIG_INT_TAG: &str = "JS_TAG_SHORT_BIG_INT";

/// The `typeof` categories a tag can collapse into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeOf {
    BigInt,
    Symbol,
    String,
    Object,
    Number,
    Boolean,
    Undefined,
}

impl TypeOf {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeOf::BigInt => "bigint",
            TypeOf::Symbol => "symbol",
            TypeOf::String => "string",
            TypeOf::Object => "object",
            TypeOf::Number => "number",
            TypeOf::Boolean => "boolean",
            TypeOf::Undefined => "undefined",
        }
    }
}

impl fmt::Display for TypeOf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Tag {
    /// Collapses the tag into its `typeof` category.
    pub fn type_of(self) -> Result<TypeOf, QjsError> {
        let category = match self {
            Tag::BigInt => TypeOf::BigInt,
            Tag::Symbol => TypeOf::Symbol,
            Tag::String => TypeOf::String,
            Tag::Object | Tag::Null | Tag::Module | Tag::FunctionBytecode => TypeOf::Object,
            Tag::Int32 | Tag::Float64 => TypeOf::Number,
            Tag::Boolean => TypeOf::Boolean,
            // Neither denotes a value script code can observe.
            Tag::Undefined | Tag::Uninitialized | Tag::Exception => TypeOf::Undefined,
            Tag::Unrecognized(raw) => return Err(QjsError::InvalidValue(raw)),
        };
        Ok(category)
    }
}

/// Mapping from raw tag numbers to [`Tag`], fixed for the life of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTable {
    entries: Vec<(i32, Tag)>,
}

impl TagTable {
    /// Builds the table by asking `lookup` for every exported tag constant.
    ///
    /// All missing names are reported together. Two names resolving to the
    /// same number are also rejected, since classification would be ambiguous.
    pub fn from_lookup<F>(mut lookup: F) -> Result<Self, QjsError>
    where
        F: FnMut(&str) -> Option<i32>,
    {
        let mut entries = Vec::with_capacity(REQUIRED_TAGS.len() + 1);
        let mut missing = Vec::new();

        for (name, tag) in REQUIRED_TAGS {
            match lookup(name) {
                Some(raw) => entries.push((raw, tag)),
                None => missing.push(name),
            }
        }
        if !missing.is_empty() {
            return Err(QjsError::TagTable(format!(
                "module does not export {}",
                missing.join(", ")
            )));
        }
        if let Some(raw) = lookup(SHORT_BIG_INT_TAG) {
            entries.push((raw, Tag::BigInt));
        }

        for (i, (raw, tag)) in entries.iter().enumerate() {
            if let Some((_, other)) = entries[..i].iter().find(|(r, _)| r == raw) {
                return Err(QjsError::TagTable(format!(
                    "tag value {} is shared by {:?} and {:?}",
                    raw, other, tag
                )));
            }
        }

        Ok(TagTable { entries })
    }

    pub fn classify(&self, raw: i32) -> Tag {
        self.entries
            .iter()
            .find(|(r, _)| *r == raw)
            .map(|(_, tag)| *tag)
            .unwrap_or(Tag::Unrecognized(raw))
    }

    /// Raw number of `tag`. For `BigInt` this is the heap encoding.
    pub fn raw_of(&self, tag: Tag) -> Option<i32> {
        self.entries
            .iter()
            .find(|(_, t)| *t == tag)
            .map(|(raw, _)| *raw)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Tag numbers of a recent QuickJS build.
    pub(crate) const QUICKJS_TAGS: [(&str, i32); 14] = [
        ("JS_TAG_BIG_INT", -9),
        ("JS_TAG_SYMBOL", -8),
        ("JS_TAG_STRING", -7),
        ("JS_TAG_MODULE", -3),
        ("JS_TAG_FUNCTION_BYTECODE", -2),
        ("JS_TAG_OBJECT", -1),
        ("JS_TAG_INT", 0),
        ("JS_TAG_BOOL", 1),
        ("JS_TAG_NULL", 2),
        ("JS_TAG_UNDEFINED", 3),
        ("JS_TAG_UNINITIALIZED", 4),
        ("JS_TAG_EXCEPTION", 6),
        ("JS_TAG_SHORT_BIG_INT", 7),
        ("JS_TAG_FLOAT64", 8),
    ];

    pub(crate) fn quickjs_table() -> TagTable {
        let globals: HashMap<&str, i32> = QUICKJS_TAGS.into_iter().collect();
        TagTable::from_lookup(|name| globals.get(name).copied()).unwrap()
    }

    #[test]
    fn test_classify_known_tags() {
        let table = quickjs_table();
        assert_eq!(table.classify(-7), Tag::String);
        assert_eq!(table.classify(8), Tag::Float64);
        assert_eq!(table.classify(0), Tag::Int32);
        assert_eq!(table.classify(-2), Tag::FunctionBytecode);
    }

    #[test]
    fn test_both_bigint_encodings() {
        let table = quickjs_table();
        assert_eq!(table.classify(-9), Tag::BigInt);
        assert_eq!(table.classify(7), Tag::BigInt);
        assert_eq!(table.raw_of(Tag::BigInt), Some(-9));
    }

    #[test]
    fn test_short_bigint_is_optional() {
        let globals: HashMap<&str, i32> = QUICKJS_TAGS
            .into_iter()
            .filter(|(name, _)| *name != SHORT_BIG_INT_TAG)
            .collect();
        let table = TagTable::from_lookup(|name| globals.get(name).copied()).unwrap();
        assert_eq!(table.classify(7), Tag::Unrecognized(7));
    }

    #[test]
    fn test_unknown_tag_is_unrecognized() {
        let table = quickjs_table();
        // 5 is the engine-internal catch offset, never exported.
        let tag = table.classify(5);
        assert_eq!(tag, Tag::Unrecognized(5));
        assert!(matches!(tag.type_of(), Err(QjsError::InvalidValue(5))));
    }

    #[test]
    fn test_missing_names_reported_together() {
        let globals: HashMap<&str, i32> = QUICKJS_TAGS
            .into_iter()
            .filter(|(name, _)| *name != "JS_TAG_SYMBOL" && *name != "JS_TAG_NULL")
            .collect();
        match TagTable::from_lookup(|name| globals.get(name).copied()) {
            Err(QjsError::TagTable(msg)) => {
                assert!(msg.contains("JS_TAG_SYMBOL"), "got: {}", msg);
                assert!(msg.contains("JS_TAG_NULL"), "got: {}", msg);
            }
            other => panic!("expected TagTable error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_tag_values_rejected() {
        let mut globals: HashMap<&str, i32> = QUICKJS_TAGS.into_iter().collect();
        globals.insert("JS_TAG_NULL", 3);
        let result = TagTable::from_lookup(|name| globals.get(name).copied());
        assert!(matches!(result, Err(QjsError::TagTable(_))));
    }

    #[test]
    fn test_type_of_categories() {
        let labels: Vec<&str> = REQUIRED_TAGS
            .iter()
            .map(|(_, tag)| tag.type_of().unwrap().as_str())
            .collect();
        insta::assert_json_snapshot!(labels, @r###"
        [
          "boolean",
          "number",
          "number",
          "string",
          "object",
          "bigint",
          "symbol",
          "object",
          "object",
          "object",
          "undefined",
          "undefined",
          "undefined"
        ]
        "###);
    }
}
