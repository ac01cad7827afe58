// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `CIMTYPE` codes and their schema names.

pub const CIM_EMPTY: i32 = 0;
pub const CIM_SINT8: i32 = 16;
pub const CIM_UINT8: i32 = 17;
pub const CIM_SINT16: i32 = 2;
pub const CIM_UINT16: i32 = 18;
pub const CIM_SINT32: i32 = 3;
pub const CIM_UINT32: i32 = 19;
pub const CIM_SINT64: i32 = 20;
pub const CIM_UINT64: i32 = 21;
pub const CIM_REAL32: i32 = 4;
pub const CIM_REAL64: i32 = 5;
pub const CIM_BOOLEAN: i32 = 11;
pub const CIM_STRING: i32 = 8;
pub const CIM_DATETIME: i32 = 101;
pub const CIM_REFERENCE: i32 = 102;
pub const CIM_CHAR16: i32 = 103;
pub const CIM_OBJECT: i32 = 13;
/// Set on array types.
pub const CIM_FLAG_ARRAY: i32 = 0x2000;

const NAMES: &[(i32, &str)] = &[
    (CIM_SINT8, "sint8"),
    (CIM_UINT8, "uint8"),
    (CIM_SINT16, "sint16"),
    (CIM_UINT16, "uint16"),
    (CIM_SINT32, "sint32"),
    (CIM_UINT32, "uint32"),
    (CIM_SINT64, "sint64"),
    (CIM_UINT64, "uint64"),
    (CIM_REAL32, "real32"),
    (CIM_REAL64, "real64"),
    (CIM_BOOLEAN, "boolean"),
    (CIM_STRING, "string"),
    (CIM_DATETIME, "datetime"),
    (CIM_REFERENCE, "ref"),
    (CIM_CHAR16, "char16"),
    (CIM_OBJECT, "object"),
];

/// Element type of `code`, without the array flag.
pub fn base(code: i32) -> i32 {
    code & !CIM_FLAG_ARRAY
}

/// True when `code` carries the array flag.
pub fn is_array(code: i32) -> bool {
    code & CIM_FLAG_ARRAY != 0
}

/// Schema name of the element type (`uint32`, `ref`, ...); empty when the
/// code is unknown.
pub fn name(code: i32) -> &'static str {
    let base = base(code);
    NAMES
        .iter()
        .find(|(c, _)| *c == base)
        .map_or("", |(_, name)| *name)
}

/// Type code for a schema name. `ref:Class` and `object:Class` map to their
/// base code and a trailing `[]` sets the array flag.
pub fn code(name: &str) -> i32 {
    let (name, array) = match name.strip_suffix("[]") {
        Some(element) => (element, CIM_FLAG_ARRAY),
        None => (name, 0),
    };
    let name = name.split(':').next().unwrap_or(name);
    NAMES
        .iter()
        .find(|(_, n)| n.eq_ignore_ascii_case(name))
        .map_or(CIM_EMPTY, |(c, _)| *c | array)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(name(CIM_UINT32), "uint32");
        assert_eq!(name(CIM_STRING | CIM_FLAG_ARRAY), "string");
        assert_eq!(name(999), "");
        assert!(is_array(CIM_SINT64 | CIM_FLAG_ARRAY));
        assert!(!is_array(CIM_SINT64));
    }

    #[test]
    fn test_codes() {
        assert_eq!(code("uint64"), CIM_UINT64);
        assert_eq!(code("ref:Win32_Process"), CIM_REFERENCE);
        assert_eq!(code("object:__Event"), CIM_OBJECT);
        assert_eq!(code("String[]"), CIM_STRING | CIM_FLAG_ARRAY);
        assert_eq!(code("decimal"), CIM_EMPTY);
    }
}
