// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Provider value model.
//!
//! Every property, qualifier, parameter and method result crossing the
//! provider boundary is a [`Variant`], the analogue of the COM `VARIANT`
//! the scripting layer hands out.

use crate::provider::ObjectHandle;
use std::fmt;
use std::sync::Arc;

/// A value held by a provider property, qualifier or parameter.
#[derive(Clone, Default)]
pub enum Variant {
    /// No value was ever assigned (`VT_EMPTY`).
    #[default]
    Empty,
    /// Explicit null (`VT_NULL`).
    Null,

    // Scalars
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),

    // Composites
    /// Embedded object (instance or class).
    Object(ObjectHandle),
    /// Array-typed property or parameter value.
    Array(Vec<Variant>),
}

impl Variant {
    /// Check if value is null or empty.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::Empty)
    }

    /// Check if value is an array.
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Widen any integer variant to i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::U8(v) => Some(i64::from(*v)),
            Self::U16(v) => Some(i64::from(*v)),
            Self::U32(v) => Some(i64::from(*v)),
            Self::U64(v) => i64::try_from(*v).ok(),
            Self::I8(v) => Some(i64::from(*v)),
            Self::I16(v) => Some(i64::from(*v)),
            Self::I32(v) => Some(i64::from(*v)),
            Self::I64(v) => Some(*v),
            // 64-bit integers travel as strings on the scripting interface
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Widen any unsigned integer variant to u64.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U8(v) => Some(u64::from(*v)),
            Self::U16(v) => Some(u64::from(*v)),
            Self::U32(v) => Some(u64::from(*v)),
            Self::U64(v) => Some(*v),
            Self::String(s) => s.trim().parse().ok(),
            other => other.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    /// Try to get as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F32(v) => Some(f64::from(*v)),
            Self::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get as array.
    pub fn as_array(&self) -> Option<&[Variant]> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get the embedded object.
    pub fn as_object(&self) -> Option<&ObjectHandle> {
        match self {
            Self::Object(v) => Some(v),
            _ => None,
        }
    }

    /// Array contents, with null/empty read as an empty array.
    ///
    /// Scalars are not arrays and yield `None`.
    pub fn into_array(self) -> Option<Vec<Variant>> {
        match self {
            Self::Array(v) => Some(v),
            Self::Null | Self::Empty => Some(Vec::new()),
            _ => None,
        }
    }

    /// Short type label used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::U8(_) => "uint8",
            Self::U16(_) => "uint16",
            Self::U32(_) => "uint32",
            Self::U64(_) => "uint64",
            Self::I8(_) => "sint8",
            Self::I16(_) => "sint16",
            Self::I32(_) => "sint32",
            Self::I64(_) => "sint64",
            Self::F32(_) => "real32",
            Self::F64(_) => "real64",
            Self::String(_) => "string",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
        }
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::U8(a), Self::U8(b)) => a == b,
            (Self::U16(a), Self::U16(b)) => a == b,
            (Self::U32(a), Self::U32(b)) => a == b,
            (Self::U64(a), Self::U64(b)) => a == b,
            (Self::I8(a), Self::I8(b)) => a == b,
            (Self::I16(a), Self::I16(b)) => a == b,
            (Self::I32(a), Self::I32(b)) => a == b,
            (Self::I64(a), Self::I64(b)) => a == b,
            (Self::F32(a), Self::F32(b)) => a == b,
            (Self::F64(a), Self::F64(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            // Same remote handle; value comparison is the provider's job
            (Self::Object(a), Self::Object(b)) => {
                std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Null => write!(f, "Null"),
            Self::Bool(v) => write!(f, "Bool({})", v),
            Self::U8(v) => write!(f, "U8({})", v),
            Self::U16(v) => write!(f, "U16({})", v),
            Self::U32(v) => write!(f, "U32({})", v),
            Self::U64(v) => write!(f, "U64({})", v),
            Self::I8(v) => write!(f, "I8({})", v),
            Self::I16(v) => write!(f, "I16({})", v),
            Self::I32(v) => write!(f, "I32({})", v),
            Self::I64(v) => write!(f, "I64({})", v),
            Self::F32(v) => write!(f, "F32({})", v),
            Self::F64(v) => write!(f, "F64({})", v),
            Self::String(v) => write!(f, "String({:?})", v),
            Self::Array(v) => f.debug_tuple("Array").field(v).finish(),
            Self::Object(obj) => match obj.path() {
                Ok(path) if !path.path.is_empty() => write!(f, "Object({})", path.path),
                Ok(path) => write!(f, "Object(<spawned {}>)", path.class),
                Err(_) => write!(f, "Object(<unavailable>)"),
            },
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty | Self::Null => Ok(()),
            Self::Bool(v) => write!(f, "{}", if *v { "TRUE" } else { "FALSE" }),
            Self::U8(v) => write!(f, "{}", v),
            Self::U16(v) => write!(f, "{}", v),
            Self::U32(v) => write!(f, "{}", v),
            Self::U64(v) => write!(f, "{}", v),
            Self::I8(v) => write!(f, "{}", v),
            Self::I16(v) => write!(f, "{}", v),
            Self::I32(v) => write!(f, "{}", v),
            Self::I64(v) => write!(f, "{}", v),
            Self::F32(v) => write!(f, "{}", v),
            Self::F64(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
            Self::Array(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
            Self::Object(obj) => match obj.path() {
                Ok(path) => write!(f, "{}", path.path),
                Err(_) => Ok(()),
            },
        }
    }
}

// Conversion traits
macro_rules! impl_from_scalar {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Variant {
            fn from(v: $ty) -> Self {
                Self::$variant(v)
            }
        }
    };
}

impl_from_scalar!(bool, Bool);
impl_from_scalar!(u8, U8);
impl_from_scalar!(u16, U16);
impl_from_scalar!(u32, U32);
impl_from_scalar!(u64, U64);
impl_from_scalar!(i8, I8);
impl_from_scalar!(i16, I16);
impl_from_scalar!(i32, I32);
impl_from_scalar!(i64, I64);
impl_from_scalar!(f32, F32);
impl_from_scalar!(f64, F64);
impl_from_scalar!(String, String);
impl_from_scalar!(ObjectHandle, Object);

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl<T: Into<Variant>> From<Vec<T>> for Variant {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Variant>> From<Option<T>> for Variant {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_values() {
        let v = Variant::from(42u32);
        assert_eq!(v.as_i64(), Some(42));
        assert_eq!(v.as_u64(), Some(42));
        assert_eq!(v.as_str(), None);

        let v = Variant::from("hello");
        assert_eq!(v.as_str(), Some("hello"));

        // uint64 arrives as a decimal string
        let v = Variant::from("18446744073709551615");
        assert_eq!(v.as_u64(), Some(u64::MAX));
    }

    #[test]
    fn test_into_array_reads_null_as_empty() {
        assert_eq!(Variant::Null.into_array(), Some(Vec::new()));
        assert_eq!(
            Variant::from(vec![1u32, 2]).into_array(),
            Some(vec![Variant::U32(1), Variant::U32(2)])
        );
        assert_eq!(Variant::from(7u8).into_array(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Variant::from(vec!["a", "b"]).to_string(), "{a, b}");
        assert_eq!(Variant::Bool(true).to_string(), "TRUE");
        assert_eq!(Variant::Null.to_string(), "");
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Variant::from(None::<u32>), Variant::Null);
        assert_eq!(Variant::from(Some(3i16)), Variant::I16(3));
    }
}
