// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Owned COM pointers, BSTRs and VARIANTs, and the `VARIANT` <-> [`Variant`]
//! mapping.
//!
//! Automation types follow the management service's rules: 64-bit integers
//! travel as strings, `uint16`/`uint32` as `VT_I4` and `sint8` as `VT_I2`.
//! [`typed`] restores the declared CIM type on the way in.

use super::ffi::{
    IEnumWbemClassObject, IEnumWbemClassObjectVtbl, IUnknown, IUnknownVtbl, IWbemClassObject,
    IWbemClassObjectVtbl, IWbemLocator, IWbemLocatorVtbl, IWbemQualifierSet,
    IWbemQualifierSetVtbl, IWbemServices, IWbemServicesVtbl, Interface, IID_IWBEM_CLASS_OBJECT,
};
use super::{ComObject, Session};
use crate::provider::cim::{
    self, CIM_BOOLEAN, CIM_CHAR16, CIM_DATETIME, CIM_OBJECT, CIM_REAL32, CIM_REAL64,
    CIM_REFERENCE, CIM_SINT16, CIM_SINT32, CIM_SINT64, CIM_SINT8, CIM_STRING, CIM_UINT16,
    CIM_UINT32, CIM_UINT64, CIM_UINT8,
};
use crate::provider::{status_text, ProviderError, ProviderResult, WBEM_E_TYPE_MISMATCH};
use crate::value::Variant;
use std::ffi::c_void;
use std::ptr::{self, NonNull};
use std::sync::Arc;
use windows_sys::core::{BSTR, HRESULT};
use windows_sys::Win32::Foundation::{SysAllocStringLen, SysFreeString, SysStringLen};
use windows_sys::Win32::System::Com::SAFEARRAY;
use windows_sys::Win32::System::Ole::{
    SafeArrayCreateVector, SafeArrayDestroy, SafeArrayGetElement, SafeArrayGetLBound,
    SafeArrayGetUBound, SafeArrayPutElement,
};
use windows_sys::Win32::System::Variant::{
    VariantClear, VARENUM, VARIANT, VT_ARRAY, VT_BOOL, VT_BSTR, VT_DISPATCH, VT_EMPTY, VT_I1,
    VT_I2, VT_I4, VT_I8, VT_INT, VT_NULL, VT_R4, VT_R8, VT_UI1, VT_UI2, VT_UI4, VT_UI8, VT_UINT,
    VT_UNKNOWN, VT_VARIANT,
};

// =======================================================================
// Status
// =======================================================================

/// Provider error for a failed call made on behalf of `source`.
pub(super) fn failure(hr: HRESULT, source: &str) -> ProviderError {
    let code = hr as u32;
    ProviderError::wbem(code, source, status_text(code))
}

/// Pass success codes through, turn failures into [`ProviderError`]s.
pub(super) fn check(hr: HRESULT, source: &str) -> ProviderResult<HRESULT> {
    if hr < 0 {
        Err(failure(hr, source))
    } else {
        Ok(hr)
    }
}

// =======================================================================
// Interface pointers
// =======================================================================

/// Counted reference to a COM interface.
pub(super) struct ComPtr<T: Interface> {
    ptr: NonNull<T>,
}

// Every interface is created in the multithreaded apartment, where proxies
// may be called from any thread.
unsafe impl<T: Interface> Send for ComPtr<T> {}
unsafe impl<T: Interface> Sync for ComPtr<T> {}

impl<T: Interface> ComPtr<T> {
    /// Adopt a pointer that already carries one reference. Null gives `None`.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live interface pointer of type `T`.
    pub(super) unsafe fn from_raw(ptr: *mut T) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| ComPtr { ptr })
    }

    pub(super) fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    pub(super) fn as_unknown(&self) -> *mut IUnknown {
        self.ptr.as_ptr().cast()
    }

    /// Hand the reference to a `VARIANT`, which releases it on clear.
    pub(super) fn into_raw(self) -> *mut T {
        let raw = self.as_ptr();
        std::mem::forget(self);
        raw
    }

    fn unknown_call<R>(&self, call: impl FnOnce(&IUnknownVtbl, *mut IUnknown) -> R) -> R {
        let unknown = self.as_unknown();
        // SAFETY: `Interface` guarantees an IUnknown-prefixed vtable.
        unsafe { call(&*(*unknown).lpVtbl, unknown) }
    }
}

impl<T: Interface> Clone for ComPtr<T> {
    fn clone(&self) -> Self {
        // SAFETY: the pointer is live while `self` holds its reference.
        self.unknown_call(|vtbl, this| unsafe { (vtbl.AddRef)(this) });
        ComPtr { ptr: self.ptr }
    }
}

impl<T: Interface> Drop for ComPtr<T> {
    fn drop(&mut self) {
        // SAFETY: releases the reference adopted or taken by this handle.
        self.unknown_call(|vtbl, this| unsafe { (vtbl.Release)(this) });
    }
}

macro_rules! vtable {
    ($interface:ty, $vtbl:ty) => {
        impl ComPtr<$interface> {
            pub(super) fn vtbl(&self) -> &$vtbl {
                // SAFETY: a live interface always points at its vtable.
                unsafe { &*(*self.as_ptr()).lpVtbl }
            }
        }
    };
}

vtable!(IWbemLocator, IWbemLocatorVtbl);
vtable!(IWbemServices, IWbemServicesVtbl);
vtable!(IEnumWbemClassObject, IEnumWbemClassObjectVtbl);
vtable!(IWbemClassObject, IWbemClassObjectVtbl);
vtable!(IWbemQualifierSet, IWbemQualifierSetVtbl);

/// `QueryInterface` a borrowed unknown for `IWbemClassObject`.
unsafe fn class_object(unknown: *mut c_void) -> Option<ComPtr<IWbemClassObject>> {
    let unknown = unknown.cast::<IUnknown>();
    if unknown.is_null() {
        return None;
    }
    let mut object = ptr::null_mut::<c_void>();
    let hr = ((*(*unknown).lpVtbl).QueryInterface)(unknown, &IID_IWBEM_CLASS_OBJECT, &mut object);
    if hr < 0 {
        return None;
    }
    ComPtr::from_raw(object.cast::<IWbemClassObject>())
}

// =======================================================================
// Strings
// =======================================================================

/// Owned `BSTR`.
pub(super) struct Bstr(BSTR);

impl Bstr {
    pub(super) fn new(text: &str) -> Self {
        let wide: Vec<u16> = text.encode_utf16().collect();
        // SAFETY: the buffer holds `wide.len()` code units.
        Bstr(unsafe { SysAllocStringLen(wide.as_ptr(), wide.len() as u32) })
    }

    /// Null for empty text, which the service reads as "use the default".
    pub(super) fn optional(text: &str) -> Self {
        if text.is_empty() {
            Bstr(ptr::null())
        } else {
            Self::new(text)
        }
    }

    pub(super) fn as_raw(&self) -> BSTR {
        self.0
    }

    /// Hand the allocation to a `VARIANT`, which frees it on clear.
    fn into_raw(self) -> BSTR {
        let raw = self.0;
        std::mem::forget(self);
        raw
    }
}

impl Drop for Bstr {
    fn drop(&mut self) {
        if !self.0.is_null() {
            // SAFETY: allocated by SysAllocStringLen and never handed out.
            unsafe { SysFreeString(self.0) };
        }
    }
}

/// Copy a borrowed `BSTR`.
unsafe fn bstr_to_string(text: BSTR) -> String {
    if text.is_null() {
        return String::new();
    }
    let units = std::slice::from_raw_parts(text, SysStringLen(text) as usize);
    String::from_utf16_lossy(units)
}

/// Copy and free a `BSTR` returned to the caller.
pub(super) unsafe fn take_bstr(text: BSTR) -> String {
    let copy = bstr_to_string(text);
    if !text.is_null() {
        SysFreeString(text);
    }
    copy
}

/// Nul-terminated UTF-16 for `LPCWSTR` parameters.
pub(super) fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

// =======================================================================
// VARIANT
// =======================================================================

/// `VARIANT` cleared on drop.
pub(super) struct OwnedVariant(VARIANT);

impl OwnedVariant {
    pub(super) fn empty() -> Self {
        // SAFETY: all-zero is VT_EMPTY.
        OwnedVariant(unsafe { std::mem::zeroed() })
    }

    pub(super) fn as_ptr(&self) -> *const VARIANT {
        &self.0
    }

    pub(super) fn as_mut_ptr(&mut self) -> *mut VARIANT {
        &mut self.0
    }

    fn set_vt(&mut self, vt: VARENUM) {
        // SAFETY: plain field write inside the VARIANT union.
        unsafe { self.0.Anonymous.Anonymous.vt = vt };
    }
}

impl Drop for OwnedVariant {
    fn drop(&mut self) {
        // SAFETY: the VARIANT is either zeroed or filled by this module or
        // the service.
        unsafe { VariantClear(&mut self.0) };
    }
}

/// Read a `VARIANT` the service filled in. Embedded objects are bound to
/// `session`.
pub(super) fn from_variant(value: &OwnedVariant, session: &Arc<Session>) -> ProviderResult<Variant> {
    // SAFETY: `vt` selects the union member read below.
    unsafe { read_variant(&value.0, session) }
}

unsafe fn read_variant(value: &VARIANT, session: &Arc<Session>) -> ProviderResult<Variant> {
    let vt = value.Anonymous.Anonymous.vt;
    let data = &value.Anonymous.Anonymous.Anonymous;
    if vt & VT_ARRAY != 0 {
        return read_array(data.parray, vt & !VT_ARRAY, session);
    }
    let decoded = match vt {
        VT_EMPTY => Variant::Empty,
        VT_NULL => Variant::Null,
        VT_BOOL => Variant::Bool(data.boolVal != 0),
        VT_I1 => Variant::I8(data.cVal as i8),
        VT_UI1 => Variant::U8(data.bVal),
        VT_I2 => Variant::I16(data.iVal),
        VT_UI2 => Variant::U16(data.uiVal),
        VT_I4 => Variant::I32(data.lVal),
        VT_INT => Variant::I32(data.intVal),
        VT_UI4 => Variant::U32(data.ulVal),
        VT_UINT => Variant::U32(data.uintVal),
        VT_I8 => Variant::I64(data.llVal),
        VT_UI8 => Variant::U64(data.ullVal),
        VT_R4 => Variant::F32(data.fltVal),
        VT_R8 => Variant::F64(data.dblVal),
        VT_BSTR => Variant::String(bstr_to_string(data.bstrVal)),
        VT_UNKNOWN | VT_DISPATCH => {
            let unknown = if vt == VT_UNKNOWN { data.punkVal } else { data.pdispVal };
            match class_object(unknown) {
                Some(object) => Variant::Object(ComObject::handle(object, session.clone())),
                None => Variant::Null,
            }
        }
        other => {
            log::debug!("[dynwmi::com] unsupported VARIANT type {:#06x}", other);
            Variant::Null
        }
    };
    Ok(decoded)
}

unsafe fn read_array(
    array: *mut SAFEARRAY,
    element: VARENUM,
    session: &Arc<Session>,
) -> ProviderResult<Variant> {
    if array.is_null() {
        return Ok(Variant::Array(Vec::new()));
    }
    let (mut lower, mut upper) = (0i32, -1i32);
    check(SafeArrayGetLBound(array, 1, &mut lower), "SAFEARRAY")?;
    check(SafeArrayGetUBound(array, 1, &mut upper), "SAFEARRAY")?;

    let mut items = Vec::with_capacity(usize::try_from(upper - lower + 1).unwrap_or(0));
    for index in lower..=upper {
        let mut slot = OwnedVariant::empty();
        if element == VT_VARIANT {
            check(
                SafeArrayGetElement(array, &index, slot.as_mut_ptr().cast()),
                "SAFEARRAY",
            )?;
        } else {
            // Scalars, BSTRs and interface pointers land in the data union,
            // which then owns them.
            let data = ptr::addr_of_mut!(slot.0.Anonymous.Anonymous.Anonymous).cast::<c_void>();
            check(SafeArrayGetElement(array, &index, data), "SAFEARRAY")?;
            slot.set_vt(element);
        }
        items.push(read_variant(&slot.0, session)?);
    }
    Ok(Variant::Array(items))
}

/// Copy and destroy a `SAFEARRAY` of `BSTR` returned to the caller.
pub(super) unsafe fn take_string_array(array: *mut SAFEARRAY) -> ProviderResult<Vec<String>> {
    if array.is_null() {
        return Ok(Vec::new());
    }
    let (mut lower, mut upper) = (0i32, -1i32);
    let bounds = check(SafeArrayGetLBound(array, 1, &mut lower), "SAFEARRAY")
        .and_then(|_| check(SafeArrayGetUBound(array, 1, &mut upper), "SAFEARRAY"));
    let mut names = Vec::new();
    if bounds.is_ok() {
        for index in lower..=upper {
            let mut text: BSTR = ptr::null();
            if SafeArrayGetElement(array, &index, (&mut text as *mut BSTR).cast()) >= 0 {
                names.push(take_bstr(text));
            }
        }
    }
    SafeArrayDestroy(array);
    bounds.map(|_| names)
}

/// Restore the declared CIM type of a value read through automation.
pub(super) fn typed(value: Variant, cim_type: i32) -> Variant {
    let base = cim::base(cim_type);
    match value {
        Variant::Array(items) => {
            Variant::Array(items.into_iter().map(|item| typed(item, base)).collect())
        }
        Variant::Empty | Variant::Null | Variant::Object(_) => value,
        scalar => {
            let converted = match base {
                CIM_UINT8 => scalar.as_i64().and_then(|n| u8::try_from(n).ok()).map(Variant::U8),
                CIM_SINT8 => scalar.as_i64().and_then(|n| i8::try_from(n).ok()).map(Variant::I8),
                CIM_UINT16 | CIM_CHAR16 => {
                    scalar.as_i64().and_then(|n| u16::try_from(n).ok()).map(Variant::U16)
                }
                CIM_SINT16 => scalar.as_i64().and_then(|n| i16::try_from(n).ok()).map(Variant::I16),
                CIM_UINT32 => match scalar {
                    // Carried in VT_I4 with the sign bit reinterpreted
                    Variant::I32(n) => Some(Variant::U32(n as u32)),
                    ref other => other.as_u64().and_then(|n| u32::try_from(n).ok()).map(Variant::U32),
                },
                CIM_SINT32 => scalar.as_i64().and_then(|n| i32::try_from(n).ok()).map(Variant::I32),
                CIM_UINT64 => scalar.as_u64().map(Variant::U64),
                CIM_SINT64 => scalar.as_i64().map(Variant::I64),
                _ => None,
            };
            converted.unwrap_or(scalar)
        }
    }
}

/// Automation type the service expects for a CIM type. Untyped values
/// (`cim_type` 0) are placed by their own kind.
fn automation_type(cim_type: i32, sample: Option<&Variant>) -> VARENUM {
    match cim::base(cim_type) {
        CIM_SINT8 | CIM_SINT16 | CIM_CHAR16 => VT_I2,
        CIM_UINT8 => VT_UI1,
        CIM_UINT16 | CIM_SINT32 | CIM_UINT32 => VT_I4,
        CIM_SINT64 | CIM_UINT64 | CIM_STRING | CIM_DATETIME | CIM_REFERENCE => VT_BSTR,
        CIM_REAL32 => VT_R4,
        CIM_REAL64 => VT_R8,
        CIM_BOOLEAN => VT_BOOL,
        CIM_OBJECT => VT_UNKNOWN,
        _ => match sample {
            Some(Variant::Bool(_)) => VT_BOOL,
            Some(Variant::U8(_)) => VT_UI1,
            Some(Variant::I8(_) | Variant::I16(_)) => VT_I2,
            Some(Variant::U16(_) | Variant::I32(_) | Variant::U32(_)) => VT_I4,
            Some(Variant::F32(_)) => VT_R4,
            Some(Variant::F64(_)) => VT_R8,
            Some(Variant::Object(_)) => VT_UNKNOWN,
            _ => VT_BSTR,
        },
    }
}

fn mismatch(value: &Variant, vt: VARENUM) -> ProviderError {
    ProviderError::wbem(
        WBEM_E_TYPE_MISMATCH,
        "SWbemProperty",
        format!("{} value cannot be stored as VARIANT type {:#06x}", value.type_name(), vt),
    )
}

/// Build the `VARIANT` for storing `value` into a property or parameter of
/// `cim_type`.
pub(super) fn to_variant(value: &Variant, cim_type: i32) -> ProviderResult<OwnedVariant> {
    let mut out = OwnedVariant::empty();
    match value {
        Variant::Empty | Variant::Null => out.set_vt(VT_NULL),
        Variant::Array(items) => {
            let element = automation_type(cim_type, items.first());
            // SAFETY: one-dimensional vector, filled element by element below
            // and owned by `out` from then on.
            unsafe {
                let array = SafeArrayCreateVector(element, 0, items.len() as u32);
                if array.is_null() {
                    return Err(mismatch(value, element | VT_ARRAY));
                }
                out.0.Anonymous.Anonymous.Anonymous.parray = array;
                out.set_vt(element | VT_ARRAY);
                for (index, item) in items.iter().enumerate() {
                    let slot = scalar_variant(item, element)?;
                    let data = &slot.0.Anonymous.Anonymous.Anonymous;
                    let source: *const c_void = match element {
                        VT_BSTR => data.bstrVal.cast(),
                        VT_UNKNOWN => data.punkVal.cast_const(),
                        _ => (data as *const _).cast(),
                    };
                    check(SafeArrayPutElement(array, &(index as i32), source), "SAFEARRAY")?;
                }
            }
        }
        scalar => return scalar_variant(scalar, automation_type(cim_type, Some(scalar))),
    }
    Ok(out)
}

fn scalar_variant(value: &Variant, vt: VARENUM) -> ProviderResult<OwnedVariant> {
    let mut out = OwnedVariant::empty();
    if value.is_null() {
        out.set_vt(VT_NULL);
        return Ok(out);
    }
    let integer = |min: i64, max: i64| {
        value
            .as_i64()
            .filter(|n| (min..=max).contains(n))
            .ok_or_else(|| mismatch(value, vt))
    };
    // SAFETY: each arm writes the union member matching the `vt` set after.
    unsafe {
        let data = &mut out.0.Anonymous.Anonymous.Anonymous;
        match vt {
            VT_BOOL => {
                let flag = value.as_bool().ok_or_else(|| mismatch(value, vt))?;
                data.boolVal = if flag { -1 } else { 0 };
            }
            VT_UI1 => data.bVal = integer(0, i64::from(u8::MAX))? as u8,
            VT_I2 => data.iVal = integer(i64::from(i16::MIN), i64::from(i16::MAX))? as i16,
            // uint32 values above i32::MAX keep their bit pattern
            VT_I4 => data.lVal = integer(i64::from(i32::MIN), i64::from(u32::MAX))? as i32,
            VT_R4 => data.fltVal = value.as_f64().ok_or_else(|| mismatch(value, vt))? as f32,
            VT_R8 => data.dblVal = value.as_f64().ok_or_else(|| mismatch(value, vt))?,
            VT_BSTR => {
                let text = match value {
                    Variant::String(text) => text.clone(),
                    Variant::Object(_) | Variant::Array(_) => return Err(mismatch(value, vt)),
                    other => other.to_string(),
                };
                data.bstrVal = Bstr::new(&text).into_raw();
            }
            VT_UNKNOWN => {
                let object = value
                    .as_object()
                    .and_then(|handle| handle.as_any().downcast_ref::<ComObject>())
                    .ok_or_else(|| mismatch(value, vt))?;
                data.punkVal = object.raw().clone().into_raw().cast();
            }
            _ => return Err(mismatch(value, vt)),
        }
    }
    out.set_vt(vt);
    Ok(out)
}
