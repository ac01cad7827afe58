// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Raw WMI interfaces (`wbemcli.h`).
//!
//! `windows-sys` does not carry the WMI COM interfaces, so the vtables are
//! declared here in header order. Slots the provider never calls are typed
//! as plain pointers to keep the layout without spelling out signatures.

#![allow(non_snake_case)]

use std::ffi::c_void;
use windows_sys::core::{BSTR, GUID, HRESULT, PCWSTR};
use windows_sys::Win32::System::Com::SAFEARRAY;
use windows_sys::Win32::System::Variant::VARIANT;

pub type CIMTYPE = i32;

/// `CLSID_WbemLocator`
pub const CLSID_WBEM_LOCATOR: GUID = GUID::from_u128(0x4590f811_1d3a_11d0_891f_00aa004b2e24);
/// `IID_IWbemLocator`
pub const IID_IWBEM_LOCATOR: GUID = GUID::from_u128(0xdc12a687_737f_11cf_884d_00aa004b2e24);
/// `IID_IWbemClassObject`
pub const IID_IWBEM_CLASS_OBJECT: GUID = GUID::from_u128(0xdc12a681_737f_11cf_884d_00aa004b2e24);

pub const WBEM_S_NO_ERROR: HRESULT = 0;
pub const WBEM_S_FALSE: HRESULT = 1;
/// `IWbemClassObject::CompareTo`: objects differ.
pub const WBEM_S_DIFFERENT: HRESULT = 0x0004_0003;
/// `IEnumWbemClassObject::Next` ran out of time before an object arrived.
pub const WBEM_S_TIMEDOUT: HRESULT = 0x0004_0004;
pub const WBEM_S_NO_MORE_DATA: HRESULT = 0x0004_0005;

pub const WBEM_INFINITE: i32 = -1;
pub const WBEM_FLAG_RETURN_WBEM_COMPLETE: i32 = 0;
pub const WBEM_FLAG_RETURN_IMMEDIATELY: i32 = 0x10;
pub const WBEM_FLAG_FORWARD_ONLY: i32 = 0x20;
pub const WBEM_FLAG_DEEP: i32 = 0;
pub const WBEM_FLAG_NONSYSTEM_ONLY: i32 = 0x40;
pub const WBEM_FLAG_CREATE_OR_UPDATE: i32 = 0;
pub const WBEM_COMPARISON_INCLUDE_ALL: i32 = 0;

/// `GetPropertyQualifierSet` on a `__` property.
pub const WBEM_E_SYSTEM_PROPERTY: u32 = 0x8004_1030;

/// The thread already joined a single-threaded apartment.
pub const RPC_E_CHANGED_MODE: HRESULT = 0x8001_0106_u32 as HRESULT;
/// Process security was set before the first `CoInitializeSecurity`.
pub const RPC_E_TOO_LATE: HRESULT = 0x8001_0119_u32 as HRESULT;

/// Let COM pick the authentication service.
pub const RPC_C_AUTHN_DEFAULT: u32 = u32::MAX;
pub const RPC_C_AUTHZ_NONE: u32 = 0;

/// `__GENUS` of a class definition.
pub const WBEM_GENUS_CLASS: i32 = 1;

/// `COAUTHIDENTITY` (`SEC_WINNT_AUTH_IDENTITY_W`).
#[repr(C)]
pub struct CoAuthIdentity {
    pub User: *mut u16,
    pub UserLength: u32,
    pub Domain: *mut u16,
    pub DomainLength: u32,
    pub Password: *mut u16,
    pub PasswordLength: u32,
    pub Flags: u32,
}

/// `SEC_WINNT_AUTH_IDENTITY_UNICODE`
pub const SEC_WINNT_AUTH_IDENTITY_UNICODE: u32 = 2;

// -----------------------------------------------------------------------
// IUnknown
// -----------------------------------------------------------------------

#[repr(C)]
pub struct IUnknownVtbl {
    pub QueryInterface:
        unsafe extern "system" fn(this: *mut IUnknown, riid: *const GUID, ppv: *mut *mut c_void) -> HRESULT,
    pub AddRef: unsafe extern "system" fn(this: *mut IUnknown) -> u32,
    pub Release: unsafe extern "system" fn(this: *mut IUnknown) -> u32,
}

#[repr(C)]
pub struct IUnknown {
    pub lpVtbl: *const IUnknownVtbl,
}

/// Opaque `IWbemContext`; always passed as null.
#[repr(C)]
pub struct IWbemContext {
    _private: [u8; 0],
}

/// Opaque `IWbemCallResult`; always passed as null.
#[repr(C)]
pub struct IWbemCallResult {
    _private: [u8; 0],
}

// -----------------------------------------------------------------------
// IWbemLocator
// -----------------------------------------------------------------------

#[repr(C)]
pub struct IWbemLocatorVtbl {
    pub base: IUnknownVtbl,
    pub ConnectServer: unsafe extern "system" fn(
        this: *mut IWbemLocator,
        strNetworkResource: BSTR,
        strUser: BSTR,
        strPassword: BSTR,
        strLocale: BSTR,
        lSecurityFlags: i32,
        strAuthority: BSTR,
        pCtx: *mut IWbemContext,
        ppNamespace: *mut *mut IWbemServices,
    ) -> HRESULT,
}

#[repr(C)]
pub struct IWbemLocator {
    pub lpVtbl: *const IWbemLocatorVtbl,
}

// -----------------------------------------------------------------------
// IWbemServices
// -----------------------------------------------------------------------

#[repr(C)]
pub struct IWbemServicesVtbl {
    pub base: IUnknownVtbl,
    pub OpenNamespace: *const c_void,
    pub CancelAsyncCall: *const c_void,
    pub QueryObjectSink: *const c_void,
    pub GetObject: unsafe extern "system" fn(
        this: *mut IWbemServices,
        strObjectPath: BSTR,
        lFlags: i32,
        pCtx: *mut IWbemContext,
        ppObject: *mut *mut IWbemClassObject,
        ppCallResult: *mut *mut IWbemCallResult,
    ) -> HRESULT,
    pub GetObjectAsync: *const c_void,
    pub PutClass: *const c_void,
    pub PutClassAsync: *const c_void,
    pub DeleteClass: *const c_void,
    pub DeleteClassAsync: *const c_void,
    pub CreateClassEnum: unsafe extern "system" fn(
        this: *mut IWbemServices,
        strSuperclass: BSTR,
        lFlags: i32,
        pCtx: *mut IWbemContext,
        ppEnum: *mut *mut IEnumWbemClassObject,
    ) -> HRESULT,
    pub CreateClassEnumAsync: *const c_void,
    pub PutInstance: unsafe extern "system" fn(
        this: *mut IWbemServices,
        pInst: *mut IWbemClassObject,
        lFlags: i32,
        pCtx: *mut IWbemContext,
        ppCallResult: *mut *mut IWbemCallResult,
    ) -> HRESULT,
    pub PutInstanceAsync: *const c_void,
    pub DeleteInstance: *const c_void,
    pub DeleteInstanceAsync: *const c_void,
    pub CreateInstanceEnum: unsafe extern "system" fn(
        this: *mut IWbemServices,
        strFilter: BSTR,
        lFlags: i32,
        pCtx: *mut IWbemContext,
        ppEnum: *mut *mut IEnumWbemClassObject,
    ) -> HRESULT,
    pub CreateInstanceEnumAsync: *const c_void,
    pub ExecQuery: unsafe extern "system" fn(
        this: *mut IWbemServices,
        strQueryLanguage: BSTR,
        strQuery: BSTR,
        lFlags: i32,
        pCtx: *mut IWbemContext,
        ppEnum: *mut *mut IEnumWbemClassObject,
    ) -> HRESULT,
    pub ExecQueryAsync: *const c_void,
    pub ExecNotificationQuery: unsafe extern "system" fn(
        this: *mut IWbemServices,
        strQueryLanguage: BSTR,
        strQuery: BSTR,
        lFlags: i32,
        pCtx: *mut IWbemContext,
        ppEnum: *mut *mut IEnumWbemClassObject,
    ) -> HRESULT,
    pub ExecNotificationQueryAsync: *const c_void,
    pub ExecMethod: unsafe extern "system" fn(
        this: *mut IWbemServices,
        strObjectPath: BSTR,
        strMethodName: BSTR,
        lFlags: i32,
        pCtx: *mut IWbemContext,
        pInParams: *mut IWbemClassObject,
        ppOutParams: *mut *mut IWbemClassObject,
        ppCallResult: *mut *mut IWbemCallResult,
    ) -> HRESULT,
    pub ExecMethodAsync: *const c_void,
}

#[repr(C)]
pub struct IWbemServices {
    pub lpVtbl: *const IWbemServicesVtbl,
}

// -----------------------------------------------------------------------
// IEnumWbemClassObject
// -----------------------------------------------------------------------

#[repr(C)]
pub struct IEnumWbemClassObjectVtbl {
    pub base: IUnknownVtbl,
    pub Reset: *const c_void,
    pub Next: unsafe extern "system" fn(
        this: *mut IEnumWbemClassObject,
        lTimeout: i32,
        uCount: u32,
        apObjects: *mut *mut IWbemClassObject,
        puReturned: *mut u32,
    ) -> HRESULT,
    pub NextAsync: *const c_void,
    pub Clone: *const c_void,
    pub Skip: *const c_void,
}

#[repr(C)]
pub struct IEnumWbemClassObject {
    pub lpVtbl: *const IEnumWbemClassObjectVtbl,
}

// -----------------------------------------------------------------------
// IWbemClassObject
// -----------------------------------------------------------------------

#[repr(C)]
pub struct IWbemClassObjectVtbl {
    pub base: IUnknownVtbl,
    pub GetQualifierSet: unsafe extern "system" fn(
        this: *mut IWbemClassObject,
        ppQualSet: *mut *mut IWbemQualifierSet,
    ) -> HRESULT,
    pub Get: unsafe extern "system" fn(
        this: *mut IWbemClassObject,
        wszName: PCWSTR,
        lFlags: i32,
        pVal: *mut VARIANT,
        pType: *mut CIMTYPE,
        plFlavor: *mut i32,
    ) -> HRESULT,
    pub Put: unsafe extern "system" fn(
        this: *mut IWbemClassObject,
        wszName: PCWSTR,
        lFlags: i32,
        pVal: *const VARIANT,
        Type: CIMTYPE,
    ) -> HRESULT,
    pub Delete: *const c_void,
    pub GetNames: unsafe extern "system" fn(
        this: *mut IWbemClassObject,
        wszQualifierName: PCWSTR,
        lFlags: i32,
        pQualifierVal: *const VARIANT,
        pNames: *mut *mut SAFEARRAY,
    ) -> HRESULT,
    pub BeginEnumeration: *const c_void,
    pub Next: *const c_void,
    pub EndEnumeration: *const c_void,
    pub GetPropertyQualifierSet: unsafe extern "system" fn(
        this: *mut IWbemClassObject,
        wszProperty: PCWSTR,
        ppQualSet: *mut *mut IWbemQualifierSet,
    ) -> HRESULT,
    pub Clone: *const c_void,
    pub GetObjectText: unsafe extern "system" fn(
        this: *mut IWbemClassObject,
        lFlags: i32,
        pstrObjectText: *mut BSTR,
    ) -> HRESULT,
    pub SpawnDerivedClass: *const c_void,
    pub SpawnInstance: unsafe extern "system" fn(
        this: *mut IWbemClassObject,
        lFlags: i32,
        ppNewInstance: *mut *mut IWbemClassObject,
    ) -> HRESULT,
    pub CompareTo: unsafe extern "system" fn(
        this: *mut IWbemClassObject,
        lFlags: i32,
        pCompareTo: *mut IWbemClassObject,
    ) -> HRESULT,
    pub GetPropertyOrigin: *const c_void,
    pub InheritsFrom: *const c_void,
    pub GetMethod: unsafe extern "system" fn(
        this: *mut IWbemClassObject,
        wszName: PCWSTR,
        lFlags: i32,
        ppInSignature: *mut *mut IWbemClassObject,
        ppOutSignature: *mut *mut IWbemClassObject,
    ) -> HRESULT,
    pub PutMethod: *const c_void,
    pub DeleteMethod: *const c_void,
    pub BeginMethodEnumeration:
        unsafe extern "system" fn(this: *mut IWbemClassObject, lEnumFlags: i32) -> HRESULT,
    pub NextMethod: unsafe extern "system" fn(
        this: *mut IWbemClassObject,
        lFlags: i32,
        pstrName: *mut BSTR,
        ppInSignature: *mut *mut IWbemClassObject,
        ppOutSignature: *mut *mut IWbemClassObject,
    ) -> HRESULT,
    pub EndMethodEnumeration: unsafe extern "system" fn(this: *mut IWbemClassObject) -> HRESULT,
    pub GetMethodQualifierSet: unsafe extern "system" fn(
        this: *mut IWbemClassObject,
        wszMethod: PCWSTR,
        ppQualSet: *mut *mut IWbemQualifierSet,
    ) -> HRESULT,
    pub GetMethodOrigin: *const c_void,
}

#[repr(C)]
pub struct IWbemClassObject {
    pub lpVtbl: *const IWbemClassObjectVtbl,
}

// -----------------------------------------------------------------------
// IWbemQualifierSet
// -----------------------------------------------------------------------

#[repr(C)]
pub struct IWbemQualifierSetVtbl {
    pub base: IUnknownVtbl,
    pub Get: *const c_void,
    pub Put: *const c_void,
    pub Delete: *const c_void,
    pub GetNames: *const c_void,
    pub BeginEnumeration:
        unsafe extern "system" fn(this: *mut IWbemQualifierSet, lFlags: i32) -> HRESULT,
    pub Next: unsafe extern "system" fn(
        this: *mut IWbemQualifierSet,
        lFlags: i32,
        pstrName: *mut BSTR,
        pVal: *mut VARIANT,
        plFlavor: *mut i32,
    ) -> HRESULT,
    pub EndEnumeration: unsafe extern "system" fn(this: *mut IWbemQualifierSet) -> HRESULT,
}

#[repr(C)]
pub struct IWbemQualifierSet {
    pub lpVtbl: *const IWbemQualifierSetVtbl,
}

/// Interfaces whose vtable starts with the `IUnknown` slots.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` structs whose first field points to a
/// vtable beginning with [`IUnknownVtbl`].
pub unsafe trait Interface {}

unsafe impl Interface for IUnknown {}
unsafe impl Interface for IWbemLocator {}
unsafe impl Interface for IWbemServices {}
unsafe impl Interface for IEnumWbemClassObject {}
unsafe impl Interface for IWbemClassObject {}
unsafe impl Interface for IWbemQualifierSet {}
