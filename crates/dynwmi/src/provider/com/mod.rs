// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! COM provider.
//!
//! Implements the provider traits over the management service's native
//! interfaces: [`ComLocator`] wraps `IWbemLocator`, [`ComServices`] wraps
//! one `IWbemServices` namespace connection and [`ComObject`] wraps an
//! `IWbemClassObject`. What the scripting layer adds on top of those
//! interfaces is rebuilt here. Monikers are parsed locally, privileges
//! named in a moniker are enabled on the process token, associators and
//! references run as `ASSOCIATORS OF`/`REFERENCES OF` queries, and failures
//! carry the nested status of a dispatch exception.
//!
//! [`ComLocator::new`] joins the multithreaded apartment. Threads that never
//! initialize COM use that apartment implicitly while it exists, so event
//! sources can be polled from worker threads.
//!
//! ```rust,no_run
//! use dynwmi::provider::com::ComLocator;
//! use dynwmi::{connect, ConnectionOptions};
//! use std::sync::Arc;
//!
//! # fn main() -> dynwmi::Result<()> {
//! let ns = connect(Arc::new(ComLocator::new()?), &ConnectionOptions::new())?
//!     .into_namespace()
//!     .expect("a namespace moniker");
//! for process in ns.class("Process")?.query(&["Name"], &[])? {
//!     println!("{}", process.property("Name")?);
//! }
//! # Ok(())
//! # }
//! ```

mod ffi;
mod interop;

use self::ffi::{
    CoAuthIdentity, IEnumWbemClassObject, IWbemClassObject, IWbemLocator, IWbemQualifierSet,
    Interface, CIMTYPE, CLSID_WBEM_LOCATOR, IID_IWBEM_LOCATOR, RPC_C_AUTHN_DEFAULT,
    RPC_C_AUTHZ_NONE, RPC_E_CHANGED_MODE, RPC_E_TOO_LATE, SEC_WINNT_AUTH_IDENTITY_UNICODE,
    WBEM_COMPARISON_INCLUDE_ALL, WBEM_E_SYSTEM_PROPERTY, WBEM_FLAG_CREATE_OR_UPDATE,
    WBEM_FLAG_DEEP, WBEM_FLAG_FORWARD_ONLY, WBEM_FLAG_NONSYSTEM_ONLY,
    WBEM_FLAG_RETURN_IMMEDIATELY, WBEM_FLAG_RETURN_WBEM_COMPLETE, WBEM_GENUS_CLASS, WBEM_INFINITE,
    WBEM_S_DIFFERENT, WBEM_S_FALSE, WBEM_S_NO_ERROR, WBEM_S_NO_MORE_DATA, WBEM_S_TIMEDOUT,
};
use self::interop::{
    check, failure, from_variant, take_bstr, take_string_array, to_variant, typed, wide, Bstr,
    ComPtr, OwnedVariant,
};
use crate::provider::{
    cim, moniker, status_text, AssocQuery, EventSource, Locator, MethodDescriptor, ObjectHandle,
    ObjectPath, ParameterDescriptor, PropertyDescriptor, ProviderError, ProviderResult,
    QueryFlags, Qualifiers, RemoteObject, RootHandle, ServerConnection, Services, ServicesHandle,
    DISP_E_UNKNOWNNAME, WBEM_E_FAILED, WBEM_E_INVALID_OPERATION, WBEM_E_INVALID_PARAMETER,
    WBEM_E_TIMED_OUT,
};
use crate::value::Variant;
use crate::wql;
use std::any::Any;
use std::ffi::c_void;
use std::ptr;
use std::sync::{Arc, Once, OnceLock};
use std::time::Duration;
use windows_sys::core::BSTR;
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, LUID};
use windows_sys::Win32::Security::{
    AdjustTokenPrivileges, LookupPrivilegeValueW, LUID_AND_ATTRIBUTES, SE_PRIVILEGE_ENABLED,
    SE_PRIVILEGE_REMOVED, TOKEN_ADJUST_PRIVILEGES, TOKEN_PRIVILEGES, TOKEN_QUERY,
};
use windows_sys::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoInitializeSecurity, CoSetProxyBlanket,
    CLSCTX_INPROC_SERVER, COINIT_MULTITHREADED, EOAC_NONE, RPC_C_AUTHN_LEVEL,
    RPC_C_AUTHN_LEVEL_CALL, RPC_C_AUTHN_LEVEL_CONNECT, RPC_C_AUTHN_LEVEL_DEFAULT,
    RPC_C_AUTHN_LEVEL_NONE, RPC_C_AUTHN_LEVEL_PKT, RPC_C_AUTHN_LEVEL_PKT_INTEGRITY,
    RPC_C_AUTHN_LEVEL_PKT_PRIVACY, RPC_C_IMP_LEVEL, RPC_C_IMP_LEVEL_ANONYMOUS,
    RPC_C_IMP_LEVEL_DELEGATE, RPC_C_IMP_LEVEL_IDENTIFY, RPC_C_IMP_LEVEL_IMPERSONATE,
};
use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

const DEFAULT_NAMESPACE: &str = "root/cimv2";

const SOURCE_LOCATOR: &str = "SWbemLocator";
const SOURCE_SERVICES: &str = "SWbemServicesEx";
const SOURCE_OBJECT: &str = "SWbemObjectEx";
const SOURCE_EVENTS: &str = "SWbemEventSource";

const AUTHENTICATION_LEVELS: &[(&str, RPC_C_AUTHN_LEVEL)] = &[
    ("default", RPC_C_AUTHN_LEVEL_DEFAULT),
    ("none", RPC_C_AUTHN_LEVEL_NONE),
    ("connect", RPC_C_AUTHN_LEVEL_CONNECT),
    ("call", RPC_C_AUTHN_LEVEL_CALL),
    ("pkt", RPC_C_AUTHN_LEVEL_PKT),
    ("pktIntegrity", RPC_C_AUTHN_LEVEL_PKT_INTEGRITY),
    ("pktPrivacy", RPC_C_AUTHN_LEVEL_PKT_PRIVACY),
];

const IMPERSONATION_LEVELS: &[(&str, RPC_C_IMP_LEVEL)] = &[
    ("anonymous", RPC_C_IMP_LEVEL_ANONYMOUS),
    ("identify", RPC_C_IMP_LEVEL_IDENTIFY),
    ("impersonate", RPC_C_IMP_LEVEL_IMPERSONATE),
    ("delegate", RPC_C_IMP_LEVEL_DELEGATE),
];

/// Look up a moniker security level by name, case-insensitively.
fn level<T: Copy>(
    table: &[(&'static str, T)],
    name: Option<&str>,
    default: &str,
) -> ProviderResult<(&'static str, T)> {
    let wanted = name.unwrap_or(default);
    table
        .iter()
        .copied()
        .find(|(known, _)| known.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| {
            ProviderError::wbem(
                WBEM_E_INVALID_PARAMETER,
                SOURCE_LOCATOR,
                format!("Unknown security level {}", wanted),
            )
        })
}

fn missing(source: &str, call: &str) -> ProviderError {
    ProviderError::wbem(WBEM_E_FAILED, source, format!("{} returned no object", call))
}

// =======================================================================
// Process setup
// =======================================================================

static SECURITY: Once = Once::new();

/// Join the multithreaded apartment and set default process security once.
fn initialize() -> ProviderResult<()> {
    // SAFETY: plain COM runtime calls with null optional arguments.
    let hr = unsafe { CoInitializeEx(ptr::null(), COINIT_MULTITHREADED) };
    if hr < 0 && hr != RPC_E_CHANGED_MODE {
        return Err(failure(hr, "CoInitializeEx"));
    }
    SECURITY.call_once(|| {
        let hr = unsafe {
            CoInitializeSecurity(
                ptr::null_mut(),
                -1,
                ptr::null(),
                ptr::null(),
                RPC_C_AUTHN_LEVEL_DEFAULT,
                RPC_C_IMP_LEVEL_IMPERSONATE,
                ptr::null(),
                EOAC_NONE,
                ptr::null(),
            )
        };
        if hr < 0 && hr != RPC_E_TOO_LATE {
            log::warn!("[dynwmi::com] CoInitializeSecurity failed: {:08X}", hr as u32);
        }
    });
    Ok(())
}

/// Windows name of a moniker privilege (`Shutdown` -> `SeShutdownPrivilege`).
fn privilege_name(privilege: &str) -> String {
    let bare = privilege.trim_start_matches('!');
    if bare.len() > 2 && bare[..2].eq_ignore_ascii_case("se") && bare.ends_with("Privilege") {
        bare.to_string()
    } else {
        format!("Se{}Privilege", bare)
    }
}

/// Enable (or, `!` prefixed, remove) privileges on the process token.
fn adjust_privileges(privileges: &[String]) -> ProviderResult<()> {
    if privileges.is_empty() {
        return Ok(());
    }
    // SAFETY: the token handle is closed on every path below.
    unsafe {
        let mut token: HANDLE = std::mem::zeroed();
        if OpenProcessToken(GetCurrentProcess(), TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY, &mut token) == 0 {
            return Err(ProviderError::wbem(
                WBEM_E_FAILED,
                SOURCE_LOCATOR,
                "Cannot open the process token",
            ));
        }
        let mut outcome = Ok(());
        for privilege in privileges {
            let name = wide(&privilege_name(privilege));
            let mut luid: LUID = std::mem::zeroed();
            if LookupPrivilegeValueW(ptr::null(), name.as_ptr(), &mut luid) == 0 {
                outcome = Err(ProviderError::wbem(
                    WBEM_E_INVALID_PARAMETER,
                    SOURCE_LOCATOR,
                    format!("Unknown privilege {}", privilege),
                ));
                break;
            }
            let attributes = if privilege.starts_with('!') {
                SE_PRIVILEGE_REMOVED
            } else {
                SE_PRIVILEGE_ENABLED
            };
            let state = TOKEN_PRIVILEGES {
                PrivilegeCount: 1,
                Privileges: [LUID_AND_ATTRIBUTES {
                    Luid: luid,
                    Attributes: attributes,
                }],
            };
            if AdjustTokenPrivileges(token, 0, &state, 0, ptr::null_mut(), ptr::null_mut()) == 0 {
                log::warn!("[dynwmi::com] privilege {} was not adjusted", privilege);
            } else {
                log::debug!("[dynwmi::com] privilege {} adjusted", privilege);
            }
        }
        CloseHandle(token);
        outcome
    }
}

// =======================================================================
// Sessions
// =======================================================================

/// Explicit credentials handed to `CoSetProxyBlanket`.
struct Identity {
    user: Vec<u16>,
    domain: Vec<u16>,
    password: Vec<u16>,
    raw: CoAuthIdentity,
}

// `raw` only points into the buffers, which are never written after
// construction.
unsafe impl Send for Identity {}
unsafe impl Sync for Identity {}

impl Identity {
    /// `DOMAIN\name` is split; `name@domain` is passed whole.
    fn new(user: &str, password: &str) -> Box<Self> {
        let (domain, user) = user.split_once('\\').unwrap_or(("", user));
        let mut identity = Box::new(Identity {
            user: user.encode_utf16().collect(),
            domain: domain.encode_utf16().collect(),
            password: password.encode_utf16().collect(),
            raw: CoAuthIdentity {
                User: ptr::null_mut(),
                UserLength: 0,
                Domain: ptr::null_mut(),
                DomainLength: 0,
                Password: ptr::null_mut(),
                PasswordLength: 0,
                Flags: SEC_WINNT_AUTH_IDENTITY_UNICODE,
            },
        });
        let id = &mut *identity;
        (id.raw.User, id.raw.UserLength) = buffer(&mut id.user);
        (id.raw.Domain, id.raw.DomainLength) = buffer(&mut id.domain);
        (id.raw.Password, id.raw.PasswordLength) = buffer(&mut id.password);
        identity
    }
}

fn buffer(units: &mut [u16]) -> (*mut u16, u32) {
    if units.is_empty() {
        (ptr::null_mut(), 0)
    } else {
        (units.as_mut_ptr(), units.len() as u32)
    }
}

/// One namespace connection and the proxy security applied to everything
/// obtained through it.
struct Session {
    services: ComPtr<self::ffi::IWbemServices>,
    authentication: (&'static str, RPC_C_AUTHN_LEVEL),
    impersonation: (&'static str, RPC_C_IMP_LEVEL),
    identity: Option<Box<Identity>>,
    server: String,
    namespace: String,
}

impl Session {
    /// Apply the session's blanket to a proxy.
    fn secure<T: Interface>(&self, proxy: &ComPtr<T>) -> ProviderResult<()> {
        let auth_info = self
            .identity
            .as_ref()
            .map_or(ptr::null(), |id| ptr::addr_of!(id.raw).cast::<c_void>());
        // SAFETY: `auth_info` lives as long as the session, which outlives
        // every proxy it secures.
        let hr = unsafe {
            CoSetProxyBlanket(
                proxy.as_unknown().cast(),
                RPC_C_AUTHN_DEFAULT,
                RPC_C_AUTHZ_NONE,
                ptr::null(),
                self.authentication.1,
                self.impersonation.1,
                auth_info,
                EOAC_NONE,
            )
        };
        check(hr, SOURCE_SERVICES).map(|_| ())
    }

    fn security(&self) -> String {
        format!(
            "{{authenticationLevel={},impersonationLevel={}}}",
            self.authentication.0, self.impersonation.0
        )
    }

    fn display_name(&self) -> String {
        format!(
            "WINMGMTS:{}!\\\\{}\\{}",
            self.security(),
            self.server,
            self.namespace.replace('/', "\\")
        )
    }

    fn get_raw(&self, path: &str) -> ProviderResult<ComPtr<IWbemClassObject>> {
        let path = Bstr::new(path);
        let mut object = ptr::null_mut();
        // SAFETY: arguments are live for the call; the result is adopted.
        unsafe {
            check(
                (self.services.vtbl().GetObject)(
                    self.services.as_ptr(),
                    path.as_raw(),
                    WBEM_FLAG_RETURN_WBEM_COMPLETE,
                    ptr::null_mut(),
                    &mut object,
                    ptr::null_mut(),
                ),
                SOURCE_SERVICES,
            )?;
            ComPtr::from_raw(object).ok_or_else(|| missing(SOURCE_SERVICES, "GetObject"))
        }
    }

    fn get(self: &Arc<Self>, path: &str) -> ProviderResult<ObjectHandle> {
        Ok(ComObject::handle(self.get_raw(path)?, self.clone()))
    }

    /// Read an enumerator to the end.
    fn drain(self: &Arc<Self>, enumerator: *mut IEnumWbemClassObject) -> ProviderResult<Vec<ObjectHandle>> {
        // SAFETY: the enumerator was just returned with one reference.
        let enumerator = unsafe { ComPtr::from_raw(enumerator) }
            .ok_or_else(|| missing(SOURCE_SERVICES, "enumeration"))?;
        self.secure(&enumerator)?;
        let mut objects = Vec::new();
        loop {
            let mut object = ptr::null_mut();
            let mut returned = 0u32;
            // SAFETY: room for exactly one object.
            let hr = unsafe {
                check(
                    (enumerator.vtbl().Next)(enumerator.as_ptr(), WBEM_INFINITE, 1, &mut object, &mut returned),
                    SOURCE_SERVICES,
                )?
            };
            match unsafe { ComPtr::from_raw(object) } {
                Some(object) if returned == 1 => objects.push(ComObject::handle(object, self.clone())),
                _ => break,
            }
            if hr == WBEM_S_FALSE {
                break;
            }
        }
        Ok(objects)
    }

    fn query(self: &Arc<Self>, wql: &str, flags: i32) -> ProviderResult<Vec<ObjectHandle>> {
        log::debug!("[dynwmi::com] ExecQuery {}", wql);
        let (language, text) = (Bstr::new("WQL"), Bstr::new(wql));
        let mut enumerator = ptr::null_mut();
        // SAFETY: arguments are live for the call.
        unsafe {
            check(
                (self.services.vtbl().ExecQuery)(
                    self.services.as_ptr(),
                    language.as_raw(),
                    text.as_raw(),
                    flags,
                    ptr::null_mut(),
                    &mut enumerator,
                ),
                SOURCE_SERVICES,
            )?;
        }
        self.drain(enumerator)
    }

    fn instances_of(self: &Arc<Self>, class: &str) -> ProviderResult<Vec<ObjectHandle>> {
        let class = Bstr::new(class);
        let mut enumerator = ptr::null_mut();
        // SAFETY: arguments are live for the call.
        unsafe {
            check(
                (self.services.vtbl().CreateInstanceEnum)(
                    self.services.as_ptr(),
                    class.as_raw(),
                    WBEM_FLAG_DEEP | WBEM_FLAG_RETURN_IMMEDIATELY | WBEM_FLAG_FORWARD_ONLY,
                    ptr::null_mut(),
                    &mut enumerator,
                ),
                SOURCE_SERVICES,
            )?;
        }
        self.drain(enumerator)
    }
}

// =======================================================================
// Locator
// =======================================================================

/// `IWbemLocator`: resolves monikers and opens namespaces on the local or a
/// remote machine.
pub struct ComLocator {
    locator: ComPtr<IWbemLocator>,
}

impl ComLocator {
    /// Initialize COM for this process and create the locator.
    pub fn new() -> ProviderResult<Self> {
        initialize()?;
        let mut locator = ptr::null_mut::<c_void>();
        // SAFETY: GUIDs are statics; the out pointer is adopted below.
        unsafe {
            check(
                CoCreateInstance(
                    &CLSID_WBEM_LOCATOR,
                    ptr::null_mut(),
                    CLSCTX_INPROC_SERVER,
                    &IID_IWBEM_LOCATOR,
                    &mut locator,
                ),
                "CoCreateInstance",
            )?;
        }
        let locator = unsafe { ComPtr::from_raw(locator.cast::<IWbemLocator>()) }
            .ok_or_else(|| missing(SOURCE_LOCATOR, "CoCreateInstance"))?;
        log::debug!("[dynwmi::com] locator created");
        Ok(Self { locator })
    }

    fn open(
        &self,
        request: &ServerConnection,
        authentication: Option<&str>,
        impersonation: Option<&str>,
    ) -> ProviderResult<Arc<Session>> {
        let server = if request.server.is_empty() { "." } else { request.server.as_str() };
        let namespace = if request.namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            request.namespace.as_str()
        };
        let resource = format!("\\\\{}\\{}", server, namespace.replace('/', "\\"));
        log::debug!("[dynwmi::com] ConnectServer {}", resource);

        let authentication = level(AUTHENTICATION_LEVELS, authentication, "pktPrivacy")?;
        let impersonation = level(IMPERSONATION_LEVELS, impersonation, "impersonate")?;
        let resource = Bstr::new(&resource);
        let user = Bstr::optional(&request.user);
        let password = Bstr::optional(&request.password);
        let locale = Bstr::optional(&request.locale);
        let authority = Bstr::optional(&request.authority);
        let mut services = ptr::null_mut();
        // SAFETY: every BSTR outlives the call; the result is adopted.
        let services = unsafe {
            check(
                (self.locator.vtbl().ConnectServer)(
                    self.locator.as_ptr(),
                    resource.as_raw(),
                    user.as_raw(),
                    password.as_raw(),
                    locale.as_raw(),
                    request.security_flags,
                    authority.as_raw(),
                    ptr::null_mut(),
                    &mut services,
                ),
                SOURCE_LOCATOR,
            )?;
            ComPtr::from_raw(services).ok_or_else(|| missing(SOURCE_LOCATOR, "ConnectServer"))?
        };

        let session = Session {
            services,
            authentication,
            impersonation,
            identity: (!request.user.is_empty()).then(|| Identity::new(&request.user, &request.password)),
            server: server.to_string(),
            namespace: namespace.to_string(),
        };
        session.secure(&session.services)?;
        Ok(Arc::new(session))
    }
}

impl Locator for ComLocator {
    fn get_object(&self, text: &str) -> ProviderResult<RootHandle> {
        let parts = moniker::parse(text);
        adjust_privileges(&parts.privileges)?;
        let request = ServerConnection {
            server: parts.server.clone().unwrap_or_default(),
            namespace: parts.namespace.clone().unwrap_or_default(),
            authority: parts.authority.clone().unwrap_or_default(),
            ..ServerConnection::default()
        };
        let session = self.open(
            &request,
            parts.authentication_level.as_deref(),
            parts.impersonation_level.as_deref(),
        )?;
        match parts.object {
            Some(path) => Ok(RootHandle::Object(session.get(&path)?)),
            None => Ok(RootHandle::Services(Arc::new(ComServices { session }))),
        }
    }

    fn connect_server(&self, request: &ServerConnection) -> ProviderResult<ServicesHandle> {
        let session = self.open(request, None, None)?;
        Ok(Arc::new(ComServices { session }))
    }
}

// =======================================================================
// Services
// =======================================================================

/// `IWbemServices` bound to one namespace.
pub struct ComServices {
    session: Arc<Session>,
}

impl ComServices {
    fn enumerate_classes(&self, root: &str) -> ProviderResult<Vec<ObjectHandle>> {
        let root = Bstr::optional(root);
        let mut enumerator = ptr::null_mut();
        let services = &self.session.services;
        // SAFETY: arguments are live for the call.
        unsafe {
            check(
                (services.vtbl().CreateClassEnum)(
                    services.as_ptr(),
                    root.as_raw(),
                    WBEM_FLAG_DEEP | WBEM_FLAG_RETURN_IMMEDIATELY | WBEM_FLAG_FORWARD_ONLY,
                    ptr::null_mut(),
                    &mut enumerator,
                ),
                SOURCE_SERVICES,
            )?;
        }
        self.session.drain(enumerator)
    }
}

impl Services for ComServices {
    fn get(&self, path: &str) -> ProviderResult<ObjectHandle> {
        self.session.get(path)
    }

    fn exec_query(&self, wql: &str, flags: QueryFlags) -> ProviderResult<Vec<ObjectHandle>> {
        self.session.query(wql, flags.bits() as i32)
    }

    fn exec_notification_query(&self, wql: &str) -> ProviderResult<Box<dyn EventSource>> {
        log::debug!("[dynwmi::com] ExecNotificationQuery {}", wql);
        let (language, text) = (Bstr::new("WQL"), Bstr::new(wql));
        let services = &self.session.services;
        let mut enumerator = ptr::null_mut();
        // SAFETY: arguments are live for the call; the result is adopted.
        let events = unsafe {
            check(
                (services.vtbl().ExecNotificationQuery)(
                    services.as_ptr(),
                    language.as_raw(),
                    text.as_raw(),
                    WBEM_FLAG_RETURN_IMMEDIATELY | WBEM_FLAG_FORWARD_ONLY,
                    ptr::null_mut(),
                    &mut enumerator,
                ),
                SOURCE_SERVICES,
            )?;
            ComPtr::from_raw(enumerator)
                .ok_or_else(|| missing(SOURCE_SERVICES, "ExecNotificationQuery"))?
        };
        self.session.secure(&events)?;
        Ok(Box::new(ComEventSource {
            events,
            session: self.session.clone(),
        }))
    }

    fn subclasses_of(&self, root: &str) -> ProviderResult<Vec<ObjectHandle>> {
        self.enumerate_classes(root)
    }

    fn instances_of(&self, class: &str) -> ProviderResult<Vec<ObjectHandle>> {
        self.session.instances_of(class)
    }

    fn native(&self, _name: &str) -> ProviderResult<Variant> {
        Err(ProviderError::new(DISP_E_UNKNOWNNAME, "Unknown name."))
    }

    fn display_name(&self) -> String {
        self.session.display_name()
    }
}

// =======================================================================
// Objects
// =======================================================================

fn value_of(
    object: &ComPtr<IWbemClassObject>,
    name: &str,
    session: &Arc<Session>,
) -> ProviderResult<(Variant, CIMTYPE)> {
    let name = wide(name);
    let mut value = OwnedVariant::empty();
    let mut cim_type: CIMTYPE = 0;
    // SAFETY: `value` receives a VARIANT owned and cleared by this frame.
    unsafe {
        check(
            (object.vtbl().Get)(
                object.as_ptr(),
                name.as_ptr(),
                0,
                value.as_mut_ptr(),
                &mut cim_type,
                ptr::null_mut(),
            ),
            SOURCE_OBJECT,
        )?;
    }
    Ok((typed(from_variant(&value, session)?, cim_type), cim_type))
}

fn names_of(object: &ComPtr<IWbemClassObject>) -> ProviderResult<Vec<String>> {
    let mut names = ptr::null_mut();
    // SAFETY: the returned array is destroyed by `take_string_array`.
    unsafe {
        check(
            (object.vtbl().GetNames)(
                object.as_ptr(),
                ptr::null(),
                WBEM_FLAG_NONSYSTEM_ONLY,
                ptr::null(),
                &mut names,
            ),
            SOURCE_OBJECT,
        )?;
        take_string_array(names)
    }
}

fn next_qualifier(
    set: &ComPtr<IWbemQualifierSet>,
    session: &Arc<Session>,
) -> ProviderResult<Option<(String, Variant)>> {
    let mut name: BSTR = ptr::null();
    let mut value = OwnedVariant::empty();
    // SAFETY: the name is freed by `take_bstr`, the value by `OwnedVariant`.
    let hr = unsafe {
        check(
            (set.vtbl().Next)(set.as_ptr(), 0, &mut name, value.as_mut_ptr(), ptr::null_mut()),
            SOURCE_OBJECT,
        )?
    };
    if hr == WBEM_S_NO_MORE_DATA {
        return Ok(None);
    }
    let name = unsafe { take_bstr(name) };
    Ok(Some((name, from_variant(&value, session)?)))
}

fn qualifiers_of(set: *mut IWbemQualifierSet, session: &Arc<Session>) -> ProviderResult<Qualifiers> {
    // SAFETY: the set was just returned with one reference.
    let Some(set) = (unsafe { ComPtr::from_raw(set) }) else {
        return Ok(Qualifiers::new());
    };
    check(unsafe { (set.vtbl().BeginEnumeration)(set.as_ptr(), 0) }, SOURCE_OBJECT)?;
    let mut qualifiers = Qualifiers::new();
    let mut outcome = Ok(());
    loop {
        match next_qualifier(&set, session) {
            Ok(Some((name, value))) => {
                qualifiers.insert(name, value);
            }
            Ok(None) => break,
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }
    unsafe { (set.vtbl().EndEnumeration)(set.as_ptr()) };
    outcome.map(|()| qualifiers)
}

fn property_qualifiers(
    object: &ComPtr<IWbemClassObject>,
    name: &str,
    session: &Arc<Session>,
) -> ProviderResult<Qualifiers> {
    let name = wide(name);
    let mut set = ptr::null_mut();
    // SAFETY: the set is adopted by `qualifiers_of`.
    let hr = unsafe { (object.vtbl().GetPropertyQualifierSet)(object.as_ptr(), name.as_ptr(), &mut set) };
    match check(hr, SOURCE_OBJECT) {
        Ok(_) => qualifiers_of(set, session),
        Err(e) if e.has_code(WBEM_E_SYSTEM_PROPERTY) => Ok(Qualifiers::new()),
        Err(e) => Err(e),
    }
}

/// Parameters of a method signature object, in `ID` order. `ReturnValue`
/// carries no `ID` and sorts last.
fn parameters_of(
    signature: &ComPtr<IWbemClassObject>,
    session: &Arc<Session>,
) -> ProviderResult<Vec<ParameterDescriptor>> {
    let mut parameters = Vec::new();
    for name in names_of(signature)? {
        let (_, cim_type) = value_of(signature, &name, session)?;
        let qualifiers = property_qualifiers(signature, &name, session)?;
        parameters.push(ParameterDescriptor {
            name,
            is_array: cim::is_array(cim_type),
            qualifiers,
        });
    }
    parameters.sort_by_key(|p| p.qualifiers.get("ID").and_then(Variant::as_i64).unwrap_or(i64::MAX));
    Ok(parameters)
}

type Signatures = (Option<ComPtr<IWbemClassObject>>, Option<ComPtr<IWbemClassObject>>);

/// `IWbemClassObject`: a class definition or an instance.
pub struct ComObject {
    object: ComPtr<IWbemClassObject>,
    session: Arc<Session>,
    definition: OnceLock<ComPtr<IWbemClassObject>>,
}

impl ComObject {
    fn handle(object: ComPtr<IWbemClassObject>, session: Arc<Session>) -> ObjectHandle {
        Arc::new(ComObject {
            object,
            session,
            definition: OnceLock::new(),
        })
    }

    fn raw(&self) -> &ComPtr<IWbemClassObject> {
        &self.object
    }

    fn value(&self, name: &str) -> ProviderResult<(Variant, CIMTYPE)> {
        value_of(&self.object, name, &self.session)
    }

    fn text(&self, name: &str) -> ProviderResult<String> {
        Ok(match self.value(name)?.0 {
            Variant::String(text) => text,
            _ => String::new(),
        })
    }

    fn is_class(&self) -> ProviderResult<bool> {
        Ok(self.value("__GENUS")?.0.as_i64() == Some(i64::from(WBEM_GENUS_CLASS)))
    }

    /// The class definition; methods are only exposed there.
    fn definition(&self) -> ProviderResult<ComPtr<IWbemClassObject>> {
        if let Some(definition) = self.definition.get() {
            return Ok(definition.clone());
        }
        let definition = if self.is_class()? {
            self.object.clone()
        } else {
            self.session.get_raw(&self.text("__CLASS")?)?
        };
        Ok(self.definition.get_or_init(|| definition).clone())
    }

    fn signatures(&self, definition: &ComPtr<IWbemClassObject>, name: &str) -> ProviderResult<Signatures> {
        let name = wide(name);
        let (mut input, mut output) = (ptr::null_mut(), ptr::null_mut());
        // SAFETY: both signatures are adopted below.
        unsafe {
            check(
                (definition.vtbl().GetMethod)(definition.as_ptr(), name.as_ptr(), 0, &mut input, &mut output),
                SOURCE_OBJECT,
            )?;
            Ok((ComPtr::from_raw(input), ComPtr::from_raw(output)))
        }
    }

    /// Relative path used to address this object in calls and queries.
    fn target(&self) -> ProviderResult<String> {
        let rel_path = self.text("__RELPATH")?;
        if rel_path.is_empty() {
            self.text("__CLASS")
        } else {
            Ok(rel_path)
        }
    }

    fn spawn(&self, class: &ComPtr<IWbemClassObject>) -> ProviderResult<ComPtr<IWbemClassObject>> {
        let mut instance = ptr::null_mut();
        // SAFETY: the instance is adopted below.
        unsafe {
            check((class.vtbl().SpawnInstance)(class.as_ptr(), 0, &mut instance), SOURCE_OBJECT)?;
            ComPtr::from_raw(instance).ok_or_else(|| missing(SOURCE_OBJECT, "SpawnInstance"))
        }
    }
}

fn put_value(
    object: &ComPtr<IWbemClassObject>,
    name: &str,
    value: &Variant,
    session: &Arc<Session>,
) -> ProviderResult<()> {
    let (_, cim_type) = value_of(object, name, session)?;
    let value = to_variant(value, cim_type)?;
    let name = wide(name);
    // SAFETY: the service copies the VARIANT.
    let hr = unsafe { (object.vtbl().Put)(object.as_ptr(), name.as_ptr(), 0, value.as_ptr(), 0) };
    check(hr, SOURCE_OBJECT).map(|_| ())
}

impl RemoteObject for ComObject {
    fn path(&self) -> ProviderResult<ObjectPath> {
        let path = self.text("__PATH")?;
        let display_name = if path.is_empty() {
            String::new()
        } else {
            format!("WINMGMTS:{}!{}", self.session.security(), path)
        };
        Ok(ObjectPath {
            rel_path: self.text("__RELPATH")?,
            class: self.text("__CLASS")?,
            namespace: self.text("__NAMESPACE")?.replace('\\', "/"),
            server: self.text("__SERVER")?,
            is_class: self.is_class()?,
            display_name,
            path,
        })
    }

    fn derivation(&self) -> ProviderResult<Vec<String>> {
        Ok(self
            .value("__DERIVATION")?
            .0
            .into_array()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|class| class.as_str().map(str::to_string))
            .collect())
    }

    fn qualifiers(&self) -> ProviderResult<Qualifiers> {
        let mut set = ptr::null_mut();
        // SAFETY: the set is adopted by `qualifiers_of`.
        check(
            unsafe { (self.object.vtbl().GetQualifierSet)(self.object.as_ptr(), &mut set) },
            SOURCE_OBJECT,
        )?;
        qualifiers_of(set, &self.session)
    }

    fn property_names(&self) -> ProviderResult<Vec<String>> {
        names_of(&self.object)
    }

    fn property(&self, name: &str) -> ProviderResult<PropertyDescriptor> {
        let (value, cim_type) = self.value(name)?;
        let qualifiers = property_qualifiers(&self.object, name, &self.session)?;
        let declared = qualifiers
            .get("CIMTYPE")
            .and_then(Variant::as_str)
            .map_or_else(|| cim::name(cim_type).to_string(), str::to_string);
        Ok(PropertyDescriptor {
            name: name.to_string(),
            cim_type: declared,
            is_array: cim::is_array(cim_type),
            value,
            qualifiers,
        })
    }

    fn set_property(&self, name: &str, value: Variant) -> ProviderResult<()> {
        put_value(&self.object, name, &value, &self.session)
    }

    fn method_names(&self) -> ProviderResult<Vec<String>> {
        let definition = self.definition()?;
        let vtbl = definition.vtbl();
        check(unsafe { (vtbl.BeginMethodEnumeration)(definition.as_ptr(), 0) }, SOURCE_OBJECT)?;
        let mut names = Vec::new();
        let mut outcome = Ok(());
        loop {
            let mut name: BSTR = ptr::null();
            let (mut input, mut output) = (ptr::null_mut(), ptr::null_mut());
            // SAFETY: the name and both signatures are released right away.
            let hr = unsafe { (vtbl.NextMethod)(definition.as_ptr(), 0, &mut name, &mut input, &mut output) };
            unsafe {
                drop(ComPtr::from_raw(input));
                drop(ComPtr::from_raw(output));
            }
            if hr == WBEM_S_NO_MORE_DATA {
                break;
            }
            if let Err(e) = check(hr, SOURCE_OBJECT) {
                outcome = Err(e);
                break;
            }
            names.push(unsafe { take_bstr(name) });
        }
        unsafe { (vtbl.EndMethodEnumeration)(definition.as_ptr()) };
        outcome.map(|()| names)
    }

    fn method(&self, name: &str) -> ProviderResult<MethodDescriptor> {
        let definition = self.definition()?;
        let (input, output) = self.signatures(&definition, name)?;
        let wide_name = wide(name);
        let mut set = ptr::null_mut();
        // SAFETY: the set is adopted by `qualifiers_of`.
        check(
            unsafe {
                (definition.vtbl().GetMethodQualifierSet)(definition.as_ptr(), wide_name.as_ptr(), &mut set)
            },
            SOURCE_OBJECT,
        )?;
        Ok(MethodDescriptor {
            name: name.to_string(),
            qualifiers: qualifiers_of(set, &self.session)?,
            in_parameters: input.map(|sig| parameters_of(&sig, &self.session)).transpose()?,
            out_parameters: output.map(|sig| parameters_of(&sig, &self.session)).transpose()?,
        })
    }

    fn exec_method(
        &self,
        name: &str,
        in_parameters: Option<&[(String, Variant)]>,
    ) -> ProviderResult<ObjectHandle> {
        let definition = self.definition()?;
        let (input, _) = self.signatures(&definition, name)?;
        let arguments = match (in_parameters, input) {
            (Some(values), Some(signature)) => {
                let arguments = self.spawn(&signature)?;
                for (parameter, value) in values {
                    put_value(&arguments, parameter, value, &self.session)?;
                }
                Some(arguments)
            }
            (Some(values), None) if !values.is_empty() => {
                return Err(ProviderError::wbem(
                    WBEM_E_INVALID_PARAMETER,
                    SOURCE_OBJECT,
                    format!("{} takes no parameters", name),
                ));
            }
            _ => None,
        };

        let target = self.target()?;
        log::debug!("[dynwmi::com] ExecMethod {}.{}", target, name);
        let (path, method) = (Bstr::new(&target), Bstr::new(name));
        let services = &self.session.services;
        let mut output = ptr::null_mut();
        // SAFETY: arguments are live for the call; the output is adopted.
        unsafe {
            check(
                (services.vtbl().ExecMethod)(
                    services.as_ptr(),
                    path.as_raw(),
                    method.as_raw(),
                    0,
                    ptr::null_mut(),
                    arguments.as_ref().map_or(ptr::null_mut(), ComPtr::as_ptr),
                    &mut output,
                    ptr::null_mut(),
                ),
                SOURCE_OBJECT,
            )?;
            ComPtr::from_raw(output)
                .map(|output| ComObject::handle(output, self.session.clone()))
                .ok_or_else(|| missing(SOURCE_OBJECT, "ExecMethod"))
        }
    }

    fn put(&self) -> ProviderResult<()> {
        if self.is_class()? {
            return Err(ProviderError::wbem(
                WBEM_E_INVALID_OPERATION,
                SOURCE_OBJECT,
                status_text(WBEM_E_INVALID_OPERATION),
            ));
        }
        let services = &self.session.services;
        // SAFETY: the instance is live for the call.
        let hr = unsafe {
            (services.vtbl().PutInstance)(
                services.as_ptr(),
                self.object.as_ptr(),
                WBEM_FLAG_CREATE_OR_UPDATE,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        check(hr, SOURCE_OBJECT).map(|_| ())
    }

    fn compare_to(&self, other: &dyn RemoteObject) -> ProviderResult<bool> {
        let Some(other) = other.as_any().downcast_ref::<ComObject>() else {
            return Ok(false);
        };
        // SAFETY: both objects are live for the call.
        let hr = unsafe {
            (self.object.vtbl().CompareTo)(
                self.object.as_ptr(),
                WBEM_COMPARISON_INCLUDE_ALL,
                other.object.as_ptr(),
            )
        };
        match check(hr, SOURCE_OBJECT)? {
            WBEM_S_NO_ERROR => Ok(true),
            WBEM_S_DIFFERENT => Ok(false),
            other => Err(failure(other, SOURCE_OBJECT)),
        }
    }

    fn object_text(&self) -> ProviderResult<String> {
        let mut text: BSTR = ptr::null();
        // SAFETY: the text is freed by `take_bstr`.
        unsafe {
            check((self.object.vtbl().GetObjectText)(self.object.as_ptr(), 0, &mut text), SOURCE_OBJECT)?;
            Ok(take_bstr(text))
        }
    }

    fn associators(&self, query: &AssocQuery) -> ProviderResult<Vec<ObjectHandle>> {
        self.session.query(
            &wql::associators_of(&self.target()?, query),
            WBEM_FLAG_RETURN_IMMEDIATELY | WBEM_FLAG_FORWARD_ONLY,
        )
    }

    fn references(&self, query: &AssocQuery) -> ProviderResult<Vec<ObjectHandle>> {
        self.session.query(
            &wql::references_of(&self.target()?, query),
            WBEM_FLAG_RETURN_IMMEDIATELY | WBEM_FLAG_FORWARD_ONLY,
        )
    }

    fn spawn_instance(&self) -> ProviderResult<ObjectHandle> {
        let instance = self.spawn(&self.definition()?)?;
        Ok(ComObject::handle(instance, self.session.clone()))
    }

    fn instances(&self) -> ProviderResult<Vec<ObjectHandle>> {
        self.session.instances_of(&self.text("__CLASS")?)
    }

    fn native(&self, name: &str) -> ProviderResult<Variant> {
        if name.starts_with("__") {
            return Ok(self.value(name)?.0);
        }
        Err(ProviderError::new(DISP_E_UNKNOWNNAME, "Unknown name."))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =======================================================================
// Events
// =======================================================================

/// Semisynchronous notification enumerator.
pub struct ComEventSource {
    events: ComPtr<IEnumWbemClassObject>,
    session: Arc<Session>,
}

impl EventSource for ComEventSource {
    fn next_event(&self, timeout: Option<Duration>) -> ProviderResult<ObjectHandle> {
        let millis = timeout.map_or(WBEM_INFINITE, |t| i32::try_from(t.as_millis()).unwrap_or(i32::MAX));
        let mut event = ptr::null_mut();
        let mut returned = 0u32;
        // SAFETY: room for exactly one object, adopted below.
        let hr = unsafe {
            check(
                (self.events.vtbl().Next)(self.events.as_ptr(), millis, 1, &mut event, &mut returned),
                SOURCE_EVENTS,
            )?
        };
        match unsafe { ComPtr::from_raw(event) } {
            Some(event) if returned == 1 => Ok(ComObject::handle(event, self.session.clone())),
            _ => {
                if hr != WBEM_S_TIMEDOUT {
                    log::debug!("[dynwmi::com] event enumerator returned {:08X}", hr as u32);
                }
                Err(ProviderError::wbem(
                    WBEM_E_TIMED_OUT,
                    SOURCE_EVENTS,
                    status_text(WBEM_E_TIMED_OUT),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::WBEM_E_INVALID_CLASS;

    fn cimv2() -> ServicesHandle {
        let locator = ComLocator::new().expect("locator");
        match locator.get_object("winmgmts:").expect("moniker") {
            RootHandle::Services(services) => services,
            RootHandle::Object(_) => panic!("namespace expected"),
        }
    }

    #[test]
    fn test_security_levels() {
        assert_eq!(
            level(AUTHENTICATION_LEVELS, Some("PKTPRIVACY"), "call").expect("level"),
            ("pktPrivacy", RPC_C_AUTHN_LEVEL_PKT_PRIVACY)
        );
        assert_eq!(
            level(IMPERSONATION_LEVELS, None, "impersonate").expect("level"),
            ("impersonate", RPC_C_IMP_LEVEL_IMPERSONATE)
        );
        let err = level(IMPERSONATION_LEVELS, Some("sudo"), "impersonate").expect_err("unknown level");
        assert!(err.has_code(WBEM_E_INVALID_PARAMETER));
    }

    #[test]
    fn test_privilege_names() {
        assert_eq!(privilege_name("Shutdown"), "SeShutdownPrivilege");
        assert_eq!(privilege_name("!RemoteShutdown"), "SeRemoteShutdownPrivilege");
        assert_eq!(privilege_name("SeDebugPrivilege"), "SeDebugPrivilege");
    }

    #[test]
    fn test_identity_splits_domain() {
        let identity = Identity::new(r"CORP\admin", "secret");
        assert_eq!(String::from_utf16_lossy(&identity.domain), "CORP");
        assert_eq!(String::from_utf16_lossy(&identity.user), "admin");
        assert_eq!(identity.raw.UserLength, 5);
        assert_eq!(identity.raw.PasswordLength, 6);

        let upn = Identity::new("admin@corp.example", "");
        assert!(upn.raw.Domain.is_null());
        assert!(upn.raw.Password.is_null());
    }

    #[test]
    fn test_typed_restores_unsigned_values() {
        assert_eq!(typed(Variant::I32(-1), cim::CIM_UINT32), Variant::U32(u32::MAX));
        assert_eq!(
            typed(Variant::String("18446744073709551615".into()), cim::CIM_UINT64),
            Variant::U64(u64::MAX)
        );
        assert_eq!(
            typed(
                Variant::Array(vec![Variant::I32(80), Variant::I32(443)]),
                cim::CIM_UINT16 | cim::CIM_FLAG_ARRAY
            ),
            Variant::Array(vec![Variant::U16(80), Variant::U16(443)])
        );
        assert_eq!(typed(Variant::String("x".into()), cim::CIM_SINT64), Variant::String("x".into()));
    }

    #[test]
    fn test_variant_conversion_keeps_declared_type() {
        let services = cimv2();
        let system = services.get("Win32_OperatingSystem").expect("class");
        let session = &system
            .as_any()
            .downcast_ref::<ComObject>()
            .expect("com object")
            .session;

        let stored = to_variant(&Variant::U32(u32::MAX), cim::CIM_UINT32).expect("uint32");
        let back = from_variant(&stored, session).expect("read back");
        assert_eq!(typed(back, cim::CIM_UINT32), Variant::U32(u32::MAX));

        let err = to_variant(&Variant::I64(70_000), cim::CIM_SINT16)
            .err()
            .expect("out of range");
        assert!(err.has_code(crate::provider::WBEM_E_TYPE_MISMATCH));
    }

    #[test]
    fn test_operating_system_query() {
        let services = cimv2();
        let systems = services
            .exec_query("SELECT * FROM Win32_OperatingSystem", QueryFlags::NONE)
            .expect("query");
        assert_eq!(systems.len(), 1);
        let path = systems[0].path().expect("path");
        assert_eq!(path.class, "Win32_OperatingSystem");
        assert!(!path.is_class);
        assert!(path.display_name.starts_with("WINMGMTS:{authenticationLevel=pktPrivacy"));
        let caption = systems[0].property("Caption").expect("caption");
        assert_eq!(caption.cim_type, "string");
        assert!(caption.value.as_str().is_some());
    }

    #[test]
    fn test_class_schema_and_methods() {
        let services = cimv2();
        let process = services.get("Win32_Process").expect("class");
        assert!(process.path().expect("path").is_class);
        assert!(process.derivation().expect("derivation").contains(&"CIM_Process".to_string()));
        assert!(process.property("Handle").expect("handle").is_key());
        assert!(process.method_names().expect("methods").contains(&"Create".to_string()));

        let create = process.method("Create").expect("create");
        let inputs = create.in_parameters.expect("inputs");
        assert_eq!(inputs[0].name, "CommandLine");
        let outputs = create.out_parameters.expect("outputs");
        assert_eq!(outputs.last().map(|p| p.name.as_str()), Some("ReturnValue"));
    }

    #[test]
    fn test_missing_class_reports_nested_status() {
        let services = cimv2();
        let err = services.get("Win32_NoSuchClass").err().expect("missing class");
        assert!(err.has_code(WBEM_E_INVALID_CLASS) || err.has_code(crate::provider::WBEM_E_NOT_FOUND));
        assert_eq!(err.info.as_ref().map(|i| i.source.as_str()), Some(SOURCE_SERVICES));
    }

    #[test]
    fn test_event_source_times_out() {
        let services = cimv2();
        let source = services
            .exec_notification_query(
                "SELECT * FROM __InstanceModificationEvent WITHIN 1 WHERE TargetInstance ISA 'Win32_OperatingSystem' AND TargetInstance.Caption = 'none'",
            )
            .expect("subscription");
        let err = source
            .next_event(Some(Duration::from_millis(200)))
            .err()
            .expect("no modification within the timeout");
        assert!(err.has_code(WBEM_E_TIMED_OUT));
    }
}
