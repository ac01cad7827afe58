// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Provider transport seam.
//!
//! The traits here mirror the scripting object model exposed by the
//! management service: a [`Locator`] resolves monikers and opens
//! [`Services`] (one per namespace), services hand out [`RemoteObject`]
//! handles (classes and instances) and [`EventSource`] subscriptions.
//!
//! Everything above this module (managed objects, classes, namespaces,
//! watchers) talks to the provider exclusively through these traits and
//! receives failures as raw [`ProviderError`]s, which are then translated
//! into [`crate::Error`] by [`crate::error::translate`].
//!
//! ```text
//! Locator --get_object/connect_server--> Services
//!    Services --get/exec_query/instances_of--> RemoteObject
//!    Services --exec_notification_query-----> EventSource
//!    RemoteObject --property/method/exec_method/put/compare_to/...
//! ```
//!
//! Handles are `Arc` + `Send + Sync`, like free-threaded COM proxies, so
//! an event producer may live on another thread. The client-side caches
//! built on top of them are single-threaded.
//!
//! Two implementations ship with the crate: [`memory`], always available,
//! and `com`, which talks to the local or a remote management service
//! through `IWbemLocator` (Windows only, feature `com`).

pub mod cim;
#[cfg(all(windows, feature = "com"))]
pub mod com;
pub mod memory;
pub mod moniker;

use crate::value::Variant;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Shared handle to a remote class or instance.
pub type ObjectHandle = Arc<dyn RemoteObject>;

/// Shared handle to a namespace connection.
pub type ServicesHandle = Arc<dyn Services>;

/// Result type returned by every provider call.
pub type ProviderResult<T> = core::result::Result<T, ProviderError>;

/// Qualifier name -> value.
pub type Qualifiers = BTreeMap<String, Variant>;

// =======================================================================
// Status codes
// =======================================================================

/// `DISP_E_EXCEPTION`: the dispatch call raised; details in [`ExcepInfo`].
pub const DISP_E_EXCEPTION: u32 = 0x8002_0009;
/// `DISP_E_UNKNOWNNAME`: member not exposed by the object.
pub const DISP_E_UNKNOWNNAME: u32 = 0x8002_0006;
/// `E_ACCESSDENIED`: credentials rejected.
pub const E_ACCESSDENIED: u32 = 0x8007_0005;
/// `WBEM_E_FAILED`: unspecified provider failure.
pub const WBEM_E_FAILED: u32 = 0x8004_1001;
/// `WBEM_E_NOT_FOUND`: object or member does not exist.
pub const WBEM_E_NOT_FOUND: u32 = 0x8004_1002;
/// `WBEM_E_ACCESS_DENIED`.
pub const WBEM_E_ACCESS_DENIED: u32 = 0x8004_1003;
/// `WBEM_E_TYPE_MISMATCH`: value does not fit the declared type.
pub const WBEM_E_TYPE_MISMATCH: u32 = 0x8004_1005;
/// `WBEM_E_INVALID_PARAMETER`.
pub const WBEM_E_INVALID_PARAMETER: u32 = 0x8004_1008;
/// `WBEM_E_INVALID_NAMESPACE`.
pub const WBEM_E_INVALID_NAMESPACE: u32 = 0x8004_100E;
/// `WBEM_E_INVALID_CLASS`.
pub const WBEM_E_INVALID_CLASS: u32 = 0x8004_1010;
/// `WBEM_E_INVALID_OPERATION`.
pub const WBEM_E_INVALID_OPERATION: u32 = 0x8004_1016;
/// `WBEM_E_INVALID_QUERY`: the WQL text was rejected.
pub const WBEM_E_INVALID_QUERY: u32 = 0x8004_1017;
/// `WBEM_E_INVALID_METHOD`.
pub const WBEM_E_INVALID_METHOD: u32 = 0x8004_1031;
/// `WBEM_E_INVALID_OBJECT_PATH`.
pub const WBEM_E_INVALID_OBJECT_PATH: u32 = 0x8004_103A;
/// `WBEM_E_TIMED_OUT`: `NextEvent` returned without an event.
pub const WBEM_E_TIMED_OUT: u32 = 0x8004_3001;

const STATUS_TEXT: &[(u32, &str)] = &[
    (E_ACCESSDENIED, "Access is denied."),
    (WBEM_E_FAILED, "Generic failure"),
    (WBEM_E_NOT_FOUND, "Not found"),
    (WBEM_E_ACCESS_DENIED, "Access denied"),
    (WBEM_E_TYPE_MISMATCH, "Type mismatch"),
    (WBEM_E_INVALID_PARAMETER, "Invalid parameter"),
    (WBEM_E_INVALID_NAMESPACE, "Invalid namespace"),
    (WBEM_E_INVALID_CLASS, "Invalid class"),
    (WBEM_E_INVALID_OPERATION, "Invalid operation"),
    (WBEM_E_INVALID_QUERY, "Invalid query"),
    (WBEM_E_INVALID_METHOD, "Invalid method"),
    (WBEM_E_INVALID_OBJECT_PATH, "Invalid object path"),
    (WBEM_E_TIMED_OUT, "Timed out"),
];

/// Description of a status code, as the scripting layer words it; empty
/// when the code is not known.
pub fn status_text(code: u32) -> &'static str {
    STATUS_TEXT
        .iter()
        .find(|(c, _)| *c == code)
        .map_or("", |(_, text)| *text)
}

/// Provider failure as reported by the transport.
///
/// `hresult` is the top-level status of the call; `info` carries the nested
/// exception detail (`EXCEPINFO`) when the provider supplied one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// Top-level status code.
    pub hresult: u32,
    /// Symbolic or human readable name for `hresult`.
    pub name: String,
    /// Nested detail.
    pub info: Option<ExcepInfo>,
}

/// Nested exception detail attached to a [`ProviderError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcepInfo {
    /// Component that raised the error.
    pub source: String,
    /// Description text (may be empty).
    pub description: String,
    /// Provider status code.
    pub scode: u32,
}

impl ProviderError {
    /// Create an error with no nested detail.
    pub fn new(hresult: u32, name: impl Into<String>) -> Self {
        Self {
            hresult,
            name: name.into(),
            info: None,
        }
    }

    /// Create the shape a dispatch exception takes: `DISP_E_EXCEPTION` on top,
    /// the provider status nested.
    pub fn wbem(scode: u32, source: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(DISP_E_EXCEPTION, "Exception occurred.").with_info(ExcepInfo {
            source: source.into(),
            description: description.into(),
            scode,
        })
    }

    /// Attach nested detail.
    #[must_use]
    pub fn with_info(mut self, info: ExcepInfo) -> Self {
        self.info = Some(info);
        self
    }

    /// Nested provider status, when present.
    pub fn scode(&self) -> Option<u32> {
        self.info.as_ref().map(|info| info.scode)
    }

    /// True when either the top-level or the nested status equals `code`.
    pub fn has_code(&self, code: u32) -> bool {
        self.hresult == code || self.scode() == Some(code)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X} - {}", self.hresult, self.name)
    }
}

impl std::error::Error for ProviderError {}

// =======================================================================
// Flags and descriptors
// =======================================================================

/// Flags passed with `ExecQuery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryFlags(u32);

impl QueryFlags {
    /// No flags (fully synchronous, rewindable).
    pub const NONE: QueryFlags = QueryFlags(0);

    /// `wbemFlagReturnImmediately`: return before the enumeration completes.
    pub const RETURN_IMMEDIATELY: QueryFlags = QueryFlags(0x10);

    /// `wbemFlagForwardOnly`: the enumerator cannot be rewound.
    pub const FORWARD_ONLY: QueryFlags = QueryFlags(0x20);

    /// Create from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        QueryFlags(bits)
    }

    /// Raw bits value.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Check if all bits of `other` are set.
    #[must_use]
    pub const fn contains(&self, other: QueryFlags) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for QueryFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        QueryFlags(self.0 | rhs.0)
    }
}

/// Path information of a remote object (`SWbemObjectPath`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPath {
    /// Full path; empty for spawned instances that were never stored.
    pub path: String,
    /// Path relative to the namespace (`Class.Key="v"`).
    pub rel_path: String,
    /// Class name.
    pub class: String,
    /// Namespace (`root/cimv2`).
    pub namespace: String,
    /// Server the object lives on.
    pub server: String,
    /// True when the path designates a class rather than an instance.
    pub is_class: bool,
    /// Moniker form (`winmgmts:{...}!//server/namespace:rel_path`).
    pub display_name: String,
}

impl ObjectPath {
    /// True when the object has been stored by the provider.
    pub fn is_persisted(&self) -> bool {
        !self.path.is_empty()
    }
}

/// A property as returned by `Properties_(name)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    /// Property name.
    pub name: String,
    /// Declared CIM type (`string`, `uint32`, `ref:Win32_Process`, ...).
    pub cim_type: String,
    /// Array-typed property.
    pub is_array: bool,
    /// Current value.
    pub value: Variant,
    /// Property qualifiers.
    pub qualifiers: Qualifiers,
}

impl PropertyDescriptor {
    /// True when the property carries a truthy `key` qualifier.
    pub fn is_key(&self) -> bool {
        self.qualifiers
            .get("key")
            .is_some_and(|v| v.as_bool().unwrap_or(!v.is_null()))
    }
}

/// One declared method parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    /// Parameter name.
    pub name: String,
    /// Array-typed parameter.
    pub is_array: bool,
    /// Parameter qualifiers (`CIMTYPE`, `BitMap`, `ID`, `In`, `Out`, ...).
    pub qualifiers: Qualifiers,
}

/// A method as returned by `Methods_(name)`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    /// Method name.
    pub name: String,
    /// Method qualifiers (`Privileges`, `MappingStrings`, `Static`, ...).
    pub qualifiers: Qualifiers,
    /// Input parameters in declared order; `None` when the method takes none.
    pub in_parameters: Option<Vec<ParameterDescriptor>>,
    /// Output parameters in declared order (including `ReturnValue`).
    pub out_parameters: Option<Vec<ParameterDescriptor>>,
}

/// Traversal mode for `Associators_`/`References_`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalMode {
    /// `bSchemaOnly`: schema-level traversal from a class.
    SchemaOnly,
    /// `bClassesOnly`: return the classes of the related instances.
    ClassesOnly,
}

/// Arguments for associator/reference traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssocQuery {
    /// Restrict to this association class (empty = any).
    pub assoc_class: String,
    /// Restrict to this result class (empty = any).
    pub result_class: String,
    /// Traversal mode flag.
    pub mode: Option<TraversalMode>,
}

/// Arguments for `ConnectServer`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerConnection {
    /// Target server (`.` for local).
    pub server: String,
    /// Namespace (`root/cimv2`); empty for the provider default.
    pub namespace: String,
    /// User, `DOMAIN\name` or `user@domain`.
    pub user: String,
    /// Password; empty for the current context.
    pub password: String,
    /// Locale (`MS_409`).
    pub locale: String,
    /// Authority (`kerberos:` or an NT domain).
    pub authority: String,
    /// Connection security flags.
    pub security_flags: i32,
}

/// What a moniker resolved to.
#[derive(Clone)]
pub enum RootHandle {
    /// A namespace connection.
    Services(ServicesHandle),
    /// A class or instance.
    Object(ObjectHandle),
}

// =======================================================================
// Traits
// =======================================================================

/// Entry point of a provider: moniker resolution and explicit connections.
pub trait Locator: Send + Sync {
    /// Resolve a `winmgmts:` moniker (`GetObject`).
    fn get_object(&self, moniker: &str) -> ProviderResult<RootHandle>;

    /// Open a namespace with explicit credentials (`ConnectServer`).
    fn connect_server(&self, request: &ServerConnection) -> ProviderResult<ServicesHandle>;
}

/// A connection to one namespace (`SWbemServices`).
pub trait Services: Send + Sync {
    /// Fetch a class or instance by path (`Get`).
    fn get(&self, path: &str) -> ProviderResult<ObjectHandle>;

    /// Run a WQL data query (`ExecQuery`).
    fn exec_query(&self, wql: &str, flags: QueryFlags) -> ProviderResult<Vec<ObjectHandle>>;

    /// Subscribe to a WQL notification query (`ExecNotificationQuery`).
    fn exec_notification_query(&self, wql: &str) -> ProviderResult<Box<dyn EventSource>>;

    /// Enumerate classes derived from `root` (all classes when empty).
    fn subclasses_of(&self, root: &str) -> ProviderResult<Vec<ObjectHandle>>;

    /// Enumerate instances of a class (`InstancesOf`).
    fn instances_of(&self, class: &str) -> ProviderResult<Vec<ObjectHandle>>;

    /// Provider-native member not modelled by the client.
    ///
    /// Returns `DISP_E_UNKNOWNNAME` when the member does not exist.
    fn native(&self, name: &str) -> ProviderResult<Variant>;

    /// Moniker form of this connection.
    fn display_name(&self) -> String;
}

/// A class or instance living in the provider (`SWbemObject`).
pub trait RemoteObject: Send + Sync {
    /// Path information (`Path_`).
    fn path(&self) -> ProviderResult<ObjectPath>;

    /// Class derivation, most specific first, excluding the class itself
    /// (`Derivation_`).
    fn derivation(&self) -> ProviderResult<Vec<String>>;

    /// Object qualifiers (`Qualifiers_`).
    fn qualifiers(&self) -> ProviderResult<Qualifiers>;

    /// Declared property names in schema order.
    fn property_names(&self) -> ProviderResult<Vec<String>>;

    /// One property with its current value (`Properties_(name)`).
    fn property(&self, name: &str) -> ProviderResult<PropertyDescriptor>;

    /// Assign a property value in the local copy (no commit).
    fn set_property(&self, name: &str, value: Variant) -> ProviderResult<()>;

    /// Declared method names in schema order.
    fn method_names(&self) -> ProviderResult<Vec<String>>;

    /// One method descriptor (`Methods_(name)`).
    fn method(&self, name: &str) -> ProviderResult<MethodDescriptor>;

    /// Execute a method (`ExecMethod_`); returns the out-parameters object.
    fn exec_method(
        &self,
        name: &str,
        in_parameters: Option<&[(String, Variant)]>,
    ) -> ProviderResult<ObjectHandle>;

    /// Commit local changes to the provider (`Put_`).
    fn put(&self) -> ProviderResult<()>;

    /// Provider-side value comparison (`CompareTo_`).
    fn compare_to(&self, other: &dyn RemoteObject) -> ProviderResult<bool>;

    /// Textual rendering of the object (`GetObjectText_`).
    fn object_text(&self) -> ProviderResult<String>;

    /// Related objects (`Associators_`).
    fn associators(&self, query: &AssocQuery) -> ProviderResult<Vec<ObjectHandle>>;

    /// Association objects that refer to this one (`References_`).
    fn references(&self, query: &AssocQuery) -> ProviderResult<Vec<ObjectHandle>>;

    /// New, unstored instance of this class (`SpawnInstance_`).
    fn spawn_instance(&self) -> ProviderResult<ObjectHandle>;

    /// Instances of this class (`Instances_`).
    fn instances(&self) -> ProviderResult<Vec<ObjectHandle>>;

    /// Provider-native member not modelled by the client.
    fn native(&self, name: &str) -> ProviderResult<Variant>;

    /// Downcast support for provider-side comparison.
    fn as_any(&self) -> &dyn Any;
}

/// A live notification subscription (`SWbemEventSource`).
pub trait EventSource: Send {
    /// Block for the next event (`NextEvent`); `None` waits forever.
    ///
    /// A timeout is reported as an error whose nested status is
    /// [`WBEM_E_TIMED_OUT`].
    fn next_event(&self, timeout: Option<Duration>) -> ProviderResult<ObjectHandle>;
}
