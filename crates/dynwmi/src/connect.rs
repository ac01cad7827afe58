// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection construction.
//!
//! A connection is opened from a [`ConnectionOptions`] either through an
//! explicit moniker, through `ConnectServer` when credentials are given, or
//! through a moniker assembled by [`construct_moniker`]:
//!
//! ```text
//! winmgmts:{impersonationLevel=X,authenticationLevel=Y,authority=A,(priv1, priv2)}//host/namespace:suffix
//! ```
//!
//! Whatever the provider hands back is classified once by [`classify`] into
//! an [`Entry`]: a namespace, a class or an instance.

use crate::class::ManagedClass;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::namespace::{Connection, Namespace};
use crate::object::{ManagedObject, ObjectKind};
use crate::provider::{Locator, ObjectPath, RootHandle, ServerConnection};
use serde::Deserialize;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Moniker scheme.
pub const PROTOCOL: &str = "winmgmts:";
/// Impersonation level used when none is given.
pub const IMPERSONATION_LEVEL: &str = "impersonate";
/// Authentication level used when none is given.
pub const AUTHENTICATION_LEVEL: &str = "default";
/// Namespace of the registry provider.
pub const REGISTRY_NAMESPACE: &str = "root/default";
/// Registry provider class.
pub const REGISTRY_CLASS: &str = "StdRegProv";

/// State shared by everything built from one connection.
pub(crate) struct Context {
    /// Used to resolve association references; absent for detached objects.
    pub(crate) locator: Option<Arc<dyn Locator>>,
    pub(crate) config: ClientConfig,
}

impl Context {
    pub(crate) fn new(locator: Option<Arc<dyn Locator>>, config: ClientConfig) -> Rc<Self> {
        Rc::new(Self { locator, config })
    }

    /// No locator, default config.
    pub(crate) fn detached() -> Rc<Self> {
        Self::new(None, ClientConfig::default())
    }

    /// Emit query text when tracing is enabled.
    pub(crate) fn trace(&self, component: &str, text: &str) {
        if self.config.debug {
            log::debug!("[dynwmi::{}] {}", component, text);
        }
    }
}

/// How to reach a namespace or object.
///
/// Empty strings are treated as absent. `user`/`password` cannot be combined
/// with impersonation, authentication, privileges or a suffix.
///
/// # Example
///
/// ```rust
/// use dynwmi::ConnectionOptions;
///
/// let options = ConnectionOptions::new()
///     .computer("server01")
///     .privileges(&["Security"])
///     .namespace("cimv2");
/// assert_eq!(options.computer.as_deref(), Some("server01"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Target host; `.` (local) when absent.
    pub computer: Option<String>,
    pub impersonation_level: Option<String>,
    pub authentication_level: Option<String>,
    /// Kerberos or NTLM authority; only used with a computer name.
    pub authority: Option<String>,
    pub privileges: Vec<String>,
    /// Complete moniker; overrides every other field except `config`.
    pub moniker: Option<String>,
    /// Namespace, `root/` is prepended when missing.
    pub namespace: Option<String>,
    /// Object path appended after `:`.
    pub suffix: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    #[serde(skip)]
    pub config: ClientConfig,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

impl ConnectionOptions {
    /// Options for the local default namespace.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn computer(mut self, computer: impl Into<String>) -> Self {
        self.computer = Some(computer.into());
        self
    }

    pub fn impersonation_level(mut self, level: impl Into<String>) -> Self {
        self.impersonation_level = Some(level.into());
        self
    }

    pub fn authentication_level(mut self, level: impl Into<String>) -> Self {
        self.authentication_level = Some(level.into());
        self
    }

    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    /// Privileges to enable, `!` prefixed to disable.
    pub fn privileges(mut self, privileges: &[&str]) -> Self {
        self.privileges = privileges.iter().map(|p| (*p).to_string()).collect();
        self
    }

    pub fn moniker(mut self, moniker: impl Into<String>) -> Self {
        self.moniker = Some(moniker.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Connect as `user` through `ConnectServer`.
    pub fn user(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }
}

/// Prefix `root/` unless the namespace already starts at the root; both
/// separators are accepted.
pub fn normalize_namespace(namespace: &str) -> String {
    let mut parts: Vec<&str> = namespace.split(['/', '\\']).collect();
    if !parts[0].eq_ignore_ascii_case("root") {
        parts.insert(0, "root");
    }
    parts.join("/")
}

/// Assemble a moniker from the fields that are present.
///
/// No defaults are applied here; [`connect`] fills in the impersonation and
/// authentication levels and the local computer.
pub fn construct_moniker(options: &ConnectionOptions) -> String {
    let computer = present(&options.computer);
    let mut security = Vec::new();
    if let Some(level) = present(&options.impersonation_level) {
        security.push(format!("impersonationLevel={}", level));
    }
    if let Some(level) = present(&options.authentication_level) {
        security.push(format!("authenticationLevel={}", level));
    }
    // authority is rejected for the local machine
    if let (Some(authority), Some(_)) = (present(&options.authority), computer) {
        security.push(format!("authority={}", authority));
    }
    if !options.privileges.is_empty() {
        security.push(format!("({})", options.privileges.join(", ")));
    }

    let mut moniker = String::from(PROTOCOL);
    if !security.is_empty() {
        moniker.push('{');
        moniker.push_str(&security.join(","));
        moniker.push_str("}/");
    }
    if let Some(computer) = computer {
        moniker.push('/');
        moniker.push_str(computer);
        moniker.push('/');
    }
    if let Some(namespace) = present(&options.namespace) {
        moniker.push_str(namespace);
    }
    if let Some(suffix) = present(&options.suffix) {
        moniker.push(':');
        moniker.push_str(suffix);
    }
    moniker
}

/// What a connection resolved to.
#[derive(Clone)]
pub enum Entry {
    Namespace(Namespace),
    Class(ManagedClass),
    Instance(ManagedObject),
}

impl Entry {
    pub fn into_namespace(self) -> Option<Namespace> {
        match self {
            Entry::Namespace(ns) => Some(ns),
            _ => None,
        }
    }

    pub fn into_class(self) -> Option<ManagedClass> {
        match self {
            Entry::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn into_instance(self) -> Option<ManagedObject> {
        match self {
            Entry::Instance(object) => Some(object),
            _ => None,
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Namespace(ns) => fmt::Debug::fmt(ns, f),
            Entry::Class(class) => fmt::Debug::fmt(class, f),
            Entry::Instance(object) => fmt::Debug::fmt(object, f),
        }
    }
}

/// Classify a provider root.
///
/// A namespace connection becomes a [`Namespace`]; an object whose path
/// designates a class becomes a [`ManagedClass`], bound to its own namespace
/// when the context can resolve monikers; anything else is an instance.
pub(crate) fn classify(root: RootHandle, ctx: &Rc<Context>) -> Result<Entry> {
    match root {
        RootHandle::Services(services) => Ok(Entry::Namespace(Namespace::from_connection(
            Connection::new(services, ctx.clone()),
        ))),
        RootHandle::Object(handle) => {
            let path = handle.path()?;
            match ObjectKind::of(&path) {
                ObjectKind::Class => {
                    let connection = match ctx.locator.as_ref() {
                        Some(locator) => Some(class_connection(locator.as_ref(), &path, ctx)?),
                        None => None,
                    };
                    Ok(Entry::Class(ManagedClass::build(handle, ctx.clone(), connection)?))
                }
                ObjectKind::Instance => Ok(Entry::Instance(ManagedObject::build(
                    handle,
                    ctx.clone(),
                    None,
                    None,
                    &[],
                )?)),
            }
        }
    }
}

/// Open the namespace a class lives in, from the moniker form of its path.
fn class_connection(locator: &dyn Locator, path: &ObjectPath, ctx: &Rc<Context>) -> Result<Connection> {
    let moniker = match path
        .display_name
        .strip_suffix(path.class.as_str())
        .and_then(|rest| rest.strip_suffix(':'))
    {
        Some(namespace) => namespace.to_string(),
        None => format!("{}//{}/{}", PROTOCOL, path.server, path.namespace),
    };
    ctx.trace("connect", &moniker);
    match locator.get_object(&moniker)? {
        RootHandle::Services(services) => Ok(Connection::new(services, ctx.clone())),
        RootHandle::Object(_) => Err(Error::InvalidConnection(format!(
            "{} did not resolve to a namespace",
            moniker
        ))),
    }
}

/// Resolve a moniker through the context's locator.
pub(crate) fn open_moniker(ctx: &Rc<Context>, moniker: &str) -> Result<Entry> {
    let Some(locator) = ctx.locator.as_ref() else {
        return Err(Error::InvalidConnection(format!(
            "no locator to resolve {}",
            moniker
        )));
    };
    let moniker = if moniker.starts_with(PROTOCOL) {
        moniker.to_string()
    } else {
        format!("{}{}", PROTOCOL, moniker)
    };
    ctx.trace("connect", &moniker);
    let root = locator.get_object(&moniker)?;
    classify(root, ctx)
}

/// Open a connection.
///
/// # Example
///
/// ```rust
/// use dynwmi::provider::memory::MemoryProvider;
/// use dynwmi::{connect, ConnectionOptions};
/// use std::sync::Arc;
///
/// let provider = Arc::new(MemoryProvider::new("WMIHOST"));
/// let entry = connect(provider, &ConnectionOptions::new()).expect("connect");
/// assert!(entry.into_namespace().is_some());
/// ```
///
/// # Errors
///
/// [`Error::InvalidConnection`] when credentials are combined with security
/// settings; translated provider errors otherwise.
pub fn connect(locator: Arc<dyn Locator>, options: &ConnectionOptions) -> Result<Entry> {
    let ctx = Context::new(Some(locator.clone()), options.config.clone());

    if let Some(moniker) = present(&options.moniker) {
        return open_moniker(&ctx, moniker);
    }

    let namespace = present(&options.namespace).map(normalize_namespace);

    if let Some(user) = present(&options.user) {
        if present(&options.impersonation_level).is_some()
            || present(&options.authentication_level).is_some()
            || !options.privileges.is_empty()
            || present(&options.suffix).is_some()
        {
            return Err(Error::InvalidConnection(
                "You can't specify an impersonation, authentication or privilege as well as a username"
                    .to_string(),
            ));
        }
        let request = ServerConnection {
            server: present(&options.computer).unwrap_or(".").to_string(),
            namespace: namespace.unwrap_or_default(),
            user: user.to_string(),
            password: options.password.clone().unwrap_or_default(),
            authority: options.authority.clone().unwrap_or_default(),
            ..ServerConnection::default()
        };
        ctx.trace(
            "connect",
            &format!("ConnectServer {} {} as {}", request.server, request.namespace, request.user),
        );
        let services = locator.connect_server(&request)?;
        return Ok(Entry::Namespace(Namespace::from_connection(Connection::new(
            services, ctx,
        ))));
    }

    let resolved = ConnectionOptions {
        computer: Some(present(&options.computer).unwrap_or(".").to_string()),
        impersonation_level: Some(
            present(&options.impersonation_level)
                .unwrap_or(IMPERSONATION_LEVEL)
                .to_string(),
        ),
        authentication_level: Some(
            present(&options.authentication_level)
                .unwrap_or(AUTHENTICATION_LEVEL)
                .to_string(),
        ),
        namespace,
        ..options.clone()
    };
    let moniker = construct_moniker(&resolved);
    open_moniker(&ctx, &moniker)
}

/// Connect to the registry provider class (`root/default:StdRegProv`).
pub fn registry(locator: Arc<dyn Locator>, options: &ConnectionOptions) -> Result<ManagedClass> {
    let ctx = Context::new(Some(locator), options.config.clone());
    let moniker = match present(&options.moniker) {
        Some(moniker) => moniker.to_string(),
        None => construct_moniker(&ConnectionOptions {
            impersonation_level: Some(
                present(&options.impersonation_level)
                    .unwrap_or("Impersonate")
                    .to_string(),
            ),
            authentication_level: Some(
                present(&options.authentication_level)
                    .unwrap_or("Default")
                    .to_string(),
            ),
            namespace: Some(REGISTRY_NAMESPACE.to_string()),
            suffix: Some(REGISTRY_CLASS.to_string()),
            ..options.clone()
        }),
    };
    match open_moniker(&ctx, &moniker)? {
        Entry::Class(class) => Ok(class),
        other => Err(Error::InvalidConnection(format!(
            "{} did not resolve to a class: {:?}",
            moniker, other
        ))),
    }
}
