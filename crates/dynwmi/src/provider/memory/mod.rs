// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory provider.
//!
//! A self-contained implementation of the provider traits: namespaces hold
//! class definitions (with inheritance, qualifiers, keys and methods backed
//! by closures), stored instances, and notification subscriptions. Writes
//! through `put` and [`MemoryProvider::delete_instance`] raise the matching
//! intrinsic events; [`EventSender`] raises extrinsic ones from any thread.
//!
//! Every namespace starts with the system event classes (`__Event`,
//! `__InstanceOperationEvent` and its creation/modification/deletion
//! subclasses, `__ExtrinsicEvent`). `root/cimv2` and `root/default` exist
//! from the start.
//!
//! # Example
//!
//! ```rust
//! use dynwmi::provider::memory::{ClassDef, MemoryProvider};
//!
//! let provider = MemoryProvider::new("WMIHOST");
//! provider
//!     .define_class(
//!         "root/cimv2",
//!         ClassDef::builder("Win32_Service")
//!             .key("Name", "string")
//!             .property("State", "string")
//!             .build(),
//!     )
//!     .expect("define");
//! let path = provider
//!     .add_instance("root/cimv2", "Win32_Service", &[("Name", "Spooler".into())])
//!     .expect("add");
//! assert_eq!(path, r#"\\WMIHOST\root\cimv2:Win32_Service.Name="Spooler""#);
//! ```

mod events;
mod object;
pub mod query;
mod schema;
mod snapshot;
mod store;

pub use events::{EventSender, MemoryEventSource};
pub use schema::{ClassDef, ClassDefBuilder, MethodCall, MethodDef, MethodHandler, ParamDef, PropertyDef};
pub use snapshot::{
    ClassSnapshot, InstanceSnapshot, MemorySnapshot, MethodSnapshot, NamespaceSnapshot,
    ParamSnapshot, PropertySnapshot, SnapshotValue,
};

use crate::provider::{
    moniker, Locator, ProviderError, ProviderResult, RootHandle, ServerConnection, Services,
    ServicesHandle, E_ACCESSDENIED, WBEM_E_INVALID_CLASS, WBEM_E_INVALID_NAMESPACE,
};
use crate::value::Variant;
use object::MemoryObject;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use store::{split_path, MemoryServices, NamespaceStore};

/// Namespace used when a moniker or connection names none.
pub const DEFAULT_NAMESPACE: &str = "root/cimv2";

/// Live call counters.
#[derive(Debug, Default)]
pub(crate) struct Stats {
    pub(crate) gets: AtomicUsize,
    pub(crate) puts: AtomicUsize,
    pub(crate) queries: AtomicUsize,
    pub(crate) notification_queries: AtomicUsize,
    pub(crate) method_calls: AtomicUsize,
    pub(crate) property_reads: AtomicUsize,
    pub(crate) connections: AtomicUsize,
}

/// Snapshot of provider call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderStats {
    /// `Get` calls (class and instance lookups by path).
    pub gets: usize,
    /// `Put_` calls.
    pub puts: usize,
    /// `ExecQuery` calls.
    pub queries: usize,
    /// `ExecNotificationQuery` calls.
    pub notification_queries: usize,
    /// `ExecMethod_` calls.
    pub method_calls: usize,
    /// `Properties_(name)` descriptor reads.
    pub property_reads: usize,
    /// Moniker resolutions and `ConnectServer` calls.
    pub connections: usize,
}

struct ProviderInner {
    server: String,
    stats: Arc<Stats>,
    namespaces: RwLock<Vec<Arc<NamespaceStore>>>,
    monikers: Mutex<Vec<String>>,
    connections: Mutex<Vec<ServerConnection>>,
    credentials: RwLock<Option<(String, String)>>,
}

/// In-memory provider; cheap to clone, all clones share state.
#[derive(Clone)]
pub struct MemoryProvider {
    inner: Arc<ProviderInner>,
}

fn invalid_namespace() -> ProviderError {
    ProviderError::wbem(
        WBEM_E_INVALID_NAMESPACE,
        "SWbemLocator",
        "Invalid namespace",
    )
}

impl MemoryProvider {
    /// Create a provider answering for `server`.
    pub fn new(server: impl Into<String>) -> Self {
        let provider = Self {
            inner: Arc::new(ProviderInner {
                server: server.into(),
                stats: Arc::new(Stats::default()),
                namespaces: RwLock::new(Vec::new()),
                monikers: Mutex::new(Vec::new()),
                connections: Mutex::new(Vec::new()),
                credentials: RwLock::new(None),
            }),
        };
        for name in [DEFAULT_NAMESPACE, "root/default"] {
            // system classes always register
            let _ = provider.add_namespace(name);
        }
        provider
    }

    /// Server name used in object paths.
    pub fn server(&self) -> &str {
        &self.inner.server
    }

    /// Create a namespace if it does not exist yet.
    pub fn add_namespace(&self, name: &str) -> ProviderResult<()> {
        if self.namespace(name).is_ok() {
            return Ok(());
        }
        let store = NamespaceStore::new(name, &self.inner.server, self.inner.stats.clone())?;
        self.inner.namespaces.write().push(store);
        Ok(())
    }

    fn namespace(&self, name: &str) -> ProviderResult<Arc<NamespaceStore>> {
        let wanted = name.replace('\\', "/");
        let wanted = wanted.trim_matches('/');
        self.inner
            .namespaces
            .read()
            .iter()
            .find(|ns| ns.name.eq_ignore_ascii_case(wanted))
            .cloned()
            .ok_or_else(invalid_namespace)
    }

    /// Names of all namespaces.
    pub fn namespaces(&self) -> Vec<String> {
        self.inner
            .namespaces
            .read()
            .iter()
            .map(|ns| ns.name.clone())
            .collect()
    }

    /// Register a class; its superclass must already be registered.
    pub fn define_class(&self, namespace: &str, class: ClassDef) -> ProviderResult<()> {
        self.namespace(namespace)?.define(class)
    }

    /// Store an instance built from `values`; returns its full path.
    ///
    /// Unlisted properties take their declared defaults.
    pub fn add_instance(
        &self,
        namespace: &str,
        class: &str,
        values: &[(&str, Variant)],
    ) -> ProviderResult<String> {
        let ns = self.namespace(namespace)?;
        let def = ns.class(class).ok_or_else(|| {
            ProviderError::wbem(WBEM_E_INVALID_CLASS, "SWbemServicesEx", "Invalid class")
        })?;
        let instance = MemoryObject::spawn(&ns, def.clone());
        for (name, value) in values {
            instance.set_value(name, value.clone());
        }
        let values = values_of(&instance);
        let rel_path = ns.store(&def, values)?;
        Ok(ns.full_path(&rel_path))
    }

    /// Remove a stored instance; raises `__InstanceDeletionEvent`.
    pub fn delete_instance(&self, namespace: &str, path: &str) -> ProviderResult<()> {
        let ns = self.namespace(namespace)?;
        ns.remove(split_path(path).1)
    }

    /// Expose a provider-specific member on a namespace connection.
    pub fn set_native(&self, namespace: &str, name: &str, value: Variant) -> ProviderResult<()> {
        self.namespace(namespace)?.set_native(name, value);
        Ok(())
    }

    /// Require these credentials on `ConnectServer` when a user is given.
    pub fn set_credentials(&self, user: &str, password: &str) {
        *self.inner.credentials.write() = Some((user.to_string(), password.to_string()));
    }

    /// Handle for raising extrinsic events in a namespace.
    pub fn event_sender(&self, namespace: &str) -> ProviderResult<EventSender> {
        Ok(EventSender::new(self.namespace(namespace)?))
    }

    /// Direct connection to a namespace, bypassing monikers.
    pub fn services(&self, namespace: &str) -> ProviderResult<ServicesHandle> {
        Ok(Arc::new(MemoryServices::new(self.namespace(namespace)?)))
    }

    /// Current call counters.
    pub fn stats(&self) -> ProviderStats {
        let s = &self.inner.stats;
        ProviderStats {
            gets: s.gets.load(Ordering::Relaxed),
            puts: s.puts.load(Ordering::Relaxed),
            queries: s.queries.load(Ordering::Relaxed),
            notification_queries: s.notification_queries.load(Ordering::Relaxed),
            method_calls: s.method_calls.load(Ordering::Relaxed),
            property_reads: s.property_reads.load(Ordering::Relaxed),
            connections: s.connections.load(Ordering::Relaxed),
        }
    }

    /// Zero all call counters.
    pub fn reset_stats(&self) {
        let s = &self.inner.stats;
        for counter in [
            &s.gets,
            &s.puts,
            &s.queries,
            &s.notification_queries,
            &s.method_calls,
            &s.property_reads,
            &s.connections,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Every moniker resolved so far, in order.
    pub fn monikers(&self) -> Vec<String> {
        self.inner.monikers.lock().clone()
    }

    /// Every `ConnectServer` request so far, in order.
    pub fn connections(&self) -> Vec<ServerConnection> {
        self.inner.connections.lock().clone()
    }
}

fn values_of(object: &MemoryObject) -> Vec<Variant> {
    object
        .class_def()
        .properties
        .iter()
        .map(|p| object.value(&p.name).unwrap_or_default())
        .collect()
}

/// Split a moniker into namespace and optional object path.
fn parse_moniker(moniker: &str) -> (String, Option<String>) {
    let parts = moniker::parse(moniker);
    let namespace = parts
        .namespace
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    (namespace, parts.object)
}

impl Locator for MemoryProvider {
    fn get_object(&self, moniker: &str) -> ProviderResult<RootHandle> {
        self.inner.stats.connections.fetch_add(1, Ordering::Relaxed);
        self.inner.monikers.lock().push(moniker.to_string());
        let (namespace, object) = parse_moniker(moniker);
        let services = MemoryServices::new(self.namespace(&namespace)?);
        match object {
            Some(path) => Ok(RootHandle::Object(services.get(&path)?)),
            None => Ok(RootHandle::Services(Arc::new(services))),
        }
    }

    fn connect_server(&self, request: &ServerConnection) -> ProviderResult<ServicesHandle> {
        self.inner.stats.connections.fetch_add(1, Ordering::Relaxed);
        self.inner.connections.lock().push(request.clone());
        if !request.user.is_empty() {
            if let Some((user, password)) = self.inner.credentials.read().as_ref() {
                if !user.eq_ignore_ascii_case(&request.user) || *password != request.password {
                    return Err(ProviderError::new(E_ACCESSDENIED, "Access is denied."));
                }
            }
        }
        let namespace = if request.namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            request.namespace.as_str()
        };
        self.services(namespace)
    }
}
