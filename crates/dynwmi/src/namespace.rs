// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Namespace: the root entry point.
//!
//! A [`Namespace`] resolves class names to [`ManagedClass`]es (retrying with
//! the `Win32_` prefix), runs queries, and sets up event watchers.
//!
//! # Example
//!
//! ```rust
//! use dynwmi::provider::memory::{ClassDef, MemoryProvider};
//! use dynwmi::Namespace;
//!
//! let provider = MemoryProvider::new("WMIHOST");
//! provider
//!     .define_class(
//!         "root/cimv2",
//!         ClassDef::builder("Win32_Service").key("Name", "string").build(),
//!     )
//!     .expect("define");
//! provider
//!     .add_instance("root/cimv2", "Win32_Service", &[("Name", "Spooler".into())])
//!     .expect("add");
//!
//! let ns = Namespace::new(provider.services("root/cimv2").expect("services"));
//! let services = ns.class("Service").expect("class").filter(&[("Name", "Spooler")]).expect("query");
//! assert_eq!(services.len(), 1);
//! ```

use crate::class::ManagedClass;
use crate::config::ClientConfig;
use crate::connect::Context;
use crate::error::{Error, Result};
use crate::object::ManagedObject;
use crate::provider::{ObjectHandle, QueryFlags, ServicesHandle};
use crate::value::Variant;
use crate::watcher::EventWatcher;
use crate::wql::{self, escape_backslashes, Filters, NotificationType};
use regex::Regex;
use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Prefix tried when a class name does not resolve as given.
pub const VENDOR_PREFIX: &str = "Win32_";

/// Event class whose subclasses are extrinsic events.
const EXTRINSIC_EVENT: &str = "__ExtrinsicEvent";

/// Services handle plus the context objects built from it inherit.
#[derive(Clone)]
pub(crate) struct Connection {
    services: ServicesHandle,
    ctx: Rc<Context>,
}

impl Connection {
    pub(crate) fn new(services: ServicesHandle, ctx: Rc<Context>) -> Self {
        Self { services, ctx }
    }

    pub(crate) fn services(&self) -> &ServicesHandle {
        &self.services
    }

    pub(crate) fn ctx(&self) -> &Rc<Context> {
        &self.ctx
    }

    /// Fetch a class by exact name.
    pub(crate) fn class(&self, name: &str) -> Result<ManagedClass> {
        let handle = self.services.get(name)?;
        ManagedClass::build(handle, self.ctx.clone(), Some(self.clone()))
    }

    pub(crate) fn raw_query(&self, wql: &str) -> Result<Vec<ObjectHandle>> {
        let wql = escape_backslashes(wql);
        self.ctx.trace("namespace", &wql);
        Ok(self
            .services
            .exec_query(&wql, QueryFlags::RETURN_IMMEDIATELY | QueryFlags::FORWARD_ONLY)?)
    }

    pub(crate) fn query(
        &self,
        wql: &str,
        instance_of: Option<&ManagedClass>,
        fields: &[&str],
    ) -> Result<Vec<ManagedObject>> {
        self.raw_query(wql)?
            .into_iter()
            .map(|handle| self.wrap(handle, instance_of.cloned(), fields))
            .collect()
    }

    pub(crate) fn wrap(
        &self,
        handle: ObjectHandle,
        instance_of: Option<ManagedClass>,
        fields: &[&str],
    ) -> Result<ManagedObject> {
        ManagedObject::build(handle, self.ctx.clone(), instance_of, Some(self.clone()), fields)
    }
}

/// Result of resolving a name on a [`Namespace`].
#[derive(Debug, Clone)]
pub enum Member {
    /// A schema class.
    Class(ManagedClass),
    /// A provider-native member of the connection.
    Passthrough(Variant),
}

struct NamespaceInner {
    connection: Connection,
    /// Keyed by the exact name that resolved.
    classes: RefCell<HashMap<String, ManagedClass>>,
    class_names: OnceCell<Vec<String>>,
}

/// A connected namespace.
///
/// Cloning is cheap and clones share the class cache.
#[derive(Clone)]
pub struct Namespace {
    inner: Rc<NamespaceInner>,
}

impl Namespace {
    /// Wrap a prebuilt connection with default settings.
    ///
    /// Association references are resolved through this connection since
    /// there is no locator.
    pub fn new(services: ServicesHandle) -> Self {
        Self::with_config(services, ClientConfig::default())
    }

    /// Wrap a prebuilt connection.
    pub fn with_config(services: ServicesHandle, config: ClientConfig) -> Self {
        Self::from_connection(Connection::new(services, Context::new(None, config)))
    }

    pub(crate) fn from_connection(connection: Connection) -> Self {
        Self {
            inner: Rc::new(NamespaceInner {
                connection,
                classes: RefCell::new(HashMap::new()),
                class_names: OnceCell::new(),
            }),
        }
    }

    /// Underlying provider connection.
    pub fn services(&self) -> &ServicesHandle {
        self.inner.connection.services()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.connection.ctx().config
    }

    fn cached_class(&self, name: &str) -> Result<ManagedClass> {
        if let Some(class) = self.inner.classes.borrow().get(name) {
            return Ok(class.clone());
        }
        let class = self.inner.connection.class(name)?;
        self.inner
            .classes
            .borrow_mut()
            .insert(name.to_string(), class.clone());
        Ok(class)
    }

    /// Resolve a class by name, then by `Win32_` + name.
    ///
    /// A class found through the prefix is cached under the prefixed name
    /// only, so a repeated lookup by the short name asks the provider again.
    /// When both fail the error of the first attempt is returned.
    pub fn class(&self, name: &str) -> Result<ManagedClass> {
        match self.cached_class(name) {
            Ok(class) => Ok(class),
            Err(first) => {
                log::trace!(
                    "[dynwmi::namespace] {} not found, retrying as {}{}",
                    name,
                    VENDOR_PREFIX,
                    name
                );
                self.cached_class(&format!("{}{}", VENDOR_PREFIX, name))
                    .map_err(|_| first)
            }
        }
    }

    /// Resolve a name as a class, falling back to the connection's own
    /// members.
    pub fn resolve(&self, name: &str) -> Result<Member> {
        match self.class(name) {
            Ok(class) => Ok(Member::Class(class)),
            Err(_) => Ok(Member::Passthrough(self.services().native(name)?)),
        }
    }

    /// Names currently in the class cache.
    pub fn class_cache_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.classes.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Fetch any object by path.
    pub fn get(&self, path: &str) -> Result<ManagedObject> {
        let handle = self.services().get(path)?;
        self.inner.connection.wrap(handle, None, &[])
    }

    /// Every instance of `class`.
    pub fn instances(&self, class: &str) -> Result<Vec<ManagedObject>> {
        self.services()
            .instances_of(class)?
            .into_iter()
            .map(|handle| self.inner.connection.wrap(handle, None, &[]))
            .collect()
    }

    /// Spawn an unsaved instance of `class` with initial values.
    pub fn new_instance(&self, class: &str, values: &[(&str, Variant)]) -> Result<ManagedObject> {
        self.class(class)?.new_instance(values)
    }

    /// Run WQL and return the raw handles.
    ///
    /// Backslashes are doubled before the text is sent.
    pub fn raw_query(&self, wql: &str) -> Result<Vec<ObjectHandle>> {
        self.inner.connection.raw_query(wql)
    }

    /// Run WQL and wrap every result.
    ///
    /// `instance_of` is recorded on each object; a non-empty `fields`
    /// restricts the properties the objects expose.
    pub fn query(
        &self,
        wql: &str,
        instance_of: Option<&ManagedClass>,
        fields: &[&str],
    ) -> Result<Vec<ManagedObject>> {
        self.inner.connection.query(wql, instance_of, fields)
    }

    /// Query `class` and return plain name/value records.
    ///
    /// All properties are read when `fields` is empty.
    pub fn fetch_as_records(
        &self,
        class: &str,
        fields: &[&str],
        filters: Filters<'_>,
    ) -> Result<Vec<Record>> {
        let wql = wql::select(class, fields, filters);
        self.raw_query(&wql)?
            .iter()
            .map(|handle| Record::read(handle, fields))
            .collect()
    }

    /// Query `class` and return one value list per result, in `fields`
    /// order.
    pub fn fetch_as_rows(
        &self,
        class: &str,
        fields: &[&str],
        filters: Filters<'_>,
    ) -> Result<Vec<Vec<Variant>>> {
        Ok(self
            .fetch_as_records(class, fields, filters)?
            .into_iter()
            .map(Record::into_values)
            .collect())
    }

    /// Watch instance operations on (or extrinsic events of) `class`.
    pub fn watch_for(&self, class: &str) -> WatchBuilder {
        WatchBuilder::new(
            self.inner.connection.clone(),
            Some(self.clone()),
            WatchTarget::Name(class.to_string()),
        )
    }

    /// Watch with a hand-written notification query.
    pub fn watch_raw(&self, wql: &str) -> WatchBuilder {
        WatchBuilder::new(
            self.inner.connection.clone(),
            Some(self.clone()),
            WatchTarget::Raw(wql.to_string()),
        )
    }

    /// Names of classes derived from `root` (all classes when empty) that
    /// match `pattern` at their start.
    pub fn subclasses_of(&self, root: &str, pattern: &str) -> Result<Vec<String>> {
        let regex = Regex::new(&format!("^(?:{})", pattern))
            .map_err(|e| Error::Config(format!("Invalid class pattern {}: {}", pattern, e)))?;
        let mut names = Vec::new();
        for handle in self.services().subclasses_of(root)? {
            let class = handle.path()?.class;
            if regex.is_match(&class) {
                names.push(class);
            }
        }
        Ok(names)
    }

    /// Every class name in the namespace, fetched once.
    pub fn classes(&self) -> Result<Vec<String>> {
        if let Some(names) = self.inner.class_names.get() {
            return Ok(names.clone());
        }
        let names = self.subclasses_of("", ".*")?;
        Ok(self.inner.class_names.get_or_init(|| names).clone())
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Namespace: {}>", self.services().display_name())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Property values of one query result, without the object machinery.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Vec<(String, Variant)>,
}

impl Record {
    fn read(handle: &ObjectHandle, fields: &[&str]) -> Result<Self> {
        let names = if fields.is_empty() {
            handle.property_names()?
        } else {
            fields.iter().map(|f| (*f).to_string()).collect()
        };
        let mut values = Vec::with_capacity(names.len());
        for name in names {
            let value = handle.property(&name)?.value;
            values.push((name, value));
        }
        Ok(Self { fields: values })
    }

    /// Value of `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&Variant> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Variant)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_values(self) -> Vec<Variant> {
        self.fields.into_iter().map(|(_, v)| v).collect()
    }
}

pub(crate) enum WatchTarget {
    Name(String),
    Class(ManagedClass),
    Raw(String),
}

/// Notification subscription under construction.
///
/// ```text
/// extrinsic:  SELECT <fields> FROM <class>[ WHERE f = 'v' AND ...]
/// intrinsic:  SELECT <fields> FROM __Instance<Type>Event WITHIN <delay>
///               WHERE TargetInstance ISA '<class>'[ AND TargetInstance.f = 'v' ...]
/// ```
pub struct WatchBuilder {
    connection: Connection,
    namespace: Option<Namespace>,
    target: WatchTarget,
    notification_type: NotificationType,
    delay_secs: u32,
    fields: Vec<String>,
    filters: Vec<(String, String)>,
    extrinsic: Option<bool>,
}

impl WatchBuilder {
    pub(crate) fn new(
        connection: Connection,
        namespace: Option<Namespace>,
        target: WatchTarget,
    ) -> Self {
        Self {
            connection,
            namespace,
            target,
            notification_type: NotificationType::default(),
            delay_secs: 1,
            fields: Vec::new(),
            filters: Vec::new(),
            extrinsic: None,
        }
    }

    /// Which instance operation to watch (default: any).
    pub fn notification_type(mut self, notification_type: NotificationType) -> Self {
        self.notification_type = notification_type;
        self
    }

    /// Provider polling interval (default: 1 s).
    pub fn delay_secs(mut self, delay_secs: u32) -> Self {
        self.delay_secs = delay_secs;
        self
    }

    /// Restrict the selected fields.
    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| (*f).to_string()).collect();
        self
    }

    /// Add an equality filter.
    pub fn filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((name.into(), value.into()));
        self
    }

    /// Override extrinsic detection (raw queries default to intrinsic).
    pub fn extrinsic(mut self, extrinsic: bool) -> Self {
        self.extrinsic = Some(extrinsic);
        self
    }

    /// The notification query and whether it targets an extrinsic event.
    pub fn build(&self) -> Result<(String, bool)> {
        let class = match &self.target {
            WatchTarget::Raw(wql) => return Ok((wql.clone(), self.extrinsic.unwrap_or(false))),
            WatchTarget::Class(class) => class.clone(),
            WatchTarget::Name(name) => match &self.namespace {
                Some(ns) => ns.class(name)?,
                None => self.connection.class(name)?,
            },
        };
        let is_extrinsic = match self.extrinsic {
            Some(extrinsic) => extrinsic,
            None => class
                .derivation()?
                .iter()
                .any(|parent| parent.eq_ignore_ascii_case(EXTRINSIC_EVENT)),
        };

        let fields: Vec<&str> = self.fields.iter().map(String::as_str).collect();
        let filters: Vec<(&str, &str)> = self
            .filters
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .collect();
        let wql = if is_extrinsic {
            wql::extrinsic_notification(class.name(), &fields, &filters)
        } else {
            wql::intrinsic_notification(
                class.name(),
                self.notification_type,
                self.delay_secs,
                &fields,
                &filters,
            )
        };
        Ok((wql, is_extrinsic))
    }

    /// Subscribe.
    pub fn start(self) -> Result<EventWatcher> {
        let (wql, is_extrinsic) = self.build()?;
        self.connection.ctx().trace("namespace", &wql);
        let source = self.connection.services().exec_notification_query(&wql)?;
        Ok(EventWatcher::new(source, is_extrinsic, self.connection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::{ClassDef, MemoryProvider, DEFAULT_NAMESPACE};

    fn namespace() -> (MemoryProvider, Namespace) {
        let provider = MemoryProvider::new("WMIHOST");
        provider
            .define_class(
                DEFAULT_NAMESPACE,
                ClassDef::builder("Win32_Directory")
                    .key("Name", "string")
                    .property("Hidden", "boolean")
                    .build(),
            )
            .expect("define");
        provider
            .define_class(
                DEFAULT_NAMESPACE,
                ClassDef::builder("Win32_PowerManagementEvent")
                    .superclass("__ExtrinsicEvent")
                    .property("EventType", "uint16")
                    .build(),
            )
            .expect("define");
        for (name, hidden) in [(r"C:\Windows", false), (r"C:\ProgramData", true)] {
            provider
                .add_instance(
                    DEFAULT_NAMESPACE,
                    "Win32_Directory",
                    &[("Name", name.into()), ("Hidden", hidden.into())],
                )
                .expect("add");
        }
        let services = provider.services(DEFAULT_NAMESPACE).expect("services");
        (provider, Namespace::new(services))
    }

    #[test]
    fn test_vendor_prefix_retry_caches_prefixed_name() {
        let (provider, ns) = namespace();
        provider.reset_stats();

        let first = ns.class("Directory").expect("retry");
        assert_eq!(provider.stats().gets, 2);
        assert_eq!(ns.class_cache_keys(), vec!["Win32_Directory".to_string()]);

        // the short name is not cached: one failed get, then a cache hit
        let again = ns.class("Directory").expect("retry");
        assert_eq!(provider.stats().gets, 3);
        assert!(first.try_eq(&again).expect("compare"));

        ns.class("Win32_Directory").expect("exact");
        assert_eq!(provider.stats().gets, 3);
    }

    #[test]
    fn test_unknown_class_falls_back_to_passthrough() {
        let (provider, ns) = namespace();
        provider
            .set_native(DEFAULT_NAMESPACE, "Security_", Variant::from("SWbemSecurity"))
            .expect("native");
        match ns.resolve("Security_").expect("resolve") {
            Member::Passthrough(value) => assert_eq!(value, Variant::from("SWbemSecurity")),
            other => panic!("unexpected member: {other:?}"),
        }
        assert!(ns.resolve("Nothing").is_err());
        assert!(matches!(ns.class("Nothing"), Err(Error::Provider { .. })));
    }

    #[test]
    fn test_raw_query_doubles_backslashes() {
        let (_provider, ns) = namespace();
        let hits = ns
            .raw_query(r"SELECT * FROM Win32_Directory WHERE Name = 'C:\Windows'")
            .expect("query");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_invalid_query_kind() {
        let (_provider, ns) = namespace();
        let err = ns.raw_query("SELEKT nothing").err().expect("error");
        assert!(err.is_invalid_query());
    }

    #[test]
    fn test_fetch_as_records_and_rows() {
        let (_provider, ns) = namespace();
        let records = ns
            .fetch_as_records("Win32_Directory", &[], &[("Hidden", "TRUE")])
            .expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].get("name"),
            Some(&Variant::from(r"C:\ProgramData"))
        );
        assert_eq!(records[0].len(), 2);

        let rows = ns
            .fetch_as_rows("Win32_Directory", &["Hidden", "Name"], &[])
            .expect("rows");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.len() == 2));
    }

    #[test]
    fn test_watch_query_shapes() {
        let (_provider, ns) = namespace();
        let (wql, extrinsic) = ns
            .watch_for("Directory")
            .notification_type(NotificationType::Creation)
            .delay_secs(5)
            .filter("Hidden", "TRUE")
            .build()
            .expect("build");
        assert!(!extrinsic);
        assert_eq!(
            wql,
            "SELECT * FROM __InstanceCreationEvent WITHIN 5 WHERE TargetInstance ISA 'Win32_Directory' AND TargetInstance.Hidden = 'TRUE'"
        );

        let (wql, extrinsic) = ns
            .watch_for("Win32_PowerManagementEvent")
            .fields(&["EventType"])
            .filter("EventType", "4")
            .build()
            .expect("build");
        assert!(extrinsic);
        assert_eq!(
            wql,
            "SELECT EventType FROM Win32_PowerManagementEvent WHERE EventType = '4'"
        );

        let raw = "SELECT * FROM __InstanceDeletionEvent WITHIN 1 WHERE TargetInstance ISA 'Win32_Directory'";
        assert_eq!(
            ns.watch_raw(raw).build().expect("raw"),
            (raw.to_string(), false)
        );
    }

    #[test]
    fn test_class_discovery_is_cached() {
        let (provider, ns) = namespace();
        let events = ns.subclasses_of("__ExtrinsicEvent", "Win32_").expect("subclasses");
        assert_eq!(events, vec!["Win32_PowerManagementEvent".to_string()]);

        let all = ns.classes().expect("classes");
        assert!(all.contains(&"Win32_Directory".to_string()));
        provider
            .define_class(DEFAULT_NAMESPACE, ClassDef::builder("Win32_Late").build())
            .expect("define");
        assert_eq!(ns.classes().expect("cached"), all);
        assert!(matches!(ns.subclasses_of("", "("), Err(Error::Config(_))));
    }

    #[test]
    fn test_new_instance_is_not_persisted() {
        let (provider, ns) = namespace();
        provider.reset_stats();
        let dir = ns
            .new_instance("Directory", &[("Name", r"C:\Temp".into())])
            .expect("spawn");
        assert!(!dir.path().expect("path").is_persisted());
        assert_eq!(provider.stats().puts, 0);
        assert_eq!(ns.instances("Win32_Directory").expect("instances").len(), 2);
    }
}
