// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Managed objects.
//!
//! A [`ManagedObject`] wraps one remote class or instance. The declared
//! property and method names are read once, at construction; each name owns
//! a slot that is filled on first access and never reverts:
//!
//! ```text
//! resolve(name)
//!   |-- declared property --> slot (descriptor fetched once) --> transform --> value
//!   |                                                     \--> association: reference
//!   |-- declared method   --> slot (invoker built once)
//!   \-- anything else     --> provider-native member
//! ```
//!
//! Objects are single-threaded (`Rc`/`RefCell`); the handles they wrap are
//! not.

use crate::class::ManagedClass;
use crate::connect::{self, Context, Entry};
use crate::error::{Error, Result};
use crate::method::{MethodInvoker, MethodOutput};
use crate::namespace::Connection;
use crate::provider::{
    AssocQuery, ObjectHandle, ObjectPath, PropertyDescriptor, Qualifiers, RootHandle,
    TraversalMode,
};
use crate::value::Variant;
use std::cell::{OnceCell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Value conversion applied to a property on every read.
pub type PropertyTransform = Rc<dyn Fn(Variant) -> Variant>;

/// Per-property read transforms, keyed by property name (case-insensitive).
#[derive(Clone, Default)]
pub struct PropertyMap {
    transforms: BTreeMap<String, PropertyTransform>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transform for `name`.
    pub fn with<F>(mut self, name: &str, transform: F) -> Self
    where
        F: Fn(Variant) -> Variant + 'static,
    {
        self.transforms
            .insert(name.to_ascii_lowercase(), Rc::new(transform));
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropertyTransform> {
        self.transforms.get(&name.to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl fmt::Debug for PropertyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.transforms.keys()).finish()
    }
}

/// Whether an object is a schema class or a data instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Class,
    Instance,
}

impl ObjectKind {
    /// Classify from the object's path.
    pub fn of(path: &ObjectPath) -> Self {
        if path.is_class {
            ObjectKind::Class
        } else {
            ObjectKind::Instance
        }
    }
}

/// Property read result.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    /// Plain value, after any transform.
    Value(Variant),
    /// Path held by an association property, resolved.
    Reference(Entry),
}

/// Result of [`ManagedObject::resolve`].
#[derive(Debug, Clone)]
pub enum Resolved {
    Property(PropertyValue),
    Method(Rc<MethodInvoker>),
    /// Provider-native member not modelled by the object.
    Passthrough(Variant),
}

struct PropertySlot {
    name: String,
    descriptor: RefCell<Option<PropertyDescriptor>>,
}

struct MethodSlot {
    name: String,
    invoker: RefCell<Option<Rc<MethodInvoker>>>,
}

struct ObjectInner {
    handle: ObjectHandle,
    ctx: Rc<Context>,
    kind: ObjectKind,
    properties: Vec<PropertySlot>,
    methods: Vec<MethodSlot>,
    qualifiers: Qualifiers,
    is_association: bool,
    instance_of: Option<ManagedClass>,
    connection: Option<Connection>,
    property_map: RefCell<PropertyMap>,
    keys: OnceCell<Vec<String>>,
    associated_classes: OnceCell<Vec<(String, ManagedClass)>>,
}

/// A remote class or instance with lazily resolved members.
///
/// Cloning is cheap; clones share the caches.
#[derive(Clone)]
pub struct ManagedObject {
    inner: Rc<ObjectInner>,
}

impl ManagedObject {
    /// Wrap a raw handle with no namespace and default settings.
    pub fn new(handle: ObjectHandle) -> Result<Self> {
        Self::build(handle, Context::detached(), None, None, &[])
    }

    /// Read the member names and qualifiers of `handle`.
    ///
    /// A non-empty `fields` replaces the declared property set. The
    /// connection is inherited from `instance_of` when not given.
    pub(crate) fn build(
        handle: ObjectHandle,
        ctx: Rc<Context>,
        instance_of: Option<ManagedClass>,
        connection: Option<Connection>,
        fields: &[&str],
    ) -> Result<Self> {
        let kind = ObjectKind::of(&handle.path()?);
        let property_names = if fields.is_empty() {
            handle.property_names()?
        } else {
            fields.iter().map(|f| (*f).to_string()).collect()
        };
        let properties = property_names
            .into_iter()
            .map(|name| PropertySlot {
                name,
                descriptor: RefCell::new(None),
            })
            .collect();
        let methods = handle
            .method_names()?
            .into_iter()
            .map(|name| MethodSlot {
                name,
                invoker: RefCell::new(None),
            })
            .collect();
        let qualifiers = handle.qualifiers()?;
        let is_association = qualifiers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("Association"));
        let connection =
            connection.or_else(|| instance_of.as_ref().and_then(|c| c.connection().cloned()));

        Ok(Self {
            inner: Rc::new(ObjectInner {
                handle,
                ctx,
                kind,
                properties,
                methods,
                qualifiers,
                is_association,
                instance_of,
                connection,
                property_map: RefCell::new(PropertyMap::default()),
                keys: OnceCell::new(),
                associated_classes: OnceCell::new(),
            }),
        })
    }

    /// Install read transforms.
    #[must_use]
    pub fn with_property_map(self, map: PropertyMap) -> Self {
        *self.inner.property_map.borrow_mut() = map;
        self
    }

    pub(crate) fn ctx(&self) -> &Rc<Context> {
        &self.inner.ctx
    }

    /// Underlying provider handle.
    pub fn handle(&self) -> &ObjectHandle {
        &self.inner.handle
    }

    pub fn kind(&self) -> ObjectKind {
        self.inner.kind
    }

    /// True when the class carries the `Association` qualifier.
    pub fn is_association(&self) -> bool {
        self.inner.is_association
    }

    /// Class this object was produced from, when known.
    pub fn instance_of(&self) -> Option<&ManagedClass> {
        self.inner.instance_of.as_ref()
    }

    pub fn qualifiers(&self) -> &Qualifiers {
        &self.inner.qualifiers
    }

    /// Declared property names.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.inner.properties.iter().map(|s| s.name.as_str())
    }

    /// Declared method names.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.inner.methods.iter().map(|s| s.name.as_str())
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property_slot(name).is_some()
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.method_slot(name).is_some()
    }

    /// Current path; empty for instances that were never stored.
    pub fn path(&self) -> Result<ObjectPath> {
        Ok(self.inner.handle.path()?)
    }

    /// Superclasses, most specific first.
    pub fn derivation(&self) -> Result<Vec<String>> {
        Ok(self.inner.handle.derivation()?)
    }

    fn property_slot(&self, name: &str) -> Option<&PropertySlot> {
        self.inner
            .properties
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    fn method_slot(&self, name: &str) -> Option<&MethodSlot> {
        self.inner
            .methods
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    fn owner_name(&self) -> String {
        match self.inner.handle.path() {
            Ok(path) if !path.path.is_empty() => path.path,
            Ok(path) => path.class,
            Err(_) => "object".to_string(),
        }
    }

    fn not_a_property(&self, name: &str) -> Error {
        Error::AttributeNotFound {
            name: name.to_string(),
            owner: self.owner_name(),
        }
    }

    /// Cached descriptor value, fetching the descriptor on first use.
    fn slot_value(&self, slot: &PropertySlot) -> Result<Variant> {
        if let Some(desc) = slot.descriptor.borrow().as_ref() {
            return Ok(desc.value.clone());
        }
        let desc = self.inner.handle.property(&slot.name)?;
        let value = desc.value.clone();
        *slot.descriptor.borrow_mut() = Some(desc);
        Ok(value)
    }

    fn transformed(&self, slot: &PropertySlot) -> Result<Variant> {
        let value = self.slot_value(slot)?;
        Ok(match self.inner.property_map.borrow().get(&slot.name) {
            Some(transform) => transform(value),
            None => value,
        })
    }

    /// Resolve `name` to a property value, a method or a native member.
    ///
    /// Properties of association objects hold paths; string values are
    /// resolved to the object they name.
    pub fn resolve(&self, name: &str) -> Result<Resolved> {
        if let Some(slot) = self.property_slot(name) {
            let value = self.transformed(slot)?;
            if self.inner.is_association {
                if let Some(path) = value.as_str().filter(|p| !p.is_empty()) {
                    let entry = self.open_reference(path)?;
                    return Ok(Resolved::Property(PropertyValue::Reference(entry)));
                }
            }
            return Ok(Resolved::Property(PropertyValue::Value(value)));
        }
        if let Some(slot) = self.method_slot(name) {
            return Ok(Resolved::Method(self.invoker(slot)?));
        }
        Ok(Resolved::Passthrough(self.inner.handle.native(name)?))
    }

    fn open_reference(&self, path: &str) -> Result<Entry> {
        if self.inner.ctx.locator.is_some() {
            return connect::open_moniker(&self.inner.ctx, path);
        }
        match &self.inner.connection {
            Some(conn) => {
                conn.ctx().trace("object", path);
                let handle = conn.services().get(path)?;
                connect::classify(RootHandle::Object(handle), conn.ctx())
            }
            None => Err(Error::NoNamespace(self.owner_name())),
        }
    }

    /// Value of a declared property, after any transform.
    ///
    /// Association paths are returned as stored; see [`Self::reference`].
    pub fn property(&self, name: &str) -> Result<Variant> {
        let slot = self
            .property_slot(name)
            .ok_or_else(|| self.not_a_property(name))?;
        self.transformed(slot)
    }

    /// Object named by the path held in property `name`.
    pub fn reference(&self, name: &str) -> Result<Entry> {
        let value = self.property(name)?;
        match value.as_str() {
            Some(path) if !path.is_empty() => self.open_reference(path),
            _ => Err(self.not_a_property(name)),
        }
    }

    fn invoker(&self, slot: &MethodSlot) -> Result<Rc<MethodInvoker>> {
        if let Some(invoker) = slot.invoker.borrow().as_ref() {
            return Ok(invoker.clone());
        }
        let invoker = Rc::new(MethodInvoker::new(self.inner.handle.clone(), &slot.name)?);
        *slot.invoker.borrow_mut() = Some(invoker.clone());
        Ok(invoker)
    }

    /// Invoker for a declared method.
    pub fn method(&self, name: &str) -> Result<Rc<MethodInvoker>> {
        let slot = self.method_slot(name).ok_or_else(|| Error::AttributeNotFound {
            name: name.to_string(),
            owner: self.owner_name(),
        })?;
        self.invoker(slot)
    }

    /// Invoke a declared method.
    pub fn call(
        &self,
        name: &str,
        args: &[Variant],
        named: &[(&str, Variant)],
    ) -> Result<MethodOutput> {
        self.method(name)?.call(args, named)
    }

    fn write_slot(&self, slot: &PropertySlot, value: Variant) -> Result<()> {
        self.slot_value(slot)?;
        self.inner.handle.set_property(&slot.name, value.clone())?;
        if let Some(desc) = slot.descriptor.borrow_mut().as_mut() {
            desc.value = value;
        }
        Ok(())
    }

    fn commit_if_persisted(&self) -> Result<()> {
        if self.inner.handle.path()?.is_persisted() {
            self.inner.handle.put()?;
        }
        Ok(())
    }

    /// Write a declared property; stored objects are committed at once.
    ///
    /// # Errors
    ///
    /// [`Error::AttributeNotFound`] when `name` is not a declared property,
    /// with nothing written.
    pub fn set(&self, name: &str, value: impl Into<Variant>) -> Result<()> {
        let slot = self
            .property_slot(name)
            .ok_or_else(|| self.not_a_property(name))?;
        self.write_slot(slot, value.into())?;
        self.commit_if_persisted()
    }

    /// Write several properties and commit once.
    ///
    /// Every name is checked before anything is written: one undeclared
    /// name fails the whole call with no local or remote change.
    pub fn set_many(&self, values: &[(&str, Variant)]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut slots = Vec::with_capacity(values.len());
        for (name, _) in values {
            slots.push(
                self.property_slot(name)
                    .ok_or_else(|| self.not_a_property(name))?,
            );
        }
        for (slot, (_, value)) in slots.into_iter().zip(values) {
            self.write_slot(slot, value.clone())?;
        }
        self.commit_if_persisted()
    }

    /// Commit local changes.
    pub fn put(&self) -> Result<()> {
        Ok(self.inner.handle.put()?)
    }

    /// Names of the key properties, computed once.
    pub fn keys(&self) -> Result<Vec<String>> {
        if let Some(keys) = self.inner.keys.get() {
            return Ok(keys.clone());
        }
        let mut keys = Vec::new();
        for name in self.inner.handle.property_names()? {
            let is_key = match self.property_slot(&name) {
                Some(slot) => {
                    self.slot_value(slot)?;
                    slot.descriptor
                        .borrow()
                        .as_ref()
                        .is_some_and(PropertyDescriptor::is_key)
                }
                None => self.inner.handle.property(&name)?.is_key(),
            };
            if is_key {
                keys.push(name);
            }
        }
        Ok(self.inner.keys.get_or_init(|| keys).clone())
    }

    /// Provider-side comparison.
    pub fn try_eq(&self, other: &ManagedObject) -> Result<bool> {
        Ok(self
            .inner
            .handle
            .compare_to(other.inner.handle.as_ref())?)
    }

    /// Compare with an arbitrary value; only objects are comparable.
    ///
    /// # Errors
    ///
    /// [`Error::EqualityTypeMismatch`] for anything but [`Variant::Object`].
    pub fn try_eq_value(&self, other: &Variant) -> Result<bool> {
        match other {
            Variant::Object(handle) => Ok(self.inner.handle.compare_to(handle.as_ref())?),
            other => Err(Error::EqualityTypeMismatch(other.type_name().to_string())),
        }
    }

    fn traversal_mode(&self) -> TraversalMode {
        match self.inner.kind {
            ObjectKind::Class => TraversalMode::SchemaOnly,
            ObjectKind::Instance => TraversalMode::ClassesOnly,
        }
    }

    fn wrap_all(&self, handles: Vec<ObjectHandle>) -> Result<Vec<ManagedObject>> {
        handles
            .into_iter()
            .map(|h| {
                ManagedObject::build(h, self.inner.ctx.clone(), None, self.inner.connection.clone(), &[])
            })
            .collect()
    }

    fn wrap_classes(&self, handles: Vec<ObjectHandle>) -> Result<Vec<ManagedClass>> {
        handles
            .into_iter()
            .map(|h| ManagedClass::build(h, self.inner.ctx.clone(), self.inner.connection.clone()))
            .collect()
    }

    /// Objects related to this one, optionally restricted by association
    /// class and result class (empty = any).
    pub fn associators(&self, assoc_class: &str, result_class: &str) -> Result<Vec<ManagedObject>> {
        let query = AssocQuery {
            assoc_class: assoc_class.to_string(),
            result_class: result_class.to_string(),
            mode: None,
        };
        self.wrap_all(self.inner.handle.associators(&query)?)
    }

    /// Association objects referring to this one, optionally restricted by
    /// association class.
    pub fn references(&self, result_class: &str) -> Result<Vec<ManagedObject>> {
        let query = AssocQuery {
            result_class: result_class.to_string(),
            ..AssocQuery::default()
        };
        self.wrap_all(self.inner.handle.references(&query)?)
    }

    /// Classes associated with this object's class, by name; fetched once.
    pub fn associated_classes(&self) -> Result<Vec<(String, ManagedClass)>> {
        if let Some(classes) = self.inner.associated_classes.get() {
            return Ok(classes.clone());
        }
        let query = AssocQuery {
            mode: Some(self.traversal_mode()),
            ..AssocQuery::default()
        };
        let classes = self
            .wrap_classes(self.inner.handle.associators(&query)?)?
            .into_iter()
            .map(|class| (class.name().to_string(), class))
            .collect();
        Ok(self.inner.associated_classes.get_or_init(|| classes).clone())
    }

    /// Association classes that refer to this object's class.
    pub fn referenced_classes(&self, result_class: &str) -> Result<Vec<ManagedClass>> {
        let query = AssocQuery {
            result_class: result_class.to_string(),
            mode: Some(self.traversal_mode()),
            ..AssocQuery::default()
        };
        self.wrap_classes(self.inner.handle.references(&query)?)
    }
}

impl PartialEq for ManagedObject {
    fn eq(&self, other: &Self) -> bool {
        self.try_eq(other).unwrap_or_else(|e| {
            log::debug!("[dynwmi::object] comparison failed: {}", e);
            false
        })
    }
}

impl fmt::Display for ManagedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.handle.object_text() {
            Ok(text) => f.write_str(&text),
            Err(_) => f.write_str(&self.owner_name()),
        }
    }
}

impl fmt::Debug for ManagedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<ManagedObject: {}>", self.owner_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::{ClassDef, MemoryProvider, MethodDef, DEFAULT_NAMESPACE};
    use crate::Namespace;

    fn provider() -> MemoryProvider {
        let provider = MemoryProvider::new("WMIHOST");
        provider
            .define_class(
                DEFAULT_NAMESPACE,
                ClassDef::builder("Win32_Service")
                    .key("Name", "string")
                    .property("StartMode", "string")
                    .property("ProcessId", "uint32")
                    .method(
                        MethodDef::new("StopService")
                            .output("ReturnValue", "uint32")
                            .returns(vec![("ReturnValue".into(), 0u32.into())]),
                    )
                    .build(),
            )
            .expect("define service");
        provider
            .define_class(
                DEFAULT_NAMESPACE,
                ClassDef::builder("Win32_Process")
                    .key("Handle", "string")
                    .property("Name", "string")
                    .build(),
            )
            .expect("define process");
        provider
            .define_class(
                DEFAULT_NAMESPACE,
                ClassDef::builder("Win32_ServiceProcess")
                    .association()
                    .key("Service", "ref:Win32_Service")
                    .key("Process", "ref:Win32_Process")
                    .build(),
            )
            .expect("define association");
        let service = provider
            .add_instance(
                DEFAULT_NAMESPACE,
                "Win32_Service",
                &[
                    ("Name", "Spooler".into()),
                    ("StartMode", "Auto".into()),
                    ("ProcessId", 1820u32.into()),
                ],
            )
            .expect("add service");
        let process = provider
            .add_instance(
                DEFAULT_NAMESPACE,
                "Win32_Process",
                &[("Handle", "1820".into()), ("Name", "spoolsv.exe".into())],
            )
            .expect("add process");
        provider
            .add_instance(
                DEFAULT_NAMESPACE,
                "Win32_ServiceProcess",
                &[("Service", service.into()), ("Process", process.into())],
            )
            .expect("add association");
        provider
    }

    fn spooler(provider: &MemoryProvider) -> ManagedObject {
        let ns = Namespace::new(provider.services(DEFAULT_NAMESPACE).expect("services"));
        ns.get(r#"Win32_Service.Name="Spooler""#).expect("spooler")
    }

    #[test]
    fn test_property_descriptor_is_fetched_once() {
        let provider = provider();
        let service = spooler(&provider);
        provider.reset_stats();
        assert_eq!(service.property("StartMode").expect("read"), Variant::from("Auto"));
        assert_eq!(service.property("startmode").expect("read"), Variant::from("Auto"));
        assert_eq!(provider.stats().property_reads, 1);
    }

    #[test]
    fn test_resolve_kinds() {
        let provider = provider();
        let service = spooler(&provider);
        assert!(matches!(
            service.resolve("Name").expect("prop"),
            Resolved::Property(PropertyValue::Value(Variant::String(_)))
        ));
        let first = match service.resolve("StopService").expect("method") {
            Resolved::Method(m) => m,
            other => panic!("unexpected: {other:?}"),
        };
        let second = service.method("StopService").expect("method");
        assert!(Rc::ptr_eq(&first, &second));
        match service.resolve("__CLASS").expect("native") {
            Resolved::Passthrough(value) => assert_eq!(value, Variant::from("Win32_Service")),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(service.resolve("Nonsense").is_err());
    }

    #[test]
    fn test_property_map_transform() {
        let provider = provider();
        let service = spooler(&provider).with_property_map(
            PropertyMap::new().with("ProcessId", |v| Variant::from(v.as_i64().unwrap_or(0) * 2)),
        );
        assert_eq!(service.property("ProcessId").expect("pid"), Variant::I64(3640));
        assert_eq!(service.property("Name").expect("name"), Variant::from("Spooler"));
    }

    #[test]
    fn test_set_commits_only_stored_objects() {
        let provider = provider();
        let service = spooler(&provider);
        provider.reset_stats();
        service.set("StartMode", "Manual").expect("set");
        assert_eq!(provider.stats().puts, 1);
        assert_eq!(service.property("StartMode").expect("read"), Variant::from("Manual"));

        let fresh = provider
            .services(DEFAULT_NAMESPACE)
            .expect("services")
            .get(r#"Win32_Service.Name="Spooler""#)
            .expect("refetch");
        assert_eq!(
            fresh.property("StartMode").expect("prop").value,
            Variant::from("Manual")
        );
    }

    #[test]
    fn test_undeclared_write_leaves_cache() {
        let provider = provider();
        let service = spooler(&provider);
        service.property("StartMode").expect("prime");
        let err = service.set("Colour", "red").err().expect("error");
        assert!(matches!(err, Error::AttributeNotFound { .. }));
        assert!(err.to_string().starts_with("Colour is not a property of"));
        assert_eq!(service.property("StartMode").expect("read"), Variant::from("Auto"));
    }

    #[test]
    fn test_keys() {
        let provider = provider();
        let service = spooler(&provider);
        assert_eq!(service.keys().expect("keys"), vec!["Name".to_string()]);
    }

    #[test]
    fn test_association_properties_resolve_to_objects() {
        let provider = provider();
        let ns = Namespace::new(provider.services(DEFAULT_NAMESPACE).expect("services"));
        let link = ns
            .query("SELECT * FROM Win32_ServiceProcess", None, &[])
            .expect("query")
            .remove(0);
        assert!(link.is_association());
        let process = match link.resolve("Process").expect("resolve") {
            Resolved::Property(PropertyValue::Reference(Entry::Instance(obj))) => obj,
            other => panic!("unexpected: {other:?}"),
        };
        assert_eq!(process.property("Name").expect("name"), Variant::from("spoolsv.exe"));
        assert!(matches!(link.reference("Service"), Ok(Entry::Instance(_))));
    }

    #[test]
    fn test_associators_and_classes() {
        let provider = provider();
        let service = spooler(&provider);
        let related = service.associators("", "").expect("associators");
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].property("Handle").expect("handle"), Variant::from("1820"));
        assert_eq!(service.references("").expect("references").len(), 1);
        assert!(service.associators("", "Win32_Service").expect("filtered").is_empty());

        let classes = service.associated_classes().expect("classes");
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].0, "Win32_Process");
        assert_eq!(
            service.referenced_classes("").expect("referenced")[0].name(),
            "Win32_ServiceProcess"
        );
    }

    #[test]
    fn test_equality() {
        let provider = provider();
        let a = spooler(&provider);
        let b = spooler(&provider);
        assert_eq!(a, b);
        assert!(a.try_eq_value(&Variant::Object(b.handle().clone())).expect("object"));
        assert!(matches!(
            a.try_eq_value(&Variant::from("Spooler")),
            Err(Error::EqualityTypeMismatch(_))
        ));
    }

    #[test]
    fn test_text_forms() {
        let provider = provider();
        let service = spooler(&provider);
        assert!(service.to_string().starts_with("instance of Win32_Service"));
        assert_eq!(
            format!("{:?}", service),
            r#"<ManagedObject: \\WMIHOST\root\cimv2:Win32_Service.Name="Spooler">"#
        );
    }
}
