// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-namespace storage: classes, instances, subscriptions.

use super::events::{ticks_now, MemoryEventSource, Subscription};
use super::object::{Genus, MemoryObject};
use super::query::{parse_select, FieldSource};
use super::schema::{ClassDef, ClassDefBuilder, PropertyDef};
use super::Stats;
use crate::provider::{
    AssocQuery, EventSource, ObjectHandle, ProviderError, ProviderResult, QueryFlags, Services,
    TraversalMode, DISP_E_UNKNOWNNAME, WBEM_E_INVALID_CLASS, WBEM_E_INVALID_NAMESPACE,
    WBEM_E_INVALID_OBJECT_PATH, WBEM_E_INVALID_QUERY, WBEM_E_NOT_FOUND,
};
use crate::value::Variant;
use crossbeam::channel;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// One stored instance.
struct InstanceRecord {
    class: Arc<ClassDef>,
    values: Vec<Variant>,
    rel_path: String,
}

/// Split an object path into its namespace (when present) and relative part.
///
/// Accepts `\\SERVER\root\cimv2:Class.Key="v"`, `//./root/cimv2:Class`,
/// `root/cimv2:Class` and bare `Class.Key="v"`.
pub(crate) fn split_path(path: &str) -> (Option<String>, &str) {
    let mut rest = path.trim();
    if rest.starts_with("\\\\") || rest.starts_with("//") {
        rest = &rest[2..];
        let server_end = rest.find(['\\', '/']).unwrap_or(rest.len());
        rest = &rest[server_end..];
        rest = rest.trim_start_matches(['\\', '/']);
        return match rest.split_once(':') {
            Some((ns, rel)) => (Some(ns.replace('\\', "/")), rel),
            None => (Some(rest.replace('\\', "/")), ""),
        };
    }
    match rest.split_once(':') {
        Some((ns, rel)) if ns.to_ascii_lowercase().starts_with("root") => {
            (Some(ns.replace('\\', "/")), rel)
        }
        _ => (None, rest),
    }
}

/// Parsed relative path: class name and key bindings.
#[derive(Debug, PartialEq)]
pub(crate) struct RelPath {
    pub(crate) class: String,
    pub(crate) keys: Vec<(String, String)>,
    pub(crate) singleton: bool,
}

pub(crate) fn parse_rel_path(rel: &str) -> ProviderResult<RelPath> {
    let invalid = || ProviderError::wbem(WBEM_E_INVALID_OBJECT_PATH, "SWbemServicesEx", "Invalid object path");
    let class_end = rel.find(['.', '=']).unwrap_or(rel.len());
    let class = rel[..class_end].trim().to_string();
    if class.is_empty() {
        return Err(invalid());
    }
    let mut rest = &rel[class_end..];
    if rest.is_empty() {
        return Ok(RelPath {
            class,
            keys: Vec::new(),
            singleton: false,
        });
    }
    if rest.trim() == "=@" {
        return Ok(RelPath {
            class,
            keys: Vec::new(),
            singleton: true,
        });
    }
    rest = rest.strip_prefix('.').ok_or_else(invalid)?;

    let mut keys = Vec::new();
    let mut chars = rest.chars().peekable();
    loop {
        let name: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if name.trim().is_empty() {
            return Err(invalid());
        }
        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => value.extend(chars.next()),
                    '"' => {
                        closed = true;
                        break;
                    }
                    c => value.push(c),
                }
            }
            if !closed {
                return Err(invalid());
            }
        } else {
            while let Some(c) = chars.next_if(|c| *c != ',') {
                value.push(c);
            }
        }
        keys.push((name.trim().to_string(), value));
        match chars.next() {
            Some(',') => continue,
            None => break,
            Some(_) => return Err(invalid()),
        }
    }
    Ok(RelPath {
        class,
        keys,
        singleton: false,
    })
}

/// Canonical relative path of an instance.
pub(crate) fn instance_rel_path(class: &ClassDef, values: &[Variant]) -> ProviderResult<String> {
    let keys: Vec<(usize, &PropertyDef)> = class
        .properties
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_key())
        .collect();
    if keys.is_empty() {
        return Ok(format!("{}=@", class.name));
    }
    let mut parts = Vec::with_capacity(keys.len());
    for (i, prop) in keys {
        let value = values.get(i).filter(|v| !v.is_null()).ok_or_else(|| {
            ProviderError::wbem(
                WBEM_E_INVALID_OBJECT_PATH,
                "SWbemObjectEx",
                format!("Key property {} is not set", prop.name),
            )
        })?;
        let rendered = match value {
            Variant::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            other => other.to_string(),
        };
        parts.push(format!("{}={}", prop.name, rendered));
    }
    Ok(format!("{}.{}", class.name, parts.join(",")))
}

fn not_found() -> ProviderError {
    ProviderError::wbem(WBEM_E_NOT_FOUND, "SWbemServicesEx", "Not found")
}

fn invalid_class() -> ProviderError {
    ProviderError::wbem(WBEM_E_INVALID_CLASS, "SWbemServicesEx", "Invalid class")
}

/// Classes every namespace starts with.
fn system_classes() -> Vec<ClassDef> {
    vec![
        ClassDefBuilder::new("__Event")
            .qualifier("abstract", true)
            .property("TIME_CREATED", "uint64")
            .build(),
        ClassDefBuilder::new("__InstanceOperationEvent")
            .superclass("__Event")
            .property("TargetInstance", "object")
            .build(),
        ClassDefBuilder::new("__InstanceCreationEvent")
            .superclass("__InstanceOperationEvent")
            .build(),
        ClassDefBuilder::new("__InstanceDeletionEvent")
            .superclass("__InstanceOperationEvent")
            .build(),
        ClassDefBuilder::new("__InstanceModificationEvent")
            .superclass("__InstanceOperationEvent")
            .property("PreviousInstance", "object")
            .build(),
        ClassDefBuilder::new("__ExtrinsicEvent")
            .superclass("__Event")
            .qualifier("abstract", true)
            .build(),
    ]
}

/// State of one namespace.
pub(crate) struct NamespaceStore {
    pub(crate) name: String,
    pub(crate) server: String,
    pub(crate) stats: Arc<Stats>,
    classes: RwLock<Vec<Arc<ClassDef>>>,
    instances: RwLock<Vec<InstanceRecord>>,
    subscriptions: Mutex<Vec<Subscription>>,
    natives: RwLock<HashMap<String, Variant>>,
}

impl NamespaceStore {
    pub(crate) fn new(name: &str, server: &str, stats: Arc<Stats>) -> ProviderResult<Arc<Self>> {
        let store = Arc::new(Self {
            name: name.replace('\\', "/"),
            server: server.to_string(),
            stats,
            classes: RwLock::new(Vec::new()),
            instances: RwLock::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            natives: RwLock::new(HashMap::new()),
        });
        for def in system_classes() {
            store.define(def)?;
        }
        Ok(store)
    }

    /// `\\SERVER\root\cimv2:` prefix of full paths.
    pub(crate) fn full_path(&self, rel_path: &str) -> String {
        format!(
            "\\\\{}\\{}:{}",
            self.server,
            self.name.replace('/', "\\"),
            rel_path
        )
    }

    pub(crate) fn class(&self, name: &str) -> Option<Arc<ClassDef>> {
        self.classes
            .read()
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Register (or replace) a class; the superclass must already exist.
    pub(crate) fn define(&self, mut def: ClassDef) -> ProviderResult<()> {
        if let Some(parent) = def.superclass.clone() {
            let parent = self.class(&parent).ok_or_else(invalid_class)?;
            def.inherit(&parent);
        }
        log::trace!("[dynwmi::memory] define {} in {}", def.name, self.name);
        let def = Arc::new(def);
        let mut classes = self.classes.write();
        match classes.iter().position(|c| c.name.eq_ignore_ascii_case(&def.name)) {
            Some(i) => classes[i] = def,
            None => classes.push(def),
        }
        Ok(())
    }

    pub(crate) fn set_native(&self, name: &str, value: Variant) {
        self.natives.write().insert(name.to_ascii_lowercase(), value);
    }

    fn record_object(self: &Arc<Self>, record: &InstanceRecord) -> ObjectHandle {
        Arc::new(MemoryObject::new(
            self,
            record.class.clone(),
            Genus::Instance,
            record.values.clone(),
            record.rel_path.clone(),
        ))
    }

    pub(crate) fn class_object(self: &Arc<Self>, def: Arc<ClassDef>) -> ObjectHandle {
        let values = def.properties.iter().map(|p| p.default.clone()).collect();
        let rel_path = def.name.clone();
        Arc::new(MemoryObject::new(self, def, Genus::Class, values, rel_path))
    }

    /// Look up by class name or relative instance path.
    pub(crate) fn lookup(self: &Arc<Self>, rel: &str) -> ProviderResult<ObjectHandle> {
        let parsed = parse_rel_path(rel)?;
        if parsed.keys.is_empty() && !parsed.singleton {
            let def = self.class(&parsed.class).ok_or_else(not_found)?;
            return Ok(self.class_object(def));
        }
        let instances = self.instances.read();
        instances
            .iter()
            .find(|record| record_matches(record, &parsed))
            .map(|record| self.record_object(record))
            .ok_or_else(not_found)
    }

    pub(crate) fn instances_of(self: &Arc<Self>, class: &str) -> Vec<ObjectHandle> {
        self.instances
            .read()
            .iter()
            .filter(|record| record.class.isa(class))
            .map(|record| self.record_object(record))
            .collect()
    }

    pub(crate) fn subclasses_of(self: &Arc<Self>, root: &str) -> Vec<ObjectHandle> {
        let classes: Vec<Arc<ClassDef>> = self
            .classes
            .read()
            .iter()
            .filter(|c| root.is_empty() || (c.isa(root) && !c.name.eq_ignore_ascii_case(root)))
            .cloned()
            .collect();
        classes.into_iter().map(|c| self.class_object(c)).collect()
    }

    /// Store an instance, replacing one with the same key; returns its
    /// relative path. Posts the matching intrinsic event.
    pub(crate) fn store(
        self: &Arc<Self>,
        class: &Arc<ClassDef>,
        values: Vec<Variant>,
    ) -> ProviderResult<String> {
        let rel_path = instance_rel_path(class, &values)?;
        let previous = {
            let mut instances = self.instances.write();
            let existing = instances
                .iter()
                .position(|r| r.rel_path.eq_ignore_ascii_case(&rel_path));
            let record = InstanceRecord {
                class: class.clone(),
                values: values.clone(),
                rel_path: rel_path.clone(),
            };
            match existing {
                Some(i) => Some(std::mem::replace(&mut instances[i], record)),
                None => {
                    instances.push(record);
                    None
                }
            }
        };

        let target = MemoryObject::new(self, class.clone(), Genus::Instance, values, rel_path.clone());
        match previous {
            Some(previous) => {
                let before = self.record_object(&previous);
                self.post_intrinsic(
                    "__InstanceModificationEvent",
                    Arc::new(target),
                    Some(before),
                );
            }
            None => self.post_intrinsic("__InstanceCreationEvent", Arc::new(target), None),
        }
        Ok(rel_path)
    }

    /// Remove an instance by relative path.
    pub(crate) fn remove(self: &Arc<Self>, rel: &str) -> ProviderResult<()> {
        let parsed = parse_rel_path(rel)?;
        let removed = {
            let mut instances = self.instances.write();
            let index = instances
                .iter()
                .position(|record| record_matches(record, &parsed))
                .ok_or_else(not_found)?;
            instances.remove(index)
        };
        let target = self.record_object(&removed);
        self.post_intrinsic("__InstanceDeletionEvent", target, None);
        Ok(())
    }

    fn post_intrinsic(
        self: &Arc<Self>,
        event_class: &str,
        target: ObjectHandle,
        previous: Option<ObjectHandle>,
    ) {
        if self.subscriptions.lock().is_empty() {
            return;
        }
        let Some(def) = self.class(event_class) else {
            return;
        };
        let event = MemoryObject::spawn(self, def);
        event.set_value("TIME_CREATED", Variant::U64(ticks_now()));
        event.set_value("TargetInstance", Variant::Object(target));
        if let Some(previous) = previous {
            event.set_value("PreviousInstance", Variant::Object(previous));
        }
        self.post(Arc::new(event));
    }

    /// Deliver an event to every matching subscription.
    pub(crate) fn post(&self, event: Arc<MemoryObject>) {
        let handle: ObjectHandle = event.clone();
        let mut subscriptions = self.subscriptions.lock();
        // Receivers that were dropped are pruned on send failure
        subscriptions.retain(|sub| !sub.wants(&event) || sub.tx.send(handle.clone()).is_ok());
    }

    pub(crate) fn subscribe(&self, wql: &str) -> ProviderResult<MemoryEventSource> {
        let query = parse_select(wql).map_err(|e| {
            ProviderError::wbem(WBEM_E_INVALID_QUERY, "SWbemServicesEx", e.0)
        })?;
        let def = self.class(&query.class).ok_or_else(invalid_class)?;
        if !def.isa("__Event") {
            return Err(invalid_class());
        }
        let (tx, rx) = channel::unbounded();
        self.subscriptions.lock().push(Subscription { query, tx });
        Ok(MemoryEventSource::new(rx))
    }

    /// Related instances (or, for classes, related classes) through
    /// association records. `references` returns the associations
    /// themselves.
    pub(crate) fn related(
        self: &Arc<Self>,
        origin: &MemoryObject,
        query: &AssocQuery,
        references: bool,
    ) -> Vec<ObjectHandle> {
        if origin.genus() == Genus::Class {
            return self.related_classes(origin.class_def(), query, references);
        }
        let own = origin.rel_path();
        if own.is_empty() {
            return Vec::new();
        }
        let assoc_filter = if references && query.assoc_class.is_empty() {
            query.result_class.as_str()
        } else {
            query.assoc_class.as_str()
        };

        let mut found: Vec<ObjectHandle> = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        let instances = self.instances.read();
        for record in instances.iter().filter(|r| r.class.is_association()) {
            if !assoc_filter.is_empty() && !record.class.isa(assoc_filter) {
                continue;
            }
            let refs: Vec<String> = record
                .class
                .properties
                .iter()
                .enumerate()
                .filter(|(_, p)| p.is_reference())
                .filter_map(|(i, _)| record.values.get(i))
                .map(|v| split_path(&v.to_string()).1.to_string())
                .collect();
            if !refs.iter().any(|r| r.eq_ignore_ascii_case(&own)) {
                continue;
            }
            if references {
                if seen.iter().all(|s| !s.eq_ignore_ascii_case(&record.rel_path)) {
                    seen.push(record.rel_path.clone());
                    found.push(self.record_object(record));
                }
                continue;
            }
            for target in refs.iter().filter(|r| !r.eq_ignore_ascii_case(&own)) {
                let Ok(parsed) = parse_rel_path(target) else {
                    continue;
                };
                let Some(hit) = instances.iter().find(|r| record_matches(r, &parsed)) else {
                    continue;
                };
                if !query.result_class.is_empty() && !hit.class.isa(&query.result_class) {
                    continue;
                }
                if seen.iter().all(|s| !s.eq_ignore_ascii_case(&hit.rel_path)) {
                    seen.push(hit.rel_path.clone());
                    found.push(self.record_object(hit));
                }
            }
        }
        drop(instances);

        if query.mode == Some(TraversalMode::ClassesOnly) {
            let mut classes: Vec<Arc<ClassDef>> = Vec::new();
            for obj in &found {
                if let Some(mem) = obj.as_any().downcast_ref::<MemoryObject>() {
                    let def = mem.class_def().clone();
                    if classes.iter().all(|c| !c.name.eq_ignore_ascii_case(&def.name)) {
                        classes.push(def);
                    }
                }
            }
            return classes.into_iter().map(|c| self.class_object(c)).collect();
        }
        found
    }

    fn related_classes(
        self: &Arc<Self>,
        origin: &ClassDef,
        query: &AssocQuery,
        references: bool,
    ) -> Vec<ObjectHandle> {
        let assoc_filter = if references && query.assoc_class.is_empty() {
            query.result_class.as_str()
        } else {
            query.assoc_class.as_str()
        };
        let classes: Vec<Arc<ClassDef>> = self.classes.read().clone();
        let mut found: Vec<Arc<ClassDef>> = Vec::new();
        let mut push = |def: Arc<ClassDef>| {
            if found.iter().all(|c| !c.name.eq_ignore_ascii_case(&def.name)) {
                found.push(def);
            }
        };
        for assoc in classes.iter().filter(|c| c.is_association()) {
            if !assoc_filter.is_empty() && !assoc.isa(assoc_filter) {
                continue;
            }
            let ref_classes: Vec<&str> = assoc
                .properties
                .iter()
                .filter_map(PropertyDef::reference_class)
                .collect();
            let Some(own) = ref_classes.iter().position(|c| origin.isa(c)) else {
                continue;
            };
            if references {
                push(assoc.clone());
                continue;
            }
            for (i, name) in ref_classes.iter().enumerate() {
                if i == own {
                    continue;
                }
                let Some(def) = self.class(name) else {
                    continue;
                };
                if query.result_class.is_empty() || def.isa(&query.result_class) {
                    push(def);
                }
            }
        }
        found.into_iter().map(|c| self.class_object(c)).collect()
    }
}

fn record_matches(record: &InstanceRecord, parsed: &RelPath) -> bool {
    if !record.class.isa(&parsed.class) {
        return false;
    }
    if parsed.singleton {
        return record.class.key_names().next().is_none();
    }
    let key_count = record.class.key_names().count();
    key_count == parsed.keys.len()
        && parsed.keys.iter().all(|(name, text)| {
            record
                .class
                .property_index(name)
                .and_then(|i| record.values.get(i))
                .is_some_and(|v| v.to_string().eq_ignore_ascii_case(text))
        })
}

/// [`Services`] over one namespace.
pub(crate) struct MemoryServices {
    ns: Arc<NamespaceStore>,
}

impl MemoryServices {
    pub(crate) fn new(ns: Arc<NamespaceStore>) -> Self {
        Self { ns }
    }

    fn check_namespace(&self, namespace: Option<String>) -> ProviderResult<()> {
        match namespace {
            Some(ns) if !ns.eq_ignore_ascii_case(&self.ns.name) => Err(ProviderError::wbem(
                WBEM_E_INVALID_NAMESPACE,
                "SWbemServicesEx",
                "Invalid namespace",
            )),
            _ => Ok(()),
        }
    }
}

impl Services for MemoryServices {
    fn get(&self, path: &str) -> ProviderResult<ObjectHandle> {
        self.ns.stats.gets.fetch_add(1, Ordering::Relaxed);
        let (namespace, rel) = split_path(path);
        self.check_namespace(namespace)?;
        self.ns.lookup(rel)
    }

    fn exec_query(&self, wql: &str, flags: QueryFlags) -> ProviderResult<Vec<ObjectHandle>> {
        self.ns.stats.queries.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "[dynwmi::memory] exec_query flags=0x{:02x} {}",
            flags.bits(),
            wql
        );
        let select = parse_select(wql)
            .map_err(|e| ProviderError::wbem(WBEM_E_INVALID_QUERY, "SWbemServicesEx", e.0))?;
        if self.ns.class(&select.class).is_none() {
            return Err(invalid_class());
        }
        Ok(self
            .ns
            .instances_of(&select.class)
            .into_iter()
            .filter(|obj| {
                obj.as_any()
                    .downcast_ref::<MemoryObject>()
                    .is_some_and(|mem| select.condition.matches(mem as &dyn FieldSource))
            })
            .collect())
    }

    fn exec_notification_query(&self, wql: &str) -> ProviderResult<Box<dyn EventSource>> {
        self.ns
            .stats
            .notification_queries
            .fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(self.ns.subscribe(wql)?))
    }

    fn subclasses_of(&self, root: &str) -> ProviderResult<Vec<ObjectHandle>> {
        if !root.is_empty() && self.ns.class(root).is_none() {
            return Err(invalid_class());
        }
        Ok(self.ns.subclasses_of(root))
    }

    fn instances_of(&self, class: &str) -> ProviderResult<Vec<ObjectHandle>> {
        if self.ns.class(class).is_none() {
            return Err(invalid_class());
        }
        Ok(self.ns.instances_of(class))
    }

    fn native(&self, name: &str) -> ProviderResult<Variant> {
        self.ns
            .natives
            .read()
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| ProviderError::new(DISP_E_UNKNOWNNAME, "Unknown name."))
    }

    fn display_name(&self) -> String {
        format!(
            "WINMGMTS:{{authenticationLevel=pktPrivacy,impersonationLevel=impersonate}}!\\\\{}\\{}",
            self.ns.server,
            self.ns.name.replace('/', "\\")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(
            split_path(r#"\\HOST\root\cimv2:Win32_Process.Handle="4""#),
            (Some("root/cimv2".to_string()), r#"Win32_Process.Handle="4""#)
        );
        assert_eq!(
            split_path("//./root/default:StdRegProv"),
            (Some("root/default".to_string()), "StdRegProv")
        );
        assert_eq!(split_path("Win32_Process"), (None, "Win32_Process"));
    }

    #[test]
    fn test_parse_rel_path() {
        let parsed = parse_rel_path(r#"Win32_Directory.Name="C:\\Windows",Drive=3"#).expect("parse");
        assert_eq!(parsed.class, "Win32_Directory");
        assert_eq!(
            parsed.keys,
            vec![
                ("Name".to_string(), r"C:\Windows".to_string()),
                ("Drive".to_string(), "3".to_string())
            ]
        );
        assert!(parse_rel_path("Win32_OperatingSystem=@").expect("singleton").singleton);
        assert!(parse_rel_path(r#"X.Name="open"#).is_err());
    }

    #[test]
    fn test_rel_path_escapes_strings() {
        let class = ClassDefBuilder::new("Win32_Directory")
            .key("Name", "string")
            .build();
        let rel = instance_rel_path(&class, &[Variant::from(r#"C:\a"b"#)]).expect("path");
        assert_eq!(rel, r#"Win32_Directory.Name="C:\\a\"b""#);
        let back = parse_rel_path(&rel).expect("parse");
        assert_eq!(back.keys[0].1, r#"C:\a"b"#);
        assert!(instance_rel_path(&class, &[Variant::Null]).is_err());
    }
}
