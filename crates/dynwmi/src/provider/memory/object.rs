// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Class and instance objects of the in-memory provider.

use super::query::FieldSource;
use super::schema::{ClassDef, ClassDefBuilder, MethodCall, ParamDef};
use super::store::NamespaceStore;
use crate::provider::{
    AssocQuery, MethodDescriptor, ObjectHandle, ObjectPath, ParameterDescriptor,
    PropertyDescriptor, ProviderError, ProviderResult, Qualifiers, RemoteObject,
    DISP_E_UNKNOWNNAME, WBEM_E_INVALID_METHOD, WBEM_E_INVALID_OPERATION,
    WBEM_E_INVALID_PARAMETER, WBEM_E_NOT_FOUND,
};
use crate::value::Variant;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt::Write as _;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Object genus: schema object or data object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Genus {
    Class,
    Instance,
}

struct ObjectState {
    values: Vec<Variant>,
    /// Empty until the instance is stored.
    rel_path: String,
}

/// A local copy of a class or instance.
///
/// Property writes stay local until [`RemoteObject::put`].
pub(crate) struct MemoryObject {
    ns: Arc<NamespaceStore>,
    class: Arc<ClassDef>,
    genus: Genus,
    state: RwLock<ObjectState>,
}

impl MemoryObject {
    pub(crate) fn new(
        ns: &Arc<NamespaceStore>,
        class: Arc<ClassDef>,
        genus: Genus,
        values: Vec<Variant>,
        rel_path: String,
    ) -> Self {
        Self {
            ns: ns.clone(),
            class,
            genus,
            state: RwLock::new(ObjectState { values, rel_path }),
        }
    }

    /// Unstored instance with default values.
    pub(crate) fn spawn(ns: &Arc<NamespaceStore>, class: Arc<ClassDef>) -> Self {
        let values = class.properties.iter().map(|p| p.default.clone()).collect();
        Self::new(ns, class, Genus::Instance, values, String::new())
    }

    pub(crate) fn class_def(&self) -> &Arc<ClassDef> {
        &self.class
    }

    pub(crate) fn genus(&self) -> Genus {
        self.genus
    }

    pub(crate) fn rel_path(&self) -> String {
        self.state.read().rel_path.clone()
    }

    /// Write a value without counting it as a client access; unknown names
    /// are ignored.
    pub(crate) fn set_value(&self, name: &str, value: Variant) {
        if let Some(i) = self.class.property_index(name) {
            self.state.write().values[i] = value;
        }
    }

    pub(crate) fn value(&self, name: &str) -> Option<Variant> {
        let i = self.class.property_index(name)?;
        self.state.read().values.get(i).cloned()
    }

    fn member_not_found(&self, what: &str) -> ProviderError {
        ProviderError::wbem(
            WBEM_E_NOT_FOUND,
            "SWbemObjectEx",
            format!("{} not found on {}", what, self.class.name),
        )
    }

    fn parameter_descriptors(params: &[ParamDef], direction: &str) -> Option<Vec<ParameterDescriptor>> {
        if params.is_empty() {
            return None;
        }
        Some(
            params
                .iter()
                .enumerate()
                .map(|(id, param)| {
                    let mut qualifiers = param.qualifiers.clone();
                    qualifiers.insert("CIMTYPE".into(), Variant::String(param.cim_type.clone()));
                    qualifiers.insert("ID".into(), Variant::I32(id as i32));
                    qualifiers.insert(direction.into(), Variant::Bool(true));
                    ParameterDescriptor {
                        name: param.name.clone(),
                        is_array: param.is_array,
                        qualifiers,
                    }
                })
                .collect(),
        )
    }

    fn render_value(value: &Variant) -> String {
        match value {
            Variant::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            Variant::Array(items) => {
                let inner: Vec<String> = items.iter().map(Self::render_value).collect();
                format!("{{{}}}", inner.join(", "))
            }
            Variant::Object(obj) => obj
                .object_text()
                .unwrap_or_default()
                .trim_end()
                .trim_end_matches(';')
                .to_string(),
            other => other.to_string(),
        }
    }
}

impl RemoteObject for MemoryObject {
    fn path(&self) -> ProviderResult<ObjectPath> {
        let rel_path = self.rel_path();
        let path = if rel_path.is_empty() {
            String::new()
        } else {
            self.ns.full_path(&rel_path)
        };
        let display_name = if path.is_empty() {
            String::new()
        } else {
            format!(
                "WINMGMTS:{{authenticationLevel=pktPrivacy,impersonationLevel=impersonate}}!{}",
                path
            )
        };
        Ok(ObjectPath {
            path,
            rel_path,
            class: self.class.name.clone(),
            namespace: self.ns.name.clone(),
            server: self.ns.server.clone(),
            is_class: self.genus == Genus::Class,
            display_name,
        })
    }

    fn derivation(&self) -> ProviderResult<Vec<String>> {
        Ok(self.class.derivation.clone())
    }

    fn qualifiers(&self) -> ProviderResult<Qualifiers> {
        Ok(self.class.qualifiers.clone())
    }

    fn property_names(&self) -> ProviderResult<Vec<String>> {
        Ok(self.class.properties.iter().map(|p| p.name.clone()).collect())
    }

    fn property(&self, name: &str) -> ProviderResult<PropertyDescriptor> {
        self.ns.stats.property_reads.fetch_add(1, Ordering::Relaxed);
        let i = self
            .class
            .property_index(name)
            .ok_or_else(|| self.member_not_found(name))?;
        let def = &self.class.properties[i];
        let mut qualifiers = def.qualifiers.clone();
        qualifiers.insert("CIMTYPE".into(), Variant::String(def.cim_type.clone()));
        Ok(PropertyDescriptor {
            name: def.name.clone(),
            cim_type: def.cim_type.clone(),
            is_array: def.is_array,
            value: self.state.read().values[i].clone(),
            qualifiers,
        })
    }

    fn set_property(&self, name: &str, value: Variant) -> ProviderResult<()> {
        let i = self
            .class
            .property_index(name)
            .ok_or_else(|| self.member_not_found(name))?;
        self.state.write().values[i] = value;
        Ok(())
    }

    fn method_names(&self) -> ProviderResult<Vec<String>> {
        Ok(self.class.methods.iter().map(|m| m.name.clone()).collect())
    }

    fn method(&self, name: &str) -> ProviderResult<MethodDescriptor> {
        let def = self
            .class
            .method(name)
            .ok_or_else(|| self.member_not_found(name))?;
        Ok(MethodDescriptor {
            name: def.name.clone(),
            qualifiers: def.qualifiers.clone(),
            in_parameters: Self::parameter_descriptors(&def.inputs, "In"),
            out_parameters: Self::parameter_descriptors(&def.outputs, "Out"),
        })
    }

    fn exec_method(
        &self,
        name: &str,
        in_parameters: Option<&[(String, Variant)]>,
    ) -> ProviderResult<ObjectHandle> {
        self.ns.stats.method_calls.fetch_add(1, Ordering::Relaxed);
        let def = self.class.method(name).ok_or_else(|| {
            ProviderError::wbem(WBEM_E_INVALID_METHOD, "SWbemObjectEx", "Invalid method")
        })?;
        let inputs = in_parameters.unwrap_or_default().to_vec();
        if let Some((unknown, _)) = inputs
            .iter()
            .find(|(n, _)| !def.inputs.iter().any(|p| p.name.eq_ignore_ascii_case(n)))
        {
            return Err(ProviderError::wbem(
                WBEM_E_INVALID_PARAMETER,
                "SWbemObjectEx",
                format!("Invalid parameter {}", unknown),
            ));
        }

        let call = MethodCall {
            class: self.class.name.clone(),
            path: self.path()?.path,
            method: def.name.clone(),
            inputs,
        };
        log::trace!("[dynwmi::memory] exec {}.{}", call.class, call.method);
        let outputs = match &def.handler {
            Some(handler) => handler(&call)?,
            None => Vec::new(),
        };

        let mut out_class = ClassDefBuilder::new("__PARAMETERS");
        for param in &def.outputs {
            let cim_type = if param.is_array {
                format!("{}[]", param.cim_type)
            } else {
                param.cim_type.clone()
            };
            out_class = out_class.property(param.name.clone(), &cim_type);
        }
        let out = MemoryObject::spawn(&self.ns, Arc::new(out_class.build()));
        for (name, value) in outputs {
            out.set_value(&name, value);
        }
        Ok(Arc::new(out))
    }

    fn put(&self) -> ProviderResult<()> {
        self.ns.stats.puts.fetch_add(1, Ordering::Relaxed);
        if self.genus == Genus::Class {
            return Ok(());
        }
        let values = self.state.read().values.clone();
        let rel_path = self.ns.store(&self.class, values)?;
        self.state.write().rel_path = rel_path;
        Ok(())
    }

    fn compare_to(&self, other: &dyn RemoteObject) -> ProviderResult<bool> {
        let Some(other) = other.as_any().downcast_ref::<MemoryObject>() else {
            return Ok(false);
        };
        if self.genus != other.genus || !self.class.name.eq_ignore_ascii_case(&other.class.name) {
            return Ok(false);
        }
        if std::ptr::eq(self, other) {
            return Ok(true);
        }
        let mine = self.state.read().values.clone();
        let theirs = other.state.read().values.clone();
        Ok(mine == theirs)
    }

    fn object_text(&self) -> ProviderResult<String> {
        let mut text = String::new();
        let state = self.state.read();
        match self.genus {
            Genus::Class => {
                let _ = match &self.class.superclass {
                    Some(parent) => writeln!(text, "class {} : {}", self.class.name, parent),
                    None => writeln!(text, "class {}", self.class.name),
                };
                text.push_str("{\n");
                for prop in &self.class.properties {
                    let suffix = if prop.is_array { "[]" } else { "" };
                    let _ = writeln!(text, "\t{} {}{};", prop.cim_type, prop.name, suffix);
                }
            }
            Genus::Instance => {
                let _ = writeln!(text, "instance of {}", self.class.name);
                text.push_str("{\n");
                for (prop, value) in self.class.properties.iter().zip(&state.values) {
                    if value.is_null() {
                        continue;
                    }
                    let _ = writeln!(text, "\t{} = {};", prop.name, Self::render_value(value));
                }
            }
        }
        text.push_str("};\n");
        Ok(text)
    }

    fn associators(&self, query: &AssocQuery) -> ProviderResult<Vec<ObjectHandle>> {
        Ok(self.ns.related(self, query, false))
    }

    fn references(&self, query: &AssocQuery) -> ProviderResult<Vec<ObjectHandle>> {
        Ok(self.ns.related(self, query, true))
    }

    fn spawn_instance(&self) -> ProviderResult<ObjectHandle> {
        if self.genus != Genus::Class {
            return Err(ProviderError::wbem(
                WBEM_E_INVALID_OPERATION,
                "SWbemObjectEx",
                "Instances cannot spawn instances",
            ));
        }
        Ok(Arc::new(MemoryObject::spawn(&self.ns, self.class.clone())))
    }

    fn instances(&self) -> ProviderResult<Vec<ObjectHandle>> {
        Ok(self.ns.instances_of(&self.class.name))
    }

    fn native(&self, name: &str) -> ProviderResult<Variant> {
        let path = self.path()?;
        let value = match name.to_ascii_uppercase().as_str() {
            "__CLASS" => Variant::String(path.class),
            "__PATH" => Variant::String(path.path),
            "__RELPATH" => Variant::String(path.rel_path),
            "__NAMESPACE" => Variant::String(path.namespace),
            "__SERVER" => Variant::String(path.server),
            "__SUPERCLASS" => self.class.superclass.clone().into(),
            "__DERIVATION" => Variant::from(self.class.derivation.clone()),
            "__GENUS" => Variant::I32(if self.genus == Genus::Class { 1 } else { 2 }),
            "__PROPERTY_COUNT" => Variant::I32(self.class.properties.len() as i32),
            _ => return Err(ProviderError::new(DISP_E_UNKNOWNNAME, "Unknown name.")),
        };
        Ok(value)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl FieldSource for MemoryObject {
    fn field(&self, path: &str) -> Option<Variant> {
        match path.split_once('.') {
            None => self.value(path),
            Some((head, rest)) => {
                let nested = self.value(head)?;
                let obj = nested.as_object()?;
                obj.as_any().downcast_ref::<MemoryObject>()?.field(rest)
            }
        }
    }

    fn isa(&self, path: &str, class: &str) -> bool {
        self.field(path)
            .as_ref()
            .and_then(Variant::as_object)
            .and_then(|obj| obj.as_any().downcast_ref::<MemoryObject>().map(|m| m.class.isa(class)))
            .unwrap_or(false)
    }
}
