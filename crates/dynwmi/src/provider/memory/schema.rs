// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Class definitions for the in-memory provider.

use crate::provider::{ProviderResult, Qualifiers};
use crate::value::Variant;
use std::fmt;
use std::sync::Arc;

/// Inputs handed to a method implementation.
#[derive(Debug, Clone)]
pub struct MethodCall {
    /// Class the method was invoked on.
    pub class: String,
    /// Path of the target (empty for static calls on a class).
    pub path: String,
    /// Method name.
    pub method: String,
    /// Bound input parameters, in the order the caller supplied them.
    pub inputs: Vec<(String, Variant)>,
}

impl MethodCall {
    /// Value bound to an input parameter (case-insensitive).
    pub fn input(&self, name: &str) -> Option<&Variant> {
        self.inputs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

/// Method implementation: returns the output parameter values.
pub type MethodHandler =
    Arc<dyn Fn(&MethodCall) -> ProviderResult<Vec<(String, Variant)>> + Send + Sync>;

/// Split `"uint32[]"` into `("uint32", true)`.
fn split_array(cim_type: &str) -> (String, bool) {
    match cim_type.strip_suffix("[]") {
        Some(base) => (base.to_string(), true),
        None => (cim_type.to_string(), false),
    }
}

/// A declared property.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    pub name: String,
    pub cim_type: String,
    pub is_array: bool,
    pub qualifiers: Qualifiers,
    /// Value given to spawned instances.
    pub default: Variant,
}

impl PropertyDef {
    /// Declare a property; a `[]` suffix on the type makes it an array.
    pub fn new(name: impl Into<String>, cim_type: &str) -> Self {
        let (cim_type, is_array) = split_array(cim_type);
        Self {
            name: name.into(),
            cim_type,
            is_array,
            qualifiers: Qualifiers::new(),
            default: Variant::Null,
        }
    }

    /// Mark as a key property.
    pub fn key(self) -> Self {
        self.qualifier("key", true)
    }

    /// Attach a qualifier.
    pub fn qualifier(mut self, name: impl Into<String>, value: impl Into<Variant>) -> Self {
        self.qualifiers.insert(name.into(), value.into());
        self
    }

    /// Default value for spawned instances.
    pub fn default_value(mut self, value: impl Into<Variant>) -> Self {
        self.default = value.into();
        self
    }

    /// True for `ref:` typed properties.
    pub fn is_reference(&self) -> bool {
        self.cim_type == "ref" || self.cim_type.starts_with("ref:")
    }

    /// Class named by a `ref:Class` type.
    pub fn reference_class(&self) -> Option<&str> {
        self.cim_type.strip_prefix("ref:")
    }

    pub(crate) fn is_key(&self) -> bool {
        self.qualifiers
            .get("key")
            .is_some_and(|v| v.as_bool().unwrap_or(!v.is_null()))
    }
}

/// A declared method parameter.
#[derive(Debug, Clone)]
pub struct ParamDef {
    pub name: String,
    pub cim_type: String,
    pub is_array: bool,
    pub qualifiers: Qualifiers,
}

impl ParamDef {
    fn new(name: impl Into<String>, cim_type: &str) -> Self {
        let (cim_type, is_array) = split_array(cim_type);
        Self {
            name: name.into(),
            cim_type,
            is_array,
            qualifiers: Qualifiers::new(),
        }
    }
}

/// A declared method.
#[derive(Clone)]
pub struct MethodDef {
    pub name: String,
    pub qualifiers: Qualifiers,
    pub inputs: Vec<ParamDef>,
    pub outputs: Vec<ParamDef>,
    pub(crate) handler: Option<MethodHandler>,
}

impl MethodDef {
    /// Declare a method with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifiers: Qualifiers::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            handler: None,
        }
    }

    /// Append an input parameter.
    pub fn input(mut self, name: impl Into<String>, cim_type: &str) -> Self {
        self.inputs.push(ParamDef::new(name, cim_type));
        self
    }

    /// Append an input parameter with a `BitMap` qualifier.
    pub fn input_bitmap(mut self, name: impl Into<String>, cim_type: &str, bitmap: &[&str]) -> Self {
        let mut param = ParamDef::new(name, cim_type);
        param
            .qualifiers
            .insert("BitMap".into(), Variant::from(bitmap.to_vec()));
        self.inputs.push(param);
        self
    }

    /// Append an output parameter.
    pub fn output(mut self, name: impl Into<String>, cim_type: &str) -> Self {
        self.outputs.push(ParamDef::new(name, cim_type));
        self
    }

    /// Attach a qualifier (`Privileges`, `MappingStrings`, `Static`, ...).
    pub fn qualifier(mut self, name: impl Into<String>, value: impl Into<Variant>) -> Self {
        self.qualifiers.insert(name.into(), value.into());
        self
    }

    /// Declare required privileges.
    pub fn privileges(self, privileges: &[&str]) -> Self {
        self.qualifier("Privileges", privileges.to_vec())
    }

    /// Install the implementation.
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&MethodCall) -> ProviderResult<Vec<(String, Variant)>> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Implementation returning fixed output values.
    pub fn returns(self, outputs: Vec<(String, Variant)>) -> Self {
        self.handler(move |_| Ok(outputs.clone()))
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// A class as registered in a namespace.
///
/// Inherited members are flattened in at registration time: base class
/// members first, then this class's own declarations.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub superclass: Option<String>,
    /// Ancestors, most specific first (filled in at registration).
    pub derivation: Vec<String>,
    pub qualifiers: Qualifiers,
    pub properties: Vec<PropertyDef>,
    pub methods: Vec<MethodDef>,
}

impl ClassDef {
    /// Start declaring a class.
    pub fn builder(name: impl Into<String>) -> ClassDefBuilder {
        ClassDefBuilder::new(name)
    }

    /// Index of a property, case-insensitive.
    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Method by name, case-insensitive.
    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// True when this class is `class` or derives from it.
    pub fn isa(&self, class: &str) -> bool {
        self.name.eq_ignore_ascii_case(class)
            || self.derivation.iter().any(|c| c.eq_ignore_ascii_case(class))
    }

    /// True when the class carries the `Association` qualifier.
    pub fn is_association(&self) -> bool {
        self.qualifiers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("Association"))
    }

    /// Key property names in declared order.
    pub fn key_names(&self) -> impl Iterator<Item = &str> {
        self.properties
            .iter()
            .filter(|p| p.is_key())
            .map(|p| p.name.as_str())
    }

    /// Merge an already registered superclass into this definition.
    pub(crate) fn inherit(&mut self, parent: &ClassDef) {
        let mut derivation = vec![parent.name.clone()];
        derivation.extend(parent.derivation.iter().cloned());
        self.derivation = derivation;

        let own_props = std::mem::take(&mut self.properties);
        self.properties = parent.properties.clone();
        for prop in own_props {
            match self.property_index(&prop.name) {
                Some(i) => self.properties[i] = prop,
                None => self.properties.push(prop),
            }
        }

        let own_methods = std::mem::take(&mut self.methods);
        self.methods = parent.methods.clone();
        for method in own_methods {
            match self
                .methods
                .iter()
                .position(|m| m.name.eq_ignore_ascii_case(&method.name))
            {
                Some(i) => self.methods[i] = method,
                None => self.methods.push(method),
            }
        }
    }
}

/// Fluent builder for [`ClassDef`].
#[derive(Debug)]
pub struct ClassDefBuilder {
    def: ClassDef,
}

impl ClassDefBuilder {
    /// Create a new builder for a root class.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            def: ClassDef {
                name: name.into(),
                superclass: None,
                derivation: Vec::new(),
                qualifiers: Qualifiers::new(),
                properties: Vec::new(),
                methods: Vec::new(),
            },
        }
    }

    /// Derive from an already registered class.
    pub fn superclass(mut self, name: impl Into<String>) -> Self {
        self.def.superclass = Some(name.into());
        self
    }

    /// Attach a class qualifier.
    pub fn qualifier(mut self, name: impl Into<String>, value: impl Into<Variant>) -> Self {
        self.def.qualifiers.insert(name.into(), value.into());
        self
    }

    /// Mark as an association class.
    pub fn association(self) -> Self {
        self.qualifier("Association", true)
    }

    /// Add a key property.
    pub fn key(self, name: impl Into<String>, cim_type: &str) -> Self {
        self.property_def(PropertyDef::new(name, cim_type).key())
    }

    /// Add a plain property.
    pub fn property(self, name: impl Into<String>, cim_type: &str) -> Self {
        self.property_def(PropertyDef::new(name, cim_type))
    }

    /// Add a fully described property.
    pub fn property_def(mut self, prop: PropertyDef) -> Self {
        self.def.properties.push(prop);
        self
    }

    /// Add a method.
    pub fn method(mut self, method: MethodDef) -> Self {
        self.def.methods.push(method);
        self
    }

    /// Build the class definition.
    pub fn build(self) -> ClassDef {
        self.def
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_suffix() {
        let prop = PropertyDef::new("Tags", "string[]");
        assert_eq!(prop.cim_type, "string");
        assert!(prop.is_array);
    }

    #[test]
    fn test_inherit_flattens_members() {
        let base = ClassDef::builder("CIM_Process")
            .key("Handle", "string")
            .property("Name", "string")
            .method(MethodDef::new("Terminate"))
            .build();
        let mut child = ClassDef::builder("Win32_Process")
            .superclass("CIM_Process")
            .property("CommandLine", "string")
            .property_def(PropertyDef::new("Name", "string").qualifier("MaxLen", 260u32))
            .build();
        child.inherit(&base);

        assert_eq!(child.derivation, vec!["CIM_Process".to_string()]);
        let names: Vec<_> = child.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Handle", "Name", "CommandLine"]);
        assert!(child.properties[1].qualifiers.contains_key("MaxLen"));
        assert!(child.method("terminate").is_some());
        assert!(child.isa("cim_process"));
        assert_eq!(child.key_names().collect::<Vec<_>>(), ["Handle"]);
    }
}
