// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Declarative provider contents.
//!
//! A [`MemorySnapshot`] describes namespaces, classes and instances as plain
//! data so fixtures can live in YAML files (see
//! `config::yaml::YamlLoader::load_snapshot`). Method implementations are
//! limited to fixed `returns` values.
//!
//! ```yaml
//! server: WMIHOST
//! namespaces:
//!   - name: root/cimv2
//!     classes:
//!       - name: Win32_Service
//!         properties:
//!           - { name: Name, type: string, key: true }
//!           - { name: State, type: string }
//!         methods:
//!           - name: StopService
//!             outputs: [{ name: ReturnValue, type: uint32 }]
//!             returns: { ReturnValue: 0 }
//!     instances:
//!       - class: Win32_Service
//!         values: { Name: Spooler, State: Running }
//! ```

use super::schema::{ClassDef, ClassDefBuilder, MethodDef, PropertyDef};
use super::{MemoryProvider, DEFAULT_NAMESPACE};
use crate::provider::{ProviderError, ProviderResult, WBEM_E_INVALID_CLASS};
use crate::value::Variant;
use serde::Deserialize;
use std::collections::BTreeMap;

/// A loosely typed literal, converted using the declared CIM type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SnapshotValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<SnapshotValue>),
}

impl SnapshotValue {
    /// Convert without type information (qualifiers).
    pub fn to_variant(&self) -> Variant {
        match self {
            SnapshotValue::Null => Variant::Null,
            SnapshotValue::Bool(b) => Variant::Bool(*b),
            SnapshotValue::Int(n) => i32::try_from(*n).map_or(Variant::I64(*n), Variant::I32),
            SnapshotValue::Float(f) => Variant::F64(*f),
            SnapshotValue::Text(s) => Variant::String(s.clone()),
            SnapshotValue::List(items) => {
                Variant::Array(items.iter().map(SnapshotValue::to_variant).collect())
            }
        }
    }

    /// Convert to the variant matching a CIM type (`uint32`, `string`, ...).
    pub fn to_typed(&self, cim_type: &str) -> Variant {
        match self {
            SnapshotValue::List(items) => {
                Variant::Array(items.iter().map(|v| v.to_typed(cim_type)).collect())
            }
            SnapshotValue::Null => Variant::Null,
            SnapshotValue::Int(n) => int_as(*n, cim_type),
            SnapshotValue::Float(f) => match cim_type {
                "real32" => Variant::F32(*f as f32),
                "string" | "datetime" => Variant::String(f.to_string()),
                _ => Variant::F64(*f),
            },
            SnapshotValue::Text(s) => match cim_type {
                "string" | "datetime" | "object" => Variant::String(s.clone()),
                t if t.starts_with("ref") => Variant::String(s.clone()),
                _ => match s.trim().parse::<i64>() {
                    Ok(n) => int_as(n, cim_type),
                    Err(_) => Variant::String(s.clone()),
                },
            },
            SnapshotValue::Bool(b) => match cim_type {
                "string" => Variant::String(if *b { "TRUE" } else { "FALSE" }.to_string()),
                _ => Variant::Bool(*b),
            },
        }
    }
}

fn int_as(n: i64, cim_type: &str) -> Variant {
    let fallback = Variant::I64(n);
    match cim_type {
        "uint8" => u8::try_from(n).map_or(fallback, Variant::U8),
        "uint16" => u16::try_from(n).map_or(fallback, Variant::U16),
        "uint32" => u32::try_from(n).map_or(fallback, Variant::U32),
        "uint64" => u64::try_from(n).map_or(fallback, Variant::U64),
        "sint8" => i8::try_from(n).map_or(fallback, Variant::I8),
        "sint16" => i16::try_from(n).map_or(fallback, Variant::I16),
        "sint32" => i32::try_from(n).map_or(fallback, Variant::I32),
        "real32" => Variant::F32(n as f32),
        "real64" => Variant::F64(n as f64),
        "boolean" => Variant::Bool(n != 0),
        "string" | "datetime" => Variant::String(n.to_string()),
        _ => fallback,
    }
}

fn qualifiers_of(raw: &BTreeMap<String, SnapshotValue>) -> impl Iterator<Item = (String, Variant)> + '_ {
    raw.iter().map(|(k, v)| (k.clone(), v.to_variant()))
}

/// Whole provider contents.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemorySnapshot {
    /// Server name used in paths.
    pub server: Option<String>,
    pub namespaces: Vec<NamespaceSnapshot>,
}

/// One namespace.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NamespaceSnapshot {
    pub name: String,
    /// Registered in order; superclasses must come first.
    pub classes: Vec<ClassSnapshot>,
    pub instances: Vec<InstanceSnapshot>,
}

/// One class definition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClassSnapshot {
    pub name: String,
    pub superclass: Option<String>,
    pub qualifiers: BTreeMap<String, SnapshotValue>,
    pub properties: Vec<PropertySnapshot>,
    pub methods: Vec<MethodSnapshot>,
}

/// One property; `type` accepts a `[]` suffix for arrays.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PropertySnapshot {
    pub name: String,
    #[serde(rename = "type")]
    pub cim_type: String,
    pub key: bool,
    pub qualifiers: BTreeMap<String, SnapshotValue>,
    pub default: Option<SnapshotValue>,
}

/// One method parameter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ParamSnapshot {
    pub name: String,
    #[serde(rename = "type")]
    pub cim_type: String,
}

/// One method with fixed outputs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MethodSnapshot {
    pub name: String,
    pub qualifiers: BTreeMap<String, SnapshotValue>,
    pub inputs: Vec<ParamSnapshot>,
    pub outputs: Vec<ParamSnapshot>,
    pub returns: BTreeMap<String, SnapshotValue>,
}

/// One stored instance.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InstanceSnapshot {
    pub class: String,
    pub values: BTreeMap<String, SnapshotValue>,
}

impl ClassSnapshot {
    fn to_class_def(&self) -> ClassDef {
        let mut builder = ClassDefBuilder::new(self.name.clone());
        if let Some(parent) = &self.superclass {
            builder = builder.superclass(parent.clone());
        }
        for (name, value) in qualifiers_of(&self.qualifiers) {
            builder = builder.qualifier(name, value);
        }
        for prop in &self.properties {
            let mut def = PropertyDef::new(prop.name.clone(), &prop.cim_type);
            if prop.key {
                def = def.key();
            }
            for (name, value) in qualifiers_of(&prop.qualifiers) {
                def = def.qualifier(name, value);
            }
            if let Some(default) = &prop.default {
                let typed = default.to_typed(&def.cim_type);
                def = def.default_value(typed);
            }
            builder = builder.property_def(def);
        }
        for method in &self.methods {
            builder = builder.method(method.to_method_def());
        }
        builder.build()
    }
}

impl MethodSnapshot {
    fn to_method_def(&self) -> MethodDef {
        let mut def = MethodDef::new(self.name.clone());
        for (name, value) in qualifiers_of(&self.qualifiers) {
            def = def.qualifier(name, value);
        }
        for input in &self.inputs {
            def = def.input(input.name.clone(), &input.cim_type);
        }
        for output in &self.outputs {
            def = def.output(output.name.clone(), &output.cim_type);
        }
        let outputs: Vec<(String, Variant)> = self
            .returns
            .iter()
            .map(|(name, value)| {
                let cim_type = def
                    .outputs
                    .iter()
                    .find(|p| p.name.eq_ignore_ascii_case(name))
                    .map_or("", |p| p.cim_type.as_str());
                (name.clone(), value.to_typed(cim_type))
            })
            .collect();
        def.returns(outputs)
    }
}

impl MemoryProvider {
    /// Build a provider from a snapshot.
    pub fn from_snapshot(snapshot: &MemorySnapshot) -> ProviderResult<Self> {
        let provider = MemoryProvider::new(snapshot.server.as_deref().unwrap_or("LOCALHOST"));
        provider.load_snapshot(snapshot)?;
        Ok(provider)
    }

    /// Add a snapshot's namespaces, classes and instances.
    pub fn load_snapshot(&self, snapshot: &MemorySnapshot) -> ProviderResult<()> {
        for ns in &snapshot.namespaces {
            let name = if ns.name.is_empty() {
                DEFAULT_NAMESPACE
            } else {
                ns.name.as_str()
            };
            self.add_namespace(name)?;
            for class in &ns.classes {
                self.define_class(name, class.to_class_def())?;
            }
            let store = self.namespace(name)?;
            for instance in &ns.instances {
                let def = store.class(&instance.class).ok_or_else(|| {
                    ProviderError::wbem(
                        WBEM_E_INVALID_CLASS,
                        "SWbemServicesEx",
                        format!("Unknown class {}", instance.class),
                    )
                })?;
                let values: Vec<(&str, Variant)> = instance
                    .values
                    .iter()
                    .map(|(prop, raw)| {
                        let cim_type = def
                            .property_index(prop)
                            .map_or("", |i| def.properties[i].cim_type.as_str());
                        (prop.as_str(), raw.to_typed(cim_type))
                    })
                    .collect();
                self.add_instance(name, &instance.class, &values)?;
            }
        }
        log::debug!(
            "[dynwmi::memory] loaded snapshot with {} namespace(s)",
            snapshot.namespaces.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_conversion() {
        assert_eq!(SnapshotValue::Int(7).to_typed("uint32"), Variant::U32(7));
        assert_eq!(SnapshotValue::Int(-1).to_typed("uint8"), Variant::I64(-1));
        assert_eq!(
            SnapshotValue::Text("42".into()).to_typed("uint64"),
            Variant::U64(42)
        );
        assert_eq!(
            SnapshotValue::Int(42).to_typed("string"),
            Variant::from("42")
        );
        assert_eq!(
            SnapshotValue::List(vec![SnapshotValue::Int(1)]).to_typed("uint16"),
            Variant::Array(vec![Variant::U16(1)])
        );
    }

    #[test]
    fn test_load_snapshot() {
        let snapshot = MemorySnapshot {
            server: Some("FIXTURE".into()),
            namespaces: vec![NamespaceSnapshot {
                name: "root/cimv2".into(),
                classes: vec![ClassSnapshot {
                    name: "Win32_Service".into(),
                    properties: vec![
                        PropertySnapshot {
                            name: "Name".into(),
                            cim_type: "string".into(),
                            key: true,
                            ..PropertySnapshot::default()
                        },
                        PropertySnapshot {
                            name: "ProcessId".into(),
                            cim_type: "uint32".into(),
                            ..PropertySnapshot::default()
                        },
                    ],
                    ..ClassSnapshot::default()
                }],
                instances: vec![InstanceSnapshot {
                    class: "Win32_Service".into(),
                    values: [
                        ("Name".to_string(), SnapshotValue::Text("Spooler".into())),
                        ("ProcessId".to_string(), SnapshotValue::Int(1044)),
                    ]
                    .into_iter()
                    .collect(),
                }],
            }],
        };
        let provider = MemoryProvider::from_snapshot(&snapshot).expect("load");
        let services = provider.services("root/cimv2").expect("services");
        let svc = services
            .get(r#"Win32_Service.Name="Spooler""#)
            .expect("instance");
        assert_eq!(
            svc.property("ProcessId").expect("pid").value,
            Variant::U32(1044)
        );
        assert_eq!(provider.server(), "FIXTURE");
    }
}
