// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Method invoker.
//!
//! A [`MethodInvoker`] reads a method's schema once (qualifiers, input and
//! output parameter lists) and then binds, validates and dispatches calls.
//!
//! ```text
//! Create(CommandLine string, CurrentDirectory string) => (ProcessId uint32, ReturnValue uint32)
//! SetDateTime(LocalDateTime datetime) => (ReturnValue uint32) | Needs: SystemTime
//! ```
//!
//! Binding rules:
//! - positional arguments follow the declared input order;
//! - named arguments replace positional ones bound to the same parameter;
//! - array-typed parameters only accept [`Variant::Array`].
//!
//! Everything is checked before the provider is contacted.

use crate::error::{Error, Result};
use crate::provider::{ObjectHandle, ParameterDescriptor, Qualifiers};
use crate::value::Variant;
use std::fmt;
use std::ops::Index;

/// One declared method parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Parameter name.
    pub name: String,
    /// Array-typed parameter.
    pub is_array: bool,
    /// Declared type from the `CIMTYPE` qualifier.
    pub cim_type: Option<String>,
    /// Values from the `BitMap` qualifier.
    pub bitmap: Option<Vec<u64>>,
}

impl Parameter {
    fn from_descriptor(desc: &ParameterDescriptor) -> Self {
        let cim_type = qualifier(&desc.qualifiers, "CIMTYPE")
            .and_then(Variant::as_str)
            .map(str::to_string);
        let bitmap = qualifier(&desc.qualifiers, "BitMap").map(|bits| match bits {
            Variant::Array(items) => items.iter().filter_map(Variant::as_u64).collect(),
            other => other.as_u64().into_iter().collect(),
        });
        Self {
            name: desc.name.clone(),
            is_array: desc.is_array,
            cim_type,
            bitmap,
        }
    }

    /// `name type[]`, as shown in signatures.
    fn render(&self) -> String {
        let mut text = self.name.clone();
        if let Some(cim_type) = &self.cim_type {
            text.push(' ');
            text.push_str(cim_type);
        }
        if self.is_array {
            text.push_str("[]");
        }
        text
    }
}

fn qualifier<'a>(qualifiers: &'a Qualifiers, name: &str) -> Option<&'a Variant> {
    qualifiers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn strings(value: &Variant) -> Vec<String> {
    match value {
        Variant::Array(items) => items.iter().map(ToString::to_string).collect(),
        Variant::Null | Variant::Empty => Vec::new(),
        other => vec![other.to_string()],
    }
}

/// Callable view of one remote method.
pub struct MethodInvoker {
    handle: ObjectHandle,
    name: String,
    qualifiers: Qualifiers,
    privileges: Vec<String>,
    provenance: String,
    /// `None` when the method declares no input parameters.
    in_parameters: Option<Vec<Parameter>>,
    out_parameters: Vec<Parameter>,
    signature: String,
}

impl MethodInvoker {
    /// Read the schema of method `name` on `handle`.
    pub fn new(handle: ObjectHandle, name: &str) -> Result<Self> {
        let desc = handle.method(name)?;
        let privileges = qualifier(&desc.qualifiers, "Privileges")
            .map(strings)
            .unwrap_or_default();
        let provenance = qualifier(&desc.qualifiers, "MappingStrings")
            .map(|v| strings(v).join("\n"))
            .unwrap_or_default();
        let in_parameters = desc
            .in_parameters
            .as_ref()
            .map(|params| params.iter().map(Parameter::from_descriptor).collect::<Vec<_>>());
        let out_parameters: Vec<Parameter> = desc
            .out_parameters
            .iter()
            .flatten()
            .map(Parameter::from_descriptor)
            .collect();

        let render = |params: &[Parameter]| {
            params
                .iter()
                .map(Parameter::render)
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut signature = format!(
            "{}({}) => ({})",
            desc.name,
            render(in_parameters.as_deref().unwrap_or_default()),
            render(&out_parameters)
        );
        if !privileges.is_empty() {
            signature.push_str(" | Needs: ");
            signature.push_str(&privileges.join(", "));
        }

        Ok(Self {
            handle,
            name: desc.name,
            qualifiers: desc.qualifiers,
            privileges,
            provenance,
            in_parameters,
            out_parameters,
            signature,
        })
    }

    /// Method name as declared.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `name(in type, ...) => (out type, ...)[ | Needs: ...]`.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Privileges the method requires.
    pub fn privileges(&self) -> &[String] {
        &self.privileges
    }

    /// Documentation mapping strings, one per line.
    pub fn provenance(&self) -> &str {
        &self.provenance
    }

    pub fn qualifiers(&self) -> &Qualifiers {
        &self.qualifiers
    }

    /// Input parameters in declared order.
    pub fn in_parameters(&self) -> &[Parameter] {
        self.in_parameters.as_deref().unwrap_or_default()
    }

    /// Output parameters in declared order.
    pub fn out_parameters(&self) -> &[Parameter] {
        &self.out_parameters
    }

    /// Invoke the method.
    ///
    /// `args` bind positionally, `named` by parameter name (case-insensitive)
    /// and win over positional values for the same parameter.
    ///
    /// # Errors
    ///
    /// - [`Error::TooManyArguments`] for surplus positional arguments
    /// - [`Error::ParameterType`] for a non-array value on an array parameter
    /// - [`Error::UnknownParameter`] for an undeclared name
    /// - translated provider errors from the call itself
    pub fn call(&self, args: &[Variant], named: &[(&str, Variant)]) -> Result<MethodOutput> {
        let out = match &self.in_parameters {
            None => {
                if !args.is_empty() {
                    return Err(Error::TooManyArguments {
                        method: self.name.clone(),
                        expected: 0,
                        given: args.len(),
                    });
                }
                if let Some((name, _)) = named.first() {
                    return Err(Error::UnknownParameter {
                        name: (*name).to_string(),
                        signature: self.signature.clone(),
                    });
                }
                log::trace!("[dynwmi::method] exec {}", self.name);
                self.handle.exec_method(&self.name, None)?
            }
            Some(params) => {
                let inputs = self.bind(params, args, named)?;
                log::trace!(
                    "[dynwmi::method] exec {} with {} bound input(s)",
                    self.name,
                    inputs.len()
                );
                self.handle.exec_method(&self.name, Some(&inputs))?
            }
        };

        let mut values = Vec::with_capacity(self.out_parameters.len());
        for param in &self.out_parameters {
            let value = out.property(&param.name)?.value;
            let value = if param.is_array {
                match value.into_array() {
                    Some(items) => Variant::Array(items),
                    None => return Err(self.scalar_for_array(&param.name)),
                }
            } else {
                value
            };
            values.push(value);
        }
        Ok(MethodOutput {
            names: self.out_parameters.iter().map(|p| p.name.clone()).collect(),
            values,
        })
    }

    fn bind(
        &self,
        params: &[Parameter],
        args: &[Variant],
        named: &[(&str, Variant)],
    ) -> Result<Vec<(String, Variant)>> {
        if args.len() > params.len() {
            return Err(Error::TooManyArguments {
                method: self.name.clone(),
                expected: params.len(),
                given: args.len(),
            });
        }

        let mut bound: Vec<Option<Variant>> = vec![None; params.len()];
        for (n, (param, value)) in params.iter().zip(args).enumerate() {
            if param.is_array && !value.is_array() {
                return Err(Error::ParameterType {
                    parameter: param.name.clone(),
                    position: Some(n),
                });
            }
            bound[n] = Some(value.clone());
        }

        for (name, value) in named {
            let Some(n) = params.iter().position(|p| p.name == *name) else {
                return Err(Error::UnknownParameter {
                    name: (*name).to_string(),
                    signature: self.signature.clone(),
                });
            };
            if params[n].is_array && !value.is_array() {
                return Err(Error::ParameterType {
                    parameter: params[n].name.clone(),
                    position: None,
                });
            }
            bound[n] = Some(value.clone());
        }

        Ok(params
            .iter()
            .zip(bound)
            .filter_map(|(param, value)| value.map(|v| (param.name.clone(), v)))
            .collect())
    }

    fn scalar_for_array(&self, name: &str) -> Error {
        log::warn!(
            "[dynwmi::method] {} returned a scalar for array output {}",
            self.name,
            name
        );
        Error::ParameterType {
            parameter: name.to_string(),
            position: None,
        }
    }
}

impl fmt::Display for MethodInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.signature)
    }
}

impl fmt::Debug for MethodInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInvoker")
            .field("signature", &self.signature)
            .finish()
    }
}

/// Output values of a call, one per declared output parameter, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodOutput {
    names: Vec<String>,
    values: Vec<Variant>,
}

impl MethodOutput {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at position `n`.
    pub fn get(&self, n: usize) -> Option<&Variant> {
        self.values.get(n)
    }

    /// Value of the output parameter `name` (case-insensitive).
    pub fn named(&self, name: &str) -> Option<&Variant> {
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .and_then(|n| self.values.get(n))
    }

    /// Output parameter names in declared order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[Variant] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Variant> {
        self.values
    }
}

impl Index<usize> for MethodOutput {
    type Output = Variant;

    fn index(&self, n: usize) -> &Variant {
        &self.values[n]
    }
}

impl IntoIterator for MethodOutput {
    type Item = Variant;
    type IntoIter = std::vec::IntoIter<Variant>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::{ClassDef, MemoryProvider, MethodDef, DEFAULT_NAMESPACE};

    fn process_class() -> ObjectHandle {
        let provider = MemoryProvider::new("WMIHOST");
        provider
            .define_class(
                DEFAULT_NAMESPACE,
                ClassDef::builder("Win32_Process")
                    .key("Handle", "string")
                    .method(
                        MethodDef::new("Create")
                            .input("CommandLine", "string")
                            .input("CurrentDirectory", "string")
                            .output("ProcessId", "uint32")
                            .output("ReturnValue", "uint32")
                            .qualifier("MappingStrings", vec!["Win32API|Process|CreateProcess"])
                            .handler(|call| {
                                let pid = match call.input("CommandLine").and_then(Variant::as_str) {
                                    Some(_) => 1234u32,
                                    None => 0,
                                };
                                Ok(vec![
                                    ("ProcessId".into(), pid.into()),
                                    ("ReturnValue".into(), 0u32.into()),
                                ])
                            }),
                    )
                    .method(
                        MethodDef::new("Terminate")
                            .input_bitmap("Reason", "uint32", &["0", "1"])
                            .output("ReturnValue", "uint32")
                            .privileges(&["SeDebugPrivilege", "SeShutdownPrivilege"])
                            .returns(vec![("ReturnValue".into(), 0u32.into())]),
                    )
                    .method(
                        MethodDef::new("SetTags")
                            .input("Tags", "string[]")
                            .output("Previous", "string[]")
                            .handler(|_| Ok(vec![])),
                    )
                    .method(MethodDef::new("Refresh").output("ReturnValue", "uint32"))
                    .build(),
            )
            .expect("define");
        provider
            .services(DEFAULT_NAMESPACE)
            .expect("services")
            .get("Win32_Process")
            .expect("class")
    }

    #[test]
    fn test_signature() {
        let class = process_class();
        let create = MethodInvoker::new(class.clone(), "Create").expect("create");
        assert_eq!(
            create.signature(),
            "Create(CommandLine string, CurrentDirectory string) => (ProcessId uint32, ReturnValue uint32)"
        );
        assert_eq!(create.provenance(), "Win32API|Process|CreateProcess");

        let terminate = MethodInvoker::new(class.clone(), "Terminate").expect("terminate");
        assert_eq!(
            terminate.signature(),
            "Terminate(Reason uint32) => (ReturnValue uint32) | Needs: SeDebugPrivilege, SeShutdownPrivilege"
        );
        assert_eq!(terminate.in_parameters()[0].bitmap, Some(vec![0, 1]));

        let tags = MethodInvoker::new(class, "SetTags").expect("tags");
        assert_eq!(tags.signature(), "SetTags(Tags string[]) => (Previous string[])");
        assert_eq!(
            tags.to_string(),
            "<function SetTags(Tags string[]) => (Previous string[])>"
        );
    }

    #[test]
    fn test_named_argument_call() {
        let create = MethodInvoker::new(process_class(), "Create").expect("create");
        let out = create
            .call(&[], &[("CommandLine", "notepad.exe".into())])
            .expect("call");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Variant::U32(1234));
        assert_eq!(out.named("returnvalue"), Some(&Variant::U32(0)));

        // parameter names bind exactly as declared
        match create.call(&[], &[("commandline", "notepad.exe".into())]) {
            Err(Error::UnknownParameter { name, .. }) => assert_eq!(name, "commandline"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_named_overrides_positional() {
        let class = process_class();
        let create = MethodInvoker::new(class, "Create").expect("create");
        let out = create
            .call(
                &[Variant::Null],
                &[("commandline", "calc.exe".into())],
            )
            .expect("call");
        assert_eq!(out[0], Variant::U32(1234));
    }

    #[test]
    fn test_too_many_positional() {
        let create = MethodInvoker::new(process_class(), "Create").expect("create");
        let err = create
            .call(&["a".into(), "b".into(), "c".into()], &[])
            .err()
            .expect("error");
        assert!(matches!(
            err,
            Error::TooManyArguments {
                expected: 2,
                given: 3,
                ..
            }
        ));

        let refresh = MethodInvoker::new(process_class(), "Refresh").expect("refresh");
        assert!(refresh.in_parameters().is_empty());
        assert!(matches!(
            refresh.call(&["x".into()], &[]),
            Err(Error::TooManyArguments { expected: 0, .. })
        ));
    }

    #[test]
    fn test_array_parameter_requires_array() {
        let tags = MethodInvoker::new(process_class(), "SetTags").expect("tags");
        let err = tags.call(&["solo".into()], &[]).err().expect("error");
        assert_eq!(err.to_string(), "parameter 0 must be iterable");

        let err = tags
            .call(&[], &[("Tags", "solo".into())])
            .err()
            .expect("error");
        assert_eq!(err.to_string(), "Tags must be iterable");

        let out = tags
            .call(&[Variant::from(vec!["a", "b"])], &[])
            .expect("call");
        // absent array output reads as an empty array
        assert_eq!(out.values(), &[Variant::Array(vec![])]);
    }

    #[test]
    fn test_unknown_named_parameter() {
        let create = MethodInvoker::new(process_class(), "Create").expect("create");
        let err = create
            .call(&[], &[("Priority", 4u32.into())])
            .err()
            .expect("error");
        match err {
            Error::UnknownParameter { name, signature } => {
                assert_eq!(name, "Priority");
                assert!(signature.starts_with("Create("));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_method_is_provider_error() {
        let err = MethodInvoker::new(process_class(), "Explode").err().expect("error");
        assert!(matches!(err, Error::Provider { .. }));
    }

    #[test]
    fn test_single_output_is_still_a_tuple() {
        let refresh = MethodInvoker::new(process_class(), "Refresh").expect("refresh");
        let out = refresh.call(&[], &[]).expect("call");
        assert_eq!(out.len(), 1);
        assert!(out[0].is_null());
        let class = process_class();
        assert!(class.method_names().expect("names").contains(&"Refresh".to_string()));
    }
}
