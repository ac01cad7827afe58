// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared fixture: a small host with services, processes, their
//! association, an extrinsic trace event and the registry provider.

#![allow(dead_code)]

use dynwmi::provider::memory::{ClassDef, MemoryProvider, MethodDef, PropertyDef, DEFAULT_NAMESPACE};
use dynwmi::provider::ProviderError;
use dynwmi::{Namespace, Variant};

pub const SERVER: &str = "WMIHOST";

pub fn provider() -> MemoryProvider {
    let provider = MemoryProvider::new(SERVER);
    define_schema(&provider).expect("fixture schema");
    populate(&provider).expect("fixture instances");
    provider
}

pub fn namespace(provider: &MemoryProvider) -> Namespace {
    Namespace::new(provider.services(DEFAULT_NAMESPACE).expect("services"))
}

fn define_schema(provider: &MemoryProvider) -> Result<(), ProviderError> {
    provider.define_class(
        DEFAULT_NAMESPACE,
        ClassDef::builder("CIM_Service")
            .qualifier("abstract", true)
            .key("Name", "string")
            .property("State", "string")
            .build(),
    )?;
    provider.define_class(
        DEFAULT_NAMESPACE,
        ClassDef::builder("Win32_Service")
            .superclass("CIM_Service")
            .property("StartMode", "string")
            .property("AcceptStop", "boolean")
            .property("ProcessId", "uint32")
            .property("Tags", "string[]")
            .method(
                MethodDef::new("StopService")
                    .output("ReturnValue", "uint32")
                    .returns(vec![("ReturnValue".into(), 0u32.into())]),
            )
            .method(
                MethodDef::new("ChangeStartMode")
                    .input("StartMode", "string")
                    .output("ReturnValue", "uint32")
                    .privileges(&["SeLoadDriverPrivilege"])
                    .handler(|call| {
                        let code: u32 = match call.input("StartMode").and_then(Variant::as_str) {
                            Some("Auto" | "Manual" | "Disabled") => 0,
                            _ => 21,
                        };
                        Ok(vec![("ReturnValue".into(), code.into())])
                    }),
            )
            .method(
                MethodDef::new("SetTags")
                    .input("Tags", "string[]")
                    .input("Reason", "string")
                    .output("Previous", "string[]")
                    .output("ReturnValue", "uint32")
                    .handler(|call| {
                        let count = call
                            .input("Tags")
                            .and_then(Variant::as_array)
                            .map_or(0, <[Variant]>::len);
                        Ok(vec![("ReturnValue".into(), (count as u32).into())])
                    }),
            )
            .build(),
    )?;
    provider.define_class(
        DEFAULT_NAMESPACE,
        ClassDef::builder("Win32_ProcessStartup")
            .property_def(PropertyDef::new("ShowWindow", "uint16").default_value(1u16))
            .build(),
    )?;
    provider.define_class(
        DEFAULT_NAMESPACE,
        ClassDef::builder("Win32_Process")
            .key("Handle", "string")
            .property("Name", "string")
            .property("WorkingSetSize", "uint64")
            .method(
                MethodDef::new("Create")
                    .input("CommandLine", "string")
                    .input("CurrentDirectory", "string")
                    .input("ProcessStartupInformation", "object:Win32_ProcessStartup")
                    .output("ProcessId", "uint32")
                    .output("ReturnValue", "uint32")
                    .returns(vec![
                        ("ProcessId".into(), 4242u32.into()),
                        ("ReturnValue".into(), 0u32.into()),
                    ]),
            )
            .build(),
    )?;
    provider.define_class(
        DEFAULT_NAMESPACE,
        ClassDef::builder("Win32_ServiceProcess")
            .association()
            .key("Service", "ref:Win32_Service")
            .key("Process", "ref:Win32_Process")
            .build(),
    )?;
    provider.define_class(
        DEFAULT_NAMESPACE,
        ClassDef::builder("Win32_ProcessStartTrace")
            .superclass("__ExtrinsicEvent")
            .property("ProcessName", "string")
            .property("ProcessID", "uint32")
            .build(),
    )?;
    provider.define_class(
        "root/default",
        ClassDef::builder("StdRegProv")
            .method(
                MethodDef::new("EnumKey")
                    .input("hDefKey", "uint32")
                    .input("sSubKeyName", "string")
                    .output("sNames", "string[]")
                    .output("ReturnValue", "uint32")
                    .returns(vec![
                        ("sNames".into(), vec!["Microsoft", "Policies"].into()),
                        ("ReturnValue".into(), 0u32.into()),
                    ]),
            )
            .build(),
    )?;
    Ok(())
}

fn populate(provider: &MemoryProvider) -> Result<(), ProviderError> {
    for (name, state, mode, pid) in [
        ("Spooler", "Running", "Auto", 1840u32),
        ("Fax", "Stopped", "Manual", 0),
        ("W32Time", "Running", "Auto", 1204),
    ] {
        provider.add_instance(
            DEFAULT_NAMESPACE,
            "Win32_Service",
            &[
                ("Name", name.into()),
                ("State", state.into()),
                ("StartMode", mode.into()),
                ("AcceptStop", (state == "Running").into()),
                ("ProcessId", pid.into()),
            ],
        )?;
    }
    for (handle, name, ws) in [("1840", "spoolsv.exe", 9_830_400u64), ("1204", "svchost.exe", 4_194_304)] {
        provider.add_instance(
            DEFAULT_NAMESPACE,
            "Win32_Process",
            &[
                ("Handle", handle.into()),
                ("Name", name.into()),
                ("WorkingSetSize", ws.into()),
            ],
        )?;
    }
    for (service, handle) in [("Spooler", "1840"), ("W32Time", "1204")] {
        provider.add_instance(
            DEFAULT_NAMESPACE,
            "Win32_ServiceProcess",
            &[
                (
                    "Service",
                    format!(r#"\\{}\root\cimv2:Win32_Service.Name="{}""#, SERVER, service).into(),
                ),
                (
                    "Process",
                    format!(r#"\\{}\root\cimv2:Win32_Process.Handle="{}""#, SERVER, handle).into(),
                ),
            ],
        )?;
    }
    Ok(())
}
