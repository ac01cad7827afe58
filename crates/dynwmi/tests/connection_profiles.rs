// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![cfg(feature = "yaml-loaders")]
#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure

//! Connection profiles and provider fixtures loaded from YAML
//!
//! A profile file selects how to connect; a snapshot file describes the
//! provider contents. Both are written to temp files and loaded back.

mod common;

use dynwmi::config::yaml::YamlLoader;
use dynwmi::provider::memory::MemoryProvider;
use dynwmi::provider::Locator;
use dynwmi::{connect, registry, ConnectionOptions, Entry, Error, Variant};
use std::io::Write;
use std::sync::Arc;

const PROFILES: &str = r#"
default_profile: local
config:
  debug: true
profiles:
  local:
    namespace: cimv2
  remote:
    computer: WMIHOST
    namespace: root\cimv2
    user: CORP\operator
    password: hunter2
  conflicting:
    user: CORP\operator
    password: hunter2
    impersonation_level: delegate
  disk:
    moniker: //./root/cimv2:Win32_LogicalDisk.DeviceID="C:"
"#;

const SNAPSHOT: &str = r#"
server: WMIHOST
namespaces:
  - name: root/cimv2
    classes:
      - name: Win32_LogicalDisk
        qualifiers: { dynamic: true }
        properties:
          - { name: DeviceID, type: string, key: true }
          - { name: FreeSpace, type: uint64 }
          - { name: VolumeName, type: string }
        methods:
          - name: Chkdsk
            inputs:
              - { name: FixErrors, type: boolean }
            outputs:
              - { name: ReturnValue, type: uint32 }
            returns: { ReturnValue: 0 }
    instances:
      - class: Win32_LogicalDisk
        values: { DeviceID: "C:", FreeSpace: 1073741824, VolumeName: System }
      - class: Win32_LogicalDisk
        values: { DeviceID: "D:", FreeSpace: 0, VolumeName: Data }
"#;

fn write_temp(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(content.as_bytes()).expect("write");
    file
}

fn fixture() -> MemoryProvider {
    let file = write_temp(SNAPSHOT);
    let snapshot = YamlLoader::load_snapshot(file.path()).expect("snapshot");
    MemoryProvider::from_snapshot(&snapshot).expect("provider")
}

fn profile(name: &str) -> ConnectionOptions {
    let file = write_temp(PROFILES);
    let doc = YamlLoader::load_from_file(file.path()).expect("profiles");
    YamlLoader::get_profile(&doc, name).expect("profile")
}

#[test]
fn test_default_profile_connects_to_snapshot() {
    let provider = fixture();
    let file = write_temp(PROFILES);
    let doc = YamlLoader::load_from_file(file.path()).expect("profiles");
    let options = YamlLoader::get_default_profile(&doc).expect("default");
    assert!(options.config.debug);

    let ns = connect(Arc::new(provider.clone()), &options)
        .expect("connect")
        .into_namespace()
        .expect("namespace");
    assert!(ns.config().debug);
    assert_eq!(
        provider.monikers(),
        vec!["winmgmts:{impersonationLevel=impersonate,authenticationLevel=default}//./root/cimv2"]
    );

    let full = ns
        .class("LogicalDisk")
        .expect("class")
        .filter(&[("VolumeName", "System")])
        .expect("query");
    assert_eq!(full.len(), 1);
    assert_eq!(
        full[0].property("FreeSpace").expect("free"),
        Variant::U64(1_073_741_824)
    );
    let out = full[0]
        .call("Chkdsk", &[Variant::Bool(false)], &[])
        .expect("chkdsk");
    assert_eq!(out[0], Variant::U32(0));
}

#[test]
fn test_remote_profile_uses_credentials() {
    let provider = fixture();
    provider.set_credentials(r"CORP\operator", "hunter2");
    let locator: Arc<dyn Locator> = Arc::new(provider.clone());

    let ns = connect(locator, &profile("remote"))
        .expect("connect")
        .into_namespace()
        .expect("namespace");
    let request = provider.connections().remove(0);
    assert_eq!(request.server, "WMIHOST");
    assert_eq!(request.namespace, "root/cimv2");
    assert_eq!(request.user, r"CORP\operator");
    assert_eq!(ns.instances("Win32_LogicalDisk").expect("instances").len(), 2);
}

#[test]
fn test_conflicting_profile_is_rejected_before_connecting() {
    let provider = fixture();
    let err = connect(Arc::new(provider.clone()), &profile("conflicting"))
        .err()
        .expect("conflict");
    assert!(matches!(err, Error::InvalidConnection(_)));
    assert!(provider.connections().is_empty());
    assert!(provider.monikers().is_empty());
}

#[test]
fn test_moniker_profile_resolves_instance() {
    let provider = fixture();
    match connect(Arc::new(provider), &profile("disk")).expect("connect") {
        Entry::Instance(disk) => {
            assert_eq!(disk.property("VolumeName").expect("name"), Variant::from("System"));
            assert!(disk.instance_of().is_none());
        }
        other => panic!("unexpected entry: {other:?}"),
    }
}

#[test]
fn test_registry_shortcut() {
    let provider = common::provider();
    let reg = registry(Arc::new(provider), &ConnectionOptions::new()).expect("registry");
    let out = reg
        .call(
            "EnumKey",
            &[],
            &[
                ("hDefKey", Variant::U32(0x8000_0002)),
                ("sSubKeyName", Variant::from("SOFTWARE")),
            ],
        )
        .expect("enum");
    assert_eq!(out.named("ReturnValue"), Some(&Variant::U32(0)));
    assert_eq!(out[0], Variant::from(vec!["Microsoft", "Policies"]));
}
