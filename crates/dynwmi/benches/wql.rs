// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Query and Timestamp Construction Benchmark
//!
//! Measures the client-side text work done before every provider call:
//! - `SELECT` and notification query construction
//! - CIM datetime formatting and parsing
//! - A filtered class query end to end against the in-memory provider

#![allow(clippy::uninlined_format_args)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dynwmi::provider::memory::{ClassDef, MemoryProvider, DEFAULT_NAMESPACE};
use dynwmi::time::parse_wmi_time;
use dynwmi::wql::{intrinsic_notification, select, NotificationType};
use dynwmi::{Namespace, WmiTime};

fn bench_query_text(c: &mut Criterion) {
    let filters = [("State", "Running"), ("StartMode", "Auto"), ("Name", r"C:\Windows")];

    c.bench_function("wql_select_filtered", |b| {
        b.iter(|| select(black_box("Win32_Service"), &["Name", "State"], black_box(&filters)));
    });

    c.bench_function("wql_intrinsic_notification", |b| {
        b.iter(|| {
            intrinsic_notification(
                black_box("Win32_Service"),
                NotificationType::Modification,
                2,
                &[],
                black_box(&filters),
            )
        });
    });
}

fn bench_timestamps(c: &mut Criterion) {
    let time = WmiTime::new(2026, 10, 18, 9, 30, 0)
        .with_microseconds(250_000)
        .with_offset_minutes(60);
    let text = time.to_wmi_time();

    c.bench_function("wmi_time_format", |b| b.iter(|| black_box(&time).to_wmi_time()));
    c.bench_function("wmi_time_parse", |b| b.iter(|| parse_wmi_time(black_box(&text))));
}

fn bench_filtered_query(c: &mut Criterion) {
    let provider = MemoryProvider::new("BENCH");
    provider
        .define_class(
            DEFAULT_NAMESPACE,
            ClassDef::builder("Win32_Service")
                .key("Name", "string")
                .property("State", "string")
                .build(),
        )
        .expect("define");
    for i in 0..256 {
        let state = if i % 4 == 0 { "Running" } else { "Stopped" };
        provider
            .add_instance(
                DEFAULT_NAMESPACE,
                "Win32_Service",
                &[("Name", format!("svc{}", i).into()), ("State", state.into())],
            )
            .expect("add");
    }
    let ns = Namespace::new(provider.services(DEFAULT_NAMESPACE).expect("services"));
    let class = ns.class("Service").expect("class");

    c.bench_function("class_filter_256", |b| {
        b.iter(|| {
            let hits = class.filter(black_box(&[("State", "Running")])).expect("query");
            assert_eq!(hits.len(), 64);
        });
    });
}

criterion_group!(benches, bench_query_text, bench_timestamps, bench_filtered_query);
criterion_main!(benches);
