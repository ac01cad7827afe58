// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure

//! Several watchers polled from one thread
//!
//! Waits are blocking, so watchers are multiplexed with short timeouts and
//! timeouts are skipped. Extrinsic events are raised from a second thread.

mod common;

use dynwmi::provider::memory::DEFAULT_NAMESPACE;
use dynwmi::{EventKind, NotificationType, Variant};
use std::thread;
use std::time::{Duration, Instant};

const POLL: Option<Duration> = Some(Duration::from_millis(10));
const DEADLINE: Duration = Duration::from_secs(5);

#[test]
fn test_poll_two_watchers_with_short_timeouts() {
    let provider = common::provider();
    let ns = common::namespace(&provider);

    let mut traces = ns
        .watch_for("ProcessStartTrace")
        .fields(&["ProcessName"])
        .start()
        .expect("extrinsic");
    let mut deletions = ns
        .watch_for("Service")
        .notification_type(NotificationType::Deletion)
        .start()
        .expect("intrinsic");
    assert!(traces.is_extrinsic());
    assert!(!deletions.is_extrinsic());

    let sender = provider.event_sender(DEFAULT_NAMESPACE).expect("sender");
    let firing = thread::spawn(move || {
        for name in ["notepad.exe", "calc.exe"] {
            sender
                .fire("Win32_ProcessStartTrace", &[("ProcessName", name.into())])
                .expect("fire");
        }
    });
    provider
        .delete_instance(DEFAULT_NAMESPACE, r#"Win32_Service.Name="Fax""#)
        .expect("delete");
    firing.join().expect("firing thread");

    let mut started = Vec::new();
    let mut deleted = Vec::new();
    let begin = Instant::now();
    while (started.len() < 2 || deleted.is_empty()) && begin.elapsed() < DEADLINE {
        match traces.next_event(POLL) {
            Ok(event) => started.push(event.property("ProcessName").expect("name")),
            Err(e) if e.is_timeout() => {}
            Err(e) => panic!("trace watcher failed: {}", e),
        }
        match deletions.next_event(POLL) {
            Ok(event) => deleted.push(event),
            Err(e) if e.is_timeout() => {}
            Err(e) => panic!("deletion watcher failed: {}", e),
        }
    }

    assert_eq!(
        started,
        vec![Variant::from("notepad.exe"), Variant::from("calc.exe")]
    );
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].kind, Some(EventKind::Deletion));
    assert_eq!(deleted[0].property("Name").expect("name"), Variant::from("Fax"));
    assert!(deleted[0].timestamp.is_some());
}

#[test]
fn test_filtered_intrinsic_watch_ignores_other_instances() {
    let provider = common::provider();
    let ns = common::namespace(&provider);
    let mut watcher = ns
        .class("Service")
        .expect("class")
        .watch_for()
        .expect("builder")
        .notification_type(NotificationType::Modification)
        .filter("Name", "Spooler")
        .start()
        .expect("subscribe");

    ns.get(r#"Win32_Service.Name="Fax""#)
        .expect("fax")
        .set("State", "Running")
        .expect("set fax");
    assert!(watcher
        .next_event(POLL)
        .err()
        .is_some_and(|e| e.is_timeout()));

    ns.get(r#"Win32_Service.Name="Spooler""#)
        .expect("spooler")
        .set("State", "Paused")
        .expect("set spooler");
    let event = watcher
        .next_event(Some(Duration::from_millis(500)))
        .expect("event");
    assert_eq!(event.kind, Some(EventKind::Modification));
    assert_eq!(
        event.previous.as_ref().expect("previous").property("State").expect("state"),
        Variant::from("Running")
    );
}
