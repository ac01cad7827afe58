// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Notification delivery for the in-memory provider.
//!
//! Each `ExecNotificationQuery` registers a [`Subscription`] holding the
//! parsed query and the sending half of an unbounded channel. Events posted
//! to the namespace (intrinsic ones on put/delete, extrinsic ones through an
//! [`EventSender`]) are fanned out to every matching subscription; the
//! [`MemoryEventSource`] blocks on the receiving half.

use super::object::MemoryObject;
use super::query::Select;
use super::store::NamespaceStore;
use crate::provider::{
    EventSource, ObjectHandle, ProviderError, ProviderResult, WBEM_E_FAILED, WBEM_E_INVALID_CLASS,
    WBEM_E_TIMED_OUT,
};
use crate::value::Variant;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds between 1601-01-01 and 1970-01-01.
const EPOCH_DIFFERENCE_SECS: u64 = 11_644_473_600;

/// Current time as 100 ns ticks since 1601.
pub(crate) fn ticks_now() -> u64 {
    let since_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (since_unix.as_secs() + EPOCH_DIFFERENCE_SECS) * 10_000_000
        + u64::from(since_unix.subsec_nanos() / 100)
}

pub(crate) struct Subscription {
    pub(crate) query: Select,
    pub(crate) tx: Sender<ObjectHandle>,
}

impl Subscription {
    pub(crate) fn wants(&self, event: &MemoryObject) -> bool {
        event.class_def().isa(&self.query.class) && self.query.condition.matches(event)
    }
}

/// Receiving end of a notification query.
pub struct MemoryEventSource {
    rx: Receiver<ObjectHandle>,
}

impl MemoryEventSource {
    pub(crate) fn new(rx: Receiver<ObjectHandle>) -> Self {
        Self { rx }
    }
}

impl EventSource for MemoryEventSource {
    fn next_event(&self, timeout: Option<Duration>) -> ProviderResult<ObjectHandle> {
        let closed = || ProviderError::wbem(WBEM_E_FAILED, "SWbemEventSource", "Subscription closed");
        match timeout {
            None => self.rx.recv().map_err(|_| closed()),
            Some(timeout) => self.rx.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => {
                    ProviderError::wbem(WBEM_E_TIMED_OUT, "SWbemEventSource", "Timed out")
                }
                RecvTimeoutError::Disconnected => closed(),
            }),
        }
    }
}

/// Posts extrinsic events into a namespace; cloneable and `Send`.
#[derive(Clone)]
pub struct EventSender {
    ns: Arc<NamespaceStore>,
}

impl EventSender {
    pub(crate) fn new(ns: Arc<NamespaceStore>) -> Self {
        Self { ns }
    }

    /// Raise an event of `class` with the given property values.
    ///
    /// `TIME_CREATED` is filled in unless supplied.
    pub fn fire(&self, class: &str, values: &[(&str, Variant)]) -> ProviderResult<()> {
        let def = self
            .ns
            .class(class)
            .filter(|def| def.isa("__Event"))
            .ok_or_else(|| {
                ProviderError::wbem(WBEM_E_INVALID_CLASS, "SWbemServicesEx", "Not an event class")
            })?;
        let event = MemoryObject::spawn(&self.ns, def);
        event.set_value("TIME_CREATED", Variant::U64(ticks_now()));
        for (name, value) in values {
            event.set_value(name, value.clone());
        }
        log::trace!("[dynwmi::memory] fire {} in {}", class, self.ns.name);
        self.ns.post(Arc::new(event));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;

    #[test]
    fn test_ticks_after_unix_epoch() {
        assert!(ticks_now() > EPOCH_DIFFERENCE_SECS * 10_000_000);
    }

    #[test]
    fn test_timeout_reports_nested_code() {
        let (_tx, rx) = channel::unbounded();
        let source = MemoryEventSource::new(rx);
        let err = source
            .next_event(Some(Duration::from_millis(5)))
            .err()
            .expect("timeout");
        assert_eq!(err.scode(), Some(WBEM_E_TIMED_OUT));
    }
}
