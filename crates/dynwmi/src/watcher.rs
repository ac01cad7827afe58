// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event watcher.
//!
//! Wraps a notification subscription. Waits block the calling thread; the
//! timeout is the only way to regain control, so several watchers are
//! multiplexed by polling each with a short timeout and skipping
//! [`Error::is_timeout`] results.
//!
//! # Example
//!
//! ```rust
//! use dynwmi::provider::memory::{ClassDef, MemoryProvider};
//! use dynwmi::Namespace;
//! use std::time::Duration;
//!
//! let provider = MemoryProvider::new("WMIHOST");
//! provider
//!     .define_class("root/cimv2", ClassDef::builder("Win32_Process").key("Handle", "string").build())
//!     .expect("define");
//! let ns = Namespace::new(provider.services("root/cimv2").expect("services"));
//! let mut watcher = ns.watch_for("Process").start().expect("subscribe");
//!
//! let err = watcher.next_event(Some(Duration::from_millis(10))).err().expect("nothing yet");
//! assert!(err.is_timeout());
//! ```

use crate::error::{format_provider_error, translate, Error, Result};
use crate::namespace::Connection;
use crate::object::ManagedObject;
use crate::provider::{
    EventSource, ObjectHandle, ProviderError, WBEM_E_NOT_FOUND, WBEM_E_TIMED_OUT,
};
use crate::time::{from_1601, from_1601_str};
use crate::value::Variant;
use chrono::NaiveDateTime;
use std::fmt;
use std::ops::Deref;
use std::time::Duration;

/// Instance operation reported by an intrinsic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Creation,
    Modification,
    Deletion,
}

impl EventKind {
    /// Classify from an `__Instance<Kind>Event` class name.
    pub fn from_event_class(class: &str) -> Option<Self> {
        let kind = class
            .strip_prefix("__Instance")
            .and_then(|rest| rest.strip_suffix("Event"))?;
        match kind.to_ascii_lowercase().as_str() {
            "creation" => Some(EventKind::Creation),
            "modification" => Some(EventKind::Modification),
            "deletion" => Some(EventKind::Deletion),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EventKind::Creation => "creation",
            EventKind::Modification => "modification",
            EventKind::Deletion => "deletion",
        };
        f.write_str(text)
    }
}

/// A delivered event.
///
/// For intrinsic subscriptions `object` is the target instance and the
/// remaining fields are filled from the event envelope. Extrinsic events
/// are returned as-is with no kind, timestamp or previous instance.
#[derive(Clone)]
pub struct Event {
    pub object: ManagedObject,
    pub kind: Option<EventKind>,
    /// `TIME_CREATED`, with no timezone adjustment.
    pub timestamp: Option<NaiveDateTime>,
    /// Prior state, for modifications.
    pub previous: Option<ManagedObject>,
}

impl Deref for Event {
    type Target = ManagedObject;

    fn deref(&self) -> &ManagedObject {
        &self.object
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("object", &self.object)
            .field("kind", &self.kind)
            .field("timestamp", &self.timestamp)
            .field("previous", &self.previous)
            .finish()
    }
}

/// A live notification subscription.
pub struct EventWatcher {
    source: Box<dyn EventSource>,
    is_extrinsic: bool,
    connection: Connection,
}

impl EventWatcher {
    pub(crate) fn new(source: Box<dyn EventSource>, is_extrinsic: bool, connection: Connection) -> Self {
        Self {
            source,
            is_extrinsic,
            connection,
        }
    }

    /// True when the subscription targets an extrinsic event class.
    pub fn is_extrinsic(&self) -> bool {
        self.is_extrinsic
    }

    /// Block until the next event, or until `timeout` elapses.
    ///
    /// `None` waits indefinitely. An elapsed timeout is reported as
    /// [`Error::TimedOut`].
    pub fn next_event(&mut self, timeout: Option<Duration>) -> Result<Event> {
        let raw = self.source.next_event(timeout).map_err(Self::wait_error)?;
        if self.is_extrinsic {
            return Ok(Event {
                object: self.connection.wrap(raw, None, &[])?,
                kind: None,
                timestamp: None,
                previous: None,
            });
        }
        self.intrinsic(raw)
    }

    fn wait_error(err: ProviderError) -> Error {
        if err.has_code(WBEM_E_TIMED_OUT) {
            return Error::TimedOut {
                message: format_provider_error(&err),
            };
        }
        translate(err)
    }

    fn intrinsic(&self, raw: ObjectHandle) -> Result<Event> {
        let class = raw.path()?.class;
        let target = match optional_property(&raw, "TargetInstance")? {
            Variant::Object(handle) => handle,
            other => {
                log::warn!(
                    "[dynwmi::watcher] {} carries no target instance ({})",
                    class,
                    other.type_name()
                );
                return Ok(Event {
                    object: self.connection.wrap(raw, None, &[])?,
                    kind: EventKind::from_event_class(&class),
                    timestamp: None,
                    previous: None,
                });
            }
        };

        let timestamp = event_timestamp(&class, optional_property(&raw, "TIME_CREATED")?);
        // only modification events declare PreviousInstance
        let previous = match optional_property(&raw, "PreviousInstance")? {
            Variant::Object(handle) => Some(self.connection.wrap(handle, None, &[])?),
            _ => None,
        };

        Ok(Event {
            object: self.connection.wrap(target, None, &[])?,
            kind: EventKind::from_event_class(&class),
            timestamp,
            previous,
        })
    }
}

/// Value of a property the event class may not declare; absent reads as `Null`.
fn optional_property(raw: &ObjectHandle, name: &str) -> Result<Variant> {
    match raw.property(name) {
        Ok(desc) => Ok(desc.value),
        Err(e) if e.has_code(WBEM_E_NOT_FOUND) => Ok(Variant::Null),
        Err(e) => Err(translate(e)),
    }
}

fn event_timestamp(class: &str, raw: Variant) -> Option<NaiveDateTime> {
    let parsed = match raw {
        Variant::Null | Variant::Empty => return None,
        Variant::String(text) => from_1601_str(&text),
        other => match other.as_u64() {
            Some(ticks) => from_1601(ticks),
            None => Err(Error::InvalidTimestamp(other.to_string())),
        },
    };
    match parsed {
        Ok(at) => Some(at),
        Err(e) => {
            log::warn!("[dynwmi::watcher] {} delivered without a timestamp: {}", class, e);
            None
        }
    }
}

impl Iterator for EventWatcher {
    type Item = Result<Event>;

    /// Blocks indefinitely; never returns `None`.
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_event(None))
    }
}

impl fmt::Debug for EventWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventWatcher")
            .field("is_extrinsic", &self.is_extrinsic)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::connect::Context;
    use crate::provider::memory::{ClassDef, MemoryEventSource, MemoryProvider, DEFAULT_NAMESPACE};
    use crate::provider::{
        AssocQuery, MethodDescriptor, ObjectPath, PropertyDescriptor, ProviderResult, Qualifiers,
        RemoteObject, WBEM_E_FAILED,
    };
    use crate::wql::NotificationType;
    use crate::Namespace;
    use crossbeam::channel;

    const WAIT: Option<Duration> = Some(Duration::from_millis(200));

    fn namespace() -> (MemoryProvider, Namespace) {
        let provider = MemoryProvider::new("WMIHOST");
        provider
            .define_class(
                DEFAULT_NAMESPACE,
                ClassDef::builder("Win32_Service")
                    .key("Name", "string")
                    .property("State", "string")
                    .build(),
            )
            .expect("define");
        provider
            .define_class(
                DEFAULT_NAMESPACE,
                ClassDef::builder("Win32_ProcessStartTrace")
                    .superclass("__ExtrinsicEvent")
                    .property("ProcessName", "string")
                    .build(),
            )
            .expect("define");
        provider
            .add_instance(
                DEFAULT_NAMESPACE,
                "Win32_Service",
                &[("Name", "Spooler".into()), ("State", "Running".into())],
            )
            .expect("add");
        let ns = Namespace::new(provider.services(DEFAULT_NAMESPACE).expect("services"));
        (provider, ns)
    }

    #[test]
    fn test_event_kind_from_class() {
        assert_eq!(
            EventKind::from_event_class("__InstanceCreationEvent"),
            Some(EventKind::Creation)
        );
        assert_eq!(
            EventKind::from_event_class("__InstanceDeletionEvent"),
            Some(EventKind::Deletion)
        );
        assert_eq!(EventKind::from_event_class("__InstanceOperationEvent"), None);
        assert_eq!(EventKind::from_event_class("Win32_ProcessStartTrace"), None);
    }

    #[test]
    fn test_timeout_is_its_own_kind() {
        let (_provider, ns) = namespace();
        let mut watcher = ns.watch_for("Service").start().expect("subscribe");
        assert!(!watcher.is_extrinsic());
        let err = watcher
            .next_event(Some(Duration::from_millis(10)))
            .err()
            .expect("timeout");
        assert!(err.is_timeout());
        assert!(err.to_string().contains("80043001"));
    }

    #[test]
    fn test_intrinsic_modification_carries_previous() {
        let (_provider, ns) = namespace();
        let mut watcher = ns
            .watch_for("Service")
            .notification_type(NotificationType::Modification)
            .start()
            .expect("subscribe");

        let spooler = ns
            .class("Service")
            .expect("class")
            .filter(&[("Name", "Spooler")])
            .expect("query")
            .remove(0);
        spooler.set("State", "Stopped").expect("set");

        let event = watcher.next_event(WAIT).expect("event");
        assert_eq!(event.kind, Some(EventKind::Modification));
        assert!(event.timestamp.is_some());
        assert_eq!(event.property("State").expect("state"), Variant::from("Stopped"));
        let previous = event.previous.as_ref().expect("previous");
        assert_eq!(previous.property("State").expect("state"), Variant::from("Running"));
    }

    #[test]
    fn test_intrinsic_creation_via_iterator() {
        let (_provider, ns) = namespace();
        let mut watcher = ns
            .watch_for("Service")
            .notification_type(NotificationType::Creation)
            .start()
            .expect("subscribe");
        let fax = ns
            .new_instance("Service", &[("Name", "Fax".into())])
            .expect("spawn");
        fax.put().expect("put");

        let event = watcher.next().expect("item").expect("event");
        assert_eq!(event.kind, Some(EventKind::Creation));
        assert_eq!(event.property("Name").expect("name"), Variant::from("Fax"));
        assert!(event.previous.is_none());
    }

    #[test]
    fn test_extrinsic_event_is_wrapped_directly() {
        let (provider, ns) = namespace();
        let mut watcher = ns
            .watch_for("ProcessStartTrace")
            .filter("ProcessName", "notepad.exe")
            .start()
            .expect("subscribe");
        assert!(watcher.is_extrinsic());

        let sender = provider.event_sender(DEFAULT_NAMESPACE).expect("sender");
        sender
            .fire("Win32_ProcessStartTrace", &[("ProcessName", "calc.exe".into())])
            .expect("fire");
        sender
            .fire("Win32_ProcessStartTrace", &[("ProcessName", "notepad.exe".into())])
            .expect("fire");

        let event = watcher.next_event(WAIT).expect("event");
        assert!(event.kind.is_none());
        assert_eq!(
            event.property("ProcessName").expect("name"),
            Variant::from("notepad.exe")
        );
        assert!(watcher
            .next_event(Some(Duration::from_millis(10)))
            .err()
            .is_some_and(|e| e.is_timeout()));
    }

    #[test]
    fn test_unparseable_time_created_still_delivers() {
        let (provider, ns) = namespace();
        let mut watcher = ns
            .watch_for("Service")
            .notification_type(NotificationType::Creation)
            .start()
            .expect("subscribe");
        let spooler = ns.get(r#"Win32_Service.Name="Spooler""#).expect("spooler");

        provider
            .event_sender(DEFAULT_NAMESPACE)
            .expect("sender")
            .fire(
                "__InstanceCreationEvent",
                &[
                    ("TargetInstance", Variant::Object(spooler.handle().clone())),
                    ("TIME_CREATED", Variant::from("soon")),
                ],
            )
            .expect("fire");

        let event = watcher.next_event(WAIT).expect("event");
        assert_eq!(event.kind, Some(EventKind::Creation));
        assert!(event.timestamp.is_none());
        assert_eq!(event.property("Name").expect("name"), Variant::from("Spooler"));
    }

    #[test]
    fn test_event_class_without_time_created() {
        let (provider, ns) = namespace();
        provider
            .define_class(
                DEFAULT_NAMESPACE,
                ClassDef::builder("Custom_InstanceCreationEvent")
                    .property("TargetInstance", "object")
                    .build(),
            )
            .expect("define");
        let spooler = ns.get(r#"Win32_Service.Name="Spooler""#).expect("spooler");
        let raw = ns
            .new_instance(
                "Custom_InstanceCreationEvent",
                &[("TargetInstance", Variant::Object(spooler.handle().clone()))],
            )
            .expect("spawn");

        let (tx, rx) = channel::unbounded();
        tx.send(raw.handle().clone()).expect("send");
        let connection = Connection::new(
            provider.services(DEFAULT_NAMESPACE).expect("services"),
            Context::new(None, ClientConfig::default()),
        );
        let mut watcher = EventWatcher::new(Box::new(MemoryEventSource::new(rx)), false, connection);

        let event = watcher.next_event(WAIT).expect("event");
        assert!(event.timestamp.is_none());
        assert!(event.previous.is_none());
        assert_eq!(event.property("Name").expect("name"), Variant::from("Spooler"));
    }

    /// Remote object whose every call fails with `WBEM_E_FAILED`.
    struct Unreachable;

    fn failed<T>() -> ProviderResult<T> {
        Err(ProviderError::wbem(WBEM_E_FAILED, "SWbemObjectEx", "Generic failure"))
    }

    impl RemoteObject for Unreachable {
        fn path(&self) -> ProviderResult<ObjectPath> {
            failed()
        }
        fn derivation(&self) -> ProviderResult<Vec<String>> {
            failed()
        }
        fn qualifiers(&self) -> ProviderResult<Qualifiers> {
            failed()
        }
        fn property_names(&self) -> ProviderResult<Vec<String>> {
            failed()
        }
        fn property(&self, _name: &str) -> ProviderResult<PropertyDescriptor> {
            failed()
        }
        fn set_property(&self, _name: &str, _value: Variant) -> ProviderResult<()> {
            failed()
        }
        fn method_names(&self) -> ProviderResult<Vec<String>> {
            failed()
        }
        fn method(&self, _name: &str) -> ProviderResult<MethodDescriptor> {
            failed()
        }
        fn exec_method(
            &self,
            _name: &str,
            _in_parameters: Option<&[(String, Variant)]>,
        ) -> ProviderResult<ObjectHandle> {
            failed()
        }
        fn put(&self) -> ProviderResult<()> {
            failed()
        }
        fn compare_to(&self, _other: &dyn RemoteObject) -> ProviderResult<bool> {
            failed()
        }
        fn object_text(&self) -> ProviderResult<String> {
            failed()
        }
        fn associators(&self, _query: &AssocQuery) -> ProviderResult<Vec<ObjectHandle>> {
            failed()
        }
        fn references(&self, _query: &AssocQuery) -> ProviderResult<Vec<ObjectHandle>> {
            failed()
        }
        fn spawn_instance(&self) -> ProviderResult<ObjectHandle> {
            failed()
        }
        fn instances(&self) -> ProviderResult<Vec<ObjectHandle>> {
            failed()
        }
        fn native(&self, _name: &str) -> ProviderResult<Variant> {
            failed()
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn test_optional_property_propagates_other_failures() {
        let broken: ObjectHandle = std::sync::Arc::new(Unreachable);
        match optional_property(&broken, "PreviousInstance") {
            Err(Error::Provider { message, .. }) => assert!(message.contains("80041001")),
            other => panic!("unexpected {:?}", other.map(|v| v.type_name())),
        }

        let (_provider, ns) = namespace();
        let spooler = ns.get(r#"Win32_Service.Name="Spooler""#).expect("spooler");
        assert_eq!(
            optional_property(spooler.handle(), "PreviousInstance").expect("absent"),
            Variant::Null
        );
        assert_eq!(
            optional_property(spooler.handle(), "State").expect("declared"),
            Variant::from("Running")
        );
    }
}
