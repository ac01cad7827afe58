// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # dynwmi - Dynamic management-instrumentation client
//!
//! A late-bound client for a WMI-style management provider. Classes,
//! properties and methods are discovered from the provider at runtime and
//! exposed through dynamic lookup; nothing is generated ahead of time.
//!
//! ## Quick Start
//!
//! ```rust
//! use dynwmi::provider::memory::{ClassDef, MemoryProvider, MethodDef};
//! use dynwmi::{connect, ConnectionOptions, Result};
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     let provider = MemoryProvider::new("WMIHOST");
//!     provider.define_class(
//!         "root/cimv2",
//!         ClassDef::builder("Win32_Service")
//!             .key("Name", "string")
//!             .property("State", "string")
//!             .method(MethodDef::new("StopService").output("ReturnValue", "uint32"))
//!             .build(),
//!     )?;
//!     provider.add_instance("root/cimv2", "Win32_Service", &[("Name", "Spooler".into())])?;
//!
//!     // Resolve a namespace through the locator
//!     let ns = connect(Arc::new(provider), &ConnectionOptions::new())?
//!         .into_namespace()
//!         .expect("a namespace moniker");
//!
//!     // "Service" is retried as "Win32_Service"
//!     for service in ns.class("Service")?.filter(&[("Name", "Spooler")])? {
//!         println!("{}", service.property("State")?);
//!         let out = service.call("StopService", &[], &[])?;
//!         println!("{:?}", out.named("ReturnValue"));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        Client layer (!Sync)                         |
//! |   Namespace -> ManagedClass -> ManagedObject -> MethodInvoker       |
//! |                \-> WatchBuilder -> EventWatcher                     |
//! +---------------------------------------------------------------------+
//! |                         Support                                     |
//! |   WQL construction | Timestamp codec | Error translation | Config   |
//! +---------------------------------------------------------------------+
//! |                     Provider seam (Send + Sync)                     |
//! |   Locator | Services | RemoteObject | EventSource                   |
//! |   (memory provider bundled, COM provider behind the `com` feature)  |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Namespace`] | Entry point, resolves class names and runs queries |
//! | [`ManagedClass`] | Schema class, builds `SELECT` and notification queries |
//! | [`ManagedObject`] | Class or instance with lazily fetched members |
//! | [`MethodInvoker`] | Bound method with signature and argument binding |
//! | [`EventWatcher`] | Blocking notification subscription |
//! | [`WmiTime`] | Partial CIM datetime for query literals |
//!
//! ## Modules Overview
//!
//! - [`namespace`] - Namespace, records and watch construction (start here)
//! - [`connect`] - Monikers and connection options
//! - [`provider`] - Transport traits, moniker parsing, the in-memory
//!   provider and (Windows, `com` feature) the native COM provider
//! - [`time`] - Timestamp codec
//! - [`wql`] - Query text construction
//! - [`config`] - Client settings and YAML loaders

pub mod class;
pub mod config;
pub mod connect;
pub mod error;
pub mod method;
pub mod namespace;
pub mod object;
pub mod provider;
pub mod time;
pub mod value;
pub mod watcher;
pub mod wql;

pub use class::ManagedClass;
pub use config::ClientConfig;
pub use connect::{connect, construct_moniker, registry, ConnectionOptions, Entry};
pub use error::{Error, Result};
pub use method::{MethodInvoker, MethodOutput, Parameter};
pub use namespace::{Member, Namespace, Record, WatchBuilder};
pub use object::{ManagedObject, ObjectKind, PropertyMap, PropertyValue, Resolved};
pub use time::WmiTime;
pub use value::Variant;
pub use watcher::{Event, EventKind, EventWatcher};
pub use wql::NotificationType;

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
