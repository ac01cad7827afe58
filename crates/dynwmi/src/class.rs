// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Managed classes.
//!
//! A [`ManagedClass`] is a [`ManagedObject`] for a schema class plus the
//! query surface: building `SELECT` statements, watching for events,
//! enumerating and spawning instances. Query and watch go through the
//! owning namespace; a class wrapped directly from a raw handle has none.

use crate::connect::Context;
use crate::error::{Error, Result};
use crate::namespace::{Connection, WatchBuilder, WatchTarget};
use crate::object::ManagedObject;
use crate::provider::ObjectHandle;
use crate::value::Variant;
use crate::wql::{self, Filters};
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// A schema class.
#[derive(Clone)]
pub struct ManagedClass {
    object: ManagedObject,
    name: String,
    connection: Option<Connection>,
}

impl ManagedClass {
    /// Wrap a raw class handle with no owning namespace.
    ///
    /// Such a class can be inspected and its methods called, but
    /// [`query`](Self::query) and [`watch_for`](Self::watch_for) fail with
    /// [`Error::NoNamespace`].
    pub fn new(handle: ObjectHandle) -> Result<Self> {
        Self::build(handle, Context::detached(), None)
    }

    pub(crate) fn build(
        handle: ObjectHandle,
        ctx: Rc<Context>,
        connection: Option<Connection>,
    ) -> Result<Self> {
        let name = handle.path()?.class;
        let object = ManagedObject::build(handle, ctx, None, connection.clone(), &[])?;
        Ok(Self {
            object,
            name,
            connection,
        })
    }

    /// Class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when the class can issue queries.
    pub fn has_namespace(&self) -> bool {
        self.connection.is_some()
    }

    pub(crate) fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    fn require_connection(&self) -> Result<&Connection> {
        self.connection
            .as_ref()
            .ok_or_else(|| Error::NoNamespace(self.name.clone()))
    }

    /// `SELECT <fields|*> FROM <class>[ WHERE f = 'v' AND ...]`.
    ///
    /// Results record this class as their origin and expose only `fields`
    /// when given.
    pub fn query(&self, fields: &[&str], filters: Filters<'_>) -> Result<Vec<ManagedObject>> {
        let connection = self.require_connection()?;
        let wql = wql::select(&self.name, fields, filters);
        connection.query(&wql, Some(self), fields)
    }

    /// All properties, equality filters only.
    pub fn filter(&self, filters: Filters<'_>) -> Result<Vec<ManagedObject>> {
        self.query(&[], filters)
    }

    /// Watch events on this class.
    pub fn watch_for(&self) -> Result<WatchBuilder> {
        let connection = self.require_connection()?;
        Ok(WatchBuilder::new(
            connection.clone(),
            None,
            WatchTarget::Class(self.clone()),
        ))
    }

    /// This class and every class reachable from it through associations,
    /// depth first, each paired with its distance from this one.
    ///
    /// Each class is reported once.
    pub fn walk_related(&self) -> Result<Vec<(ManagedClass, usize)>> {
        let mut visited = HashSet::new();
        let mut walked = Vec::new();
        self.walk_from(0, &mut visited, &mut walked)?;
        Ok(walked)
    }

    fn walk_from(
        &self,
        level: usize,
        visited: &mut HashSet<String>,
        walked: &mut Vec<(ManagedClass, usize)>,
    ) -> Result<()> {
        visited.insert(self.name.to_ascii_lowercase());
        walked.push((self.clone(), level));
        for (name, related) in self.associated_classes()? {
            if !visited.contains(&name.to_ascii_lowercase()) {
                related.walk_from(level + 1, visited, walked)?;
            }
        }
        Ok(())
    }

    /// Every instance, through the provider's own enumeration.
    pub fn instances(&self) -> Result<Vec<ManagedObject>> {
        self.object
            .handle()
            .instances()?
            .into_iter()
            .map(|handle| {
                ManagedObject::build(
                    handle,
                    self.object.ctx().clone(),
                    Some(self.clone()),
                    self.connection.clone(),
                    &[],
                )
            })
            .collect()
    }

    /// Spawn an instance and set `values` on it.
    ///
    /// The instance has no path and is not committed; it is typically
    /// passed to a method such as `Create`.
    pub fn new_instance(&self, values: &[(&str, Variant)]) -> Result<ManagedObject> {
        let handle = self.object.handle().spawn_instance()?;
        let instance = ManagedObject::build(
            handle,
            self.object.ctx().clone(),
            Some(self.clone()),
            self.connection.clone(),
            &[],
        )?;
        instance.set_many(values)?;
        Ok(instance)
    }

    /// The class as a plain object.
    pub fn as_object(&self) -> &ManagedObject {
        &self.object
    }
}

impl Deref for ManagedClass {
    type Target = ManagedObject;

    fn deref(&self) -> &ManagedObject {
        &self.object
    }
}

impl fmt::Display for ManagedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.object, f)
    }
}

impl fmt::Debug for ManagedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.object.path() {
            Ok(path) => write!(f, "<ManagedClass: {}>", path.path),
            Err(_) => write!(f, "<ManagedClass: {}>", self.name),
        }
    }
}
