// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WQL construction.
//!
//! Only the subset the client generates is covered: equality filters joined
//! with `AND`, and the two notification query shapes.
//!
//! ```text
//! data:       SELECT <fields|*> FROM <class>[ WHERE f = 'v' AND ...]
//! extrinsic:  SELECT <fields|*> FROM <event class>[ WHERE f = 'v' AND ...]
//! intrinsic:  SELECT <fields|*> FROM __Instance<Type>Event WITHIN <secs>
//!               WHERE TargetInstance ISA '<class>'[ AND TargetInstance.f = 'v' ...]
//! related:    ASSOCIATORS OF {<path>}[ WHERE AssocClass = a ResultClass = r SchemaOnly]
//!             REFERENCES OF {<path>}[ WHERE ResultClass = a ClassDefsOnly]
//! ```
//!
//! Literals are inserted verbatim between single quotes; backslash doubling
//! happens once, when the text is submitted (see [`escape_backslashes`]).

use crate::provider::{AssocQuery, TraversalMode};
use std::fmt;
use std::str::FromStr;

/// Equality filters as `(property, literal)` pairs.
pub type Filters<'a> = &'a [(&'a str, &'a str)];

/// Which intrinsic event to subscribe to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum NotificationType {
    /// Any of creation, modification or deletion.
    #[default]
    Operation,
    Creation,
    Modification,
    Deletion,
}

impl NotificationType {
    /// Fragment used in `__Instance<Type>Event`.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Operation => "Operation",
            NotificationType::Creation => "Creation",
            NotificationType::Modification => "Modification",
            NotificationType::Deletion => "Deletion",
        }
    }

    /// Intrinsic event class name.
    pub fn event_class(&self) -> String {
        format!("__Instance{}Event", self.as_str())
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "operation" => Ok(NotificationType::Operation),
            "creation" => Ok(NotificationType::Creation),
            "modification" => Ok(NotificationType::Modification),
            "deletion" => Ok(NotificationType::Deletion),
            other => Err(format!("Invalid notification type: {}", other)),
        }
    }
}

/// Double every backslash so literals survive the provider's parser.
pub fn escape_backslashes(wql: &str) -> String {
    wql.replace('\\', "\\\\")
}

fn field_list(fields: &[&str]) -> String {
    if fields.is_empty() {
        "*".to_string()
    } else {
        fields.join(", ")
    }
}

fn conditions(filters: Filters<'_>, prefix: &str) -> String {
    filters
        .iter()
        .map(|(name, value)| format!("{}{} = '{}'", prefix, name, value))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// `SELECT <fields> FROM <class>[ WHERE ...]`
pub fn select(class: &str, fields: &[&str], filters: Filters<'_>) -> String {
    let mut wql = format!("SELECT {} FROM {}", field_list(fields), class);
    if !filters.is_empty() {
        wql.push_str(" WHERE ");
        wql.push_str(&conditions(filters, ""));
    }
    wql
}

/// Notification query for an extrinsic event class.
pub fn extrinsic_notification(class: &str, fields: &[&str], filters: Filters<'_>) -> String {
    select(class, fields, filters)
}

/// Notification query for instance operations on `class`, polled every
/// `delay_secs`.
pub fn intrinsic_notification(
    class: &str,
    notification_type: NotificationType,
    delay_secs: u32,
    fields: &[&str],
    filters: Filters<'_>,
) -> String {
    let mut wql = format!(
        "SELECT {} FROM {} WITHIN {} WHERE TargetInstance ISA '{}'",
        field_list(fields),
        notification_type.event_class(),
        delay_secs,
        class
    );
    if !filters.is_empty() {
        wql.push_str(" AND ");
        wql.push_str(&conditions(filters, "TargetInstance."));
    }
    wql
}

fn related(verb: &str, path: &str, clauses: &[(&str, &str)], mode: Option<TraversalMode>) -> String {
    let mut wql = format!("{} OF {{{}}}", verb, path);
    let mut restrictions: Vec<String> = clauses
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(keyword, value)| format!("{} = {}", keyword, value))
        .collect();
    match mode {
        Some(TraversalMode::SchemaOnly) => restrictions.push("SchemaOnly".to_string()),
        Some(TraversalMode::ClassesOnly) => restrictions.push("ClassDefsOnly".to_string()),
        None => {}
    }
    if !restrictions.is_empty() {
        wql.push_str(" WHERE ");
        wql.push_str(&restrictions.join(" "));
    }
    wql
}

/// `ASSOCIATORS OF {<path>}` with the restrictions carried by `query`.
pub fn associators_of(path: &str, query: &AssocQuery) -> String {
    related(
        "ASSOCIATORS",
        path,
        &[
            ("AssocClass", query.assoc_class.as_str()),
            ("ResultClass", query.result_class.as_str()),
        ],
        query.mode,
    )
}

/// `REFERENCES OF {<path>}`. The association class is the result class of
/// a references query: `query.assoc_class`, else `query.result_class`.
pub fn references_of(path: &str, query: &AssocQuery) -> String {
    let assoc = if query.assoc_class.is_empty() {
        query.result_class.as_str()
    } else {
        query.assoc_class.as_str()
    };
    related("REFERENCES", path, &[("ResultClass", assoc)], query.mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select() {
        assert_eq!(select("Win32_Process", &[], &[]), "SELECT * FROM Win32_Process");
        assert_eq!(
            select(
                "Win32_Process",
                &["Name", "ProcessId"],
                &[("Name", "notepad.exe"), ("Priority", "8")]
            ),
            "SELECT Name, ProcessId FROM Win32_Process WHERE Name = 'notepad.exe' AND Priority = '8'"
        );
    }

    #[test]
    fn test_intrinsic_notification() {
        assert_eq!(
            intrinsic_notification("Win32_Process", NotificationType::Creation, 2, &[], &[]),
            "SELECT * FROM __InstanceCreationEvent WITHIN 2 WHERE TargetInstance ISA 'Win32_Process'"
        );
        assert_eq!(
            intrinsic_notification(
                "Win32_Process",
                NotificationType::Operation,
                1,
                &["TargetInstance"],
                &[("Name", "calc.exe")]
            ),
            "SELECT TargetInstance FROM __InstanceOperationEvent WITHIN 1 WHERE TargetInstance ISA 'Win32_Process' AND TargetInstance.Name = 'calc.exe'"
        );
    }

    #[test]
    fn test_associators_of() {
        let path = r#"Win32_Service.Name="Spooler""#;
        assert_eq!(
            associators_of(path, &AssocQuery::default()),
            r#"ASSOCIATORS OF {Win32_Service.Name="Spooler"}"#
        );
        let query = AssocQuery {
            assoc_class: "Win32_DependentService".into(),
            result_class: String::new(),
            mode: Some(TraversalMode::ClassesOnly),
        };
        assert_eq!(
            associators_of(path, &query),
            r#"ASSOCIATORS OF {Win32_Service.Name="Spooler"} WHERE AssocClass = Win32_DependentService ClassDefsOnly"#
        );
    }

    #[test]
    fn test_references_of_uses_assoc_class() {
        let query = AssocQuery {
            assoc_class: "Win32_DependentService".into(),
            result_class: "Win32_Process".into(),
            mode: Some(TraversalMode::SchemaOnly),
        };
        assert_eq!(
            references_of("Win32_Service", &query),
            "REFERENCES OF {Win32_Service} WHERE ResultClass = Win32_DependentService SchemaOnly"
        );
        let fallback = AssocQuery {
            result_class: "Win32_DependentService".into(),
            ..AssocQuery::default()
        };
        assert_eq!(
            references_of("Win32_Service", &fallback),
            "REFERENCES OF {Win32_Service} WHERE ResultClass = Win32_DependentService"
        );
    }

    #[test]
    fn test_escape_backslashes() {
        assert_eq!(
            escape_backslashes(r"SELECT * FROM Win32_Directory WHERE Name = 'C:\Windows'"),
            r"SELECT * FROM Win32_Directory WHERE Name = 'C:\\Windows'"
        );
    }

    #[test]
    fn test_notification_type_parse() {
        assert_eq!(
            "creation".parse::<NotificationType>(),
            Ok(NotificationType::Creation)
        );
        assert!("rename".parse::<NotificationType>().is_err());
        assert_eq!(NotificationType::Deletion.event_class(), "__InstanceDeletionEvent");
    }
}
