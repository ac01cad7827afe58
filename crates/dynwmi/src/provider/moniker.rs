// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `winmgmts:` moniker parsing.
//!
//! ```text
//! winmgmts:[{security}[!]][//server][/namespace][:object path]
//!
//! security := item (, item)*
//! item     := impersonationLevel=<level> | authenticationLevel=<level>
//!           | authority=<authority> | (privilege, !privilege, ...)
//! ```
//!
//! Both `/` and `\` separate the server and namespace segments.

/// The parts of a parsed moniker. Absent parts are left to the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Moniker {
    /// `impersonationLevel` from the security block.
    pub impersonation_level: Option<String>,
    /// `authenticationLevel` from the security block.
    pub authentication_level: Option<String>,
    /// `authority` from the security block.
    pub authority: Option<String>,
    /// Privilege names, `!` prefixed when revoked.
    pub privileges: Vec<String>,
    /// Target server; `None` means the local machine.
    pub server: Option<String>,
    /// Namespace with `/` separators.
    pub namespace: Option<String>,
    /// Object path after the namespace.
    pub object: Option<String>,
}

impl Moniker {
    /// True when the moniker names the local machine.
    pub fn is_local(&self) -> bool {
        self.server.as_deref().map_or(true, |s| s.is_empty() || s == ".")
    }
}

const PROTOCOL: &str = "winmgmts:";

/// Split a moniker into its parts.
///
/// Parsing is lenient: an unterminated security block swallows the rest of
/// the text and an empty namespace is reported as absent.
pub fn parse(moniker: &str) -> Moniker {
    let mut parts = Moniker::default();
    let mut rest = moniker.trim();
    if rest.len() >= PROTOCOL.len() && rest[..PROTOCOL.len()].eq_ignore_ascii_case(PROTOCOL) {
        rest = &rest[PROTOCOL.len()..];
    }
    if let Some(block) = rest.strip_prefix('{') {
        let (security, after) = match block.find('}') {
            Some(end) => (&block[..end], &block[end + 1..]),
            None => (block, ""),
        };
        parse_security(security, &mut parts);
        rest = after.strip_prefix('!').unwrap_or(after);
    }
    if rest.starts_with("//") || rest.starts_with("\\\\") {
        let after = &rest[2..];
        let server_end = after.find(['/', '\\', ':']).unwrap_or(after.len());
        parts.server = Some(after[..server_end].to_string()).filter(|s| !s.is_empty());
        rest = &after[server_end..];
    }
    let rest = rest.trim_start_matches(['/', '\\']);
    let (namespace, object) = match rest.split_once(':') {
        Some((ns, obj)) => (ns, Some(obj)),
        None => (rest, None),
    };
    parts.namespace = Some(namespace.replace('\\', "/")).filter(|ns| !ns.is_empty());
    parts.object = object.filter(|o| !o.is_empty()).map(str::to_string);
    parts
}

fn parse_security(block: &str, parts: &mut Moniker) {
    let mut rest = block;
    while !rest.trim().is_empty() {
        let item_end = if rest.trim_start().starts_with('(') {
            rest.find(')').map_or(rest.len(), |end| end + 1)
        } else {
            rest.find(',').unwrap_or(rest.len())
        };
        let item = rest[..item_end].trim();
        rest = rest[item_end..].trim_start().trim_start_matches(',');

        if let Some(list) = item.strip_prefix('(') {
            parts.privileges.extend(
                list.trim_end_matches(')')
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
            );
            continue;
        }
        let Some((key, value)) = item.split_once('=') else {
            log::debug!("[dynwmi::provider] ignoring moniker security item {:?}", item);
            continue;
        };
        let value = Some(value.trim().to_string());
        match key.trim().to_ascii_lowercase().as_str() {
            "impersonationlevel" => parts.impersonation_level = value,
            "authenticationlevel" => parts.authentication_level = value,
            "authority" => parts.authority = value,
            other => log::debug!("[dynwmi::provider] ignoring moniker security key {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_protocol() {
        let parts = parse("winmgmts:");
        assert_eq!(parts, Moniker::default());
        assert!(parts.is_local());
    }

    #[test]
    fn test_parse_security_block() {
        let parts = parse(
            "WINMGMTS:{impersonationLevel=Impersonate, authenticationLevel=pktPrivacy,\
             authority=kerberos:CORP\\host,(Security, !RemoteShutdown)}!//./root/default:StdRegProv",
        );
        assert_eq!(parts.impersonation_level.as_deref(), Some("Impersonate"));
        assert_eq!(parts.authentication_level.as_deref(), Some("pktPrivacy"));
        assert_eq!(parts.authority.as_deref(), Some("kerberos:CORP\\host"));
        assert_eq!(parts.privileges, vec!["Security", "!RemoteShutdown"]);
        assert_eq!(parts.server.as_deref(), Some("."));
        assert!(parts.is_local());
        assert_eq!(parts.namespace.as_deref(), Some("root/default"));
        assert_eq!(parts.object.as_deref(), Some("StdRegProv"));
    }

    #[test]
    fn test_parse_backslash_server() {
        let parts = parse(r#"winmgmts:\\HOST\root\cimv2:Win32_Process.Handle="4""#);
        assert_eq!(parts.server.as_deref(), Some("HOST"));
        assert!(!parts.is_local());
        assert_eq!(parts.namespace.as_deref(), Some("root/cimv2"));
        assert_eq!(parts.object.as_deref(), Some(r#"Win32_Process.Handle="4""#));
    }

    #[test]
    fn test_parse_server_without_namespace() {
        let parts = parse("winmgmts://HOST");
        assert_eq!(parts.server.as_deref(), Some("HOST"));
        assert_eq!(parts.namespace, None);
        assert_eq!(parts.object, None);
    }

    #[test]
    fn test_parse_unterminated_security_block() {
        let parts = parse("winmgmts:{impersonationLevel=impersonate");
        assert_eq!(parts.impersonation_level.as_deref(), Some("impersonate"));
        assert_eq!(parts.namespace, None);
    }
}
