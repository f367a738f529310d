//! ULID-based identifier generation with prefixes.
//!
//! Identifiers in agstream follow the pattern: `prefix_ulid`
//! For example: `run_01hqxyz...` for runs.

use ulid::Ulid;

/// Known identifier prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdPrefix {
    Thread,
    Run,
    Message,
    Thinking,
    ToolResult,
}

impl IdPrefix {
    /// Get the string prefix for this identifier type.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdPrefix::Thread => "thr",
            IdPrefix::Run => "run",
            IdPrefix::Message => "msg",
            IdPrefix::Thinking => "thk",
            IdPrefix::ToolResult => "tlr",
        }
    }

    /// Parse a prefix from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "thr" => Some(IdPrefix::Thread),
            "run" => Some(IdPrefix::Run),
            "msg" => Some(IdPrefix::Message),
            "thk" => Some(IdPrefix::Thinking),
            "tlr" => Some(IdPrefix::ToolResult),
            _ => None,
        }
    }
}

/// Identifier generation and parsing utilities.
pub struct Identifier;

impl Identifier {
    /// Generate a new ascending identifier (newer = larger).
    pub fn ascending(prefix: IdPrefix) -> String {
        Self::with_ulid(prefix, Ulid::new())
    }

    /// Generate an identifier with a specific ULID (for testing or imports).
    pub fn with_ulid(prefix: IdPrefix, ulid: Ulid) -> String {
        format!("{}_{}", prefix.as_str(), ulid.to_string().to_lowercase())
    }

    /// Parse an identifier into its prefix and ULID parts.
    pub fn parse(id: &str) -> Option<(IdPrefix, Ulid)> {
        let (prefix, ulid) = id.split_once('_')?;
        let prefix = IdPrefix::parse(prefix)?;
        let ulid = Ulid::from_string(ulid).ok()?;
        Some((prefix, ulid))
    }

    /// Check if an identifier has the expected prefix.
    pub fn has_prefix(id: &str, prefix: IdPrefix) -> bool {
        id.strip_prefix(prefix.as_str())
            .is_some_and(|rest| rest.starts_with('_'))
    }

    pub fn thread() -> String {
        Self::ascending(IdPrefix::Thread)
    }

    pub fn run() -> String {
        Self::ascending(IdPrefix::Run)
    }

    pub fn message() -> String {
        Self::ascending(IdPrefix::Message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascending_id() {
        let id = Identifier::ascending(IdPrefix::Run);
        assert!(id.starts_with("run_"));
        assert_eq!(id.len(), 30); // "run_" (4) + ULID (26)
    }

    #[test]
    fn test_ids_are_ordered() {
        let first = Identifier::ascending(IdPrefix::Message);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = Identifier::ascending(IdPrefix::Message);
        assert!(second > first);
    }

    #[test]
    fn test_parse_roundtrip() {
        let ulid = Ulid::new();
        let id = Identifier::with_ulid(IdPrefix::Thinking, ulid);
        let (prefix, parsed) = Identifier::parse(&id).unwrap();
        assert_eq!(prefix, IdPrefix::Thinking);
        assert_eq!(parsed, ulid);
    }

    #[test]
    fn test_parse_rejects_unknown_prefix() {
        assert!(Identifier::parse("xyz_01hqxyz").is_none());
        assert!(Identifier::parse("no-separator").is_none());
    }

    #[test]
    fn test_has_prefix() {
        let id = Identifier::thread();
        assert!(Identifier::has_prefix(&id, IdPrefix::Thread));
        assert!(!Identifier::has_prefix(&id, IdPrefix::Run));
        assert!(!Identifier::has_prefix("thrx", IdPrefix::Thread));
    }
}
