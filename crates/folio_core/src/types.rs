//! Core type definitions for FolioDB.

use std::fmt;

/// Unique identifier for a page.
///
/// A page is an independently versioned key-value store with its own
/// commit graph and sync scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId(pub [u8; 16]);

impl PageId {
    /// Creates a page id from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page:")?;
        for b in &self.0[..4] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Encryption and sync isolation scope, typically one per page.
///
/// Keys are derived per namespace, so two namespaces cannot decrypt each
/// other's data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Creates a namespace from its identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the namespace identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the identifier bytes used for key derivation.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a journal transaction.
///
/// Journal ids are assigned by page storage and never reused within a
/// storage instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JournalId(pub u64);

impl JournalId {
    /// Creates a new journal id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JournalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "journal:{}", self.0)
    }
}

/// Sync priority of a key's value.
///
/// Eager values are shipped with the commit; lazy values stay page-local
/// and are fetched in the background when another device needs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeyPriority {
    /// Small values synced together with the commit.
    Eager = 0,
    /// Large values synced lazily on demand.
    Lazy = 1,
}

impl KeyPriority {
    /// Converts a byte to a priority.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Eager),
            1 => Some(Self::Lazy),
            _ => None,
        }
    }

    /// Converts the priority to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_id_display_is_short_hex() {
        let id = PageId::new([0xab; 16]);
        assert_eq!(format!("{id}"), "page:abababab");
    }

    #[test]
    fn key_priority_byte_roundtrip() {
        assert_eq!(KeyPriority::from_byte(0), Some(KeyPriority::Eager));
        assert_eq!(KeyPriority::from_byte(1), Some(KeyPriority::Lazy));
        assert_eq!(KeyPriority::from_byte(2), None);
        assert_eq!(KeyPriority::Lazy.as_byte(), 1);
    }

    #[test]
    fn namespace_bytes() {
        let ns = Namespace::new("page-7");
        assert_eq!(ns.as_bytes(), b"page-7");
        assert_eq!(format!("{ns}"), "page-7");
    }
}
