//! Property-based test generators using proptest.

use folio_core::{KeyPriority, Namespace, PageId};
use proptest::prelude::*;

/// Strategy for generating page ids.
pub fn page_id_strategy() -> impl Strategy<Value = PageId> {
    prop::array::uniform16(any::<u8>()).prop_map(PageId::new)
}

/// Strategy for generating namespace identifiers.
pub fn namespace_strategy() -> impl Strategy<Value = Namespace> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,31}")
        .expect("valid regex")
        .prop_map(Namespace::new)
}

/// Strategy for generating page keys.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..64)
}

/// Strategy for generating value payloads.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..1024)
}

/// Strategy for generating key priorities.
pub fn priority_strategy() -> impl Strategy<Value = KeyPriority> {
    prop_oneof![Just(KeyPriority::Eager), Just(KeyPriority::Lazy)]
}

/// Strategy for generating a set of distinct key-value pairs.
pub fn entries_strategy(max: usize) -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
    prop::collection::btree_map(key_strategy(), value_strategy(), 0..max)
        .prop_map(|map| map.into_iter().collect())
}
