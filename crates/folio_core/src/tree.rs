//! Structural-sharing page tree.
//!
//! A page's key-value contents are stored as a persistent treap: every
//! node is a content-addressed object holding one entry and the identifiers
//! of its subtrees. Mutations copy only the path to the touched key, so
//! consecutive commits share all unaffected subtrees.
//!
//! Node priority is the hash of the key, which makes the shape a pure
//! function of the contained entries. Two devices that arrive at the same
//! logical contents produce byte-identical root objects, which in turn
//! makes merge commit ids independent of merge order.

use crate::error::{CoreError, CoreResult};
use crate::object::{ObjectIdentifier, ObjectStore};
use crate::types::KeyPriority;
use folio_db::WriteBatch;

/// One key's entry in the page tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TreeEntry {
    /// The page key.
    pub key: Vec<u8>,
    /// Identifier of the value object.
    pub value: ObjectIdentifier,
    /// Sync priority of the value.
    pub priority: KeyPriority,
}

#[derive(Debug, Clone)]
struct Node {
    entry: TreeEntry,
    left: Option<ObjectIdentifier>,
    right: Option<ObjectIdentifier>,
}

type Rank = [u8; 32];

fn rank_of(key: &[u8]) -> Rank {
    *crate::object::ObjectDigest::of(key).as_bytes()
}

impl Node {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.entry.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.entry.key);
        buf.extend_from_slice(&self.entry.value.encode());
        buf.push(self.entry.priority.as_byte());
        encode_child(&mut buf, self.left.as_ref());
        encode_child(&mut buf, self.right.as_ref());
        buf
    }

    fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let corrupt = || CoreError::invalid_commit("malformed tree node");

        let mut pos = 0usize;
        let key_len =
            u32::from_le_bytes(bytes.get(0..4).and_then(|s| s.try_into().ok()).ok_or_else(corrupt)?)
                as usize;
        pos += 4;
        let key = bytes.get(pos..pos + key_len).ok_or_else(corrupt)?.to_vec();
        pos += key_len;

        let id_len = crate::object::id_encoded_len();
        let value =
            ObjectIdentifier::decode(bytes.get(pos..pos + id_len).ok_or_else(corrupt)?)?;
        pos += id_len;

        let priority = KeyPriority::from_byte(*bytes.get(pos).ok_or_else(corrupt)?)
            .ok_or_else(corrupt)?;
        pos += 1;

        let (left, consumed) = decode_child(&bytes[pos..])?;
        pos += consumed;
        let (right, consumed) = decode_child(&bytes[pos..])?;
        pos += consumed;

        if pos != bytes.len() {
            return Err(corrupt());
        }

        Ok(Self {
            entry: TreeEntry {
                key,
                value,
                priority,
            },
            left,
            right,
        })
    }
}

fn encode_child(buf: &mut Vec<u8>, child: Option<&ObjectIdentifier>) {
    match child {
        Some(id) => {
            buf.push(1);
            buf.extend_from_slice(&id.encode());
        }
        None => buf.push(0),
    }
}

fn decode_child(bytes: &[u8]) -> CoreResult<(Option<ObjectIdentifier>, usize)> {
    let corrupt = || CoreError::invalid_commit("malformed tree node");
    match bytes.first().ok_or_else(corrupt)? {
        0 => Ok((None, 1)),
        1 => {
            let id_len = crate::object::id_encoded_len();
            let id = ObjectIdentifier::decode(bytes.get(1..1 + id_len).ok_or_else(corrupt)?)?;
            Ok((Some(id), 1 + id_len))
        }
        _ => Err(corrupt()),
    }
}

/// Stages the empty tree root and returns its identifier.
pub(crate) fn empty_root(store: &ObjectStore, batch: &mut WriteBatch) -> CoreResult<ObjectIdentifier> {
    store.stage_object(batch, b"")
}

/// Returns true if `root` identifies the empty tree.
pub(crate) fn is_empty_root(root: &ObjectIdentifier) -> bool {
    root.size == 0
}

fn load(store: &ObjectStore, id: &ObjectIdentifier) -> CoreResult<Node> {
    Node::decode(&store.get_object(id)?)
}

/// Loads a node that may still be staged in the current commit batch.
///
/// Mutations rebuild path nodes into the batch and immediately read them
/// back; those nodes are not in the db until the batch is applied.
fn load_staged(
    store: &ObjectStore,
    batch: &WriteBatch,
    id: &ObjectIdentifier,
) -> CoreResult<Node> {
    Node::decode(&store.get_object_staged(batch, id)?)
}

fn stage(store: &ObjectStore, batch: &mut WriteBatch, node: &Node) -> CoreResult<ObjectIdentifier> {
    store.stage_object(batch, &node.encode())
}

fn as_subtree(root: &ObjectIdentifier) -> Option<ObjectIdentifier> {
    if is_empty_root(root) {
        None
    } else {
        Some(*root)
    }
}

/// Looks up `key` in the tree rooted at `root`.
pub(crate) fn get(
    store: &ObjectStore,
    root: &ObjectIdentifier,
    key: &[u8],
) -> CoreResult<Option<(ObjectIdentifier, KeyPriority)>> {
    let mut current = as_subtree(root);
    while let Some(id) = current {
        let node = load(store, &id)?;
        current = match key.cmp(&node.entry.key) {
            std::cmp::Ordering::Equal => {
                return Ok(Some((node.entry.value, node.entry.priority)));
            }
            std::cmp::Ordering::Less => node.left,
            std::cmp::Ordering::Greater => node.right,
        };
    }
    Ok(None)
}

/// Splits the subtree at `key` into (< key, entry at key, > key).
fn split(
    store: &ObjectStore,
    batch: &mut WriteBatch,
    subtree: Option<ObjectIdentifier>,
    key: &[u8],
) -> CoreResult<(Option<ObjectIdentifier>, Option<TreeEntry>, Option<ObjectIdentifier>)> {
    let Some(id) = subtree else {
        return Ok((None, None, None));
    };
    let node = load_staged(store, batch, &id)?;
    match key.cmp(&node.entry.key) {
        std::cmp::Ordering::Equal => Ok((node.left, Some(node.entry), node.right)),
        std::cmp::Ordering::Less => {
            let (low, at, mid) = split(store, batch, node.left, key)?;
            let rebuilt = stage(
                store,
                batch,
                &Node {
                    entry: node.entry,
                    left: mid,
                    right: node.right,
                },
            )?;
            Ok((low, at, Some(rebuilt)))
        }
        std::cmp::Ordering::Greater => {
            let (mid, at, high) = split(store, batch, node.right, key)?;
            let rebuilt = stage(
                store,
                batch,
                &Node {
                    entry: node.entry,
                    left: node.left,
                    right: mid,
                },
            )?;
            Ok((Some(rebuilt), at, high))
        }
    }
}

/// Merges two subtrees where every key in `a` orders before every key in `b`.
fn merge_subtrees(
    store: &ObjectStore,
    batch: &mut WriteBatch,
    a: Option<ObjectIdentifier>,
    b: Option<ObjectIdentifier>,
) -> CoreResult<Option<ObjectIdentifier>> {
    match (a, b) {
        (None, other) | (other, None) => Ok(other),
        (Some(a_id), Some(b_id)) => {
            let a_node = load_staged(store, batch, &a_id)?;
            let b_node = load_staged(store, batch, &b_id)?;
            // Higher-ranked key stays on top; ranks of distinct keys never tie.
            if rank_of(&a_node.entry.key) > rank_of(&b_node.entry.key) {
                let right = merge_subtrees(store, batch, a_node.right, Some(b_id))?;
                let rebuilt = stage(
                    store,
                    batch,
                    &Node {
                        entry: a_node.entry,
                        left: a_node.left,
                        right,
                    },
                )?;
                Ok(Some(rebuilt))
            } else {
                let left = merge_subtrees(store, batch, Some(a_id), b_node.left)?;
                let rebuilt = stage(
                    store,
                    batch,
                    &Node {
                        entry: b_node.entry,
                        left,
                        right: b_node.right,
                    },
                )?;
                Ok(Some(rebuilt))
            }
        }
    }
}

fn wrap_root(
    store: &ObjectStore,
    batch: &mut WriteBatch,
    subtree: Option<ObjectIdentifier>,
) -> CoreResult<ObjectIdentifier> {
    match subtree {
        Some(id) => Ok(id),
        None => empty_root(store, batch),
    }
}

/// Inserts or replaces `entry`, returning the new root.
pub(crate) fn insert(
    store: &ObjectStore,
    batch: &mut WriteBatch,
    root: &ObjectIdentifier,
    entry: TreeEntry,
) -> CoreResult<ObjectIdentifier> {
    let (low, _, high) = split(store, batch, as_subtree(root), &entry.key)?;
    let leaf = stage(
        store,
        batch,
        &Node {
            entry,
            left: None,
            right: None,
        },
    )?;
    let merged = merge_subtrees(store, batch, low, Some(leaf))?;
    let merged = merge_subtrees(store, batch, merged, high)?;
    wrap_root(store, batch, merged)
}

/// Removes `key` if present, returning the new root.
pub(crate) fn remove(
    store: &ObjectStore,
    batch: &mut WriteBatch,
    root: &ObjectIdentifier,
    key: &[u8],
) -> CoreResult<ObjectIdentifier> {
    let (low, at, high) = split(store, batch, as_subtree(root), key)?;
    if at.is_none() {
        // Key absent: the original root is still correct.
        return Ok(*root);
    }
    let merged = merge_subtrees(store, batch, low, high)?;
    wrap_root(store, batch, merged)
}

/// Returns all entries in ascending key order.
pub(crate) fn entries(store: &ObjectStore, root: &ObjectIdentifier) -> CoreResult<Vec<TreeEntry>> {
    let mut out = Vec::new();
    collect(store, as_subtree(root), &mut out)?;
    Ok(out)
}

fn collect(
    store: &ObjectStore,
    subtree: Option<ObjectIdentifier>,
    out: &mut Vec<TreeEntry>,
) -> CoreResult<()> {
    let Some(id) = subtree else {
        return Ok(());
    };
    let node = load(store, &id)?;
    collect(store, node.left, out)?;
    out.push(node.entry);
    collect(store, node.right, out)
}

/// Returns the identifiers of every node object reachable from `root`,
/// including `root` itself.
pub(crate) fn node_ids(store: &ObjectStore, root: &ObjectIdentifier) -> CoreResult<Vec<ObjectIdentifier>> {
    let mut out = vec![*root];
    let mut stack: Vec<ObjectIdentifier> = as_subtree(root).into_iter().collect();
    while let Some(id) = stack.pop() {
        if id != *root {
            out.push(id);
        }
        let node = load(store, &id)?;
        stack.extend(node.left);
        stack.extend(node.right);
    }
    Ok(out)
}

/// Builds a tree from entries, staging all nodes into `batch`.
pub(crate) fn from_entries(
    store: &ObjectStore,
    batch: &mut WriteBatch,
    entries: impl IntoIterator<Item = TreeEntry>,
) -> CoreResult<ObjectIdentifier> {
    let mut root = empty_root(store, batch)?;
    for entry in entries {
        root = insert(store, batch, &root, entry)?;
    }
    Ok(root)
}
