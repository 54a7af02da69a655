//! Journal transactions.

use crate::commit::CommitId;
use crate::error::{CoreError, CoreResult};
use crate::object::ObjectIdentifier;
use crate::types::{JournalId, KeyPriority};

/// Lifecycle state of a journal.
///
/// A journal transitions exactly once from `Open` to either `Committed` or
/// `RolledBack`; both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalState {
    /// The journal accepts operations.
    Open,
    /// The journal produced a commit and is no longer usable.
    Committed,
    /// The journal was discarded and is no longer usable.
    RolledBack,
}

/// One staged key operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalOp {
    /// Map a key to a stored object.
    Put {
        /// The page key.
        key: Vec<u8>,
        /// Identifier of the value object.
        value: ObjectIdentifier,
        /// Sync priority of the value.
        priority: KeyPriority,
    },
    /// Remove a key.
    Delete {
        /// The page key.
        key: Vec<u8>,
    },
    /// Remove every key.
    Clear,
}

/// A mutable, exclusively-owned staging area for pending key mutations.
///
/// Operations are recorded in order and only touch the database when the
/// journal is committed through page storage. Rolling back discards the op
/// log without any I/O.
#[derive(Debug)]
pub struct Journal {
    id: JournalId,
    bases: Vec<CommitId>,
    ops: Vec<JournalOp>,
    state: JournalState,
}

impl Journal {
    pub(crate) fn new(id: JournalId, bases: Vec<CommitId>) -> Self {
        Self {
            id,
            bases,
            ops: Vec::new(),
            state: JournalState::Open,
        }
    }

    /// Returns the journal id.
    #[must_use]
    pub fn id(&self) -> JournalId {
        self.id
    }

    /// Returns the base commit ids (one for edits, two or more for merges).
    #[must_use]
    pub fn bases(&self) -> &[CommitId] {
        &self.bases
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> JournalState {
        self.state
    }

    /// Returns the staged operations in order.
    #[must_use]
    pub fn ops(&self) -> &[JournalOp] {
        &self.ops
    }

    /// Stages a put of `key` to an already-stored object.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalFinalized`] if the journal is no longer
    /// open.
    pub fn put(
        &mut self,
        key: Vec<u8>,
        value: ObjectIdentifier,
        priority: KeyPriority,
    ) -> CoreResult<()> {
        self.ensure_open()?;
        self.ops.push(JournalOp::Put {
            key,
            value,
            priority,
        });
        Ok(())
    }

    /// Stages a delete of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalFinalized`] if the journal is no longer
    /// open.
    pub fn delete(&mut self, key: Vec<u8>) -> CoreResult<()> {
        self.ensure_open()?;
        self.ops.push(JournalOp::Delete { key });
        Ok(())
    }

    /// Stages removal of every key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalFinalized`] if the journal is no longer
    /// open.
    pub fn clear(&mut self) -> CoreResult<()> {
        self.ensure_open()?;
        self.ops.push(JournalOp::Clear);
        Ok(())
    }

    /// Discards the op log. Never touches the database.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalFinalized`] if the journal was already
    /// finalized.
    pub fn rollback(&mut self) -> CoreResult<()> {
        self.ensure_open()?;
        self.ops.clear();
        self.state = JournalState::RolledBack;
        Ok(())
    }

    pub(crate) fn mark_committed(&mut self) {
        self.state = JournalState::Committed;
    }

    pub(crate) fn ensure_open(&self) -> CoreResult<()> {
        match self.state {
            JournalState::Open => Ok(()),
            JournalState::Committed | JournalState::RolledBack => {
                Err(CoreError::JournalFinalized)
            }
        }
    }
}
