//! External Collaborators
//!
//! The resolver depends on two outside systems, both abstracted as async
//! traits so the host can plug in its own database and cache clients:
//!
//! - [`FieldSource`]: read access to board and field records. The records
//!   are owned by the host's relational storage.
//! - [`KvStore`]: a Redis-like key-value cache holding the derived graph
//!   and topological order. Writes are grouped into a [`Batch`] that must
//!   be applied atomically.
//!
//! In-memory implementations of both live in [`memory`].

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::field::{Board, BoardFields, Field, FieldWithBoard};
use crate::ids::{BaseId, BoardId, FieldId};

/// Read access to board and field records.
#[async_trait]
pub trait FieldSource: Send + Sync {
    /// Look up a board.
    async fn board(&self, board_id: &BoardId) -> StoreResult<Option<Board>>;

    /// All boards of a base with their fields. `None` if the base does not exist.
    async fn fields_by_base(&self, base_id: &BaseId) -> StoreResult<Option<Vec<BoardFields>>>;

    /// The primary field of a board, if it has one.
    async fn primary_field(&self, board_id: &BoardId) -> StoreResult<Option<Field>>;

    /// Fields with their boards, for diagnostics. Unknown ids are skipped.
    async fn fields_by_ids(&self, field_ids: &[FieldId]) -> StoreResult<Vec<FieldWithBoard>>;
}

/// One write in a [`Batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvCommand {
    /// Set one field of a hash.
    HashSet {
        key: String,
        field: String,
        value: String,
    },
    /// Delete one field of a hash.
    HashDelete { key: String, field: String },
    /// Set a scalar with an expiry.
    SetEx {
        key: String,
        value: String,
        ttl: Duration,
    },
    /// (Re)set the expiry of an existing key.
    Expire { key: String, ttl: Duration },
    /// Delete a key of any type.
    Delete { key: String },
}

/// Writes applied together: readers see all of them or none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    commands: Vec<KvCommand>,
}

impl Batch {
    /// Start an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash_set(&mut self, key: &str, field: &str, value: String) -> &mut Self {
        self.commands.push(KvCommand::HashSet {
            key: key.to_string(),
            field: field.to_string(),
            value,
        });
        self
    }

    pub fn hash_delete(&mut self, key: &str, field: &str) -> &mut Self {
        self.commands.push(KvCommand::HashDelete {
            key: key.to_string(),
            field: field.to_string(),
        });
        self
    }

    pub fn set_ex(&mut self, key: &str, value: String, ttl: Duration) -> &mut Self {
        self.commands.push(KvCommand::SetEx {
            key: key.to_string(),
            value,
            ttl,
        });
        self
    }

    pub fn expire(&mut self, key: &str, ttl: Duration) -> &mut Self {
        self.commands.push(KvCommand::Expire {
            key: key.to_string(),
            ttl,
        });
        self
    }

    pub fn delete(&mut self, key: &str) -> &mut Self {
        self.commands.push(KvCommand::Delete { key: key.to_string() });
        self
    }

    /// Commands in submission order.
    pub fn commands(&self) -> &[KvCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl IntoIterator for Batch {
    type Item = KvCommand;
    type IntoIter = std::vec::IntoIter<KvCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}

/// Key-value cache primitives.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Whether `key` exists (and has not expired).
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Reset the expiry of `key`. Returns `false` if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// All `(field, value)` pairs of a hash, in insertion order.
    async fn hash_get_all(&self, key: &str) -> StoreResult<Vec<(String, String)>>;

    /// Whether a hash has `field`.
    async fn hash_field_exists(&self, key: &str, field: &str) -> StoreResult<bool>;

    /// Read a scalar.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Apply every command of `batch` atomically.
    async fn exec(&self, batch: Batch) -> StoreResult<()>;
}
