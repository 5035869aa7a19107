//! In-memory collaborators.
//!
//! [`MemoryKvStore`] follows Redis semantics for the subset of commands the
//! resolver uses (hashes, scalars, expiry, atomic batches). Expiry uses the
//! tokio clock, so tests can drive it with a paused runtime.
//!
//! [`MemoryFieldSource`] keeps boards and fields in insertion order and
//! counts the calls that matter for caching behavior.
//!
//! Both can be switched unavailable to exercise failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use super::{Batch, FieldSource, KvCommand, KvStore};
use crate::error::{StoreError, StoreResult};
use crate::field::{Board, BoardFields, Field, FieldWithBoard};
use crate::ids::{BaseId, BoardId, FieldId};

#[derive(Debug, Clone)]
enum Value {
    Hash(IndexMap<String, String>),
    Scalar(String),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Redis-like key-value store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
    unavailable: AtomicBool,
    batches: AtomicUsize,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of batches applied so far.
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// Remaining time to live of `key`, if it exists and has an expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock();
        let entry = entries.get(key).filter(|entry| entry.is_live(now))?;
        entry.expires_at.map(|at| at.saturating_duration_since(now))
    }

    /// Drop every key.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }

    /// Run `f` over the live entries, after dropping expired ones.
    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> T) -> StoreResult<T> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(f(&mut entries, now))
    }
}

fn validate(entries: &HashMap<String, Entry>, command: &KvCommand) -> StoreResult<()> {
    match command {
        KvCommand::HashSet { key, .. } | KvCommand::HashDelete { key, .. } => {
            match entries.get(key).map(|entry| &entry.value) {
                Some(Value::Scalar(_)) => Err(StoreError::WrongType(key.clone())),
                _ => Ok(()),
            }
        }
        KvCommand::SetEx { .. } | KvCommand::Expire { .. } | KvCommand::Delete { .. } => Ok(()),
    }
}

fn apply(entries: &mut HashMap<String, Entry>, command: KvCommand, now: Instant) {
    match command {
        KvCommand::HashSet { key, field, value } => {
            let entry = entries.entry(key).or_insert_with(|| Entry {
                value: Value::Hash(IndexMap::new()),
                expires_at: None,
            });
            if let Value::Hash(hash) = &mut entry.value {
                hash.insert(field, value);
            }
        }
        KvCommand::HashDelete { key, field } => {
            let now_empty = match entries.get_mut(&key).map(|entry| &mut entry.value) {
                Some(Value::Hash(hash)) => {
                    hash.shift_remove(&field);
                    hash.is_empty()
                }
                _ => false,
            };
            if now_empty {
                entries.remove(&key);
            }
        }
        KvCommand::SetEx { key, value, ttl } => {
            entries.insert(
                key,
                Entry {
                    value: Value::Scalar(value),
                    expires_at: Some(now + ttl),
                },
            );
        }
        KvCommand::Expire { key, ttl } => {
            if let Some(entry) = entries.get_mut(&key) {
                entry.expires_at = Some(now + ttl);
            }
        }
        KvCommand::Delete { key } => {
            entries.remove(&key);
        }
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.with_entries(|entries, _| entries.contains_key(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.with_entries(|entries, now| match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                true
            }
            None => false,
        })
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<Vec<(String, String)>> {
        self.with_entries(|entries, _| match entries.get(key).map(|entry| &entry.value) {
            Some(Value::Hash(hash)) => Ok(hash.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            Some(Value::Scalar(_)) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(Vec::new()),
        })?
    }

    async fn hash_field_exists(&self, key: &str, field: &str) -> StoreResult<bool> {
        self.with_entries(|entries, _| match entries.get(key).map(|entry| &entry.value) {
            Some(Value::Hash(hash)) => Ok(hash.contains_key(field)),
            Some(Value::Scalar(_)) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(false),
        })?
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.with_entries(|entries, _| match entries.get(key).map(|entry| &entry.value) {
            Some(Value::Scalar(value)) => Ok(Some(value.clone())),
            Some(Value::Hash(_)) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(None),
        })?
    }

    async fn exec(&self, batch: Batch) -> StoreResult<()> {
        self.with_entries(|entries, now| -> StoreResult<()> {
            // Reject the whole batch before touching anything.
            for command in batch.commands() {
                validate(entries, command)?;
            }
            for command in batch {
                apply(entries, command, now);
            }
            self.batches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })?
    }
}

/// Board and field records held in process memory.
#[derive(Debug, Default)]
pub struct MemoryFieldSource {
    bases: RwLock<IndexSet<BaseId>>,
    boards: RwLock<IndexMap<BoardId, Board>>,
    fields: RwLock<IndexMap<FieldId, Field>>,
    unavailable: AtomicBool,
    base_scans: AtomicUsize,
    primary_lookups: AtomicUsize,
}

impl MemoryFieldSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty base.
    pub fn add_base(&self, base_id: impl Into<BaseId>) {
        self.bases.write().insert(base_id.into());
    }

    /// Register a board (and its base).
    pub fn add_board(&self, board: Board) {
        self.bases.write().insert(board.base_id.clone());
        self.boards.write().insert(board.id.clone(), board);
    }

    /// Remove a board and all of its fields.
    pub fn remove_board(&self, board_id: &BoardId) {
        self.boards.write().shift_remove(board_id);
        self.fields.write().retain(|_, field| &field.board_id != board_id);
    }

    /// Insert or replace a field, keeping its original position on replace.
    pub fn upsert_field(&self, field: Field) {
        self.fields.write().insert(field.id.clone(), field);
    }

    pub fn remove_field(&self, field_id: &FieldId) -> Option<Field> {
        self.fields.write().shift_remove(field_id)
    }

    pub fn field(&self, field_id: &FieldId) -> Option<Field> {
        self.fields.read().get(field_id).cloned()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of full base scans served.
    pub fn base_scans(&self) -> usize {
        self.base_scans.load(Ordering::SeqCst)
    }

    /// Number of primary field lookups served.
    pub fn primary_lookups(&self) -> usize {
        self.primary_lookups.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("field source switched off".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FieldSource for MemoryFieldSource {
    async fn board(&self, board_id: &BoardId) -> StoreResult<Option<Board>> {
        self.check_available()?;
        Ok(self.boards.read().get(board_id).cloned())
    }

    async fn fields_by_base(&self, base_id: &BaseId) -> StoreResult<Option<Vec<BoardFields>>> {
        self.check_available()?;
        self.base_scans.fetch_add(1, Ordering::SeqCst);

        if !self.bases.read().contains(base_id) {
            return Ok(None);
        }

        let boards = self.boards.read();
        let fields = self.fields.read();
        let grouped = boards
            .values()
            .filter(|board| &board.base_id == base_id)
            .map(|board| BoardFields {
                board: board.clone(),
                fields: fields
                    .values()
                    .filter(|field| field.board_id == board.id)
                    .cloned()
                    .collect(),
            })
            .collect();

        Ok(Some(grouped))
    }

    async fn primary_field(&self, board_id: &BoardId) -> StoreResult<Option<Field>> {
        self.check_available()?;
        self.primary_lookups.fetch_add(1, Ordering::SeqCst);

        Ok(self
            .fields
            .read()
            .values()
            .find(|field| &field.board_id == board_id && field.is_primary)
            .cloned())
    }

    async fn fields_by_ids(&self, field_ids: &[FieldId]) -> StoreResult<Vec<FieldWithBoard>> {
        self.check_available()?;

        let boards = self.boards.read();
        let fields = self.fields.read();
        Ok(field_ids
            .iter()
            .filter_map(|id| {
                let field = fields.get(id)?;
                let board = boards.get(&field.board_id)?;
                Some(FieldWithBoard {
                    field: field.clone(),
                    board: board.clone(),
                })
            })
            .collect())
    }
}
