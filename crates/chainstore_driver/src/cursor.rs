//! Per-cursor state machine.
//!
//! A cursor is configured by `open()` (cheap, no I/O) and materialized by
//! `lazy_open()`, which turns the logical position `(direction, find_key,
//! find_pk)` into a hinted range query and pins the returned iterator.
//! Changing direction materializes the current row back into the logical
//! position and drops the iterator; the next `lazy_open()` re-locates in
//! the new direction. The skip set only biases advancement on an open
//! iterator and is cleared whenever the iterator is re-established.

use std::collections::HashSet;
use std::sync::Arc;

use chainstore_common::error::{DriverError, DriverResult};
use chainstore_common::schema::{IndexInfo, ObjectValue};
use chainstore_common::types::{AccountName, CursorId, PrimaryKey};
use chainstore_common::value::Value;

use crate::bounds::{self, Direction};
use crate::names;
use crate::object;
use crate::retry::{with_reconnect, RetryPolicy};
use crate::store::{FindOptions, RowSource, Store};

/// Shared store access handed to every cursor.
#[derive(Clone)]
pub(crate) struct StoreContext {
    pub store: Arc<dyn Store>,
    pub sys_name: String,
    pub retry: RetryPolicy,
}

impl StoreContext {
    pub fn db_name(&self, code: AccountName) -> String {
        names::get_code_name(&self.sys_name, code)
    }
}

pub struct Cursor {
    pub id: CursorId,
    pub index: IndexInfo,
    /// Cached key of the current row; `UNSET` until resolved, `END` past
    /// the range.
    pub pk: PrimaryKey,
    /// Cached decoded row; null-valued while unresolved.
    pub object: ObjectValue,

    direction: Direction,
    find_pk: PrimaryKey,
    find_key: Value,
    source: Option<Box<dyn RowSource>>,
    scope: AccountName,
    skipped_pks: HashSet<u64>,

    context: StoreContext,
    db_name: String,
    collection: String,
}

impl Cursor {
    pub(crate) fn new(id: CursorId, index: IndexInfo, context: StoreContext) -> Self {
        let db_name = context.db_name(index.code());
        let collection = names::get_table_name(index.table_name());
        Self {
            id,
            pk: PrimaryKey::UNSET,
            object: ObjectValue::default(),
            direction: Direction::Forward,
            find_pk: PrimaryKey::UNSET,
            find_key: Value::Null,
            source: None,
            scope: index.scope(),
            skipped_pks: HashSet::new(),
            index,
            context,
            db_name,
            collection,
        }
    }

    /// Reconfigure the cursor for a new logical position. Lazy: the store
    /// is not contacted until the position is first observed.
    pub fn open(&mut self, direction: Direction, key: Value, locate_pk: PrimaryKey) -> &mut Self {
        self.reset_object();
        self.source = None;

        self.pk = locate_pk;
        self.scope = self.index.scope();
        self.direction = direction;

        self.find_pk = locate_pk;
        self.find_key = key;

        self
    }

    pub fn next(&mut self) -> DriverResult<&mut Self> {
        if self.direction == Direction::Backward {
            // we are at the last record of a range: capture its key for
            // correct re-location before turning around
            self.lazy_open()?;
            let was_end = self.is_end();
            self.change_direction(Direction::Forward)?;
            if was_end {
                self.lazy_open()?;
                return Ok(self);
            }
        }
        self.lazy_next()?;
        Ok(self)
    }

    pub fn prev(&mut self) -> DriverResult<&mut Self> {
        if self.direction == Direction::Forward {
            self.change_direction(Direction::Backward)?;
            self.lazy_open()?;
        } else if self.pk == PrimaryKey::END {
            self.lazy_open()?;
        } else {
            self.lazy_next()?;
        }
        Ok(self)
    }

    pub fn current(&mut self) -> DriverResult<&mut Self> {
        if self.pk == PrimaryKey::UNSET {
            self.lazy_open()?;
        }
        Ok(self)
    }

    /// Decode and cache the current row. At the end position the returned
    /// object carries the table triple but no payload.
    pub fn get_object_value(&mut self, with_decors: bool) -> DriverResult<&ObjectValue> {
        self.lazy_open()?;
        if !self.object.value.is_null() {
            return Ok(&self.object);
        }

        if self.is_end() {
            self.object.clear();
            self.object.service.pk = self.pk;
            self.object.service.code = self.index.code();
            self.object.service.scope = self.index.scope();
            self.object.service.table = self.index.table_name();
        } else {
            let object = match self.source.as_ref().and_then(|s| s.current()) {
                Some(row) => object::build_object(&self.index.table, row, with_decors)?,
                None => return Err(DriverError::open("cursor source lost its position")),
            };
            self.object = object;
            self.pk = self.object.service.pk;
        }

        Ok(&self.object)
    }

    pub fn is_opened(&self) -> bool {
        self.source.is_some()
    }

    /// Hide a pk from subsequent advancement on the open iterator. The
    /// initial landing is not affected.
    pub fn skip_pk(&mut self, pk: PrimaryKey) {
        if self.is_opened() {
            if self.skipped_pks.capacity() == 0 {
                self.skipped_pks.reserve(64);
            }
            self.skipped_pks.insert(pk.0);
        }
    }

    /// Derive an independent cursor at the current position. A live
    /// iterator cannot be shared, so the clone inherits the materialized
    /// row as its find key and re-locates on first use.
    pub fn clone_with_id(&mut self, id: CursorId) -> DriverResult<Cursor> {
        let mut dst = Cursor::new(id, self.index.clone(), self.context.clone());

        if self.source.is_some() {
            // it is faster to take the object from the live cursor than to
            // open a new one, locate, and fetch it
            dst.object = self.get_object_value(false)?.clone();
            dst.find_key = dst.object.value.clone();
            dst.find_pk = self.get_pk_value()?;
            // Backward starts from the previous record, not the current one
            dst.direction = Direction::Forward;
        } else {
            dst.find_key = self.find_key.clone();
            dst.find_pk = self.find_pk;
            dst.object = self.object.clone();
            dst.direction = self.direction;
        }

        dst.pk = self.pk;
        dst.scope = self.index.scope();

        Ok(dst)
    }

    // ── lazy machinery ───────────────────────────────────────────────

    fn lazy_open(&mut self) -> DriverResult<()> {
        if self.source.is_some() {
            return Ok(());
        }

        let bound =
            bounds::bound_document(&self.index, self.direction, &self.find_key, self.find_pk)?;
        let sort = bounds::sort_spec(&self.index, self.direction);

        self.find_pk = PrimaryKey::UNSET;

        let mut options = FindOptions {
            hint: names::get_index_name(self.index.index.name),
            sort,
            min: None,
            max: None,
            limit: None,
        };
        match self.direction {
            Direction::Forward => options.min = Some(bound),
            Direction::Backward => options.max = Some(bound),
        }

        let policy = self.context.retry;
        let source = {
            let store = Arc::clone(&self.context.store);
            let db_name = &self.db_name;
            let collection = &self.collection;
            let skipped = &mut self.skipped_pks;
            with_reconnect(policy, || {
                skipped.clear();
                store.find(db_name, collection, options.clone())
            })?
        };
        self.source = Some(source);
        self.init_position()
    }

    fn lazy_next(&mut self) -> DriverResult<()> {
        self.lazy_open()?;

        while !self.is_end() {
            if let Some(source) = self.source.as_mut() {
                source.advance().map_err(|err| {
                    tracing::error!(code = err.raw, error = %err.message,
                        "store error on iterate to next object");
                    DriverError::open(format!(
                        "store error on iterate to next object: {}, {}",
                        err.raw, err.message
                    ))
                })?;
            }

            self.init_position()?;
            if !self.skipped_pks.contains(&self.pk.0) {
                break;
            }
        }
        Ok(())
    }

    fn change_direction(&mut self, direction: Direction) -> DriverResult<()> {
        if self.source.is_none() {
            self.get_object_value(false)?;
        }
        if self.source.is_some() {
            self.find_key = self.get_object_value(false)?.value.clone();
            self.find_pk = self.get_pk_value()?;
        }
        self.source = None;
        self.direction = direction;
        Ok(())
    }

    /// End of range: iterator exhaustion, or a scope boundary on scoped
    /// tables (unless the index ignores scopes).
    fn is_end(&self) -> bool {
        let Some(source) = &self.source else {
            return true;
        };
        if source.current().is_none() {
            return true;
        }
        if !self.index.is_noscope() {
            return !self.index.ignore_scope() && self.scope != self.index.scope();
        }
        false
    }

    fn init_position(&mut self) -> DriverResult<()> {
        self.init_scope_value();
        if !self.is_end() || self.direction == Direction::Forward {
            self.reset_object();
            self.init_pk_value()?;
        }
        Ok(())
    }

    fn get_pk_value(&mut self) -> DriverResult<PrimaryKey> {
        if self.pk == PrimaryKey::UNSET {
            self.init_pk_value()?;
        }
        Ok(self.pk)
    }

    fn init_scope_value(&mut self) {
        if let Some(row) = self.source.as_ref().and_then(|s| s.current()) {
            self.scope = object::get_scope_value(row);
        }
    }

    fn init_pk_value(&mut self) -> DriverResult<()> {
        if self.is_end() {
            self.pk = PrimaryKey::END;
        } else {
            let pk = match self.source.as_ref().and_then(|s| s.current()) {
                Some(row) => object::get_pk_value(&self.index.table, row)?,
                None => PrimaryKey::END,
            };
            self.pk = pk;
        }
        Ok(())
    }

    fn reset_object(&mut self) {
        self.pk = PrimaryKey::UNSET;
        if !self.object.is_null() {
            self.object.clear();
        }
    }
}
