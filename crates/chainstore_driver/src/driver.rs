//! The driver facade: public entry points over the cursor registry, the
//! write pipeline and the store session.
//!
//! Read entry points that observe rows (`current`, `next`, `prev`,
//! `object_at_cursor`, `upper_bound`, `available_pk`, `object_by_pk`) first
//! drain the journal for the touched table, so cursors never see stale
//! pre-apply state. Position-only entry points (`lower_bound`, `locate_to`,
//! `begin`, `end`, `cursor`) return an unapplied cursor the caller may use
//! before the apply happens.
//!
//! Single-writer contract: the driver is owned by one caller; the internal
//! lock only guards the registry's shape, not cross-operation ordering.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use chainstore_common::config::DriverConfig;
use chainstore_common::error::{DriverError, DriverResult};
use chainstore_common::schema::{IndexInfo, ObjectValue, TableInfo};
use chainstore_common::types::{AccountName, CursorId, PrimaryKey};
use chainstore_common::value::{Document, Value};

use crate::bounds::Direction;
use crate::cursor::{Cursor, StoreContext};
use crate::journal::Journal;
use crate::names;
use crate::object::{append_pk_value, append_scope_value, SCOPE_PATH};
use crate::registry::{CursorRegistry, CursorRequest};
use crate::retry::{with_reconnect, RetryPolicy};
use crate::store::{FindOptions, Store};
use crate::write_ctx::WriteContext;

/// Position snapshot returned by cursor entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorView {
    pub id: CursorId,
    pub pk: PrimaryKey,
}

impl CursorView {
    fn of(cursor: &Cursor) -> Self {
        Self { id: cursor.id, pk: cursor.pk }
    }
}

pub struct Driver {
    context: StoreContext,
    journal: Arc<dyn Journal>,
    registry: Mutex<CursorRegistry>,
    update_pk_with_revision: AtomicBool,
    skip_op_cnt_checking: AtomicBool,
}

impl Driver {
    pub fn new(store: Arc<dyn Store>, journal: Arc<dyn Journal>, config: DriverConfig) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            context: StoreContext { store, sys_name: config.sys_name.clone(), retry },
            journal,
            registry: Mutex::new(CursorRegistry::new()),
            update_pk_with_revision: AtomicBool::new(config.update_pk_with_revision),
            skip_op_cnt_checking: AtomicBool::new(config.skip_op_cnt_checking),
        }
    }

    // ── mode flags ───────────────────────────────────────────────────

    /// Disable post-bulk row-count assertions for undo restore.
    pub fn enable_undo_restore(&self) {
        self.skip_op_cnt_checking.store(true, Ordering::Relaxed);
    }

    pub fn disable_undo_restore(&self) {
        self.skip_op_cnt_checking.store(false, Ordering::Relaxed);
    }

    /// Pin updates/removes/revisions to the revision the row carried when
    /// it was read. Implies undo restore mode.
    pub fn enable_revision_pinning(&self) {
        self.update_pk_with_revision.store(true, Ordering::Relaxed);
        self.enable_undo_restore();
    }

    pub fn disable_revision_pinning(&self) {
        self.update_pk_with_revision.store(false, Ordering::Relaxed);
        self.disable_undo_restore();
    }

    // ── cursor entry points ──────────────────────────────────────────

    /// Position before the first row `>= key`.
    pub fn lower_bound(&self, index: IndexInfo, key: Value) -> DriverResult<CursorView> {
        self.create_cursor_with(index, |cursor| {
            cursor.open(Direction::Forward, key, PrimaryKey::UNSET);
            Ok(CursorView::of(cursor))
        })
    }

    /// Position after the last row `== key`: a backward open at the key
    /// (max is exclusive) turned forward, with one extra step when the
    /// landing row still equals the key.
    pub fn upper_bound(&self, index: IndexInfo, key: Value) -> DriverResult<CursorView> {
        self.apply_table_changes(&index.table)?;
        self.create_cursor_with(index, |cursor| {
            cursor.open(Direction::Backward, key.clone(), PrimaryKey::UNSET);
            cursor.next()?;

            let lands_on_key = {
                let object = cursor.get_object_value(false)?;
                object.value.is_object() && object.value.contains(&key)
            };
            if lands_on_key {
                cursor.next()?;
            }
            Ok(CursorView::of(cursor))
        })
    }

    /// Position at `(key, pk)` exactly.
    pub fn locate_to(
        &self,
        index: IndexInfo,
        key: Value,
        pk: PrimaryKey,
    ) -> DriverResult<CursorView> {
        self.create_cursor_with(index, |cursor| {
            cursor.open(Direction::Forward, key, pk);
            Ok(CursorView::of(cursor))
        })
    }

    pub fn begin(&self, index: IndexInfo) -> DriverResult<CursorView> {
        self.create_cursor_with(index, |cursor| {
            cursor.open(Direction::Forward, Value::Null, PrimaryKey::UNSET);
            Ok(CursorView::of(cursor))
        })
    }

    pub fn end(&self, index: IndexInfo) -> DriverResult<CursorView> {
        self.create_cursor_with(index, |cursor| {
            cursor.open(Direction::Backward, Value::Null, PrimaryKey::END);
            Ok(CursorView::of(cursor))
        })
    }

    /// Look up an existing cursor without applying pending changes.
    pub fn cursor(&self, request: CursorRequest) -> DriverResult<CursorView> {
        let mut registry = self.registry.lock();
        Ok(CursorView::of(registry.get_cursor(request)?))
    }

    pub fn current(&self, request: CursorRequest) -> DriverResult<CursorView> {
        self.with_applied_cursor(request, |cursor| Ok(CursorView::of(cursor.current()?)))
    }

    pub fn next(&self, request: CursorRequest) -> DriverResult<CursorView> {
        self.with_applied_cursor(request, |cursor| Ok(CursorView::of(cursor.next()?)))
    }

    pub fn prev(&self, request: CursorRequest) -> DriverResult<CursorView> {
        self.with_applied_cursor(request, |cursor| Ok(CursorView::of(cursor.prev()?)))
    }

    pub fn object_at_cursor(
        &self,
        request: CursorRequest,
        with_decors: bool,
    ) -> DriverResult<ObjectValue> {
        self.with_applied_cursor(request, |cursor| {
            Ok(cursor.get_object_value(with_decors)?.clone())
        })
    }

    /// Derive an independent cursor at the source cursor's position.
    pub fn clone_cursor(&self, request: CursorRequest) -> DriverResult<CursorView> {
        let mut registry = self.registry.lock();
        let next_id = registry.next_cursor_id(request.code);
        let cloned = registry.get_cursor(request)?.clone_with_id(next_id)?;
        Ok(CursorView::of(registry.add_cursor(request.code, cloned)))
    }

    pub fn close(&self, request: CursorRequest) -> DriverResult<()> {
        self.registry.lock().close_cursor(request)
    }

    pub fn close_code_cursors(&self, code: AccountName) {
        self.registry.lock().close_code_cursors(code);
    }

    /// Hide a pk from every open cursor over the table's scope.
    pub fn skip_pk(&self, table: &TableInfo, pk: PrimaryKey) {
        let mut registry = self.registry.lock();
        for cursor in registry.code_cursors_mut(table.code) {
            if cursor.index.scope() == table.scope {
                cursor.skip_pk(pk);
            }
        }
    }

    // ── journal application ──────────────────────────────────────────

    pub fn apply_code_changes(&self, code: AccountName) -> DriverResult<()> {
        let mut ctx = self.new_write_context();
        self.journal.apply_code_changes(&mut ctx, code)?;
        ctx.write()
    }

    pub fn apply_all_changes(&self) -> DriverResult<()> {
        let mut ctx = self.new_write_context();
        self.journal.apply_all_changes(&mut ctx)?;
        ctx.write()
    }

    pub(crate) fn apply_table_changes(&self, table: &TableInfo) -> DriverResult<()> {
        let mut ctx = self.new_write_context();
        self.journal.apply_table_changes(&mut ctx, table)?;
        ctx.write()
    }

    fn new_write_context(&self) -> WriteContext {
        WriteContext::new(
            self.context.clone(),
            self.update_pk_with_revision.load(Ordering::Relaxed),
            self.skip_op_cnt_checking.load(Ordering::Relaxed),
        )
    }

    // ── point reads ──────────────────────────────────────────────────

    /// Smallest pk not yet in use within the table's collection (across
    /// scopes): largest stored pk plus one, or 0 for an empty table.
    pub fn available_pk(&self, table: &TableInfo) -> DriverResult<PrimaryKey> {
        self.apply_table_changes(table)?;

        let primary = table
            .table
            .primary_index()
            .ok_or_else(|| DriverError::open("table has no primary index"))?;
        let pk_field = table.pk_field().to_string();

        let mut bound = Document::new();
        bound.insert(pk_field.clone(), Value::MaxKey);

        let mut hint = names::get_index_name(primary.name);
        if !table.is_noscope() {
            hint.push_str(names::PK_INDEX_SUFFIX);
        }

        let options = FindOptions {
            hint,
            sort: vec![(pk_field, -1)],
            min: None,
            max: Some(bound),
            limit: Some(1),
        };

        let db = self.context.db_name(table.code);
        let collection = names::get_table_name(table.table_name());
        let found = {
            let store = Arc::clone(&self.context.store);
            with_reconnect(self.context.retry, || {
                store.find_one(&db, &collection, options.clone())
            })?
        };

        match found {
            Some(row) => Ok(crate::object::get_pk_value(table, &row)?.next()),
            None => Ok(PrimaryKey(0)),
        }
    }

    /// Fetch one row by pk, or an end-sentinel object when it is absent.
    pub fn object_by_pk(&self, table: &TableInfo, pk: PrimaryKey) -> DriverResult<ObjectValue> {
        self.apply_table_changes(table)?;

        let primary = table
            .table
            .primary_index()
            .ok_or_else(|| DriverError::open("table has no primary index"))?;

        let mut bound = Document::new();
        let mut sort = Vec::with_capacity(2);
        if !table.is_noscope() {
            append_scope_value(&mut bound, table.scope);
            sort.push((SCOPE_PATH.to_string(), 1));
        }
        append_pk_value(&mut bound, table.pk_order(), pk);
        sort.push((table.pk_field().to_string(), 1));

        let options = FindOptions {
            hint: names::get_index_name(primary.name),
            sort,
            min: Some(bound),
            max: None,
            limit: Some(1),
        };

        let db = self.context.db_name(table.code);
        let collection = names::get_table_name(table.table_name());
        let found = {
            let store = Arc::clone(&self.context.store);
            with_reconnect(self.context.retry, || {
                store.find_one(&db, &collection, options.clone())
            })?
        };

        if let Some(row) = found {
            let found_pk = crate::object::get_pk_value(table, &row)?;
            let found_scope = crate::object::get_scope_value(&row);
            if found_pk == pk && (table.is_noscope() || found_scope == table.scope) {
                return crate::object::build_object(table, &row, false);
            }
        }

        let mut object = ObjectValue::default();
        object.service.pk = PrimaryKey::END;
        object.service.code = table.code;
        object.service.scope = table.scope;
        object.service.table = table.table_name();
        Ok(object)
    }

    // ── internals ────────────────────────────────────────────────────

    pub(crate) fn store_context(&self) -> &StoreContext {
        &self.context
    }

    pub(crate) fn registry_is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }

    fn create_cursor_with<T>(
        &self,
        index: IndexInfo,
        f: impl FnOnce(&mut Cursor) -> DriverResult<T>,
    ) -> DriverResult<T> {
        let code = index.code();
        let mut registry = self.registry.lock();
        let id = registry.next_cursor_id(code);
        let cursor = Cursor::new(id, index, self.context.clone());
        f(registry.add_cursor(code, cursor))
    }

    /// Run `f` on a cursor, draining the journal for its table first when
    /// the cursor has no live iterator yet.
    fn with_applied_cursor<T>(
        &self,
        request: CursorRequest,
        f: impl FnOnce(&mut Cursor) -> DriverResult<T>,
    ) -> DriverResult<T> {
        let pending_table = {
            let mut registry = self.registry.lock();
            let cursor = registry.get_cursor(request)?;
            if cursor.is_opened() {
                None
            } else {
                Some(cursor.index.table.clone())
            }
        };
        if let Some(table) = pending_table {
            self.apply_table_changes(&table)?;
        }

        let mut registry = self.registry.lock();
        f(registry.get_cursor(request)?)
    }
}
