//! Write context: per-apply grouping of pending mutations into bulk writes.
//!
//! The journal drives the context through `start_table` / `add_data` /
//! `add_prepare_undo` / `add_complete_undo`; the driver then consumes it
//! once with `write()`. Operations are grouped per `(code, table)` in
//! journal order: consecutive operations on one table coalesce, and a
//! table change appends a new group.
//!
//! Execution per group builds two unordered bulks against the collection:
//! the remove bulk runs first so freed pks can be reused by inserts in the
//! update bulk (update → revision → insert). A duplicate-key failure is
//! recorded and the remaining groups still run; any other bulk failure
//! aborts the apply. Bulk writes are not idempotent, so there is no retry.

use chainstore_common::error::{DriverError, DriverResult};
use chainstore_common::schema::{Operation, TableInfo, WriteOperation};
use chainstore_common::types::{AccountName, Revision, TableName};
use chainstore_common::value::{Document, Value};

use crate::cursor::StoreContext;
use crate::names;
use crate::object::{
    build_document, build_find_pk_document, build_find_undo_pk_document,
    build_service_document, build_undo_document, REVISION_PATH,
};
use crate::store::BulkOp;

/// Name of the out-of-band undo table; it lives in the bare-prefix
/// database (code 0).
pub const UNDO_TABLE: &str = "undo";

#[derive(Default)]
struct BulkInfo {
    pk: Document,
    data: Document,
}

struct BulkGroup {
    code: AccountName,
    table: TableName,
    remove: Vec<BulkInfo>,
    update: Vec<BulkInfo>,
    revision: Vec<BulkInfo>,
    insert: Vec<BulkInfo>,
}

impl BulkGroup {
    fn for_table(table: &TableInfo) -> Self {
        Self::new(table.code, table.table_name())
    }

    fn undo() -> Self {
        let name = chainstore_common::types::string_to_symbol(UNDO_TABLE)
            .map(TableName)
            .unwrap_or_default();
        Self::new(AccountName(0), name)
    }

    fn new(code: AccountName, table: TableName) -> Self {
        Self {
            code,
            table,
            remove: Vec::new(),
            update: Vec::new(),
            revision: Vec::new(),
            insert: Vec::new(),
        }
    }
}

/// Per-apply accumulation of bulk writes, consumed once.
pub struct WriteContext {
    context: StoreContext,
    update_pk_with_revision: bool,
    skip_op_cnt_checking: bool,

    bulk_list: Vec<BulkGroup>,
    prepare_undo_bulk: BulkGroup,
    complete_undo_bulk: BulkGroup,

    /// Sticky duplicate-key message; raised as `Duplicate` after all
    /// groups ran.
    error: String,
    table: Option<TableInfo>,
}

impl WriteContext {
    pub(crate) fn new(
        context: StoreContext,
        update_pk_with_revision: bool,
        skip_op_cnt_checking: bool,
    ) -> Self {
        Self {
            context,
            update_pk_with_revision,
            skip_op_cnt_checking,
            bulk_list: Vec::new(),
            prepare_undo_bulk: BulkGroup::undo(),
            complete_undo_bulk: BulkGroup::undo(),
            error: String::new(),
            table: None,
        }
    }

    /// Switch the target table. Appends a new group unless the previous
    /// operation targeted the same `(code, table)`.
    pub fn start_table(&mut self, table: &TableInfo) {
        let same = self
            .table
            .as_ref()
            .map(|old| old.code == table.code && old.table_name() == table.table_name())
            .unwrap_or(false);
        if !same {
            self.bulk_list.push(BulkGroup::for_table(table));
        }
        self.table = Some(table.clone());
    }

    /// Queue one user-table operation into the current group.
    pub fn add_data(&mut self, op: &WriteOperation) -> DriverResult<()> {
        let table = self
            .table
            .clone()
            .ok_or_else(|| DriverError::open("write operation before any table was started"))?;
        let pin_revision = self.pin_revision(op);
        let group = self
            .bulk_list
            .last_mut()
            .ok_or_else(|| DriverError::open("write operation before any table was started"))?;
        append_data_bulk(group, &table, op, pin_revision)
    }

    /// Queue an undo-table operation applied before the user tables.
    pub fn add_prepare_undo(&mut self, op: &WriteOperation) -> DriverResult<()> {
        let pin_revision = self.pin_revision(op);
        append_undo_bulk(&mut self.prepare_undo_bulk, op, pin_revision)
    }

    /// Queue an undo-table operation applied after the user tables.
    pub fn add_complete_undo(&mut self, op: &WriteOperation) -> DriverResult<()> {
        let pin_revision = self.pin_revision(op);
        append_undo_bulk(&mut self.complete_undo_bulk, op, pin_revision)
    }

    fn pin_revision(&self, op: &WriteOperation) -> bool {
        self.update_pk_with_revision && op.find_revision >= Revision::START
    }

    /// Apply everything: prepare-undo, the per-table groups in journal
    /// order, complete-undo; then raise the sticky duplicate error if one
    /// was recorded.
    pub(crate) fn write(mut self) -> DriverResult<()> {
        let prepare = std::mem::replace(&mut self.prepare_undo_bulk, BulkGroup::undo());
        self.execute_group(&prepare)?;

        let groups = std::mem::take(&mut self.bulk_list);
        for group in &groups {
            self.execute_group(group)?;
        }

        let complete = std::mem::replace(&mut self.complete_undo_bulk, BulkGroup::undo());
        self.execute_group(&complete)?;

        if !self.error.is_empty() {
            return Err(DriverError::Duplicate(std::mem::take(&mut self.error)));
        }
        Ok(())
    }

    fn execute_group(&mut self, group: &BulkGroup) -> DriverResult<()> {
        let remove_ops: Vec<BulkOp> = group
            .remove
            .iter()
            .map(|src| BulkOp::DeleteOne { filter: src.pk.clone() })
            .collect();

        let mut update_ops: Vec<BulkOp> =
            Vec::with_capacity(group.update.len() + group.revision.len() + group.insert.len());
        for src in &group.update {
            update_ops.push(BulkOp::ReplaceOne {
                filter: src.pk.clone(),
                document: src.data.clone(),
            });
        }
        for src in &group.revision {
            update_ops.push(BulkOp::UpdateOne { filter: src.pk.clone(), set: src.data.clone() });
        }
        for src in &group.insert {
            update_ops.push(BulkOp::InsertOne { document: src.data.clone() });
        }

        // removes commit before their pks are reused by inserts
        self.execute_bulk(group, remove_ops)?;
        self.execute_bulk(group, update_ops)
    }

    fn execute_bulk(&mut self, group: &BulkGroup, ops: Vec<BulkOp>) -> DriverResult<()> {
        let op_cnt = ops.len() as u64;
        if op_cnt == 0 {
            return Ok(());
        }

        let db = self.context.db_name(group.code);
        let collection = names::get_table_name(group.table);

        match self.context.store.bulk_write(&db, &collection, ops) {
            Ok(summary) => {
                let counts_hold = summary.matched + summary.inserted == op_cnt
                    || summary.deleted == op_cnt;
                if !self.skip_op_cnt_checking && !counts_hold {
                    return Err(DriverError::open(format!(
                        "bad result on bulk execution to the table {}.{}: \
                         op_cnt {}, matched {}, inserted {}, modified {}, \
                         deleted {}, upserted {}",
                        db,
                        collection,
                        op_cnt,
                        summary.matched,
                        summary.inserted,
                        summary.modified,
                        summary.deleted,
                        summary.upserted
                    )));
                }
                Ok(())
            }
            Err(err) if err.is_duplicate() => {
                tracing::error!(code = err.raw, error = %err.message, "duplicate key on bulk write");
                self.error = err.message;
                Ok(())
            }
            Err(err) => {
                tracing::error!(code = err.raw, error = %err.message, "store error on bulk write");
                Err(err.into())
            }
        }
    }
}

fn pin_revision_path(info: &mut BulkInfo, op: &WriteOperation) {
    info.pk.insert(REVISION_PATH, Value::Int(op.find_revision.0));
}

fn append_data_bulk(
    group: &mut BulkGroup,
    table: &TableInfo,
    op: &WriteOperation,
    pin_revision: bool,
) -> DriverResult<()> {
    let mut info = BulkInfo::default();

    match op.operation {
        Operation::Insert | Operation::Update => {
            build_document(&mut info.data, table, &op.object);
            build_service_document(&mut info.data, table, &op.object);
            build_find_pk_document(&mut info.pk, table, &op.object);
        }
        Operation::Revision => {
            build_service_document(&mut info.data, table, &op.object);
            build_find_pk_document(&mut info.pk, table, &op.object);
        }
        Operation::Remove => {
            build_find_pk_document(&mut info.pk, table, &op.object);
        }
        Operation::Unknown => {
            return Err(DriverError::Write {
                table: table.table_name(),
                scope: table.scope,
                find_revision: op.find_revision,
                set_revision: op.object.service.revision,
                pk: op.object.pk(),
            });
        }
    }
    if pin_revision {
        pin_revision_path(&mut info, op);
    }

    push_into_bucket(group, op.operation, info);
    Ok(())
}

fn append_undo_bulk(
    group: &mut BulkGroup,
    op: &WriteOperation,
    pin_revision: bool,
) -> DriverResult<()> {
    let mut info = BulkInfo::default();

    match op.operation {
        Operation::Insert | Operation::Update => {
            if let Some(payload) = op.object.value.as_object() {
                for (key, value) in payload.iter() {
                    info.data.insert(key.clone(), value.clone());
                }
            }
            build_undo_document(&mut info.data, &op.object);
            build_find_undo_pk_document(&mut info.pk, &op.object);
        }
        Operation::Revision => {
            build_undo_document(&mut info.data, &op.object);
            build_find_undo_pk_document(&mut info.pk, &op.object);
        }
        Operation::Remove => {
            build_find_undo_pk_document(&mut info.pk, &op.object);
        }
        Operation::Unknown => {
            return Err(DriverError::Write {
                table: op.object.service.table,
                scope: op.object.service.scope,
                find_revision: op.find_revision,
                set_revision: op.object.service.revision,
                pk: op.object.pk(),
            });
        }
    }
    if pin_revision {
        pin_revision_path(&mut info, op);
    }

    push_into_bucket(group, op.operation, info);
    Ok(())
}

fn push_into_bucket(group: &mut BulkGroup, operation: Operation, info: BulkInfo) {
    match operation {
        Operation::Insert => group.insert.push(info),
        Operation::Update => group.update.push(info),
        Operation::Revision => group.revision.push(info),
        Operation::Remove => group.remove.push(info),
        Operation::Unknown => {}
    }
}
