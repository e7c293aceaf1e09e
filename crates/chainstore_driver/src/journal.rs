//! The journal contract: the external producer of pending mutations.
//!
//! The driver never inspects pending operations itself. For every apply it
//! constructs a fresh `WriteContext` and hands it to the journal, which
//! enumerates the relevant operations through `start_table` / `add_data` /
//! `add_prepare_undo` / `add_complete_undo`; the driver then consumes the
//! context. Cursor reads use the table-scoped form so a cursor never
//! observes pre-apply state of its own table.

use chainstore_common::error::DriverResult;
use chainstore_common::schema::TableInfo;
use chainstore_common::types::AccountName;

use crate::write_ctx::WriteContext;

pub trait Journal: Send + Sync {
    /// Enumerate pending operations of one table.
    fn apply_table_changes(&self, ctx: &mut WriteContext, table: &TableInfo)
        -> DriverResult<()>;

    /// Enumerate pending operations of every table of a code.
    fn apply_code_changes(&self, ctx: &mut WriteContext, code: AccountName) -> DriverResult<()>;

    /// Enumerate all pending operations.
    fn apply_all_changes(&self, ctx: &mut WriteContext) -> DriverResult<()>;
}
