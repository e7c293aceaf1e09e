//! Two-level cursor registry: `code → (cursor id → cursor)`.
//!
//! Both levels are ordered maps: id allocation takes the largest existing
//! id plus one, starting at 1, and per-code buckets are pruned when their
//! last cursor closes.

use std::collections::BTreeMap;

use chainstore_common::error::{DriverError, DriverResult};
use chainstore_common::types::{AccountName, CursorId};

use crate::cursor::Cursor;

/// Identifies one cursor for the facade entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorRequest {
    pub code: AccountName,
    pub id: CursorId,
}

#[derive(Default)]
pub struct CursorRegistry {
    buckets: BTreeMap<AccountName, BTreeMap<CursorId, Cursor>>,
}

impl CursorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Next free id within a code bucket: largest existing id plus one.
    pub fn next_cursor_id(&self, code: AccountName) -> CursorId {
        self.buckets
            .get(&code)
            .and_then(|bucket| bucket.keys().next_back())
            .map(|id| CursorId(id.0 + 1))
            .unwrap_or(CursorId(1))
    }

    pub fn add_cursor(&mut self, code: AccountName, cursor: Cursor) -> &mut Cursor {
        let id = cursor.id;
        self.buckets
            .entry(code)
            .or_default()
            .entry(id)
            .or_insert(cursor)
    }

    pub fn get_cursor(&mut self, request: CursorRequest) -> DriverResult<&mut Cursor> {
        self.buckets
            .get_mut(&request.code)
            .and_then(|bucket| bucket.get_mut(&request.id))
            .ok_or(DriverError::InvalidCursor { code: request.code, id: request.id })
    }

    pub fn close_cursor(&mut self, request: CursorRequest) -> DriverResult<()> {
        let bucket = self
            .buckets
            .get_mut(&request.code)
            .ok_or(DriverError::InvalidCursor { code: request.code, id: request.id })?;
        bucket
            .remove(&request.id)
            .ok_or(DriverError::InvalidCursor { code: request.code, id: request.id })?;
        if bucket.is_empty() {
            self.buckets.remove(&request.code);
        }
        Ok(())
    }

    /// Drop every cursor of a code. Unknown codes are a no-op.
    pub fn close_code_cursors(&mut self, code: AccountName) {
        self.buckets.remove(&code);
    }

    /// Iterate the cursors of one code bucket.
    pub fn code_cursors_mut(
        &mut self,
        code: AccountName,
    ) -> impl Iterator<Item = &mut Cursor> {
        self.buckets.get_mut(&code).into_iter().flat_map(|bucket| bucket.values_mut())
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::time::Duration;

    use chainstore_common::schema::{IndexDef, IndexInfo, OrderDef, SortKind, TableDef, TableInfo};
    use chainstore_common::types::{IndexName, TableName};

    use crate::cursor::StoreContext;
    use crate::memstore::MemStore;
    use crate::retry::RetryPolicy;

    fn test_cursor(id: CursorId) -> Cursor {
        let index_def = IndexDef {
            name: IndexName::from_str("primary").unwrap(),
            unique: true,
            orders: vec![OrderDef {
                field: "id".to_string(),
                path: vec!["id".to_string()],
                type_name: String::new(),
                order: SortKind::Asc,
            }],
            ignore_scope: false,
        };
        let table = Arc::new(TableDef {
            name: TableName::from_str("accounts").unwrap(),
            indexes: vec![index_def.clone()],
            noscope: false,
            row_count: 0,
        });
        let info = TableInfo::new(
            AccountName::from_str("code").unwrap(),
            AccountName::from_str("alice").unwrap(),
            table,
        );
        let context = StoreContext {
            store: Arc::new(MemStore::new()),
            sys_name: "_TEST_".to_string(),
            retry: RetryPolicy { attempts: 1, pause: Duration::from_millis(1) },
        };
        Cursor::new(id, IndexInfo::new(info, Arc::new(index_def)), context)
    }

    fn code() -> AccountName {
        AccountName::from_str("code").unwrap()
    }

    #[test]
    fn test_id_allocation_starts_at_one_and_grows() {
        let mut registry = CursorRegistry::new();
        assert_eq!(registry.next_cursor_id(code()), CursorId(1));
        registry.add_cursor(code(), test_cursor(CursorId(1)));
        registry.add_cursor(code(), test_cursor(CursorId(2)));
        assert_eq!(registry.next_cursor_id(code()), CursorId(3));

        // closing the middle cursor does not recycle its id
        registry.close_cursor(CursorRequest { code: code(), id: CursorId(1) }).unwrap();
        assert_eq!(registry.next_cursor_id(code()), CursorId(3));
    }

    #[test]
    fn test_empty_bucket_is_pruned() {
        let mut registry = CursorRegistry::new();
        registry.add_cursor(code(), test_cursor(CursorId(1)));
        registry.close_cursor(CursorRequest { code: code(), id: CursorId(1) }).unwrap();
        assert!(registry.is_empty());
        // pruned bucket resets id allocation
        assert_eq!(registry.next_cursor_id(code()), CursorId(1));
    }

    #[test]
    fn test_unknown_cursor_is_an_error() {
        let mut registry = CursorRegistry::new();
        let missing = CursorRequest { code: code(), id: CursorId(9) };
        assert!(matches!(
            registry.get_cursor(missing),
            Err(DriverError::InvalidCursor { .. })
        ));
        assert!(matches!(
            registry.close_cursor(missing),
            Err(DriverError::InvalidCursor { .. })
        ));
    }

    #[test]
    fn test_close_code_cursors_drops_bucket() {
        let mut registry = CursorRegistry::new();
        registry.add_cursor(code(), test_cursor(CursorId(1)));
        registry.add_cursor(code(), test_cursor(CursorId(2)));
        registry.close_code_cursors(code());
        assert!(registry.is_empty());
    }
}
