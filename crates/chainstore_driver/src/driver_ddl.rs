//! Schema reconciliation on the Driver: create/drop indexes and tables,
//! list the physical schema back as logical definitions, drop databases.
//!
//! Listing is self-healing: a collection or index whose name does not
//! decode as a symbol is debris from an older run and is dropped on sight
//! instead of failing the scan.

use std::sync::Arc;
use std::time::Duration;

use chainstore_common::error::{DriverError, DriverResult, StoreError};
use chainstore_common::schema::{IndexDef, IndexInfo, OrderDef, SortKind, TableDef, TableInfo};
use chainstore_common::types::AccountName;

use crate::bigint;
use crate::bounds::order_field;
use crate::driver::Driver;
use crate::names;
use crate::object::SCOPE_PATH;
use crate::retry::with_reconnect;
use crate::store::{IndexSpec, Store};

/// Time budget of the per-collection row-count estimate.
const ROW_COUNT_MAX_TIME: Duration = Duration::from_millis(10);

impl Driver {
    /// Create the physical index behind a logical definition: optional
    /// scope prefix, the ordered fields, and a pk tie-breaker on
    /// non-unique indexes. A scoped primary index additionally gets a
    /// pk-only auxiliary index for reverse scans across scopes.
    pub fn create_index(&self, info: &IndexInfo) -> DriverResult<()> {
        let index = &info.index;

        let mut keys: Vec<(String, i32)> = Vec::with_capacity(index.orders.len() + 2);
        if !info.is_noscope() {
            keys.push((SCOPE_PATH.to_string(), 1));
        }
        for order in &index.orders {
            keys.push((order_field(order), order.order.sign()));
        }
        if !index.unique {
            // non-unique indexes get a unique pk for deterministic order
            keys.push((info.pk_order().field.clone(), 1));
        }

        let db = self.store_context().db_name(info.code());
        let collection = names::get_table_name(info.table_name());
        let name = names::get_index_name(index.name);

        self.store_context().store.create_index(
            &db,
            &collection,
            IndexSpec { name: name.clone(), unique: index.unique, keys },
        )?;

        // for available_pk
        if !info.is_noscope() && info.is_primary() {
            self.store_context().store.create_index(
                &db,
                &collection,
                IndexSpec {
                    name: names::get_pk_index_name(index.name),
                    unique: false,
                    keys: vec![(info.pk_order().field.clone(), 1)],
                },
            )?;
        }

        Ok(())
    }

    pub fn drop_index(&self, info: &IndexInfo) -> DriverResult<()> {
        let db = self.store_context().db_name(info.code());
        let collection = names::get_table_name(info.table_name());
        self.store_context()
            .store
            .drop_index(&db, &collection, &names::get_index_name(info.index.name))?;
        Ok(())
    }

    pub fn drop_table(&self, info: &TableInfo) -> DriverResult<()> {
        let db = self.store_context().db_name(info.code);
        self.store_context()
            .store
            .drop_collection(&db, &names::get_table_name(info.table_name()))?;
        Ok(())
    }

    /// Reconstruct the logical schema of every table of a code from the
    /// physical layout.
    pub fn db_tables(&self, code: AccountName) -> DriverResult<Vec<TableDef>> {
        let db = self.store_context().db_name(code);
        let store = Arc::clone(&self.store_context().store);

        with_reconnect(self.store_context().retry, || {
            let mut tables = Vec::new();
            for collection in store.list_collections(&db)? {
                if collection.starts_with(names::STORE_SYSTEM_PREFIX) {
                    continue;
                }

                let name = match names::db_string_to_table(&collection) {
                    Ok(name) => name,
                    Err(err) => {
                        tracing::warn!(collection = %collection, error = %err,
                            "dropping collection with undecodable name");
                        store.drop_collection(&db, &collection)?;
                        continue;
                    }
                };

                let row_count =
                    store.estimated_row_count(&db, &collection, ROW_COUNT_MAX_TIME)?;
                let indexes = db_indexes(store.as_ref(), &db, &collection)?;

                tables.push(TableDef { name, indexes, noscope: false, row_count });
            }
            Ok(tables)
        })
    }

    /// Drop every database owned by this driver. Refused while cursors
    /// are live.
    pub fn drop_db(&self) -> DriverResult<()> {
        if !self.registry_is_empty() {
            return Err(DriverError::OpenedCursors);
        }

        let sys_name = self.store_context().sys_name.clone();
        for db in self.store_context().store.list_databases()? {
            if !db.starts_with(&sys_name) {
                continue;
            }
            self.store_context().store.drop_database(&db)?;
        }
        Ok(())
    }
}

/// Decode the physical indexes of one collection, skipping the store's id
/// index and the auxiliary pk indexes, stripping the binary sub-field
/// suffix and the synthesized pk tie-breaker.
fn db_indexes(
    store: &dyn Store,
    db: &str,
    collection: &str,
) -> Result<Vec<IndexDef>, StoreError> {
    let mut result = Vec::new();

    for spec in store.list_indexes(db, collection)? {
        if spec.name.ends_with(names::PK_INDEX_SUFFIX) {
            continue;
        }
        if spec.name == names::STORE_ID_INDEX {
            continue;
        }

        let name = match names::db_string_to_index(&spec.name) {
            Ok(name) => name,
            Err(err) => {
                tracing::warn!(index = %spec.name, error = %err,
                    "dropping index with undecodable name");
                store.drop_index(db, collection, &spec.name)?;
                continue;
            }
        };

        let mut index = IndexDef {
            name,
            unique: spec.unique,
            orders: Vec::with_capacity(spec.keys.len()),
            ignore_scope: false,
        };

        for (field, dir) in &spec.keys {
            if field == SCOPE_PATH {
                continue;
            }

            let mut field = field.clone();
            let binary_suffix_len = bigint::BINARY_FIELD.len() + 1;
            if field.len() > binary_suffix_len
                && field.ends_with(bigint::BINARY_FIELD)
                && field.as_bytes()[field.len() - binary_suffix_len] == b'.'
            {
                field.truncate(field.len() - binary_suffix_len);
            }

            index.orders.push(OrderDef {
                field,
                path: Vec::new(),
                type_name: String::new(),
                order: if *dir == 1 { SortKind::Asc } else { SortKind::Desc },
            });
        }

        // the trailing pk tie-breaker was synthesized at creation
        if !index.unique {
            index.orders.pop();
        }

        result.push(index);
    }

    Ok(result)
}
