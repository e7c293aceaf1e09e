//! Logical schema metadata: tables, indexes, ordered fields, and the typed
//! row (`ObjectValue`) exchanged between the driver and its callers.
//!
//! A table is identified by `(code, table, scope)`. Every table's first
//! index is the primary index and its first ordered field is the primary
//! key. Non-unique indexes get a synthesized pk tie-breaker appended at the
//! physical layer; it never appears in these logical definitions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{AccountName, IndexName, PrimaryKey, Revision, TableName};
use crate::value::Value;

/// Sort direction of one ordered field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKind {
    #[default]
    Asc,
    Desc,
}

impl SortKind {
    /// +1 for ascending, -1 for descending.
    pub fn sign(self) -> i32 {
        match self {
            SortKind::Asc => 1,
            SortKind::Desc => -1,
        }
    }
}

/// One ordered field of an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDef {
    /// Physical field name (dotted for nested fields).
    pub field: String,
    /// Extraction path through the row object. Empty when reconstructed
    /// from a physical index listing.
    #[serde(default)]
    pub path: Vec<String>,
    /// ABI type name; `uint128`/`int128` switch the field to its binary
    /// sub-document form.
    #[serde(default)]
    pub type_name: String,
    pub order: SortKind,
}

/// A logical index definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: IndexName,
    #[serde(default)]
    pub unique: bool,
    pub orders: Vec<OrderDef>,
    /// When set, range scans on this index cross scope boundaries instead
    /// of stopping at them. Distinct from the table-level `noscope` flag.
    #[serde(default)]
    pub ignore_scope: bool,
}

/// A logical table definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableDef {
    pub name: TableName,
    /// The first index is the primary index.
    pub indexes: Vec<IndexDef>,
    /// Scope is absent from storage for noscope tables.
    #[serde(default)]
    pub noscope: bool,
    /// Estimated row count, populated by schema scans.
    #[serde(default)]
    pub row_count: u64,
}

impl TableDef {
    pub fn primary_index(&self) -> Option<&IndexDef> {
        self.indexes.first()
    }
}

/// A concrete table instance: definition plus owning code and scope.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub code: AccountName,
    pub scope: AccountName,
    pub table: Arc<TableDef>,
}

impl TableInfo {
    pub fn new(code: AccountName, scope: AccountName, table: Arc<TableDef>) -> Self {
        Self { code, scope, table }
    }

    pub fn table_name(&self) -> TableName {
        self.table.name
    }

    pub fn is_noscope(&self) -> bool {
        self.table.noscope
    }

    /// The primary key order: first ordered field of the primary index.
    pub fn pk_order(&self) -> &OrderDef {
        &self.table.indexes[0].orders[0]
    }

    pub fn pk_field(&self) -> &str {
        &self.pk_order().field
    }
}

/// A concrete index instance over a table.
#[derive(Debug, Clone)]
pub struct IndexInfo {
    pub table: TableInfo,
    pub index: Arc<IndexDef>,
}

impl IndexInfo {
    pub fn new(table: TableInfo, index: Arc<IndexDef>) -> Self {
        Self { table, index }
    }

    pub fn code(&self) -> AccountName {
        self.table.code
    }

    pub fn scope(&self) -> AccountName {
        self.table.scope
    }

    pub fn table_name(&self) -> TableName {
        self.table.table_name()
    }

    pub fn is_noscope(&self) -> bool {
        self.table.is_noscope()
    }

    pub fn ignore_scope(&self) -> bool {
        self.index.ignore_scope
    }

    pub fn pk_order(&self) -> &OrderDef {
        self.table.pk_order()
    }

    /// True when this index is the table's primary index.
    pub fn is_primary(&self) -> bool {
        self.table
            .table
            .primary_index()
            .map(|primary| primary.name == self.index.name)
            .unwrap_or(false)
    }
}

/// Service header of a stored row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    pub pk: PrimaryKey,
    pub code: AccountName,
    pub scope: AccountName,
    pub table: TableName,
    pub revision: Revision,
    pub payer: AccountName,
}

/// A row: opaque structured payload plus its service header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectValue {
    pub service: ServiceState,
    pub value: Value,
}

impl ObjectValue {
    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    pub fn pk(&self) -> PrimaryKey {
        self.service.pk
    }

    /// Drop the payload and reset the service header.
    pub fn clear(&mut self) {
        *self = ObjectValue::default();
    }
}

/// Kind of a pending mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Unknown,
    Insert,
    Update,
    Revision,
    Remove,
}

impl Default for Operation {
    fn default() -> Self {
        Operation::Unknown
    }
}

/// One pending mutation produced by the journal.
#[derive(Debug, Clone, Default)]
pub struct WriteOperation {
    pub operation: Operation,
    /// Revision the row carried when it was read; used to pin writes when
    /// revision pinning is enabled.
    pub find_revision: Revision,
    pub object: ObjectValue,
}

impl WriteOperation {
    pub fn insert(object: ObjectValue) -> Self {
        Self { operation: Operation::Insert, find_revision: Revision::UNSET, object }
    }

    pub fn update(find_revision: Revision, object: ObjectValue) -> Self {
        Self { operation: Operation::Update, find_revision, object }
    }

    pub fn revision(find_revision: Revision, object: ObjectValue) -> Self {
        Self { operation: Operation::Revision, find_revision, object }
    }

    pub fn remove(find_revision: Revision, object: ObjectValue) -> Self {
        Self { operation: Operation::Remove, find_revision, object }
    }
}
