//! The external document-store session consumed by the driver.
//!
//! The driver never talks to a concrete client; everything flows through
//! these object-safe traits. The contract mirrors a document store with
//! hinted index scans: `find` takes an index hint, a sort specification and
//! a half-open `min`/`max` bound evaluated in *index key order*: `min` is
//! inclusive, `max` exclusive. Bulk writes are unordered within a batch.

use std::time::Duration;

use chainstore_common::error::StoreError;
use chainstore_common::value::Document;

/// Physical index description: name, uniqueness, and the key pattern as
/// `(field, ±1)` pairs in index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub unique: bool,
    pub keys: Vec<(String, i32)>,
}

/// Options of a hinted range query.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Name of the index the scan is pinned to.
    pub hint: String,
    /// Sort specification as `(field, ±1)` pairs.
    pub sort: Vec<(String, i32)>,
    /// Inclusive lower bound in index key order.
    pub min: Option<Document>,
    /// Exclusive upper bound in index key order.
    pub max: Option<Document>,
    pub limit: Option<usize>,
}

/// One operation of an unordered bulk write.
#[derive(Debug, Clone)]
pub enum BulkOp {
    InsertOne { document: Document },
    ReplaceOne { filter: Document, document: Document },
    /// Partial update: `$set` of the given fields.
    UpdateOne { filter: Document, set: Document },
    DeleteOne { filter: Document },
}

/// Counters returned by a bulk execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub matched: u64,
    pub inserted: u64,
    pub modified: u64,
    pub deleted: u64,
    pub upserted: u64,
}

/// A server-side range iterator. The iterator starts positioned on the
/// first row of the range (`current` is `None` only when the range is
/// empty or exhausted).
pub trait RowSource {
    fn current(&self) -> Option<&Document>;
    fn advance(&mut self) -> Result<(), StoreError>;
}

/// A document-store session. Databases and collections are addressed by
/// name; collections come into existence on first write.
pub trait Store: Send + Sync {
    fn list_databases(&self) -> Result<Vec<String>, StoreError>;

    fn drop_database(&self, db: &str) -> Result<(), StoreError>;

    fn list_collections(&self, db: &str) -> Result<Vec<String>, StoreError>;

    fn drop_collection(&self, db: &str, collection: &str) -> Result<(), StoreError>;

    /// Estimated row count, bounded by `max_time` of server-side work.
    fn estimated_row_count(
        &self,
        db: &str,
        collection: &str,
        max_time: Duration,
    ) -> Result<u64, StoreError>;

    fn list_indexes(&self, db: &str, collection: &str) -> Result<Vec<IndexSpec>, StoreError>;

    fn create_index(
        &self,
        db: &str,
        collection: &str,
        spec: IndexSpec,
    ) -> Result<(), StoreError>;

    fn drop_index(&self, db: &str, collection: &str, name: &str) -> Result<(), StoreError>;

    fn find(
        &self,
        db: &str,
        collection: &str,
        options: FindOptions,
    ) -> Result<Box<dyn RowSource>, StoreError>;

    fn find_one(
        &self,
        db: &str,
        collection: &str,
        options: FindOptions,
    ) -> Result<Option<Document>, StoreError>;

    /// Execute `operations` as an unordered bulk write. On duplicate keys
    /// the remaining operations still run; the error is raised afterwards
    /// with code `DuplicateValue`.
    fn bulk_write(
        &self,
        db: &str,
        collection: &str,
        operations: Vec<BulkOp>,
    ) -> Result<BulkSummary, StoreError>;
}
