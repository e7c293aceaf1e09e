//! Ordered in-memory document store.
//!
//! Implements the `Store` session contract over `BTreeMap`s: databases hold
//! collections, collections hold rows keyed by a synthetic `_id` plus their
//! physical index specs. Range queries are evaluated in index key order
//! with half-open `min`/`max` semantics (min inclusive, max exclusive),
//! exactly the contract the driver's bound builder relies on.
//!
//! Collections come into existence on first write or first index creation.
//! Unique indexes are enforced at write time; a violated insert/replace is
//! skipped and reported with code `11000` after the whole batch ran, the
//! way an unordered bulk write behaves.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::RwLock;

use chainstore_common::error::{StoreError, StoreErrorCode};
use chainstore_common::value::{Document, Value};

use crate::store::{BulkOp, BulkSummary, FindOptions, IndexSpec, RowSource, Store};

#[derive(Default)]
struct MemCollection {
    next_id: u64,
    rows: BTreeMap<u64, Document>,
    indexes: BTreeMap<String, IndexSpec>,
}

impl MemCollection {
    fn new() -> Self {
        let mut collection = MemCollection::default();
        collection.indexes.insert(
            "_id_".to_string(),
            IndexSpec {
                name: "_id_".to_string(),
                unique: true,
                keys: vec![("_id".to_string(), 1)],
            },
        );
        collection
    }

    fn insert_row(&mut self, mut document: Document) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        document.insert("_id", Value::Uint(id));
        self.rows.insert(id, document);
        id
    }

    /// First row matching an equality filter on dotted fields, in
    /// insertion order.
    fn find_first(&self, filter: &Document) -> Option<u64> {
        self.rows
            .iter()
            .find(|(_, row)| matches_filter(row, filter))
            .map(|(id, _)| *id)
    }

    /// Check every unique index against `candidate`; `exclude` skips the
    /// row being replaced. Returns the violated index name.
    fn unique_violation(&self, candidate: &Document, exclude: Option<u64>) -> Option<&str> {
        for spec in self.indexes.values() {
            if !spec.unique || spec.name == "_id_" {
                continue;
            }
            let key = index_key(candidate, spec);
            let collision = self.rows.iter().any(|(id, row)| {
                Some(*id) != exclude && index_key(row, spec) == key
            });
            if collision {
                return Some(&spec.name);
            }
        }
        None
    }
}

#[derive(Default)]
struct MemDatabase {
    collections: BTreeMap<String, MemCollection>,
}

/// In-memory `Store` implementation.
#[derive(Default)]
pub struct MemStore {
    databases: RwLock<BTreeMap<String, MemDatabase>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_filter(row: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(field, expected)| row.get_path(field).unwrap_or(&Value::Null) == expected)
}

/// Key tuple of a row under an index spec; missing fields read as Null.
fn index_key(row: &Document, spec: &IndexSpec) -> Vec<Value> {
    spec.keys
        .iter()
        .map(|(field, _)| row.get_path(field).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Compare a row against a bound document in index key order.
fn cmp_in_index_order(row: &Document, bound: &Document, spec: &IndexSpec) -> Ordering {
    for (field, dir) in &spec.keys {
        let row_value = row.get_path(field).unwrap_or(&Value::Null);
        let bound_value = bound.get(field).unwrap_or(&Value::Null);
        let mut ord = row_value.cmp(bound_value);
        if *dir < 0 {
            ord = ord.reverse();
        }
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn cmp_by_sort(a: &Document, b: &Document, sort: &[(String, i32)]) -> Ordering {
    for (field, dir) in sort {
        let av = a.get_path(field).unwrap_or(&Value::Null);
        let bv = b.get_path(field).unwrap_or(&Value::Null);
        let mut ord = av.cmp(bv);
        if *dir < 0 {
            ord = ord.reverse();
        }
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Snapshot iterator over a resolved range.
struct MemRowSource {
    rows: Vec<Document>,
    position: usize,
}

impl RowSource for MemRowSource {
    fn current(&self) -> Option<&Document> {
        self.rows.get(self.position)
    }

    fn advance(&mut self) -> Result<(), StoreError> {
        if self.position < self.rows.len() {
            self.position += 1;
        }
        Ok(())
    }
}

impl MemStore {
    fn resolve_range(
        &self,
        db: &str,
        collection: &str,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let databases = self.databases.read();
        let Some(coll) = databases.get(db).and_then(|d| d.collections.get(collection)) else {
            return Ok(Vec::new());
        };
        let spec = coll.indexes.get(&options.hint).ok_or_else(|| {
            StoreError::new(
                StoreErrorCode::Unknown,
                format!("hint '{}' does not match any index on {}.{}", options.hint, db, collection),
            )
        })?;

        let mut rows: Vec<Document> = coll
            .rows
            .values()
            .filter(|row| {
                if let Some(min) = &options.min {
                    if cmp_in_index_order(row, min, spec) == Ordering::Less {
                        return false;
                    }
                }
                if let Some(max) = &options.max {
                    if cmp_in_index_order(row, max, spec) != Ordering::Less {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        rows.sort_by(|a, b| cmp_by_sort(a, b, &options.sort));
        if let Some(limit) = options.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

impl Store for MemStore {
    fn list_databases(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.databases.read().keys().cloned().collect())
    }

    fn drop_database(&self, db: &str) -> Result<(), StoreError> {
        self.databases.write().remove(db);
        Ok(())
    }

    fn list_collections(&self, db: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .databases
            .read()
            .get(db)
            .map(|d| d.collections.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn drop_collection(&self, db: &str, collection: &str) -> Result<(), StoreError> {
        if let Some(database) = self.databases.write().get_mut(db) {
            database.collections.remove(collection);
        }
        Ok(())
    }

    fn estimated_row_count(
        &self,
        db: &str,
        collection: &str,
        _max_time: Duration,
    ) -> Result<u64, StoreError> {
        Ok(self
            .databases
            .read()
            .get(db)
            .and_then(|d| d.collections.get(collection))
            .map(|c| c.rows.len() as u64)
            .unwrap_or(0))
    }

    fn list_indexes(&self, db: &str, collection: &str) -> Result<Vec<IndexSpec>, StoreError> {
        Ok(self
            .databases
            .read()
            .get(db)
            .and_then(|d| d.collections.get(collection))
            .map(|c| c.indexes.values().cloned().collect())
            .unwrap_or_default())
    }

    fn create_index(
        &self,
        db: &str,
        collection: &str,
        spec: IndexSpec,
    ) -> Result<(), StoreError> {
        let mut databases = self.databases.write();
        let database = databases.entry(db.to_string()).or_default();
        let coll = database
            .collections
            .entry(collection.to_string())
            .or_insert_with(MemCollection::new);
        coll.indexes.insert(spec.name.clone(), spec);
        Ok(())
    }

    fn drop_index(&self, db: &str, collection: &str, name: &str) -> Result<(), StoreError> {
        if let Some(coll) = self
            .databases
            .write()
            .get_mut(db)
            .and_then(|d| d.collections.get_mut(collection))
        {
            coll.indexes.remove(name);
        }
        Ok(())
    }

    fn find(
        &self,
        db: &str,
        collection: &str,
        options: FindOptions,
    ) -> Result<Box<dyn RowSource>, StoreError> {
        let rows = self.resolve_range(db, collection, &options)?;
        Ok(Box::new(MemRowSource { rows, position: 0 }))
    }

    fn find_one(
        &self,
        db: &str,
        collection: &str,
        options: FindOptions,
    ) -> Result<Option<Document>, StoreError> {
        let rows = self.resolve_range(db, collection, &options)?;
        Ok(rows.into_iter().next())
    }

    fn bulk_write(
        &self,
        db: &str,
        collection: &str,
        operations: Vec<BulkOp>,
    ) -> Result<BulkSummary, StoreError> {
        if operations.is_empty() {
            return Err(StoreError::new(StoreErrorCode::EmptyBulk, "empty bulk write"));
        }

        let mut databases = self.databases.write();
        let database = databases.entry(db.to_string()).or_default();
        let coll = database
            .collections
            .entry(collection.to_string())
            .or_insert_with(MemCollection::new);

        let mut summary = BulkSummary::default();
        let mut duplicate: Option<String> = None;

        for op in operations {
            match op {
                BulkOp::InsertOne { document } => {
                    if let Some(index) = coll.unique_violation(&document, None) {
                        duplicate = Some(format!(
                            "E11000 duplicate key error collection: {}.{} index: {}",
                            db, collection, index
                        ));
                        continue;
                    }
                    coll.insert_row(document);
                    summary.inserted += 1;
                }
                BulkOp::ReplaceOne { filter, document } => {
                    let Some(id) = coll.find_first(&filter) else {
                        continue;
                    };
                    if let Some(index) = coll.unique_violation(&document, Some(id)) {
                        duplicate = Some(format!(
                            "E11000 duplicate key error collection: {}.{} index: {}",
                            db, collection, index
                        ));
                        continue;
                    }
                    summary.matched += 1;
                    summary.modified += 1;
                    let mut replacement = document;
                    replacement.insert("_id", Value::Uint(id));
                    coll.rows.insert(id, replacement);
                }
                BulkOp::UpdateOne { filter, set } => {
                    let Some(id) = coll.find_first(&filter) else {
                        continue;
                    };
                    summary.matched += 1;
                    summary.modified += 1;
                    if let Some(row) = coll.rows.get_mut(&id) {
                        for (field, value) in set.iter() {
                            row.insert_path(field, value.clone());
                        }
                    }
                }
                BulkOp::DeleteOne { filter } => {
                    if let Some(id) = coll.find_first(&filter) {
                        coll.rows.remove(&id);
                        summary.deleted += 1;
                    }
                }
            }
        }

        match duplicate {
            Some(message) => Err(StoreError::new(StoreErrorCode::DuplicateValue, message)),
            None => Ok(summary),
        }
    }
}

#[cfg(test)]
mod memstore_tests {
    use super::*;

    fn doc(json: serde_json::Value) -> Document {
        match Value::from(json) {
            Value::Object(doc) => doc,
            _ => panic!("expected object"),
        }
    }

    fn value_index() -> IndexSpec {
        IndexSpec {
            name: "byvalue".to_string(),
            unique: false,
            keys: vec![("v".to_string(), 1), ("id".to_string(), 1)],
        }
    }

    fn seed(store: &MemStore) {
        store.create_index("db", "t", value_index()).unwrap();
        let rows = vec![
            doc(serde_json::json!({"id": 1, "v": 10})),
            doc(serde_json::json!({"id": 2, "v": 10})),
            doc(serde_json::json!({"id": 3, "v": 20})),
        ];
        store
            .bulk_write(
                "db",
                "t",
                rows.into_iter().map(|document| BulkOp::InsertOne { document }).collect(),
            )
            .unwrap();
    }

    fn scan_ids(store: &MemStore, options: FindOptions) -> Vec<u64> {
        let mut source = store.find("db", "t", options).unwrap();
        let mut ids = Vec::new();
        while let Some(row) = source.current() {
            ids.push(row.get("id").and_then(|v| v.as_u64()).unwrap());
            source.advance().unwrap();
        }
        ids
    }

    #[test]
    fn test_min_bound_is_inclusive() {
        let store = MemStore::new();
        seed(&store);
        let mut min = Document::new();
        min.insert("v", Value::Int(10));
        min.insert("id", Value::Int(2));
        let options = FindOptions {
            hint: "byvalue".to_string(),
            sort: vec![("v".to_string(), 1), ("id".to_string(), 1)],
            min: Some(min),
            max: None,
            limit: None,
        };
        assert_eq!(scan_ids(&store, options), vec![2, 3]);
    }

    #[test]
    fn test_max_bound_is_exclusive() {
        let store = MemStore::new();
        seed(&store);
        let mut max = Document::new();
        max.insert("v", Value::Int(10));
        max.insert("id", Value::Int(2));
        let options = FindOptions {
            hint: "byvalue".to_string(),
            sort: vec![("v".to_string(), -1), ("id".to_string(), -1)],
            min: None,
            max: Some(max),
            limit: None,
        };
        assert_eq!(scan_ids(&store, options), vec![1]);
    }

    #[test]
    fn test_sentinel_bounds_cover_whole_range() {
        let store = MemStore::new();
        seed(&store);
        let mut min = Document::new();
        min.insert("v", Value::MinKey);
        min.insert("id", Value::MinKey);
        let options = FindOptions {
            hint: "byvalue".to_string(),
            sort: vec![("v".to_string(), 1), ("id".to_string(), 1)],
            min: Some(min),
            max: None,
            limit: None,
        };
        assert_eq!(scan_ids(&store, options), vec![1, 2, 3]);
    }

    #[test]
    fn test_unique_index_rejects_duplicates_but_keeps_batch() {
        let store = MemStore::new();
        store
            .create_index(
                "db",
                "t",
                IndexSpec {
                    name: "primary".to_string(),
                    unique: true,
                    keys: vec![("id".to_string(), 1)],
                },
            )
            .unwrap();
        let err = store
            .bulk_write(
                "db",
                "t",
                vec![
                    BulkOp::InsertOne { document: doc(serde_json::json!({"id": 1})) },
                    BulkOp::InsertOne { document: doc(serde_json::json!({"id": 1})) },
                    BulkOp::InsertOne { document: doc(serde_json::json!({"id": 2})) },
                ],
            )
            .unwrap_err();
        assert!(err.is_duplicate());
        // the non-conflicting operations still landed
        assert_eq!(
            store
                .estimated_row_count("db", "t", Duration::from_millis(10))
                .unwrap(),
            2
        );
    }

    #[test]
    fn test_empty_bulk_is_an_error() {
        let store = MemStore::new();
        let err = store.bulk_write("db", "t", Vec::new()).unwrap_err();
        assert_eq!(err.code(), StoreErrorCode::EmptyBulk);
    }

    #[test]
    fn test_missing_collection_scans_empty() {
        let store = MemStore::new();
        let mut source = store
            .find("db", "missing", FindOptions { hint: "x".into(), ..Default::default() })
            .unwrap();
        assert!(source.current().is_none());
    }
}
