//! Row codec: translation between stored documents and typed rows.
//!
//! Every stored row is the user payload plus a `_SERVICE_` sub-document
//! `{scope, rev, payer}`; the primary key lives inside the payload at the
//! table's pk path. Scopes and payers are stored in canonical string form.
//! Bound and filter documents address service fields through dotted paths
//! (`_SERVICE_.scope`), which is also the physical index key of the scope.

use std::str::FromStr;

use chainstore_common::error::{DriverError, DriverResult};
use chainstore_common::schema::{ObjectValue, OrderDef, TableInfo};
use chainstore_common::types::{AccountName, PrimaryKey, Revision};
use chainstore_common::value::{Document, Value};

use crate::bigint;

/// Service sub-document field.
pub const SERVICE_FIELD: &str = "_SERVICE_";
/// Dotted path of the stored scope; also the scope's index key.
pub const SCOPE_PATH: &str = "_SERVICE_.scope";
/// Dotted path of the stored revision.
pub const REVISION_PATH: &str = "_SERVICE_.rev";

const SCOPE_FIELD: &str = "scope";
const REVISION_FIELD: &str = "rev";
const PAYER_FIELD: &str = "payer";

/// Top-level key fields of undo rows.
pub const UNDO_PK_FIELD: &str = "pk";
pub const UNDO_REVISION_FIELD: &str = "rev";

fn walk_path<'a>(
    row: &'a Document,
    order: &OrderDef,
    table: &TableInfo,
) -> DriverResult<&'a Value> {
    let absent = || DriverError::AbsentField {
        table: table.table_name(),
        field: order.field.clone(),
    };
    let mut position = row;
    let mut parts = order.path.iter().peekable();
    while let Some(key) = parts.next() {
        let value = position.get(key).ok_or_else(absent)?;
        if parts.peek().is_none() {
            return Ok(value);
        }
        position = value.as_object().ok_or_else(absent)?;
    }
    Err(absent())
}

/// Extract the primary key from a stored row.
pub fn get_pk_value(table: &TableInfo, row: &Document) -> DriverResult<PrimaryKey> {
    let order = table.pk_order();
    let value = walk_path(row, order, table)?;
    value.as_u64().map(PrimaryKey).ok_or_else(|| DriverError::AbsentField {
        table: table.table_name(),
        field: order.field.clone(),
    })
}

/// Extract the scope from a stored row. Rows of noscope tables carry no
/// scope and read as the default account.
pub fn get_scope_value(row: &Document) -> AccountName {
    row.get_path(SCOPE_PATH)
        .and_then(|v| v.as_str())
        .and_then(|s| AccountName::from_str(s).ok())
        .unwrap_or_default()
}

/// Append a scope equality to a bound/filter document.
pub fn append_scope_value(doc: &mut Document, scope: AccountName) {
    doc.insert(SCOPE_PATH, Value::Str(scope.to_string()));
}

/// Append a pk equality to a bound/filter document.
pub fn append_pk_value(doc: &mut Document, pk_order: &OrderDef, pk: PrimaryKey) {
    doc.insert(pk_order.field.clone(), Value::Uint(pk.0));
}

/// Ordered big-int fields of a table, across all of its indexes.
fn bigint_orders(table: &TableInfo) -> impl Iterator<Item = &OrderDef> {
    table
        .table
        .indexes
        .iter()
        .flat_map(|index| index.orders.iter())
        .filter(|order| bigint::is_bigint_type(&order.type_name))
}

/// Decode a stored row into a typed object.
///
/// Strips the store's row id and the service sub-document (unless decors
/// are requested), unwraps big-int sub-documents back to numeric values and
/// fills the service header from the stored service fields.
pub fn build_object(
    table: &TableInfo,
    row: &Document,
    with_decors: bool,
) -> DriverResult<ObjectValue> {
    let mut payload = row.clone();
    payload.remove("_id");
    let service_doc = payload.remove(SERVICE_FIELD);

    for order in bigint_orders(table) {
        if let Some(value) = payload.get_path(&order.field).cloned() {
            let decoded = bigint::from_stored(&order.type_name, &value);
            payload.insert_path(&order.field, decoded);
        }
    }

    let mut object = ObjectValue::default();
    object.service.pk = get_pk_value(table, &payload)?;
    object.service.code = table.code;
    object.service.table = table.table_name();
    object.service.scope = table.scope;

    if let Some(Value::Object(service)) = &service_doc {
        if let Some(scope) = service.get(SCOPE_FIELD).and_then(|v| v.as_str()) {
            if let Ok(scope) = AccountName::from_str(scope) {
                object.service.scope = scope;
            }
        }
        if let Some(rev) = service.get(REVISION_FIELD).and_then(|v| v.as_i64()) {
            object.service.revision = Revision(rev);
        }
        if let Some(payer) = service.get(PAYER_FIELD).and_then(|v| v.as_str()) {
            if let Ok(payer) = AccountName::from_str(payer) {
                object.service.payer = payer;
            }
        }
    }

    if with_decors {
        if let Some(service) = service_doc {
            payload.insert(SERVICE_FIELD, service);
        }
    }

    object.value = Value::Object(payload);
    Ok(object)
}

/// Encode an object's payload into a data document, converting ordered
/// big-int fields to their stored form.
pub fn build_document(doc: &mut Document, table: &TableInfo, object: &ObjectValue) {
    if let Some(payload) = object.value.as_object() {
        for (key, value) in payload.iter() {
            doc.insert(key.clone(), value.clone());
        }
    }
    for order in bigint_orders(table) {
        if let Some(value) = doc.get_path(&order.field).cloned() {
            let stored = bigint::to_stored(&order.type_name, &value);
            doc.insert_path(&order.field, stored);
        }
    }
}

/// Append the service sub-document to a data document. Noscope tables
/// store no scope.
pub fn build_service_document(doc: &mut Document, table: &TableInfo, object: &ObjectValue) {
    let mut service = Document::new();
    if !table.is_noscope() {
        service.insert(SCOPE_FIELD, Value::Str(object.service.scope.to_string()));
    }
    service.insert(REVISION_FIELD, Value::Int(object.service.revision.0));
    service.insert(PAYER_FIELD, Value::Str(object.service.payer.to_string()));
    doc.insert(SERVICE_FIELD, Value::Object(service));
}

/// Filter addressing one row of a user table: scope (when stored) plus pk.
pub fn build_find_pk_document(doc: &mut Document, table: &TableInfo, object: &ObjectValue) {
    if !table.is_noscope() {
        append_scope_value(doc, object.service.scope);
    }
    append_pk_value(doc, table.pk_order(), object.service.pk);
}

/// Filter addressing one undo row: top-level pk and revision.
pub fn build_find_undo_pk_document(doc: &mut Document, object: &ObjectValue) {
    doc.insert(UNDO_PK_FIELD, Value::Uint(object.service.pk.0));
    doc.insert(UNDO_REVISION_FIELD, Value::Int(object.service.revision.0));
}

/// Undo service fields: the undo key at top level plus the usual service
/// sub-document, so revision-pinned filters address undo rows the same way
/// they address user rows.
pub fn build_undo_document(doc: &mut Document, object: &ObjectValue) {
    doc.insert(UNDO_PK_FIELD, Value::Uint(object.service.pk.0));
    doc.insert(UNDO_REVISION_FIELD, Value::Int(object.service.revision.0));
    let mut service = Document::new();
    service.insert(REVISION_FIELD, Value::Int(object.service.revision.0));
    service.insert(PAYER_FIELD, Value::Str(object.service.payer.to_string()));
    doc.insert(SERVICE_FIELD, Value::Object(service));
}

#[cfg(test)]
mod object_tests {
    use super::*;
    use std::sync::Arc;

    use chainstore_common::schema::{IndexDef, SortKind, TableDef};
    use chainstore_common::types::{IndexName, TableName};

    fn table_info() -> TableInfo {
        let primary = IndexDef {
            name: IndexName::from_str("primary").unwrap(),
            unique: true,
            orders: vec![OrderDef {
                field: "id".to_string(),
                path: vec!["id".to_string()],
                type_name: "uint64".to_string(),
                order: SortKind::Asc,
            }],
            ignore_scope: false,
        };
        let table = Arc::new(TableDef {
            name: TableName::from_str("accounts").unwrap(),
            indexes: vec![primary],
            noscope: false,
            row_count: 0,
        });
        TableInfo::new(
            AccountName::from_str("code").unwrap(),
            AccountName::from_str("alice").unwrap(),
            table,
        )
    }

    fn object(pk: u64, rev: i64) -> ObjectValue {
        let mut object = ObjectValue::default();
        object.service.pk = PrimaryKey(pk);
        object.service.scope = AccountName::from_str("alice").unwrap();
        object.service.payer = AccountName::from_str("bob").unwrap();
        object.service.revision = Revision(rev);
        let mut payload = Document::new();
        payload.insert("id", Value::Uint(pk));
        payload.insert("balance", Value::Int(100));
        object.value = Value::Object(payload);
        object
    }

    #[test]
    fn test_document_object_roundtrip() {
        let table = table_info();
        let source = object(7, 3);

        let mut doc = Document::new();
        build_document(&mut doc, &table, &source);
        build_service_document(&mut doc, &table, &source);

        let decoded = build_object(&table, &doc, false).unwrap();
        assert_eq!(decoded.service.pk, PrimaryKey(7));
        assert_eq!(decoded.service.revision, Revision(3));
        assert_eq!(decoded.service.scope.to_string(), "alice");
        assert_eq!(decoded.service.payer.to_string(), "bob");
        // service sub-document stripped without decors
        let payload = decoded.value.as_object().unwrap();
        assert!(payload.get(SERVICE_FIELD).is_none());
        assert_eq!(payload.get("balance"), Some(&Value::Int(100)));
    }

    #[test]
    fn test_decors_keep_service_fields() {
        let table = table_info();
        let source = object(1, 1);
        let mut doc = Document::new();
        build_document(&mut doc, &table, &source);
        build_service_document(&mut doc, &table, &source);

        let decoded = build_object(&table, &doc, true).unwrap();
        assert!(decoded.value.as_object().unwrap().get(SERVICE_FIELD).is_some());
    }

    #[test]
    fn test_find_pk_document_carries_scope_and_pk() {
        let table = table_info();
        let mut filter = Document::new();
        build_find_pk_document(&mut filter, &table, &object(9, 1));
        assert_eq!(filter.get(SCOPE_PATH), Some(&Value::Str("alice".to_string())));
        assert_eq!(filter.get("id"), Some(&Value::Uint(9)));
    }

    #[test]
    fn test_missing_pk_field_is_absent_field() {
        let err = build_object(&table_info(), &Document::new(), false).unwrap_err();
        assert!(matches!(err, DriverError::AbsentField { .. }));
    }
}
