//! Translation of logical cursor positions into hint-scoped range queries.
//!
//! A query is an empty filter pinned to the logical index plus a sort
//! specification and one half-open bound: `min` when scanning forward,
//! `max` when scanning backward. The bound row itself is included going
//! forward and excluded going backward, which is the asymmetry the
//! `upper_bound` dance is built on.

use chainstore_common::error::{DriverError, DriverResult};
use chainstore_common::schema::{IndexInfo, OrderDef};
use chainstore_common::types::PrimaryKey;
use chainstore_common::value::{Document, Value};

use crate::bigint;
use crate::object::{append_pk_value, append_scope_value, SCOPE_PATH};

/// Scan direction. The numeric form multiplies into sort orders and picks
/// the boundary sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn sign(self) -> i32 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

/// Physical field name of an ordered field: big-int fields are addressed
/// through their binary sub-field.
pub fn order_field(order: &OrderDef) -> String {
    if bigint::is_bigint_type(&order.type_name) {
        format!("{}.{}", order.field, bigint::BINARY_FIELD)
    } else {
        order.field.clone()
    }
}

fn field_order(direction: Direction, order: &OrderDef) -> i32 {
    direction.sign() * order.order.sign()
}

/// Boundary sentinel: "before all" for a positive order, "past all" for a
/// negative one.
fn bound_sentinel(order: i32) -> Value {
    if order > 0 {
        Value::MinKey
    } else {
        Value::MaxKey
    }
}

/// Extract the value of one ordered field from a row object, following the
/// order's path through nested objects.
pub fn get_order_value(
    row: &Document,
    index: &IndexInfo,
    order: &OrderDef,
) -> DriverResult<Value> {
    let absent = || DriverError::AbsentField {
        table: index.table_name(),
        field: order.field.clone(),
    };
    let mut position = row;
    let mut parts = order.path.iter().peekable();
    while let Some(key) = parts.next() {
        let value = position.get(key).ok_or_else(absent)?;
        if parts.peek().is_none() {
            return Ok(value.clone());
        }
        position = value.as_object().ok_or_else(absent)?;
    }
    Err(absent())
}

/// Sort specification for an index scan in the given direction.
pub fn sort_spec(index: &IndexInfo, direction: Direction) -> Vec<(String, i32)> {
    let mut sort = Vec::with_capacity(index.index.orders.len() + 2);
    if !index.is_noscope() {
        sort.push((SCOPE_PATH.to_string(), direction.sign()));
    }
    for order in &index.index.orders {
        sort.push((order_field(order), field_order(direction, order)));
    }
    if !index.index.unique {
        sort.push((index.pk_order().field.clone(), direction.sign()));
    }
    sort
}

/// Half-open bound for an index scan: equality on the find key's ordered
/// fields where present, boundary sentinels elsewhere, with the pk
/// tie-breaker pinned on non-unique indexes when a find pk is known.
pub fn bound_document(
    index: &IndexInfo,
    direction: Direction,
    find_key: &Value,
    find_pk: PrimaryKey,
) -> DriverResult<Document> {
    let mut bound = Document::new();

    let find_object = match find_key {
        Value::Object(doc) if !doc.is_empty() => Some(doc),
        _ => None,
    };

    if !index.is_noscope() {
        append_scope_value(&mut bound, index.scope());
    }

    for order in &index.index.orders {
        let field = order_field(order);
        match find_object {
            Some(row) => {
                let value = get_order_value(row, index, order)?;
                let value = if bigint::is_bigint_type(&order.type_name) {
                    bigint::to_bound_bytes(&order.type_name, &value)
                } else {
                    value
                };
                bound.insert(field, value);
            }
            None => {
                bound.insert(field, bound_sentinel(field_order(direction, order)));
            }
        }
    }

    if !index.index.unique {
        if find_pk.is_good() {
            append_pk_value(&mut bound, index.pk_order(), find_pk);
        } else {
            bound.insert(index.pk_order().field.clone(), bound_sentinel(direction.sign()));
        }
    }

    Ok(bound)
}

#[cfg(test)]
mod bounds_tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::Arc;

    use chainstore_common::schema::{IndexDef, SortKind, TableDef, TableInfo};
    use chainstore_common::types::{AccountName, IndexName, TableName};

    fn order(field: &str, kind: SortKind) -> OrderDef {
        OrderDef {
            field: field.to_string(),
            path: vec![field.to_string()],
            type_name: String::new(),
            order: kind,
        }
    }

    fn index_info(unique: bool, orders: Vec<OrderDef>) -> IndexInfo {
        let primary = IndexDef {
            name: IndexName::from_str("primary").unwrap(),
            unique: true,
            orders: vec![order("id", SortKind::Asc)],
            ignore_scope: false,
        };
        let secondary = IndexDef {
            name: IndexName::from_str("byvalue").unwrap(),
            unique,
            orders,
            ignore_scope: false,
        };
        let table = Arc::new(TableDef {
            name: TableName::from_str("accounts").unwrap(),
            indexes: vec![primary, secondary.clone()],
            noscope: false,
            row_count: 0,
        });
        let info = TableInfo::new(
            AccountName::from_str("code").unwrap(),
            AccountName::from_str("alice").unwrap(),
            table,
        );
        IndexInfo::new(info, Arc::new(secondary))
    }

    #[test]
    fn test_sort_includes_scope_and_pk_tiebreak() {
        let index = index_info(false, vec![order("v", SortKind::Asc)]);
        let sort = sort_spec(&index, Direction::Forward);
        assert_eq!(
            sort,
            vec![
                (SCOPE_PATH.to_string(), 1),
                ("v".to_string(), 1),
                ("id".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_backward_flips_every_component() {
        let index = index_info(false, vec![order("v", SortKind::Desc)]);
        let sort = sort_spec(&index, Direction::Backward);
        assert_eq!(
            sort,
            vec![
                (SCOPE_PATH.to_string(), -1),
                ("v".to_string(), 1),
                ("id".to_string(), -1),
            ]
        );
    }

    #[test]
    fn test_empty_key_yields_sentinels() {
        let index = index_info(false, vec![order("v", SortKind::Asc)]);
        let bound =
            bound_document(&index, Direction::Forward, &Value::Null, PrimaryKey::UNSET)
                .unwrap();
        assert_eq!(bound.get("v"), Some(&Value::MinKey));
        assert_eq!(bound.get("id"), Some(&Value::MinKey));
        assert_eq!(
            bound.get(SCOPE_PATH),
            Some(&Value::Str("alice".to_string()))
        );
    }

    #[test]
    fn test_key_fields_pin_equality() {
        let index = index_info(false, vec![order("v", SortKind::Asc)]);
        let key: Value = serde_json::json!({"v": 10}).into();
        let bound =
            bound_document(&index, Direction::Backward, &key, PrimaryKey(7)).unwrap();
        assert_eq!(bound.get("v"), Some(&Value::Uint(10)));
        assert_eq!(bound.get("id"), Some(&Value::Uint(7)));
    }

    #[test]
    fn test_missing_ordered_field_is_absent_field() {
        let index = index_info(false, vec![order("v", SortKind::Asc)]);
        let key: Value = serde_json::json!({"other": 1}).into();
        let err = bound_document(&index, Direction::Forward, &key, PrimaryKey::UNSET)
            .unwrap_err();
        assert!(matches!(err, DriverError::AbsentField { .. }));
    }

    #[test]
    fn test_bigint_field_addresses_binary_subfield() {
        let mut big = order("v", SortKind::Asc);
        big.type_name = "uint128".to_string();
        let index = index_info(false, vec![big]);
        let sort = sort_spec(&index, Direction::Forward);
        assert_eq!(sort[1].0, "v.binary");

        let mut key_doc = Document::new();
        key_doc.insert("v", Value::Uint128(1 << 70));
        let bound = bound_document(
            &index,
            Direction::Forward,
            &Value::Object(key_doc),
            PrimaryKey::UNSET,
        )
        .unwrap();
        assert!(matches!(bound.get("v.binary"), Some(Value::Binary(_))));
    }
}
