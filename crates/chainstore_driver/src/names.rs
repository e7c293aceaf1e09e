//! Mapping of logical names onto store identifiers.
//!
//! One database per code (`<sys_name><code>`), one collection per table,
//! indexes named by their logical symbol. The `_pk` suffix is reserved for
//! the synthesized pk-disambiguation auxiliary index and never decodes back
//! into a logical index.

use chainstore_common::types::{
    string_to_symbol, AccountName, IndexName, NameError, TableName,
};

/// Suffix of the auxiliary single-field pk index on scoped pk indexes.
pub const PK_INDEX_SUFFIX: &str = "_pk";

/// The store's built-in per-collection id index; skipped on schema scans.
pub const STORE_ID_INDEX: &str = "_id_";

/// Prefix of the store's internal collections; skipped on schema scans.
pub const STORE_SYSTEM_PREFIX: &str = "system.";

/// Database name for a code: system prefix plus the canonical code string.
/// Code 0 encodes to the empty string, so its tables live in the
/// bare-prefix database.
pub fn get_code_name(sys_name: &str, code: AccountName) -> String {
    let mut name = String::with_capacity(sys_name.len() + 13);
    name.push_str(sys_name);
    name.push_str(&code.to_string());
    name
}

/// Collection name for a table.
pub fn get_table_name(table: TableName) -> String {
    table.to_string()
}

/// Store identifier of a logical index.
pub fn get_index_name(index: IndexName) -> String {
    index.to_string()
}

/// Name of the auxiliary pk index paired with a scoped primary index.
pub fn get_pk_index_name(index: IndexName) -> String {
    let mut name = get_index_name(index);
    name.push_str(PK_INDEX_SUFFIX);
    name
}

/// Strict decode of a collection name back to a table symbol.
pub fn db_string_to_table(name: &str) -> Result<TableName, NameError> {
    string_to_symbol(name).map(TableName)
}

/// Strict decode of a physical index name back to an index symbol.
pub fn db_string_to_index(name: &str) -> Result<IndexName, NameError> {
    string_to_symbol(name).map(IndexName)
}

#[cfg(test)]
mod names_tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_code_name_concatenation() {
        let code = AccountName::from_str("alice").unwrap();
        assert_eq!(get_code_name("_CHAIN_", code), "_CHAIN_alice");
    }

    #[test]
    fn test_code_zero_lands_in_bare_prefix_db() {
        assert_eq!(get_code_name("_CHAIN_", AccountName(0)), "_CHAIN_");
    }

    #[test]
    fn test_pk_index_name() {
        let index = IndexName::from_str("primary").unwrap();
        assert_eq!(get_pk_index_name(index), "primary_pk");
    }

    #[test]
    fn test_invalid_collection_name_fails_decode() {
        assert!(db_string_to_table("system.profile").is_err());
        assert!(db_string_to_table("Bad_Name").is_err());
        assert!(db_string_to_table("accounts").is_ok());
    }
}
