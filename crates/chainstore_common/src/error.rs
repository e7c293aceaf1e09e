//! Error taxonomy for the driver and the store session beneath it.
//!
//! `StoreError` is what the external store surfaces: a raw numeric code plus
//! a message. Only a handful of codes are meaningful to the driver;
//! everything else is `Unknown`. `DriverError` is the caller-facing surface:
//! one variant per failure class.

use thiserror::Error;

use crate::types::{AccountName, CursorId, PrimaryKey, Revision, TableName};

/// Convenience alias for `Result<T, DriverError>`.
pub type DriverResult<T> = Result<T, DriverError>;

/// Store error classes the driver reacts to. Raw values follow the store's
/// wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    Unknown,
    EmptyBulk,
    DuplicateValue,
    NoServer,
}

impl StoreErrorCode {
    pub fn from_raw(raw: i32) -> StoreErrorCode {
        match raw {
            22 => StoreErrorCode::EmptyBulk,
            11000 => StoreErrorCode::DuplicateValue,
            13053 => StoreErrorCode::NoServer,
            _ => StoreErrorCode::Unknown,
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            StoreErrorCode::Unknown => -1,
            StoreErrorCode::EmptyBulk => 22,
            StoreErrorCode::DuplicateValue => 11000,
            StoreErrorCode::NoServer => 13053,
        }
    }
}

/// An error surfaced by the external store session.
#[derive(Error, Debug, Clone)]
#[error("store error {raw}: {message}")]
pub struct StoreError {
    pub raw: i32,
    pub message: String,
}

impl StoreError {
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self { raw: code.raw(), message: message.into() }
    }

    pub fn code(&self) -> StoreErrorCode {
        StoreErrorCode::from_raw(self.raw)
    }

    /// Transient connectivity loss: the only class the reconnect supervisor
    /// retries.
    pub fn is_no_server(&self) -> bool {
        self.code() == StoreErrorCode::NoServer
    }

    pub fn is_duplicate(&self) -> bool {
        self.code() == StoreErrorCode::DuplicateValue
    }
}

/// Caller-facing driver errors.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Connectivity exhaustion, unexpected store errors, bad bulk results.
    #[error("driver error: {0}")]
    Open(String),

    /// `drop_db` refused while cursors are live.
    #[error("cannot drop databases: opened cursors exist")]
    OpenedCursors,

    /// Lookup of an unknown cursor id.
    #[error("the cursor {code}.{id} doesn't exist")]
    InvalidCursor { code: AccountName, id: CursorId },

    /// Duplicate key reported by a bulk write; raised after all groups ran.
    #[error("duplicate key on write: {0}")]
    Duplicate(String),

    /// A row is missing a field required by an ordered index path.
    #[error("can't find the field {field} in a row of the table {table}")]
    AbsentField { table: TableName, field: String },

    /// Unknown operation kind handed to the write context.
    #[error(
        "wrong operation type on writing into the table {table}:{scope} \
         with the revision (find: {find_revision}, set: {set_revision}) \
         and with the primary key {pk}"
    )]
    Write {
        table: TableName,
        scope: AccountName,
        find_revision: Revision,
        set_revision: Revision,
        pk: PrimaryKey,
    },
}

impl DriverError {
    pub fn open(message: impl Into<String>) -> Self {
        DriverError::Open(message.into())
    }
}

impl From<StoreError> for DriverError {
    fn from(err: StoreError) -> Self {
        DriverError::Open(format!("store error: {}, {}", err.raw, err.message))
    }
}
