//! Error taxonomy for a reconciliation run.
//!
//! Fetch and resolution errors are fatal to the operation that hit them and
//! surface verbatim in the report. Per-record connect failures and verify
//! mismatches are accumulated as report messages instead, so they never show
//! up here.

use thiserror::Error;

/// The inventory source could not be queried. Fatal to the current
/// operation; there is no partial result and no automatic retry.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Error connecting to inventory source at {url}: {cause}")]
    Unreachable { url: String, cause: String },

    #[error("Inventory source rejected query {query}: {cause}")]
    QueryRejected { query: String, cause: String },

    #[error("Unexpected response from {url}: {cause}")]
    BadResponse { url: String, cause: String },
}

/// Configuration or data inconsistencies found while deriving a record's
/// target state. Any of these aborts a build as a whole, before any mutation.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Device-type '{type_model}' on record '{record}' has no configured driver")]
    UnmappedType { record: String, type_model: String },

    #[error("VM role '{role}' on record '{record}' has no configured driver")]
    UnmappedRole { record: String, role: String },

    #[error("Driver '{driver_id}' exposes neither a cli nor a generic connection descriptor")]
    UnresolvableDriverFamily { driver_id: String },

    #[error("Record '{record}' reports unknown lifecycle status '{status}'")]
    UnknownStatus { record: String, status: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Failures talking to the managed registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry request to {url} failed: {cause}")]
    Transport { url: String, cause: String },

    #[error("Registry returned {status} for {url}: {body}")]
    Rejected {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Registry transaction failed: {0}")]
    Transaction(String),
}
