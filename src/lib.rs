extern crate duckdb;
extern crate duckdb_loadable_macros;
extern crate libduckdb_sys;

mod logging;

mod catalog;
mod client;
mod config;
mod convert;
mod error;
mod functions;
mod pool;
mod query;
mod replacement;
mod scan;
mod tls;
mod validate;

pub use catalog::{
    attached_catalog, catalog_for_uri, config_for_uri, register_catalog, unregister_catalog,
    AttachVTab, CatalogColumn, DetachScalar, OnNotFound, RemoteCatalog, ScanBinding, SchemaEntry,
    TableEntry, TransactionManager,
};
pub use client::{BatchReader, ColumnDescriptor, FlightSqlClient, StatementHandle, TableRef};
pub use config::{
    get_global_config, resolve_credentials, set_global_config, ConnectionConfig, ENV_PASSWORD,
    ENV_USERNAME,
};
pub use convert::{
    logical_type_for_arrow, map_type_string, sql_type_name, write_column, HostType,
    HOST_CHUNK_MAX, MAX_DECIMAL_WIDTH,
};
pub use error::DuckArrowError;
pub use functions::{ConfigureScalar, ExecuteScalar, VersionScalar};
pub use pool::{global_pool, pool_key, ConnectionPool, ConnectionResult, PoolKey};
pub use query::{build_projected_query, build_schema_probe, build_select_all, escape_identifier};
pub use replacement::{
    applies_to_schema, rewrite_table_reference, rewrite_with_config, ReplacementScan,
    VIRTUAL_SCHEMA,
};
pub use scan::{BoundScan, RemoteQueryVTab, RemoteTableVTab, ScanPhase, ScanSlice, ScanStream,
    ScanTarget};
pub use validate::{is_skipped_table, uri_is_tls, validate_table_name, validate_uri};

use duckdb::{Connection, Result};
use duckdb_loadable_macros::duckdb_entrypoint_c_api;
use std::error::Error;
use std::sync::{Mutex, OnceLock};

// The entrypoint's connection is the only host handle a loadable
// extension ever sees; attach/detach DDL must run through a clone of it.
static HOST_CONNECTION: OnceLock<Mutex<Connection>> = OnceLock::new();

/// Runs host-side DDL (schema/view maintenance for attach and detach)
/// through the connection captured at load time.
pub(crate) fn execute_ddl_batch(statements: &[String]) -> Result<(), Box<dyn Error>> {
    let connection = HOST_CONNECTION
        .get()
        .ok_or("extension is not loaded")?
        .lock()
        .map_err(|_| "host connection lock poisoned")?;
    for sql in statements {
        connection.execute_batch(sql)?;
    }
    Ok(())
}

#[duckdb_entrypoint_c_api(ext_name = "duckarrow", min_duckdb_version = "v1.3.2")]
pub unsafe fn extension_entrypoint(con: Connection) -> Result<(), Box<dyn Error>> {
    let cloned = con
        .try_clone()
        .map_err(|e| format!("failed to capture host connection: {}", e))?;
    if HOST_CONNECTION.set(Mutex::new(cloned)).is_err() {
        return Err("extension loaded twice into one process".into());
    }

    con.register_scalar_function::<ConfigureScalar>("remote_configure")?;
    con.register_scalar_function::<VersionScalar>("remote_version")?;
    con.register_scalar_function::<ExecuteScalar>("remote_execute")?;
    con.register_scalar_function::<DetachScalar>("duckarrow_detach")?;

    con.register_table_function::<RemoteQueryVTab>("remote_query")?;
    con.register_table_function::<RemoteTableVTab>("duckarrow_scan")?;
    con.register_table_function::<AttachVTab>("duckarrow_attach")?;

    Ok(())
}
