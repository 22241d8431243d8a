//! Scalar functions: `remote_configure`, `remote_version`, `remote_execute`.
//!
//! NULL arguments never reach these bodies; the host's default scalar null
//! handling yields NULL outputs without invoking the function, which is
//! exactly the contract for a NULL URI or NULL SQL text.

use std::error::Error;

use duckdb::core::{DataChunkHandle, Inserter, LogicalTypeId};
use duckdb::vscalar::{ScalarFunctionSignature, VScalar};
use duckdb::vtab::arrow::WritableVector;

use crate::config::{resolve_credentials, set_global_config, ConnectionConfig};
use crate::error::DuckArrowError;
use crate::logging::log_debug;
use crate::pool::global_pool;
use crate::validate::validate_uri;

const CONFIGURE_OK: &str = "duckarrow configuration updated";

const VERSION: &str = match option_env!("DUCKARROW_VERSION") {
    Some(version) => version,
    None => "dev",
};

pub const MAX_EXECUTE_SQL_LEN: usize = 1024 * 1024;

fn read_varchar(slice: &[libduckdb_sys::duckdb_string_t], row: usize) -> String {
    let mut binding = slice[row];
    duckdb::types::DuckString::new(&mut binding).as_str().to_string()
}

/// `remote_configure(uri, user, pass [, skip_verify])` replaces the
/// process-wide config snapshot. Empty user/pass consult the environment.
pub struct ConfigureScalar;

impl VScalar for ConfigureScalar {
    type State = ();

    fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        if input.len() == 0 {
            return Err("No input provided".into());
        }

        let uri_vector = input.flat_vector(0);
        let user_vector = input.flat_vector(1);
        let pass_vector = input.flat_vector(2);
        let uri_slice =
            unsafe { uri_vector.as_slice_with_len::<libduckdb_sys::duckdb_string_t>(input.len()) };
        let user_slice = unsafe {
            user_vector.as_slice_with_len::<libduckdb_sys::duckdb_string_t>(input.len())
        };
        let pass_slice = unsafe {
            pass_vector.as_slice_with_len::<libduckdb_sys::duckdb_string_t>(input.len())
        };
        let has_skip = input.num_columns() > 3;

        let out = output.flat_vector();
        for row in 0..input.len() {
            let uri = read_varchar(uri_slice, row);
            validate_uri(&uri).map_err(|e| format!("remote_configure: {}", e))?;
            let skip_verify = if has_skip {
                let skip_vector = input.flat_vector(3);
                (unsafe { skip_vector.as_slice_with_len::<bool>(input.len()) })[row]
            } else {
                false
            };
            let (username, password) =
                resolve_credentials(&read_varchar(user_slice, row), &read_varchar(pass_slice, row));
            set_global_config(ConnectionConfig::new(&uri, &username, &password, skip_verify));
            log_debug!("CONFIG", "configuration updated for {}", uri);
            out.insert(row, CONFIGURE_OK);
        }
        Ok(())
    }

    fn signatures() -> Vec<ScalarFunctionSignature> {
        vec![
            ScalarFunctionSignature::exact(
                vec![
                    LogicalTypeId::Varchar.into(),
                    LogicalTypeId::Varchar.into(),
                    LogicalTypeId::Varchar.into(),
                ],
                LogicalTypeId::Varchar.into(),
            ),
            ScalarFunctionSignature::exact(
                vec![
                    LogicalTypeId::Varchar.into(),
                    LogicalTypeId::Varchar.into(),
                    LogicalTypeId::Varchar.into(),
                    LogicalTypeId::Boolean.into(),
                ],
                LogicalTypeId::Varchar.into(),
            ),
        ]
    }
}

/// `remote_version()` returns the build-time embedded version string.
pub struct VersionScalar;

impl VScalar for VersionScalar {
    type State = ();

    fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        let out = output.flat_vector();
        for row in 0..input.len() {
            out.insert(row, VERSION);
        }
        Ok(())
    }

    fn signatures() -> Vec<ScalarFunctionSignature> {
        vec![ScalarFunctionSignature::exact(
            vec![],
            LogicalTypeId::Varchar.into(),
        )]
    }
}

/// `remote_execute(sql)` passes DDL/DML through to the remote on a pooled
/// connection and returns the reported affected-row count.
pub struct ExecuteScalar;

impl VScalar for ExecuteScalar {
    type State = ();

    fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        if input.len() == 0 {
            return Err("No input provided".into());
        }

        let sql_vector = input.flat_vector(0);
        let sql_slice =
            unsafe { sql_vector.as_slice_with_len::<libduckdb_sys::duckdb_string_t>(input.len()) };

        let mut out = output.flat_vector();
        for row in 0..input.len() {
            let sql = read_varchar(sql_slice, row);
            validate_execute_sql(&sql).map_err(|e| format!("remote_execute: {}", e))?;
            let config = crate::config::get_global_config()
                .ok_or("remote_execute: no connection configured; call remote_configure first")?;
            let conn = global_pool()
                .get(&config)
                .map_err(|e| format!("remote_execute: {}", e))?;
            let result = {
                let mut client = conn
                    .client()
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                client.execute(&sql)
            };
            conn.release(global_pool());
            let affected = result.map_err(|e| format!("remote_execute: {}", e))?;
            let slice = unsafe { out.as_mut_slice::<i64>() };
            slice[row] = affected;
        }
        Ok(())
    }

    fn signatures() -> Vec<ScalarFunctionSignature> {
        vec![ScalarFunctionSignature::exact(
            vec![LogicalTypeId::Varchar.into()],
            LogicalTypeId::Bigint.into(),
        )]
    }
}

fn validate_execute_sql(sql: &str) -> Result<(), Box<dyn Error>> {
    if sql.trim().is_empty() {
        return Err(DuckArrowError::invalid_parameter(
            "SQL cannot be empty",
            "sql",
        ));
    }
    if sql.len() > MAX_EXECUTE_SQL_LEN {
        return Err(DuckArrowError::invalid_parameter(
            "SQL too long (max 1 MiB)",
            "sql",
        ));
    }
    if sql.contains('\0') {
        return Err(DuckArrowError::invalid_parameter(
            "SQL contains a NUL byte",
            "sql",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string_defaults_to_dev() {
        // Built without DUCKARROW_VERSION in the environment.
        assert_eq!(VERSION, "dev");
    }

    #[test]
    fn test_execute_sql_validation() {
        assert!(validate_execute_sql("DROP TABLE \"t\"").is_ok());
        assert!(validate_execute_sql("").is_err());
        assert!(validate_execute_sql("   ").is_err());
        assert!(validate_execute_sql("bad\0sql").is_err());
    }

    #[test]
    fn test_execute_sql_length_boundary() {
        let exactly = "x".repeat(MAX_EXECUTE_SQL_LEN);
        assert!(validate_execute_sql(&exactly).is_ok());
        let over = "x".repeat(MAX_EXECUTE_SQL_LEN + 1);
        let result = validate_execute_sql(&over);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("too long"));
    }
}
