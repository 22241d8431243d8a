//! Synchronous wrapper over the Arrow Flight SQL client.
//!
//! The host drives scans from its own worker threads, so every RPC blocks on
//! a shared multi-thread tokio runtime. Metadata lookups try the structured
//! Flight SQL RPCs first and fall back to `information_schema` queries once.

use std::error::Error;
use std::sync::OnceLock;
use std::time::Duration;

use arrow_array::{Array, BinaryArray, Int16Array, Int32Array, Int64Array, LargeBinaryArray,
    LargeStringArray, RecordBatch, StringArray};
use arrow_flight::decode::FlightRecordBatchStream;
use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::sql::client::{FlightSqlServiceClient, PreparedStatement};
use arrow_flight::sql::{CommandGetDbSchemas, CommandGetTables};
use arrow_flight::FlightInfo;
use arrow_schema::SchemaRef;
use futures::StreamExt;
use tokio::runtime::Runtime;
use tonic::transport::Channel;

use crate::config::ConnectionConfig;
use crate::error::DuckArrowError;
use crate::logging::{log_debug, log_warn};
use crate::tls::{self, MAX_DECODING_MESSAGE_SIZE, MAX_ENCODING_MESSAGE_SIZE};

const STATEMENT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

pub fn runtime() -> &'static Runtime {
    static RUNTIME: OnceLock<Runtime> = OnceLock::new();
    RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("duckarrow-io")
            .enable_all()
            .build()
            .expect("failed to build duckarrow I/O runtime")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub type_name: String,
    pub nullable: bool,
    pub ordinal: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

/// Owns a server-side prepared statement. Closing is best-effort with a
/// short timeout so teardown never wedges a cancelled scan.
pub struct StatementHandle {
    stmt: Option<PreparedStatement<Channel>>,
}

impl StatementHandle {
    fn new(stmt: PreparedStatement<Channel>) -> Self {
        StatementHandle { stmt: Some(stmt) }
    }

    pub fn close(&mut self) {
        if let Some(stmt) = self.stmt.take() {
            let result =
                runtime().block_on(async { tokio::time::timeout(STATEMENT_CLOSE_TIMEOUT, stmt.close()).await });
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log_warn!("STMT", "statement close failed: {}", e),
                Err(_) => log_warn!("STMT", "statement close timed out"),
            }
        }
    }
}

impl Drop for StatementHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) fn noop_statement() -> StatementHandle {
    StatementHandle { stmt: None }
}

#[cfg(test)]
pub(crate) fn reader_from_batches(
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
) -> BatchReader {
    use arrow_flight::encode::FlightDataEncoderBuilder;
    use arrow_flight::error::FlightError;

    let input = futures::stream::iter(batches.into_iter().map(Ok::<_, FlightError>));
    let encoded = FlightDataEncoderBuilder::new()
        .with_schema(schema)
        .build(input);
    BatchReader::new(FlightRecordBatchStream::new_from_flight_data(encoded))
}

/// Pull-based view of a Flight record batch stream. The wire schema arrives
/// with the first stream message, so `schema` may buffer one peeked batch.
pub struct BatchReader {
    stream: FlightRecordBatchStream,
    peeked: Option<RecordBatch>,
    schema: Option<SchemaRef>,
}

impl BatchReader {
    fn new(stream: FlightRecordBatchStream) -> Self {
        BatchReader {
            stream,
            peeked: None,
            schema: None,
        }
    }

    fn poll(&mut self) -> Result<Option<RecordBatch>, Box<dyn Error>> {
        match runtime().block_on(self.stream.next()) {
            Some(Ok(batch)) => {
                if self.schema.is_none() {
                    self.schema = Some(batch.schema());
                }
                Ok(Some(batch))
            }
            Some(Err(e)) => Err(classify_stream_error(&e)),
            None => {
                if self.schema.is_none() {
                    self.schema = self.stream.schema().cloned();
                }
                Ok(None)
            }
        }
    }

    pub fn next_batch(&mut self) -> Result<Option<RecordBatch>, Box<dyn Error>> {
        if let Some(batch) = self.peeked.take() {
            return Ok(Some(batch));
        }
        self.poll()
    }

    pub fn schema(&mut self) -> Result<SchemaRef, Box<dyn Error>> {
        if let Some(schema) = &self.schema {
            return Ok(schema.clone());
        }
        if let Some(schema) = self.stream.schema() {
            self.schema = Some(schema.clone());
            return Ok(schema.clone());
        }
        if let Some(batch) = self.poll()? {
            self.peeked = Some(batch);
        }
        if let Some(schema) = &self.schema {
            return Ok(schema.clone());
        }
        if let Some(schema) = self.stream.schema() {
            self.schema = Some(schema.clone());
            return Ok(schema.clone());
        }
        Err(DuckArrowError::remote(
            "stream did not provide a schema",
            "reader schema",
        ))
    }
}

pub struct FlightSqlClient {
    inner: Option<FlightSqlServiceClient<Channel>>,
    channel: Option<Channel>,
    uri: String,
}

impl FlightSqlClient {
    pub fn connect(config: &ConnectionConfig) -> Result<Self, Box<dyn Error>> {
        let rt = runtime();
        let channel = rt.block_on(tls::new_flight_channel(&config.uri, config.skip_verify))?;
        let service = FlightServiceClient::new(channel.clone())
            .max_encoding_message_size(MAX_ENCODING_MESSAGE_SIZE)
            .max_decoding_message_size(MAX_DECODING_MESSAGE_SIZE);
        let mut client = FlightSqlServiceClient::new_from_inner(service);
        if !config.token.is_empty() {
            client.set_token(config.token.clone());
        } else if !config.username.is_empty() || !config.password.is_empty() {
            rt.block_on(client.handshake(&config.username, &config.password))
                .map_err(|e| {
                    DuckArrowError::connect(
                        &format!("authentication failed: {}", e),
                        Some(&config.uri),
                    )
                })?;
        }
        log_debug!("CONN", "connected to {}", config.uri);
        Ok(FlightSqlClient {
            inner: Some(client),
            channel: Some(channel),
            uri: config.uri.clone(),
        })
    }

    fn client_mut(&mut self) -> Result<&mut FlightSqlServiceClient<Channel>, Box<dyn Error>> {
        self.inner
            .as_mut()
            .ok_or_else(|| DuckArrowError::connect("client is closed", Some(&self.uri)) as Box<dyn Error>)
    }

    /// Prepares and executes `sql`, returning the statement and its result
    /// stream. The caller releases the reader, then closes the statement.
    pub fn query(&mut self, sql: &str) -> Result<(StatementHandle, BatchReader), Box<dyn Error>> {
        let rt = runtime();
        let client = self.client_mut()?;
        let mut prepared = rt
            .block_on(client.prepare(sql.to_string(), None))
            .map_err(|e| DuckArrowError::statement(&e.to_string(), "prepare"))?;
        let info = match rt.block_on(prepared.execute()) {
            Ok(info) => info,
            Err(e) => {
                let err = DuckArrowError::execute(&e.to_string(), Some(sql));
                StatementHandle::new(prepared).close();
                return Err(err);
            }
        };
        let mut stmt = StatementHandle::new(prepared);
        let ticket = match info.endpoint.first().and_then(|ep| ep.ticket.clone()) {
            Some(ticket) => ticket,
            None => {
                stmt.close();
                return Err(DuckArrowError::remote("query returned no endpoints", "query"));
            }
        };
        let client = self.client_mut()?;
        let stream = match rt.block_on(client.do_get(ticket)) {
            Ok(stream) => stream,
            Err(e) => {
                let err = DuckArrowError::execute(&e.to_string(), Some(sql));
                stmt.close();
                return Err(err);
            }
        };
        Ok((stmt, BatchReader::new(stream)))
    }

    /// Runs a non-result statement and reports the affected-row count the
    /// server declared (servers that report nothing yield -1 on the wire).
    pub fn execute(&mut self, sql: &str) -> Result<i64, Box<dyn Error>> {
        let rt = runtime();
        let client = self.client_mut()?;
        rt.block_on(client.execute_update(sql.to_string(), None))
            .map_err(|e| DuckArrowError::execute(&e.to_string(), Some(sql)).into())
    }

    pub fn get_schemas(&mut self) -> Result<Vec<String>, Box<dyn Error>> {
        let rpc_err = match self.get_schemas_rpc() {
            Ok(names) => return Ok(names),
            Err(e) => e,
        };
        log_debug!("META", "GetDbSchemas RPC failed, trying information_schema: {}", rpc_err);
        match self.get_schemas_sql() {
            Ok(names) => Ok(names),
            Err(sql_err) => Err(DuckArrowError::remote(
                &format!(
                    "metadata RPC failed: {}; information_schema fallback failed: {}",
                    rpc_err, sql_err
                ),
                "get_schemas",
            )),
        }
    }

    pub fn get_tables(&mut self, schema: Option<&str>) -> Result<Vec<TableRef>, Box<dyn Error>> {
        let rpc_err = match self.get_tables_rpc(schema) {
            Ok(tables) => return Ok(tables),
            Err(e) => e,
        };
        log_debug!("META", "GetTables RPC failed, trying information_schema: {}", rpc_err);
        match self.get_tables_sql(schema) {
            Ok(tables) => Ok(tables),
            Err(sql_err) => Err(DuckArrowError::remote(
                &format!(
                    "metadata RPC failed: {}; information_schema fallback failed: {}",
                    rpc_err, sql_err
                ),
                "get_tables",
            )),
        }
    }

    pub fn get_columns(
        &mut self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<ColumnDescriptor>, Box<dyn Error>> {
        let rpc_err = match self.get_columns_rpc(schema, table) {
            Ok(columns) => return Ok(columns),
            Err(e) => e,
        };
        log_debug!("META", "GetTables(include_schema) failed, trying information_schema: {}", rpc_err);
        match self.get_columns_sql(schema, table) {
            Ok(columns) => Ok(columns),
            Err(sql_err) => Err(DuckArrowError::remote(
                &format!(
                    "metadata RPC failed: {}; information_schema fallback failed: {}",
                    rpc_err, sql_err
                ),
                "get_columns",
            )),
        }
    }

    /// Handle liveness only; no round-trip.
    pub fn is_healthy(&self) -> bool {
        self.inner.is_some() && self.channel.is_some()
    }

    /// Drops session then transport. Idempotent once both handles are gone;
    /// the gRPC channel tears down its streams on drop.
    pub fn close(&mut self) -> Result<(), Box<dyn Error>> {
        self.inner = None;
        self.channel = None;
        Ok(())
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn fetch_info_batches(
        &mut self,
        info: FlightInfo,
        context: &str,
    ) -> Result<Vec<RecordBatch>, Box<dyn Error>> {
        let ticket = info
            .endpoint
            .first()
            .and_then(|ep| ep.ticket.clone())
            .ok_or_else(|| DuckArrowError::remote("no endpoints returned", context))?;
        let rt = runtime();
        let client = self.client_mut()?;
        let stream = rt
            .block_on(client.do_get(ticket))
            .map_err(|e| DuckArrowError::remote(&e.to_string(), context))?;
        let mut reader = BatchReader::new(stream);
        let mut batches = Vec::new();
        while let Some(batch) = reader.next_batch()? {
            batches.push(batch);
        }
        Ok(batches)
    }

    fn get_schemas_rpc(&mut self) -> Result<Vec<String>, Box<dyn Error>> {
        let rt = runtime();
        let info = {
            let client = self.client_mut()?;
            rt.block_on(client.get_db_schemas(CommandGetDbSchemas {
                catalog: None,
                db_schema_filter_pattern: None,
            }))
            .map_err(|e| DuckArrowError::remote(&e.to_string(), "GetDbSchemas"))?
        };
        let batches = self.fetch_info_batches(info, "GetDbSchemas")?;
        let mut names = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                if let Some(name) = string_value(batch, "db_schema_name", row) {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    fn get_schemas_sql(&mut self) -> Result<Vec<String>, Box<dyn Error>> {
        let (_, batches) =
            self.query_all("SELECT schema_name FROM information_schema.schemata ORDER BY schema_name")?;
        let mut names = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                if let Some(name) =
                    string_value(batch, "schema_name", row).or_else(|| string_value_at(batch, 0, row))
                {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    fn get_tables_rpc(&mut self, schema: Option<&str>) -> Result<Vec<TableRef>, Box<dyn Error>> {
        let rt = runtime();
        let info = {
            let client = self.client_mut()?;
            rt.block_on(client.get_tables(CommandGetTables {
                catalog: None,
                db_schema_filter_pattern: schema.map(|s| s.to_string()),
                table_name_filter_pattern: None,
                table_types: Vec::new(),
                include_schema: false,
            }))
            .map_err(|e| DuckArrowError::remote(&e.to_string(), "GetTables"))?
        };
        let batches = self.fetch_info_batches(info, "GetTables")?;
        let mut tables = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                let name = match string_value(batch, "table_name", row) {
                    Some(name) => name,
                    None => continue,
                };
                let schema = string_value(batch, "db_schema_name", row).unwrap_or_default();
                tables.push(TableRef { schema, name });
            }
        }
        Ok(tables)
    }

    fn get_tables_sql(&mut self, schema: Option<&str>) -> Result<Vec<TableRef>, Box<dyn Error>> {
        let sql = match schema {
            Some(schema) => format!(
                "SELECT table_schema, table_name FROM information_schema.tables WHERE table_schema = '{}' ORDER BY table_name",
                escape_literal(schema)
            ),
            None => "SELECT table_schema, table_name FROM information_schema.tables ORDER BY table_schema, table_name".to_string(),
        };
        let (_, batches) = self.query_all(&sql)?;
        let mut tables = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                let name = match string_value(batch, "table_name", row)
                    .or_else(|| string_value_at(batch, 1, row))
                {
                    Some(name) => name,
                    None => continue,
                };
                let schema = string_value(batch, "table_schema", row)
                    .or_else(|| string_value_at(batch, 0, row))
                    .unwrap_or_default();
                tables.push(TableRef { schema, name });
            }
        }
        Ok(tables)
    }

    fn get_columns_rpc(
        &mut self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<ColumnDescriptor>, Box<dyn Error>> {
        let rt = runtime();
        let info = {
            let client = self.client_mut()?;
            rt.block_on(client.get_tables(CommandGetTables {
                catalog: None,
                db_schema_filter_pattern: schema.map(|s| s.to_string()),
                table_name_filter_pattern: Some(table.to_string()),
                table_types: Vec::new(),
                include_schema: true,
            }))
            .map_err(|e| DuckArrowError::remote(&e.to_string(), "GetTables"))?
        };
        let batches = self.fetch_info_batches(info, "GetTables")?;
        for batch in &batches {
            for row in 0..batch.num_rows() {
                match string_value(batch, "table_name", row) {
                    Some(name) if name == table => {}
                    _ => continue,
                }
                let bytes = match binary_value(batch, "table_schema", row) {
                    Some(bytes) => bytes,
                    None => continue,
                };
                let schema = arrow_ipc::convert::try_schema_from_ipc_buffer(&bytes)
                    .map_err(|e| DuckArrowError::remote(&e.to_string(), "table_schema decode"))?;
                let columns = schema
                    .fields()
                    .iter()
                    .enumerate()
                    .map(|(ordinal, field)| ColumnDescriptor {
                        name: field.name().clone(),
                        type_name: field.data_type().to_string(),
                        nullable: field.is_nullable(),
                        ordinal,
                    })
                    .collect();
                return Ok(columns);
            }
        }
        Ok(Vec::new())
    }

    fn get_columns_sql(
        &mut self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<ColumnDescriptor>, Box<dyn Error>> {
        let sql = match schema {
            Some(schema) => format!(
                "SELECT column_name, data_type, is_nullable, ordinal_position FROM information_schema.columns WHERE table_name = '{}' AND table_schema = '{}' ORDER BY ordinal_position",
                escape_literal(table),
                escape_literal(schema)
            ),
            None => format!(
                "SELECT column_name, data_type, is_nullable, ordinal_position FROM information_schema.columns WHERE table_name = '{}' ORDER BY ordinal_position",
                escape_literal(table)
            ),
        };
        let (_, batches) = self.query_all(&sql)?;
        let mut columns = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                let name = match string_value(batch, "column_name", row) {
                    Some(name) => name,
                    None => continue,
                };
                let type_name = string_value(batch, "data_type", row).unwrap_or_default();
                let nullable = tri_state_nullable(batch, "is_nullable", row);
                let ordinal = int_value(batch, "ordinal_position", row)
                    .map(|v| (v.max(1) - 1) as usize)
                    .unwrap_or(columns.len());
                columns.push(ColumnDescriptor {
                    name,
                    type_name,
                    nullable,
                    ordinal,
                });
            }
        }
        Ok(columns)
    }

    fn query_all(&mut self, sql: &str) -> Result<(SchemaRef, Vec<RecordBatch>), Box<dyn Error>> {
        let (mut stmt, mut reader) = self.query(sql)?;
        let result = (|| {
            let schema = reader.schema()?;
            let mut batches = Vec::new();
            while let Some(batch) = reader.next_batch()? {
                batches.push(batch);
            }
            Ok((schema, batches))
        })();
        drop(reader);
        stmt.close();
        result
    }

    #[cfg(test)]
    pub(crate) fn stub() -> Self {
        static RUNTIME: std::sync::OnceLock<tokio::runtime::Runtime> = std::sync::OnceLock::new();
        let rt = RUNTIME.get_or_init(|| tokio::runtime::Runtime::new().expect("test runtime"));
        let _guard = rt.enter();
        let channel = tonic::transport::Endpoint::from_static("http://127.0.0.1:1").connect_lazy();
        let service = FlightServiceClient::new(channel.clone());
        FlightSqlClient {
            inner: Some(FlightSqlServiceClient::new_from_inner(service)),
            channel: Some(channel),
            uri: "grpc://stub:0".to_string(),
        }
    }
}

/// A broken channel (keepalive timeout, dead peer) is fatal to the scan;
/// the pool evicts the entry on its next health check.
fn classify_stream_error(error: &arrow_flight::error::FlightError) -> Box<dyn Error> {
    match error {
        arrow_flight::error::FlightError::Tonic(status) => {
            DuckArrowError::transport(&status.to_string())
        }
        other => DuckArrowError::remote(&other.to_string(), "reader advance"),
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Field-name navigation tolerant of absent optional columns; metadata
/// results differ across servers.
fn string_value(batch: &RecordBatch, name: &str, row: usize) -> Option<String> {
    let idx = batch.schema().index_of(name).ok()?;
    string_value_at(batch, idx, row)
}

fn string_value_at(batch: &RecordBatch, idx: usize, row: usize) -> Option<String> {
    if idx >= batch.num_columns() {
        return None;
    }
    let column = batch.column(idx);
    if column.is_null(row) {
        return None;
    }
    if let Some(arr) = column.as_any().downcast_ref::<StringArray>() {
        return Some(arr.value(row).to_string());
    }
    if let Some(arr) = column.as_any().downcast_ref::<LargeStringArray>() {
        return Some(arr.value(row).to_string());
    }
    None
}

fn binary_value(batch: &RecordBatch, name: &str, row: usize) -> Option<Vec<u8>> {
    let idx = batch.schema().index_of(name).ok()?;
    let column = batch.column(idx);
    if column.is_null(row) {
        return None;
    }
    if let Some(arr) = column.as_any().downcast_ref::<BinaryArray>() {
        return Some(arr.value(row).to_vec());
    }
    if let Some(arr) = column.as_any().downcast_ref::<LargeBinaryArray>() {
        return Some(arr.value(row).to_vec());
    }
    None
}

fn int_value(batch: &RecordBatch, name: &str, row: usize) -> Option<i64> {
    let idx = batch.schema().index_of(name).ok()?;
    let column = batch.column(idx);
    if column.is_null(row) {
        return None;
    }
    if let Some(arr) = column.as_any().downcast_ref::<Int64Array>() {
        return Some(arr.value(row));
    }
    if let Some(arr) = column.as_any().downcast_ref::<Int32Array>() {
        return Some(arr.value(row) as i64);
    }
    if let Some(arr) = column.as_any().downcast_ref::<Int16Array>() {
        return Some(arr.value(row) as i64);
    }
    None
}

/// `1`/`YES` nullable, `0`/`NO` not, `2` or absent unknown (nullable).
fn tri_state_nullable(batch: &RecordBatch, name: &str, row: usize) -> bool {
    if let Some(v) = int_value(batch, name, row) {
        return v != 0;
    }
    match string_value(batch, name, row).as_deref() {
        Some("NO") | Some("no") | Some("0") => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Int32Array, StringArray};
    use arrow_schema::{DataType, Field, Schema};
    use std::sync::Arc;

    fn metadata_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("column_name", DataType::Utf8, false),
            Field::new("data_type", DataType::Utf8, true),
            Field::new("is_nullable", DataType::Utf8, true),
            Field::new("ordinal_position", DataType::Int32, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["id", "name"])),
                Arc::new(StringArray::from(vec!["INTEGER", "VARCHAR"])),
                Arc::new(StringArray::from(vec![Some("NO"), None])),
                Arc::new(Int32Array::from(vec![1, 2])),
            ],
        )
        .expect("valid test batch")
    }

    #[test]
    fn test_string_value_by_field_name() {
        let batch = metadata_batch();
        assert_eq!(string_value(&batch, "column_name", 0).as_deref(), Some("id"));
        assert_eq!(string_value(&batch, "column_name", 1).as_deref(), Some("name"));
        assert_eq!(string_value(&batch, "missing_field", 0), None);
    }

    #[test]
    fn test_tri_state_nullable() {
        let batch = metadata_batch();
        assert!(!tri_state_nullable(&batch, "is_nullable", 0));
        // Null value means unknown, treated as nullable.
        assert!(tri_state_nullable(&batch, "is_nullable", 1));
        // Absent field means unknown, treated as nullable.
        assert!(tri_state_nullable(&batch, "no_such_field", 0));
    }

    #[test]
    fn test_int_value_widths() {
        let batch = metadata_batch();
        assert_eq!(int_value(&batch, "ordinal_position", 0), Some(1));
        assert_eq!(int_value(&batch, "ordinal_position", 1), Some(2));
        assert_eq!(int_value(&batch, "column_name", 0), None);
    }

    #[test]
    fn test_stub_health_and_close_idempotence() {
        let mut client = FlightSqlClient::stub();
        assert!(client.is_healthy());
        client.close().expect("close never fails");
        assert!(!client.is_healthy());
        client.close().expect("close is idempotent");
        assert!(!client.is_healthy());
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("it's"), "it''s");
        assert_eq!(escape_literal("plain"), "plain");
    }
}
