//! Table-scan lifecycle: bind captures the remote schema through a
//! metadata-only probe, init pushes the projection into the remote SELECT,
//! func streams record batches into host chunks, and teardown returns the
//! connection to the pool. A scan owns exactly one connection for its
//! lifetime and is driven by a single host worker.

use std::error::Error;
use std::sync::Mutex;

use arrow_array::RecordBatch;
use arrow_schema::{FieldRef, SchemaRef};
use duckdb::core::{DataChunkHandle, LogicalTypeHandle, LogicalTypeId};
use duckdb::vtab::{BindInfo, InitInfo, TableFunctionInfo, VTab};

use crate::catalog::{catalog_for_uri, config_for_uri, OnNotFound};
use crate::client::{BatchReader, ColumnDescriptor, StatementHandle};
use crate::config::ConnectionConfig;
use crate::convert::{logical_type_for_arrow, sql_type_name, write_column, HOST_CHUNK_MAX};
use crate::error::DuckArrowError;
use crate::logging::{log_debug, log_error};
use crate::pool::{global_pool, ConnectionResult};
use crate::query::{build_projected_query, build_schema_probe};
use crate::validate::{validate_table_name, validate_uri};

#[derive(Debug, Clone)]
pub enum ScanTarget {
    Table {
        schema: Option<String>,
        table: String,
    },
    Query {
        sql: String,
    },
}

/// Bound scan: schema known, no stream yet. `init` turns it into a
/// `ScanStream`; binding errors release the connection before returning.
pub struct BoundScan {
    config: ConnectionConfig,
    target: ScanTarget,
    schema: SchemaRef,
    columns: Vec<ColumnDescriptor>,
    conn: Mutex<Option<ConnectionResult>>,
    // remote_query executes at bind to learn its schema; the first init
    // takes over that stream instead of re-running the query.
    first_stream: Mutex<Option<(StatementHandle, BatchReader)>>,
}

impl BoundScan {
    pub fn bind_table(
        config: ConnectionConfig,
        schema: Option<String>,
        table: String,
    ) -> Result<Self, Box<dyn Error>> {
        validate_table_name(&table)?;
        if let Some(schema_name) = &schema {
            validate_table_name(schema_name)?;
        }
        let conn = global_pool().get(&config)?;
        let probe = build_schema_probe(schema.as_deref(), &table);
        log_debug!("SCAN", "schema probe: {}", probe);
        let probed = {
            let mut client = conn
                .client()
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            client.query(&probe)
        };
        let (mut stmt, mut reader) = match probed {
            Ok(pair) => pair,
            Err(e) => {
                conn.release(global_pool());
                return Err(e);
            }
        };
        let arrow_schema = match reader.schema() {
            Ok(schema) => schema,
            Err(e) => {
                drop(reader);
                stmt.close();
                conn.release(global_pool());
                return Err(e);
            }
        };
        drop(reader);
        stmt.close();
        let columns = descriptors_from_schema(&arrow_schema);
        Ok(BoundScan {
            config,
            target: ScanTarget::Table { schema, table },
            schema: arrow_schema,
            columns,
            conn: Mutex::new(Some(conn)),
            first_stream: Mutex::new(None),
        })
    }

    pub fn bind_query(config: ConnectionConfig, sql: String) -> Result<Self, Box<dyn Error>> {
        if sql.trim().is_empty() {
            return Err(DuckArrowError::invalid_parameter(
                "query cannot be empty",
                "sql",
            ));
        }
        let conn = global_pool().get(&config)?;
        let queried = {
            let mut client = conn
                .client()
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            client.query(&sql)
        };
        let (mut stmt, mut reader) = match queried {
            Ok(pair) => pair,
            Err(e) => {
                conn.release(global_pool());
                return Err(e);
            }
        };
        let arrow_schema = match reader.schema() {
            Ok(schema) => schema,
            Err(e) => {
                drop(reader);
                stmt.close();
                conn.release(global_pool());
                return Err(e);
            }
        };
        let columns = descriptors_from_schema(&arrow_schema);
        Ok(BoundScan {
            config,
            target: ScanTarget::Query { sql },
            schema: arrow_schema,
            columns,
            conn: Mutex::new(Some(conn)),
            first_stream: Mutex::new(Some((stmt, reader))),
        })
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> Result<&ColumnDescriptor, Box<dyn Error>> {
        self.columns.get(index).ok_or_else(|| {
            DuckArrowError::invalid_argument(&format!("column index {} out of range", index))
                as Box<dyn Error>
        })
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldRef> {
        self.schema.fields().iter()
    }

    /// Records the projection and opens the streaming statement. Rescans
    /// (a second init on the same bind) draw a fresh pool connection.
    pub fn init(&self, projection: Vec<usize>) -> Result<ScanStream, Box<dyn Error>> {
        for &index in &projection {
            if index >= self.columns.len() {
                return Err(DuckArrowError::invalid_argument(&format!(
                    "projected column index {} out of range",
                    index
                )));
            }
        }
        let conn = {
            let mut slot = self
                .conn
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slot.take()
        };
        let conn = match conn {
            Some(conn) => conn,
            None => global_pool().get(&self.config)?,
        };
        let sql = match &self.target {
            ScanTarget::Table { schema, table } => {
                let names: Vec<String> =
                    self.columns.iter().map(|c| c.name.clone()).collect();
                build_projected_query(schema.as_deref(), table, &names, &projection)
            }
            ScanTarget::Query { sql } => {
                let stashed = {
                    let mut slot = self
                        .first_stream
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    slot.take()
                };
                if let Some((stmt, reader)) = stashed {
                    return Ok(ScanStream::new(conn, stmt, reader));
                }
                sql.clone()
            }
        };
        log_debug!("SCAN", "streaming query: {}", sql);
        let queried = {
            let mut client = conn
                .client()
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            client.query(&sql)
        };
        match queried {
            Ok((stmt, reader)) => Ok(ScanStream::new(conn, stmt, reader)),
            Err(e) => {
                conn.release(global_pool());
                Err(e)
            }
        }
    }
}

impl Drop for BoundScan {
    fn drop(&mut self) {
        let stashed = {
            let mut slot = self
                .first_stream
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slot.take()
        };
        if let Some((mut stmt, reader)) = stashed {
            drop(reader);
            stmt.close();
        }
        let conn = {
            let mut slot = self
                .conn
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slot.take()
        };
        if let Some(conn) = conn {
            conn.release(global_pool());
        }
    }
}

fn descriptors_from_schema(schema: &SchemaRef) -> Vec<ColumnDescriptor> {
    schema
        .fields()
        .iter()
        .enumerate()
        .map(|(ordinal, field)| ColumnDescriptor {
            name: field.name().clone(),
            type_name: sql_type_name(field.data_type()),
            nullable: field.is_nullable(),
            ordinal,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Initialized,
    Streaming,
    Done,
}

/// One emission from the stream: a batch plus the window to convert.
pub struct ScanSlice {
    pub batch: RecordBatch,
    pub offset: usize,
    pub rows: usize,
}

pub struct ScanStream {
    conn: Option<ConnectionResult>,
    stmt: Option<StatementHandle>,
    reader: Option<BatchReader>,
    batch: Option<RecordBatch>,
    cursor: usize,
    phase: ScanPhase,
}

impl ScanStream {
    fn new(conn: ConnectionResult, stmt: StatementHandle, reader: BatchReader) -> Self {
        ScanStream {
            conn: Some(conn),
            stmt: Some(stmt),
            reader: Some(reader),
            batch: None,
            cursor: 0,
            phase: ScanPhase::Initialized,
        }
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    /// Emits at most `HOST_CHUNK_MAX` rows. The previous batch is dropped
    /// before the next is fetched; a finished stream keeps returning `None`.
    pub fn next_slice(&mut self) -> Result<Option<ScanSlice>, Box<dyn Error>> {
        if self.phase == ScanPhase::Done {
            return Ok(None);
        }
        loop {
            let need_batch = match &self.batch {
                Some(batch) => self.cursor >= batch.num_rows(),
                None => true,
            };
            if need_batch {
                self.batch = None;
                let reader = self.reader.as_mut().ok_or_else(|| {
                    DuckArrowError::statement("scan stream already torn down", "next")
                })?;
                match reader.next_batch() {
                    Ok(Some(batch)) => {
                        self.cursor = 0;
                        self.batch = Some(batch);
                    }
                    Ok(None) => {
                        self.phase = ScanPhase::Done;
                        return Ok(None);
                    }
                    Err(e) => {
                        log_error!("SCAN", "reader advance failed: {}", e);
                        self.phase = ScanPhase::Done;
                        return Err(e);
                    }
                }
            }
            let batch = match &self.batch {
                Some(batch) => batch,
                None => continue,
            };
            let remaining = batch.num_rows() - self.cursor;
            if remaining == 0 {
                continue;
            }
            let rows = remaining.min(HOST_CHUNK_MAX);
            let slice = ScanSlice {
                batch: batch.clone(),
                offset: self.cursor,
                rows,
            };
            self.cursor += rows;
            self.phase = ScanPhase::Streaming;
            return Ok(Some(slice));
        }
    }

    /// Releases batch, reader, statement, then the connection, in that
    /// order. Prompt even mid-stream: closing the statement aborts the
    /// remote stream at the transport. Idempotent.
    pub fn finish(&mut self) {
        self.batch = None;
        self.reader = None;
        if let Some(mut stmt) = self.stmt.take() {
            stmt.close();
        }
        if let Some(conn) = self.conn.take() {
            conn.release(global_pool());
        }
        self.phase = ScanPhase::Done;
    }
}

impl Drop for ScanStream {
    fn drop(&mut self) {
        self.finish();
    }
}

fn emit_chunk(
    stream: &mut ScanStream,
    output_columns: usize,
    output: &mut DataChunkHandle,
) -> Result<(), Box<dyn Error>> {
    match stream.next_slice()? {
        None => {
            output.set_len(0);
            Ok(())
        }
        Some(slice) => {
            let columns = output_columns.min(slice.batch.num_columns());
            for col in 0..columns {
                write_column(output, col, slice.batch.column(col), slice.offset, slice.rows)?;
            }
            output.set_len(slice.rows);
            Ok(())
        }
    }
}

pub struct RemoteTableBindData {
    scan: BoundScan,
}

pub struct RemoteTableInitData {
    stream: Mutex<ScanStream>,
    projection: Vec<usize>,
}

/// `duckarrow_scan(uri, schema, table)`: the catalog's scan entry point,
/// with column projection pushed through to the remote SELECT.
pub struct RemoteTableVTab;

impl VTab for RemoteTableVTab {
    type InitData = RemoteTableInitData;
    type BindData = RemoteTableBindData;

    fn bind(bind: &BindInfo) -> Result<Self::BindData, Box<dyn Error>> {
        let uri = bind.get_parameter(0).to_string();
        let schema_name = bind.get_parameter(1).to_string();
        let table = bind.get_parameter(2).to_string();
        validate_uri(&uri)?;
        let config = config_for_uri(&uri);
        let schema = if schema_name.is_empty() {
            None
        } else {
            Some(schema_name)
        };
        // Scans of an attached catalog resolve the table through its lazy
        // entry cache: a missing table fails here without opening a
        // stream, and repeat scans reuse the cached column metadata.
        if let Some(catalog) = catalog_for_uri(&uri) {
            catalog.lookup_table(schema.as_deref().unwrap_or(""), &table, OnNotFound::Error)?;
        }
        let scan = BoundScan::bind_table(config, schema, table)?;
        for field in scan.fields() {
            bind.add_result_column(field.name(), logical_type_for_arrow(field.data_type()));
        }
        Ok(RemoteTableBindData { scan })
    }

    fn init(init: &InitInfo) -> Result<Self::InitData, Box<dyn Error>> {
        let bind_data = init.get_bind_data::<Self::BindData>();
        if bind_data.is_null() {
            return Err(DuckArrowError::statement("missing bind data", "init"));
        }
        let bind_ref = unsafe { &*bind_data };
        let projection: Vec<usize> = init
            .get_column_indices()
            .iter()
            .map(|&index| index as usize)
            .collect();
        let stream = bind_ref.scan.init(projection.clone())?;
        Ok(RemoteTableInitData {
            stream: Mutex::new(stream),
            projection,
        })
    }

    fn func(
        info: &TableFunctionInfo<Self>,
        output: &mut DataChunkHandle,
    ) -> Result<(), Box<dyn Error>> {
        let init_data = &*(info.get_init_data());
        let mut stream = init_data
            .stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        emit_chunk(&mut stream, init_data.projection.len(), output)
    }

    fn parameters() -> Option<Vec<LogicalTypeHandle>> {
        Some(vec![
            LogicalTypeHandle::from(LogicalTypeId::Varchar), // uri
            LogicalTypeHandle::from(LogicalTypeId::Varchar), // schema
            LogicalTypeHandle::from(LogicalTypeId::Varchar), // table
        ])
    }

    fn supports_pushdown() -> bool {
        true
    }
}

pub struct RemoteQueryBindData {
    scan: BoundScan,
}

pub struct RemoteQueryInitData {
    stream: Mutex<ScanStream>,
    columns: usize,
}

/// `remote_query(uri, sql)`: opaque SQL passthrough, the rewriter target.
pub struct RemoteQueryVTab;

impl VTab for RemoteQueryVTab {
    type InitData = RemoteQueryInitData;
    type BindData = RemoteQueryBindData;

    fn bind(bind: &BindInfo) -> Result<Self::BindData, Box<dyn Error>> {
        let uri = bind.get_parameter(0).to_string();
        let sql = bind.get_parameter(1).to_string();
        validate_uri(&uri)?;
        let config = config_for_uri(&uri);
        let scan = BoundScan::bind_query(config, sql)?;
        for field in scan.fields() {
            bind.add_result_column(field.name(), logical_type_for_arrow(field.data_type()));
        }
        Ok(RemoteQueryBindData { scan })
    }

    fn init(init: &InitInfo) -> Result<Self::InitData, Box<dyn Error>> {
        let bind_data = init.get_bind_data::<Self::BindData>();
        if bind_data.is_null() {
            return Err(DuckArrowError::statement("missing bind data", "init"));
        }
        let bind_ref = unsafe { &*bind_data };
        let stream = bind_ref.scan.init(Vec::new())?;
        Ok(RemoteQueryInitData {
            stream: Mutex::new(stream),
            columns: bind_ref.scan.column_count(),
        })
    }

    fn func(
        info: &TableFunctionInfo<Self>,
        output: &mut DataChunkHandle,
    ) -> Result<(), Box<dyn Error>> {
        let init_data = &*(info.get_init_data());
        let mut stream = init_data
            .stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        emit_chunk(&mut stream, init_data.columns, output)
    }

    fn parameters() -> Option<Vec<LogicalTypeHandle>> {
        Some(vec![
            LogicalTypeHandle::from(LogicalTypeId::Varchar), // uri
            LogicalTypeHandle::from(LogicalTypeId::Varchar), // sql
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{noop_statement, reader_from_batches, FlightSqlClient};
    use crate::pool::ConnectionPool;
    use arrow_array::Int32Array;
    use arrow_schema::{DataType, Field, Schema};
    use std::sync::Arc;

    fn int_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![Field::new("v", DataType::Int32, false)]))
    }

    fn int_batch(start: i32, rows: usize) -> RecordBatch {
        let values: Vec<i32> = (start..start + rows as i32).collect();
        RecordBatch::try_new(int_schema(), vec![Arc::new(Int32Array::from(values))])
            .expect("valid test batch")
    }

    fn stream_over(batches: Vec<RecordBatch>) -> ScanStream {
        let config = ConnectionConfig::new("grpc://stream-test:1", "", "", false);
        let conn = ConnectionPool::test_unmanaged(FlightSqlClient::stub(), config);
        let reader = reader_from_batches(int_schema(), batches);
        ScanStream::new(conn, noop_statement(), reader)
    }

    #[test]
    fn test_descriptors_from_schema() {
        let schema: SchemaRef = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        let descriptors = descriptors_from_schema(&schema);
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].name, "id");
        assert_eq!(descriptors[0].type_name, "INTEGER");
        assert!(!descriptors[0].nullable);
        assert_eq!(descriptors[0].ordinal, 0);
        assert_eq!(descriptors[1].name, "name");
        assert_eq!(descriptors[1].type_name, "VARCHAR");
        assert!(descriptors[1].nullable);
        assert_eq!(descriptors[1].ordinal, 1);
    }

    #[test]
    fn test_empty_stream_goes_straight_to_done() {
        let mut stream = stream_over(Vec::new());
        assert_eq!(stream.phase(), ScanPhase::Initialized);
        let slice = stream.next_slice().expect("clean end of stream");
        assert!(slice.is_none());
        assert_eq!(stream.phase(), ScanPhase::Done);
        // Done stays done.
        assert!(stream.next_slice().expect("still clean").is_none());
    }

    #[test]
    fn test_slices_never_exceed_chunk_max() {
        let total = HOST_CHUNK_MAX * 2 + 500;
        let mut stream = stream_over(vec![int_batch(0, total)]);
        let mut seen = 0usize;
        while let Some(slice) = stream.next_slice().expect("stream is healthy") {
            assert!(slice.rows <= HOST_CHUNK_MAX);
            assert!(slice.offset + slice.rows <= slice.batch.num_rows());
            seen += slice.rows;
        }
        assert_eq!(seen, total);
        assert_eq!(stream.phase(), ScanPhase::Done);
    }

    #[test]
    fn test_rows_arrive_in_stream_order() {
        let mut stream = stream_over(vec![int_batch(0, 3), int_batch(3, 4)]);
        let mut values = Vec::new();
        while let Some(slice) = stream.next_slice().expect("stream is healthy") {
            let column = slice
                .batch
                .column(0)
                .as_any()
                .downcast_ref::<Int32Array>()
                .expect("int column");
            for i in 0..slice.rows {
                values.push(column.value(slice.offset + i));
            }
        }
        assert_eq!(values, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_finish_is_idempotent_and_terminal() {
        let mut stream = stream_over(vec![int_batch(0, 10)]);
        let first = stream.next_slice().expect("stream is healthy");
        assert!(first.is_some());
        stream.finish();
        assert_eq!(stream.phase(), ScanPhase::Done);
        assert!(stream.next_slice().expect("done emits nothing").is_none());
        stream.finish();
        assert_eq!(stream.phase(), ScanPhase::Done);
    }
}
