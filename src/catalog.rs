//! Remote catalog surface.
//!
//! An attached remote shows up as lazily materialized schema and table
//! entries: schema names are case-sensitive, table names are not, and a
//! table's column descriptors are cached on first lookup. The catalog is
//! read-only; every write path fails through one helper. Attach opens the
//! Flight connection up-front so a bad URI fails the attach statement.

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use duckdb::core::{DataChunkHandle, Inserter, LogicalTypeHandle, LogicalTypeId};
use duckdb::vscalar::{ScalarFunctionSignature, VScalar};
use duckdb::vtab::arrow::WritableVector;
use duckdb::vtab::{BindInfo, InitInfo, TableFunctionInfo, VTab};

use crate::client::{ColumnDescriptor, FlightSqlClient};
use crate::config::{get_global_config, ConnectionConfig};
use crate::convert::{map_type_string, HostType};
use crate::error::DuckArrowError;
use crate::logging::{log_debug, log_warn};
use crate::query::escape_identifier;
use crate::validate::validate_uri;

/// Policy for cache misses that cannot be materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnNotFound {
    ReturnNone,
    Error,
}

#[derive(Debug, Clone)]
pub struct CatalogColumn {
    pub name: String,
    pub host_type: HostType,
    pub nullable: bool,
    pub ordinal: usize,
}

#[derive(Debug)]
pub struct TableEntry {
    pub schema: String,
    pub name: String,
    pub columns: Vec<CatalogColumn>,
}

/// How the host invokes a scan of this table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanBinding {
    pub function: String,
    pub arguments: Vec<String>,
    pub projection_pushdown: bool,
}

impl TableEntry {
    pub fn scan_binding(&self, uri: &str) -> ScanBinding {
        ScanBinding {
            function: "duckarrow_scan".to_string(),
            arguments: vec![
                uri.to_string(),
                self.schema.clone(),
                self.name.clone(),
            ],
            projection_pushdown: true,
        }
    }
}

pub struct SchemaEntry {
    pub name: String,
    tables: RwLock<HashMap<String, Arc<TableEntry>>>,
}

impl SchemaEntry {
    fn new(name: String) -> Self {
        SchemaEntry {
            name,
            tables: RwLock::new(HashMap::new()),
        }
    }

    fn cached_table(&self, name: &str) -> Option<Arc<TableEntry>> {
        let tables = self
            .tables
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tables.get(&name.to_lowercase()).cloned()
    }

    fn cache_table(&self, entry: Arc<TableEntry>) {
        let mut tables = self
            .tables
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tables.insert(entry.name.to_lowercase(), entry);
    }
}

pub struct RemoteCatalog {
    pub name: String,
    config: ConnectionConfig,
    client: Mutex<FlightSqlClient>,
    schemas: RwLock<HashMap<String, Arc<SchemaEntry>>>,
    host_schemas: RwLock<Vec<String>>,
}

impl RemoteCatalog {
    /// Opens the connection up-front so attach fails fast.
    pub fn attach(name: &str, config: ConnectionConfig) -> Result<Arc<Self>, Box<dyn Error>> {
        validate_uri(&config.uri)?;
        let client = FlightSqlClient::connect(&config)?;
        Ok(Arc::new(RemoteCatalog {
            name: name.to_string(),
            config,
            client: Mutex::new(client),
            schemas: RwLock::new(HashMap::new()),
            host_schemas: RwLock::new(Vec::new()),
        }))
    }

    #[cfg(test)]
    pub(crate) fn attach_stub(name: &str, config: ConnectionConfig) -> Arc<Self> {
        Arc::new(RemoteCatalog {
            name: name.to_string(),
            config,
            client: Mutex::new(FlightSqlClient::stub()),
            schemas: RwLock::new(HashMap::new()),
            host_schemas: RwLock::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn uri(&self) -> &str {
        &self.config.uri
    }

    /// Cache-first. A miss constructs an unverified entry; the remote may
    /// not pre-declare schemas, so existence is checked on first table
    /// access instead.
    pub fn lookup_schema(&self, name: &str) -> Arc<SchemaEntry> {
        {
            let schemas = self
                .schemas
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(entry) = schemas.get(name) {
                return Arc::clone(entry);
            }
        }
        let mut schemas = self
            .schemas
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            schemas
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(SchemaEntry::new(name.to_string()))),
        )
    }

    pub fn scan_schemas(&self) -> Result<Vec<Arc<SchemaEntry>>, Box<dyn Error>> {
        let names = {
            let mut client = self
                .client
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            client.get_schemas()?
        };
        Ok(names.iter().map(|name| self.lookup_schema(name)).collect())
    }

    pub fn lookup_table(
        &self,
        schema: &str,
        name: &str,
        if_not_found: OnNotFound,
    ) -> Result<Option<Arc<TableEntry>>, Box<dyn Error>> {
        let schema_entry = self.lookup_schema(schema);
        if let Some(entry) = schema_entry.cached_table(name) {
            return Ok(Some(entry));
        }
        let columns = {
            let mut client = self
                .client
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            client.get_columns(Some(schema), name)?
        };
        if columns.is_empty() {
            return match if_not_found {
                OnNotFound::ReturnNone => Ok(None),
                OnNotFound::Error => Err(DuckArrowError::not_found("table", name)),
            };
        }
        let entry = Arc::new(TableEntry {
            schema: schema.to_string(),
            name: name.to_string(),
            columns: catalog_columns(&columns),
        });
        schema_entry.cache_table(Arc::clone(&entry));
        Ok(Some(entry))
    }

    pub fn list_tables(&self, schema: &str) -> Result<Vec<String>, Box<dyn Error>> {
        let mut client = self
            .client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(client
            .get_tables(Some(schema))?
            .into_iter()
            .map(|t| t.name)
            .collect())
    }

    fn record_host_schema(&self, host_schema: String) {
        let mut schemas = self
            .host_schemas
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !schemas.contains(&host_schema) {
            schemas.push(host_schema);
        }
    }

    fn host_schemas(&self) -> Vec<String> {
        self.host_schemas
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn create_schema(&self, _name: &str) -> Result<(), Box<dyn Error>> {
        Err(read_only("CREATE SCHEMA"))
    }

    pub fn drop_schema(&self, _name: &str) -> Result<(), Box<dyn Error>> {
        Err(read_only("DROP SCHEMA"))
    }

    pub fn create_table(&self, _schema: &str, _name: &str) -> Result<(), Box<dyn Error>> {
        Err(read_only("CREATE TABLE"))
    }

    pub fn drop_table(&self, _schema: &str, _name: &str) -> Result<(), Box<dyn Error>> {
        Err(read_only("DROP TABLE"))
    }

    pub fn alter_table(&self, _schema: &str, _name: &str) -> Result<(), Box<dyn Error>> {
        Err(read_only("ALTER TABLE"))
    }

    pub fn create_view(&self, _schema: &str, _name: &str) -> Result<(), Box<dyn Error>> {
        Err(read_only("CREATE VIEW"))
    }

    pub fn create_index(&self, _schema: &str, _name: &str) -> Result<(), Box<dyn Error>> {
        Err(read_only("CREATE INDEX"))
    }

    pub fn create_function(&self, _schema: &str, _name: &str) -> Result<(), Box<dyn Error>> {
        Err(read_only("CREATE FUNCTION"))
    }

    pub fn create_sequence(&self, _schema: &str, _name: &str) -> Result<(), Box<dyn Error>> {
        Err(read_only("CREATE SEQUENCE"))
    }

    pub fn create_type(&self, _schema: &str, _name: &str) -> Result<(), Box<dyn Error>> {
        Err(read_only("CREATE TYPE"))
    }

    pub fn create_collation(&self, _schema: &str, _name: &str) -> Result<(), Box<dyn Error>> {
        Err(read_only("CREATE COLLATION"))
    }

    pub fn copy_into(&self, _schema: &str, _name: &str) -> Result<(), Box<dyn Error>> {
        Err(read_only("COPY"))
    }

    pub fn pragma(&self, _name: &str) -> Result<(), Box<dyn Error>> {
        Err(read_only("PRAGMA"))
    }
}

fn read_only(operation: &str) -> Box<dyn Error> {
    DuckArrowError::read_only(operation)
}

fn catalog_columns(columns: &[ColumnDescriptor]) -> Vec<CatalogColumn> {
    columns
        .iter()
        .map(|c| CatalogColumn {
            name: c.name.clone(),
            host_type: map_type_string(&c.type_name),
            nullable: c.nullable,
            ordinal: c.ordinal,
        })
        .collect()
}

/// The remote commits per statement; tickets exist only to satisfy the
/// host's transaction interface.
pub struct TransactionManager {
    next_ticket: AtomicU64,
    active: Mutex<HashSet<u64>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        TransactionManager {
            next_ticket: AtomicU64::new(1),
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn start_transaction(&self) -> u64 {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(ticket);
        ticket
    }

    pub fn commit(&self, ticket: u64) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&ticket)
    }

    pub fn rollback(&self, ticket: u64) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&ticket)
    }

    pub fn checkpoint(&self) {}
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn attached() -> &'static RwLock<HashMap<String, Arc<RemoteCatalog>>> {
    static ATTACHED: OnceLock<RwLock<HashMap<String, Arc<RemoteCatalog>>>> = OnceLock::new();
    ATTACHED.get_or_init(|| RwLock::new(HashMap::new()))
}

pub fn register_catalog(catalog: Arc<RemoteCatalog>) {
    let mut map = attached()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    map.insert(catalog.name.clone(), catalog);
}

pub fn unregister_catalog(name: &str) -> Option<Arc<RemoteCatalog>> {
    let mut map = attached()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    map.remove(name)
}

pub fn attached_catalog(name: &str) -> Option<Arc<RemoteCatalog>> {
    let map = attached()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    map.get(name).cloned()
}

/// The attached catalog owning this URI, if any.
pub fn catalog_for_uri(uri: &str) -> Option<Arc<RemoteCatalog>> {
    let map = attached()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    map.values().find(|catalog| catalog.uri() == uri).cloned()
}

/// Credentials for a bare URI. Attach-time credentials win for their URI;
/// the global snapshot applies only to its own URI; anything else connects
/// anonymously.
pub fn config_for_uri(uri: &str) -> ConnectionConfig {
    if let Some(catalog) = catalog_for_uri(uri) {
        return catalog.config().clone();
    }
    if let Some(config) = get_global_config() {
        if config.uri == uri {
            return (*config).clone();
        }
    }
    ConnectionConfig::new(uri, "", "", false)
}

fn host_schema_name(catalog: &str, schema: &str) -> String {
    if schema.is_empty() {
        catalog.to_string()
    } else {
        format!("{}_{}", catalog, schema)
    }
}

pub struct AttachBindData {
    rows: Vec<(String, String, String)>,
    ddl_statements: Vec<String>,
}

pub struct AttachInitData {
    rows: Vec<(String, String, String)>,
    ddl_statements: Vec<String>,
    current_row: RwLock<usize>,
    ddl_done: RwLock<bool>,
}

/// `duckarrow_attach(uri, name, username := ..., password := ..., token := ...)`
///
/// Registers the catalog, then materializes one host schema and one view
/// per discovered remote table so `<name>_<schema>.<table>` resolves.
pub struct AttachVTab;

impl VTab for AttachVTab {
    type InitData = AttachInitData;
    type BindData = AttachBindData;

    fn bind(bind: &BindInfo) -> Result<Self::BindData, Box<dyn Error>> {
        let uri = bind.get_parameter(0).to_string();
        let name = bind.get_parameter(1).to_string();
        if name.is_empty() {
            return Err(DuckArrowError::invalid_parameter(
                "attach name cannot be empty",
                "name",
            ));
        }
        let username = bind
            .get_named_parameter("username")
            .map(|v| v.to_string())
            .unwrap_or_default();
        let password = bind
            .get_named_parameter("password")
            .map(|v| v.to_string())
            .unwrap_or_default();
        let token = bind
            .get_named_parameter("token")
            .map(|v| v.to_string())
            .unwrap_or_default();

        let config = ConnectionConfig::new(&uri, &username, &password, false).with_token(&token);
        let catalog = RemoteCatalog::attach(&name, config)?;

        let schemas = catalog.scan_schemas()?;
        let mut rows: Vec<(String, String, String)> = Vec::new();
        let mut ddl_statements: Vec<String> = Vec::new();
        let safe_uri = uri.replace('\'', "''");
        for schema_entry in &schemas {
            let tables = match catalog.list_tables(&schema_entry.name) {
                Ok(tables) => tables,
                Err(e) => {
                    log_warn!("ATTACH", "table discovery failed for schema {}: {}", schema_entry.name, e);
                    continue;
                }
            };
            if tables.is_empty() {
                continue;
            }
            let host_schema = host_schema_name(&name, &schema_entry.name);
            catalog.record_host_schema(host_schema.clone());
            ddl_statements.push(format!(
                "CREATE SCHEMA IF NOT EXISTS \"{}\"",
                escape_identifier(&host_schema)
            ));
            for table in tables {
                ddl_statements.push(format!(
                    "CREATE OR REPLACE VIEW \"{}\".\"{}\" AS SELECT * FROM duckarrow_scan('{}', '{}', '{}')",
                    escape_identifier(&host_schema),
                    escape_identifier(&table),
                    safe_uri,
                    schema_entry.name.replace('\'', "''"),
                    table.replace('\'', "''"),
                ));
                rows.push((schema_entry.name.clone(), table, host_schema.clone()));
            }
        }

        register_catalog(catalog);
        log_debug!("ATTACH", "attached {} with {} tables", name, rows.len());

        bind.add_result_column("schema_name", LogicalTypeHandle::from(LogicalTypeId::Varchar));
        bind.add_result_column("table_name", LogicalTypeHandle::from(LogicalTypeId::Varchar));
        bind.add_result_column("host_schema", LogicalTypeHandle::from(LogicalTypeId::Varchar));

        Ok(AttachBindData {
            rows,
            ddl_statements,
        })
    }

    fn init(init: &InitInfo) -> Result<Self::InitData, Box<dyn Error>> {
        let bind_data = init.get_bind_data::<Self::BindData>();
        if bind_data.is_null() {
            return Err(DuckArrowError::statement("missing bind data", "init"));
        }
        let bind_ref = unsafe { &*bind_data };
        Ok(AttachInitData {
            rows: bind_ref.rows.clone(),
            ddl_statements: bind_ref.ddl_statements.clone(),
            current_row: RwLock::new(0),
            ddl_done: RwLock::new(false),
        })
    }

    fn func(
        info: &TableFunctionInfo<Self>,
        output: &mut DataChunkHandle,
    ) -> Result<(), Box<dyn Error>> {
        let init_data = &*(info.get_init_data());

        // DDL is deferred to func to avoid catalog lock re-entrancy during
        // bind. Best-effort: the attach itself already succeeded.
        {
            let done = *init_data
                .ddl_done
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !done {
                if let Err(e) = crate::execute_ddl_batch(&init_data.ddl_statements) {
                    log_warn!("ATTACH", "could not create schemas/views: {}", e);
                }
                *init_data
                    .ddl_done
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = true;
            }
        }

        let current = *init_data
            .current_row
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let remaining = init_data.rows.len().saturating_sub(current);
        if remaining == 0 {
            output.set_len(0);
            return Ok(());
        }
        let batch = remaining.min(2048);
        output.set_len(batch);

        let schema_vec = output.flat_vector(0);
        let table_vec = output.flat_vector(1);
        let host_vec = output.flat_vector(2);
        for i in 0..batch {
            let (ref schema, ref table, ref host_schema) = init_data.rows[current + i];
            schema_vec.insert(i, schema.as_str());
            table_vec.insert(i, table.as_str());
            host_vec.insert(i, host_schema.as_str());
        }

        *init_data
            .current_row
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) += batch;
        Ok(())
    }

    fn parameters() -> Option<Vec<LogicalTypeHandle>> {
        Some(vec![
            LogicalTypeHandle::from(LogicalTypeId::Varchar), // uri
            LogicalTypeHandle::from(LogicalTypeId::Varchar), // name
        ])
    }

    fn named_parameters() -> Option<Vec<(String, LogicalTypeHandle)>> {
        Some(vec![
            (
                "username".to_string(),
                LogicalTypeHandle::from(LogicalTypeId::Varchar),
            ),
            (
                "password".to_string(),
                LogicalTypeHandle::from(LogicalTypeId::Varchar),
            ),
            (
                "token".to_string(),
                LogicalTypeHandle::from(LogicalTypeId::Varchar),
            ),
        ])
    }
}

/// `duckarrow_detach(name)`: drops the registration and the host schemas
/// the attach created.
pub struct DetachScalar;

impl VScalar for DetachScalar {
    type State = ();

    fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        if input.len() == 0 {
            return Err("No input provided".into());
        }

        let name_vector = input.flat_vector(0);
        let name_slice =
            unsafe { name_vector.as_slice_with_len::<libduckdb_sys::duckdb_string_t>(input.len()) };
        let name = {
            let mut binding = name_slice[0];
            duckdb::types::DuckString::new(&mut binding).as_str().to_string()
        };

        let message = match unregister_catalog(&name) {
            Some(catalog) => {
                for host_schema in catalog.host_schemas() {
                    let ddl = format!(
                        "DROP SCHEMA IF EXISTS \"{}\" CASCADE",
                        escape_identifier(&host_schema)
                    );
                    if let Err(e) = crate::execute_ddl_batch(&[ddl]) {
                        log_warn!("DETACH", "could not drop schema {}: {}", host_schema, e);
                    }
                }
                format!("Detached {}", name)
            }
            None => format!("No attached database named {}", name),
        };

        let flat_vector = output.flat_vector();
        flat_vector.insert(0, &message);
        Ok(())
    }

    fn signatures() -> Vec<ScalarFunctionSignature> {
        vec![ScalarFunctionSignature::exact(
            vec![LogicalTypeId::Varchar.into()],
            LogicalTypeId::Varchar.into(),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(uri: &str) -> ConnectionConfig {
        ConnectionConfig::new(uri, "u", "p", false)
    }

    #[test]
    fn test_schema_entries_are_case_sensitive() {
        let catalog = RemoteCatalog::attach_stub("db", test_config("grpc://h:1"));
        let lower = catalog.lookup_schema("sales");
        let upper = catalog.lookup_schema("SALES");
        assert!(!Arc::ptr_eq(&lower, &upper));
        assert_eq!(lower.name, "sales");
        assert_eq!(upper.name, "SALES");
    }

    #[test]
    fn test_schema_lookup_is_cached() {
        let catalog = RemoteCatalog::attach_stub("db", test_config("grpc://h:1"));
        let first = catalog.lookup_schema("sales");
        let second = catalog.lookup_schema("sales");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_lookup_table_is_cache_first() {
        let catalog = RemoteCatalog::attach_stub("db", test_config("grpc://h:1"));
        let schema = catalog.lookup_schema("sales");
        let entry = Arc::new(TableEntry {
            schema: "sales".to_string(),
            name: "Orders".to_string(),
            columns: Vec::new(),
        });
        schema.cache_table(Arc::clone(&entry));
        // The stub client cannot serve a metadata call, so a hit proves
        // the cached entry short-circuits the remote lookup.
        let hit = catalog
            .lookup_table("sales", "Orders", OnNotFound::Error)
            .expect("cached entry needs no remote call")
            .expect("entry is present");
        assert!(Arc::ptr_eq(&hit, &entry));
    }

    #[test]
    fn test_lookup_table_is_case_insensitive() {
        let catalog = RemoteCatalog::attach_stub("db", test_config("grpc://h:1"));
        let schema = catalog.lookup_schema("sales");
        let entry = Arc::new(TableEntry {
            schema: "sales".to_string(),
            name: "Orders".to_string(),
            columns: Vec::new(),
        });
        schema.cache_table(Arc::clone(&entry));
        let hit = catalog
            .lookup_table("sales", "ORDERS", OnNotFound::Error)
            .expect("cached entry needs no remote call")
            .expect("entry is present");
        assert!(Arc::ptr_eq(&hit, &entry));
    }

    #[test]
    fn test_write_paths_are_read_only() {
        let catalog = RemoteCatalog::attach_stub("db", test_config("grpc://h:1"));
        for result in [
            catalog.create_schema("s"),
            catalog.drop_schema("s"),
            catalog.create_table("s", "t"),
            catalog.drop_table("s", "t"),
            catalog.alter_table("s", "t"),
            catalog.create_view("s", "v"),
            catalog.create_index("s", "i"),
            catalog.create_function("s", "f"),
            catalog.create_sequence("s", "q"),
            catalog.create_type("s", "y"),
            catalog.create_collation("s", "c"),
            catalog.copy_into("s", "t"),
            catalog.pragma("p"),
        ] {
            let err = result.expect_err("write path must fail");
            assert!(err.to_string().contains("read-only"), "got: {}", err);
        }
    }

    #[test]
    fn test_transaction_manager_tickets() {
        let txns = TransactionManager::new();
        let a = txns.start_transaction();
        let b = txns.start_transaction();
        assert_ne!(a, b);
        assert!(txns.commit(a));
        assert!(!txns.commit(a));
        assert!(txns.rollback(b));
        assert!(!txns.rollback(b));
        txns.checkpoint();
    }

    #[test]
    fn test_scan_binding_advertises_pushdown() {
        let entry = TableEntry {
            schema: "sales".to_string(),
            name: "orders".to_string(),
            columns: Vec::new(),
        };
        let binding = entry.scan_binding("grpc://h:1");
        assert_eq!(binding.function, "duckarrow_scan");
        assert_eq!(
            binding.arguments,
            vec!["grpc://h:1", "sales", "orders"]
        );
        assert!(binding.projection_pushdown);
    }

    #[test]
    fn test_config_for_uri_prefers_attached_credentials() {
        let uri = "grpc://attached-host:7815";
        let catalog = RemoteCatalog::attach_stub("attached_creds", test_config(uri));
        register_catalog(catalog);
        let config = config_for_uri(uri);
        assert_eq!(config.username, "u");
        assert_eq!(config.password, "p");
        unregister_catalog("attached_creds");
        let anonymous = config_for_uri(uri);
        assert!(anonymous.username.is_empty());
        assert!(anonymous.password.is_empty());
    }

    #[test]
    fn test_host_schema_name() {
        assert_eq!(host_schema_name("db", "sales"), "db_sales");
        assert_eq!(host_schema_name("db", ""), "db");
    }

    #[test]
    fn test_catalog_columns_maps_type_strings() {
        let descriptors = vec![
            ColumnDescriptor {
                name: "id".to_string(),
                type_name: "INTEGER".to_string(),
                nullable: false,
                ordinal: 0,
            },
            ColumnDescriptor {
                name: "price".to_string(),
                type_name: "DECIMAL(10,2)".to_string(),
                nullable: true,
                ordinal: 1,
            },
        ];
        let columns = catalog_columns(&descriptors);
        assert_eq!(columns[0].host_type, HostType::Integer);
        assert_eq!(
            columns[1].host_type,
            HostType::Decimal { width: 10, scale: 2 }
        );
    }
}
