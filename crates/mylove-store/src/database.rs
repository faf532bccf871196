//! Database handle: lazy single-flight connection and versioned upgrade

use mylove_config::{DEFAULT_DATABASE_NAME, DatabaseSettings, check_name};
use rusqlite::Connection;
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::{
    PerformanceMonitor, RecordStore, StorageEstimate, StoreError, StoreResult, StoreSchema,
};

/// How long a statement waits on a locked database file before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Hook run inside the upgrade transaction with `(conn, old_version, new_version)`
pub type UpgradeHook = Arc<dyn Fn(&Connection, u32, u32) -> StoreResult<()> + Send + Sync>;

type SharedConnection = Arc<Mutex<Connection>>;

/// Outcome of one open-and-upgrade attempt, shared by everyone who waited on it
type InitOutcome = Result<SharedConnection, Arc<StoreError>>;

/// Where the database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    /// Private in-memory database, gone once the handle is closed
    InMemory,
}

struct DatabaseConfig {
    name: String,
    version: u32,
    location: Location,
    quota_bytes: Option<u64>,
    stores: Vec<Arc<StoreSchema>>,
    on_upgrade: Option<UpgradeHook>,
}

struct Inner {
    config: Arc<DatabaseConfig>,
    /// One cell per attempt. Replaced by `close()`, or after a failed
    /// attempt, so the next caller starts over.
    cell: Mutex<Arc<OnceCell<InitOutcome>>>,
    metrics: PerformanceMonitor,
}

/// Handle to one local database and the stores declared in it.
///
/// Nothing is opened until the first operation (or an explicit [`init`]).
/// Concurrent first callers share a single open-and-upgrade attempt and all
/// see its outcome. A failure is not cached: the next call tries again.
///
/// Cloning is cheap and every clone shares the same connection.
///
/// [`init`]: Database::init
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl Database {
    pub fn builder(location: Location) -> DatabaseBuilder {
        DatabaseBuilder::new(location)
    }

    /// Build a database from validated configuration
    pub fn from_config(settings: &DatabaseSettings) -> StoreResult<Self> {
        DatabaseBuilder::from_settings(settings).build()
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn version(&self) -> u32 {
        self.inner.config.version
    }

    pub fn location(&self) -> &Location {
        &self.inner.config.location
    }

    pub fn quota_bytes(&self) -> Option<u64> {
        self.inner.config.quota_bytes
    }

    /// Declared stores, in declaration order
    pub fn schemas(&self) -> impl Iterator<Item = &StoreSchema> {
        self.inner.config.stores.iter().map(|s| s.as_ref())
    }

    /// Timings of successful store operations
    pub fn metrics(&self) -> &PerformanceMonitor {
        &self.inner.metrics
    }

    /// Typed handle to a declared store
    pub fn store<T>(&self, name: &str) -> StoreResult<RecordStore<T>> {
        let schema = self
            .inner
            .config
            .stores
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownStore(name.to_string()))?;

        Ok(RecordStore {
            db: self.clone(),
            schema,
            _record: PhantomData,
        })
    }

    /// Open the database and run the upgrade step if needed.
    ///
    /// Returns immediately once a connection exists.
    pub async fn init(&self) -> StoreResult<()> {
        self.connection().await.map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.current_cell().get(), Some(Ok(_)))
    }

    /// Drop the connection. The next operation opens it again.
    pub fn close(&self) {
        let mut cell = self.inner.cell.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(cell.get(), Some(Ok(_))) {
            info!(db = %self.name(), "Database closed");
        }
        *cell = Arc::new(OnceCell::new());
    }

    /// Check that the database answers queries
    pub async fn is_healthy(&self) -> bool {
        self.run(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
        .await
        .is_ok()
    }

    /// Current space usage and the configured quota
    pub async fn estimate(&self) -> StoreResult<StorageEstimate> {
        let quota_bytes = self.quota_bytes();
        let usage_bytes = self.run(|conn| usage_bytes(conn)).await?;
        Ok(StorageEstimate {
            usage_bytes,
            quota_bytes,
        })
    }

    fn current_cell(&self) -> Arc<OnceCell<InitOutcome>> {
        self.inner
            .cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn connection(&self) -> StoreResult<SharedConnection> {
        let cell = self.current_cell();
        let config = self.inner.config.clone();
        let outcome = cell
            .get_or_init(|| async move {
                let opened = match tokio::task::spawn_blocking({
                    let config = config.clone();
                    move || open_database(&config)
                })
                .await
                {
                    Ok(opened) => opened,
                    Err(e) => Err(StoreError::Init(e.to_string())),
                };
                opened.map(|conn| Arc::new(Mutex::new(conn))).map_err(|e| {
                    error!(db = %config.name, error = %e, "Database initialization failed");
                    Arc::new(e)
                })
            })
            .await;

        match outcome {
            Ok(conn) => Ok(conn.clone()),
            Err(e) => {
                self.discard_attempt(&cell);
                Err(shared_init_error(e))
            }
        }
    }

    /// Forget a failed attempt, unless `close()` or another caller already
    /// replaced it.
    fn discard_attempt(&self, attempt: &Arc<OnceCell<InitOutcome>>) {
        let mut cell = self.inner.cell.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::ptr_eq(&*cell, attempt) {
            *cell = Arc::new(OnceCell::new());
        }
    }

    /// Run `f` against the connection on the blocking pool.
    ///
    /// The connection lock is held for the whole call, so operations on one
    /// database never interleave.
    pub(crate) async fn run<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Connection) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let shared = self.connection().await?;
        tokio::task::spawn_blocking(move || {
            let mut conn = shared
                .lock()
                .map_err(|_| StoreError::Database("connection lock poisoned".into()))?;
            f(&mut *conn)
        })
        .await?
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.inner.config.name)
            .field("version", &self.inner.config.version)
            .field("location", &self.inner.config.location)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// Configuration-driven constructor for [`Database`]
pub struct DatabaseBuilder {
    location: Location,
    name: String,
    version: u32,
    quota_bytes: Option<u64>,
    stores: Vec<StoreSchema>,
    on_upgrade: Option<UpgradeHook>,
}

impl DatabaseBuilder {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            name: DEFAULT_DATABASE_NAME.to_string(),
            version: 1,
            quota_bytes: None,
            stores: Vec::new(),
            on_upgrade: None,
        }
    }

    pub fn from_settings(settings: &DatabaseSettings) -> Self {
        let mut builder = Self::new(Location::File(settings.database_path()))
            .name(settings.name.clone())
            .version(settings.version);
        builder.quota_bytes = settings.quota_bytes;
        builder.stores = settings.stores.iter().map(StoreSchema::from).collect();
        builder
    }

    pub fn location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Schema version. Opening a database stored at a lower version runs the
    /// upgrade step.
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn quota_bytes(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    pub fn store(mut self, schema: StoreSchema) -> Self {
        self.stores.push(schema);
        self
    }

    /// Extra work for the upgrade step, run after the declared stores exist
    pub fn on_upgrade<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Connection, u32, u32) -> StoreResult<()> + Send + Sync + 'static,
    {
        self.on_upgrade = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> StoreResult<Database> {
        check_name(&self.name)
            .map_err(|e| StoreError::InvalidSchema(format!("database '{}': {}", self.name, e)))?;
        if self.version == 0 {
            return Err(StoreError::InvalidSchema(
                "database version must be at least 1".into(),
            ));
        }
        if self.quota_bytes == Some(0) {
            return Err(StoreError::InvalidSchema(
                "quota must be greater than zero".into(),
            ));
        }

        for (i, schema) in self.stores.iter().enumerate() {
            schema.validate()?;
            if self.stores[..i].iter().any(|s| s.name == schema.name) {
                return Err(StoreError::InvalidSchema(format!(
                    "store '{}' declared twice",
                    schema.name
                )));
            }
        }

        let config = DatabaseConfig {
            name: self.name,
            version: self.version,
            location: self.location,
            quota_bytes: self.quota_bytes,
            stores: self.stores.into_iter().map(Arc::new).collect(),
            on_upgrade: self.on_upgrade,
        };

        Ok(Database {
            inner: Arc::new(Inner {
                config: Arc::new(config),
                cell: Mutex::new(Arc::new(OnceCell::new())),
                metrics: PerformanceMonitor::new(),
            }),
        })
    }
}

/// Copy of a failed attempt's error for one of the callers that waited on it
fn shared_init_error(e: &StoreError) -> StoreError {
    match e {
        StoreError::VersionMismatch { found, expected } => StoreError::VersionMismatch {
            found: *found,
            expected: *expected,
        },
        StoreError::Init(msg) => StoreError::Init(msg.clone()),
        other => StoreError::Init(other.to_string()),
    }
}

fn open_database(config: &DatabaseConfig) -> StoreResult<Connection> {
    open_and_upgrade(config).map_err(|e| match e {
        StoreError::VersionMismatch { .. } | StoreError::Init(_) => e,
        other => StoreError::Init(other.to_string()),
    })
}

fn open_and_upgrade(config: &DatabaseConfig) -> StoreResult<Connection> {
    let mut conn = match &config.location {
        Location::File(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(path)?;
            let _: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            conn
        }
        Location::InMemory => Connection::open_in_memory()?,
    };
    conn.busy_timeout(BUSY_TIMEOUT)?;

    upgrade(&mut conn, config)?;

    if let Some(quota) = config.quota_bytes {
        apply_quota(&conn, quota)?;
    }

    info!(
        db = %config.name,
        version = config.version,
        stores = config.stores.len(),
        "Database initialized"
    );
    Ok(conn)
}

fn upgrade(conn: &mut Connection, config: &DatabaseConfig) -> StoreResult<()> {
    let old_version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if old_version > config.version {
        return Err(StoreError::VersionMismatch {
            found: old_version,
            expected: config.version,
        });
    }
    if old_version == config.version {
        debug!(db = %config.name, version = old_version, "Schema up to date");
        return Ok(());
    }

    info!(
        db = %config.name,
        from = old_version,
        to = config.version,
        "Upgrading database schema"
    );

    let tx = conn.transaction()?;
    {
        let conn: &Connection = &tx;
        for schema in &config.stores {
            schema.create(conn)?;
        }
        if let Some(hook) = &config.on_upgrade {
            hook(conn, old_version, config.version)?;
        }
    }
    tx.pragma_update(None, "user_version", config.version)?;
    tx.commit()?;

    Ok(())
}

/// Cap the database file size with `max_page_count`; writes past it fail
/// with SQLITE_FULL.
fn apply_quota(conn: &Connection, quota_bytes: u64) -> StoreResult<()> {
    let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
    let page_size = u64::try_from(page_size.max(1)).unwrap_or(1);
    let max_pages = (quota_bytes / page_size).max(1);

    let applied: i64 = conn.query_row(
        &format!("PRAGMA max_page_count = {}", max_pages),
        [],
        |row| row.get(0),
    )?;

    debug!(quota_bytes, page_size, max_pages = applied, "Storage quota applied");
    Ok(())
}

pub(crate) fn usage_bytes(conn: &Connection) -> StoreResult<u64> {
    let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
    let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
    Ok(u64::try_from(page_count.saturating_mul(page_size)).unwrap_or(0))
}
