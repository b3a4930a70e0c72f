// Durable key-value storage backends

use crate::models::now_ms;
use eyre::{Context, Result, eyre};
use fs2::FileExt;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Key holding the serialized task list. The version token lets an
/// incompatible schema move to a new key without reading old data.
pub const TASKS_KEY: &str = "todoflow.v2.tasks";

/// Key holding the theme preference (`"light"` or `"dark"`)
pub const THEME_KEY: &str = "todoflow.theme";

/// Name of the store directory created under the configured path
pub const STORE_DIR: &str = ".todoflow";

const CURRENT_VERSION: u32 = 2;

/// Durable string key-value storage scoped to the application
pub trait Storage {
    /// Read the value stored under `key`, `None` if absent
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Durably store `value` under `key`, replacing any previous value
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}

/// Which storage implementation to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    File,
}

impl std::str::FromStr for Backend {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "sqlite" => Ok(Backend::Sqlite),
            "file" => Ok(Backend::File),
            other => Err(eyre!("Invalid backend: {} (expected sqlite or file)", other)),
        }
    }
}

/// Open the chosen backend rooted at `path`
pub fn open_storage<P: AsRef<Path>>(backend: Backend, path: P) -> Result<Box<dyn Storage>> {
    match backend {
        Backend::Sqlite => Ok(Box::new(SqliteStorage::open(path)?)),
        Backend::File => Ok(Box::new(FileStorage::open(path)?)),
    }
}

/// Create the store directory with its `.gitignore` and `.version` files
fn prepare_store_dir(path: &Path) -> Result<PathBuf> {
    let base_path = path.join(STORE_DIR);
    fs::create_dir_all(&base_path).context("Failed to create store directory")?;

    let gitignore_path = base_path.join(".gitignore");
    if !gitignore_path.exists() {
        fs::write(gitignore_path, "todoflow.db\ntodoflow.db-shm\ntodoflow.db-wal\n")?;
    }

    let version_path = base_path.join(".version");
    if !version_path.exists() {
        fs::write(version_path, CURRENT_VERSION.to_string())?;
    }

    Ok(base_path)
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(eyre!("Storage key cannot be empty"));
    }
    if key.len() > 128 {
        return Err(eyre!("Storage key too long: {} (max 128 chars)", key));
    }
    if !key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.') {
        return Err(eyre!("Invalid storage key: {} (must be alphanumeric with _/-/.)", key));
    }
    Ok(())
}

// ============================================================================
// SQLite backend
// ============================================================================

/// Key-value storage in a single SQLite table
pub struct SqliteStorage {
    base_path: Option<PathBuf>,
    db: Connection,
}

impl SqliteStorage {
    /// Open or create the database under `<path>/.todoflow/todoflow.db`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = prepare_store_dir(path.as_ref())?;

        let db_path = base_path.join("todoflow.db");
        let db = Connection::open(&db_path).context("Failed to open SQLite database")?;

        let storage = Self {
            base_path: Some(base_path),
            db,
        };
        storage.create_schema()?;

        info!(path = ?db_path, "Opened SQLite storage");
        Ok(storage)
    }

    /// Open a throwaway database that lives only as long as this value
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let storage = Self { base_path: None, db };
        storage.create_schema()?;
        Ok(storage)
    }

    /// Store directory, `None` for in-memory databases
    pub fn base_path(&self) -> Option<&Path> {
        self.base_path.as_deref()
    }

    fn create_schema(&self) -> Result<()> {
        debug!("Creating database schema");

        self.db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(())
    }
}

impl Storage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;

        let value = self
            .db
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get::<_, String>(0))
            .optional()
            .context("Failed to read key from database")?;

        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;

        self.db
            .execute(
                "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![key, value, now_ms()],
            )
            .context("Failed to write key to database")?;

        debug!(key, bytes = value.len(), "Stored value");
        Ok(())
    }
}

// ============================================================================
// File backend
// ============================================================================

/// Key-value storage as one `<key>.json` file per key
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Open or create the store directory under `<path>/.todoflow`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = prepare_store_dir(path.as_ref())?;
        info!(path = ?base_path, "Opened file storage");
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", key))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;

        let mut file = match File::open(self.key_path(key)) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Failed to open storage file"),
        };

        file.lock_shared().context("Failed to acquire file lock")?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read storage file")?;

        Ok(Some(content))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.key_path(key))
            .context("Failed to open storage file for writing")?;

        // Truncate only once the lock is held so readers never see a partial value
        file.lock_exclusive().context("Failed to acquire file lock")?;
        file.set_len(0)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;

        debug!(key, bytes = value.len(), "Stored value");
        // Lock is automatically released when file is dropped
        Ok(())
    }
}
