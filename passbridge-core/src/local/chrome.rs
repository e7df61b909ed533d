//! Chrome/Chromium `Login Data` reader.

use crate::local::keys::LocalKeyProvider;
use crate::local::RecordSource;
use crate::platform::expand_home;
use crate::records::{RawLoginRow, SourceRows};
use crate::{PassbridgeError, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name Chrome uses for its password database.
pub const LOGIN_DATA_FILE: &str = "Login Data";

const SELECT_LOGINS: &str = "SELECT signon_realm, action_url, username_element, password_element,
        username_value, password_value
 FROM main.logins";

/// A `Login Data` database opened read-only.
pub struct ChromeLoginStore {
    conn: Connection,
    path: PathBuf,
    keys: Box<dyn LocalKeyProvider>,
}

impl ChromeLoginStore {
    /// Open the database and check that it holds a `logins` table.
    pub fn open(path: &Path, keys: Box<dyn LocalKeyProvider>) -> Result<Self> {
        info!("Opening Chrome login database {}", path.display());
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            PassbridgeError::LocalStore(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let store = Self {
            conn,
            path: path.to_path_buf(),
            keys,
        };
        let count = store.count().map_err(|e| {
            PassbridgeError::LocalStore(format!(
                "{} is not readable as a Chrome login database (is Chrome still running?): {}",
                path.display(),
                e
            ))
        })?;
        info!("Connected to Chrome login database, {} passwords found", count);
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of saved logins.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM main.logins", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Every saved login, with passwords decrypted.
    ///
    /// `signon_realm` becomes the hostname so the imported login autofills
    /// on the same origins.
    pub fn read_logins(&self) -> Result<Vec<RawLoginRow>> {
        let mut stmt = self.conn.prepare(SELECT_LOGINS)?;
        let mut rows = stmt.query([])?;
        let mut logins = Vec::new();

        while let Some(row) = rows.next()? {
            let blob = match row.get_ref(5)? {
                ValueRef::Blob(bytes) | ValueRef::Text(bytes) => bytes.to_vec(),
                ValueRef::Null => Vec::new(),
                other => {
                    return Err(PassbridgeError::LocalStore(format!(
                        "unexpected password_value type {:?}",
                        other.data_type()
                    )))
                }
            };

            logins.push(RawLoginRow {
                hostname: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                form_submit_url: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                username_field: non_empty(row.get(2)?),
                password_field: non_empty(row.get(3)?),
                username: non_empty(row.get(4)?),
                password: self.keys.decrypt_password(&blob)?,
            });
        }

        debug!("Read {} logins from {}", logins.len(), self.path.display());
        Ok(logins)
    }
}

impl RecordSource for ChromeLoginStore {
    fn read_rows(&self) -> Result<SourceRows> {
        self.read_logins().map(SourceRows::from)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Every `Login Data` file under the given directories, depth first.
///
/// Missing or unreadable directories are skipped.
pub fn find_login_data(search_paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for path in search_paths {
        walk(&expand_home(path), &mut found);
    }
    found
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<_> = entries.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            walk(&path, found);
        } else if file_type.is_file() && entry.file_name() == LOGIN_DATA_FILE {
            debug!("Found {}", path.display());
            found.push(path);
        }
    }
}
