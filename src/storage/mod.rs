use crate::errors::{AppError, AppResult};
use crate::models::ColorMode;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");

pub const COLOR_MODE_KEY: &str = "colorMode";
pub const KIOSK_MODE_KEY: &str = "kioskMode";
pub const SIDEBAR_DOCKED_KEY: &str = "sidebarDocked";
const FIRST_LOGIN_PREFIX: &str = "firstLogin.";

/// String-valued key-value state, last write wins.
#[derive(Debug)]
pub struct LocalStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("local store mutex poisoned".to_string()))
    }

    pub fn get(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM local_state WHERE key = ?1",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO local_state (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM local_state WHERE key = ?1", [key])?;
        Ok(removed > 0)
    }

    pub fn color_mode(&self) -> AppResult<Option<ColorMode>> {
        Ok(self.get(COLOR_MODE_KEY)?.map(|raw| ColorMode::normalize(&raw)))
    }

    pub fn set_color_mode(&self, mode: ColorMode) -> AppResult<()> {
        self.set(COLOR_MODE_KEY, mode.as_str())
    }

    /// A user is on their first login until the flag is explicitly cleared.
    pub fn is_first_login(&self, user_id: u64) -> AppResult<bool> {
        let key = format!("{}{}", FIRST_LOGIN_PREFIX, user_id);
        Ok(self.get(&key)?.map_or(true, |raw| raw != "false"))
    }

    pub fn mark_first_login_done(&self, user_id: u64) -> AppResult<()> {
        self.set(&format!("{}{}", FIRST_LOGIN_PREFIX, user_id), "false")
    }

    pub fn kiosk_mode(&self) -> AppResult<bool> {
        Ok(self.get(KIOSK_MODE_KEY)?.as_deref() == Some("true"))
    }

    pub fn set_kiosk_mode(&self, enabled: bool) -> AppResult<()> {
        self.set(KIOSK_MODE_KEY, if enabled { "true" } else { "false" })
    }

    /// Sidebar defaults to docked when nothing was stored.
    pub fn sidebar_docked(&self) -> AppResult<bool> {
        Ok(self.get(SIDEBAR_DOCKED_KEY)?.as_deref() != Some("false"))
    }

    pub fn set_sidebar_docked(&self, docked: bool) -> AppResult<()> {
        self.set(SIDEBAR_DOCKED_KEY, if docked { "true" } else { "false" })
    }
}

#[cfg(test)]
mod tests {
    use super::LocalStore;
    use crate::models::ColorMode;

    #[test]
    fn last_write_wins() {
        let store = LocalStore::open_in_memory().expect("store");
        assert_eq!(store.get("k").expect("get"), None);
        store.set("k", "one").expect("set");
        store.set("k", "two").expect("set");
        assert_eq!(store.get("k").expect("get").as_deref(), Some("two"));
        assert!(store.remove("k").expect("remove"));
        assert!(!store.remove("k").expect("remove again"));
    }

    #[test]
    fn typed_helpers_apply_defaults() {
        let store = LocalStore::open_in_memory().expect("store");
        assert_eq!(store.color_mode().expect("mode"), None);
        assert!(store.is_first_login(7).expect("first login"));
        assert!(!store.kiosk_mode().expect("kiosk"));
        assert!(store.sidebar_docked().expect("sidebar"));

        store.set_color_mode(ColorMode::Dark).expect("set mode");
        store.mark_first_login_done(7).expect("mark");
        store.set_kiosk_mode(true).expect("kiosk");
        store.set_sidebar_docked(false).expect("sidebar");

        assert_eq!(store.color_mode().expect("mode"), Some(ColorMode::Dark));
        assert!(!store.is_first_login(7).expect("first login"));
        assert!(store.is_first_login(8).expect("other user"));
        assert!(store.kiosk_mode().expect("kiosk"));
        assert!(!store.sidebar_docked().expect("sidebar"));
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("state.sqlite");
        {
            let store = LocalStore::open(&path).expect("store");
            store.set_color_mode(ColorMode::Light).expect("set");
        }
        let store = LocalStore::open(&path).expect("reopen");
        assert_eq!(store.color_mode().expect("mode"), Some(ColorMode::Light));
        assert_eq!(store.path(), Some(path.as_path()));
    }
}
